//! CSV persistence for records and the skip-set read back from prior output.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::AppError;
use crate::models::{PRODUCT_URL_FIELD, Record};

/// Product URLs already present in a previous output file.
///
/// Missing files, unreadable files, files without a `product_url` column and
/// malformed rows all degrade to fewer (or zero) entries; this never fails.
pub fn load_skip_set(path: &Path) -> HashSet<String> {
    if !path.exists() {
        return HashSet::new();
    }

    let mut reader = match csv::Reader::from_path(path) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not open prior output");
            return HashSet::new();
        }
    };

    let column = match reader.headers() {
        Ok(headers) => headers.iter().position(|h| h == PRODUCT_URL_FIELD),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not read prior output header"
            );
            return HashSet::new();
        }
    };
    let Some(column) = column else {
        tracing::debug!(path = %path.display(), "Prior output has no product_url column");
        return HashSet::new();
    };

    let urls: HashSet<String> = reader
        .records()
        .filter_map(Result::ok)
        .filter_map(|row| row.get(column).map(str::trim).map(str::to_string))
        .filter(|url| !url.is_empty())
        .collect();

    tracing::info!(path = %path.display(), count = urls.len(), "Loaded previously scraped URLs");
    urls
}

/// Rows of a previous output file as string-valued records.
///
/// Used to carry earlier results forward when a run only scraped the
/// products missing from them. Unreadable input yields no rows.
pub fn load_records(path: &Path) -> Vec<Record> {
    let Ok(mut reader) = csv::Reader::from_path(path) else {
        return Vec::new();
    };
    let Ok(headers) = reader.headers().cloned() else {
        return Vec::new();
    };

    reader
        .records()
        .filter_map(Result::ok)
        .map(|row| {
            headers
                .iter()
                .zip(row.iter())
                .filter(|(_, value)| !value.is_empty())
                .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
                .collect()
        })
        .collect()
}

/// Column order for a batch: `product_url` first, then every other key in
/// sorted order.
pub fn header_for(records: &[Record]) -> Vec<String> {
    let rest: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.keys().map(String::as_str))
        .filter(|k| *k != PRODUCT_URL_FIELD)
        .collect();

    std::iter::once(PRODUCT_URL_FIELD.to_string())
        .chain(rest.into_iter().map(str::to_string))
        .collect()
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Write `records` to `path` as CSV, replacing any previous file.
///
/// The file is written next to its destination and renamed into place, so
/// readers only ever see a complete snapshot.
pub fn write_records(path: &Path, records: &[Record]) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let header = header_for(records);

    let mut writer = csv::Writer::from_path(&tmp)?;
    writer.write_record(&header)?;
    for record in records {
        writer.write_record(header.iter().map(|key| cell(record.get(key))))?;
    }
    writer.flush()?;
    drop(writer);

    fs::rename(&tmp, path)?;
    tracing::debug!(path = %path.display(), rows = records.len(), "Wrote CSV");
    Ok(())
}

/// Writes record snapshots to one fixed CSV path.
#[derive(Debug, Clone)]
pub struct RecordWriter {
    path: PathBuf,
}

impl RecordWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, records: &[Record]) -> Result<(), AppError> {
        write_records(&self.path, records)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

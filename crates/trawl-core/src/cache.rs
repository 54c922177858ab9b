//! Per-page content checksums, kept across runs to spot changed products.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::compute_hash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEntry {
    pub checksum: String,
    pub last_scraped: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    products: BTreeMap<String, PageEntry>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

/// JSON-backed checksum cache.
#[derive(Debug)]
pub struct PageCache {
    path: PathBuf,
    data: CacheFile,
}

impl PageCache {
    /// Load the cache at `path`. A missing or corrupt file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Corrupt page cache, starting fresh"
                );
                CacheFile::default()
            }),
            Err(_) => CacheFile::default(),
        };
        Self { path, data }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.data.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.products.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<&PageEntry> {
        self.data.products.get(url)
    }

    /// Record the page content for `url`. Returns `true` when the page is new
    /// or its checksum differs from the stored one.
    pub fn observe(&mut self, url: &str, html: &str) -> bool {
        let checksum = compute_hash(html);
        let now = Utc::now();
        let changed = self
            .data
            .products
            .get(url)
            .is_none_or(|entry| entry.checksum != checksum);

        self.data.products.insert(
            url.to_string(),
            PageEntry {
                checksum,
                last_scraped: now,
            },
        );
        self.data.last_updated = Some(now);
        changed
    }

    /// Whether `url` was never scraped or was last scraped more than `max_age` ago.
    pub fn should_refresh(&self, url: &str, max_age: TimeDelta) -> bool {
        self.data
            .products
            .get(url)
            .is_none_or(|entry| Utc::now() - entry.last_scraped > max_age)
    }

    pub fn save(&self) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_counts_as_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::load(dir.path().join(".trawl_cache.json"));
        assert!(cache.is_empty());
        assert!(cache.observe("https://a/1", "<html>v1</html>"));
        assert!(!cache.observe("https://a/1", "<html>v1</html>"));
        assert!(cache.observe("https://a/1", "<html>v2</html>"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn survives_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/.trawl_cache.json");
        let mut cache = PageCache::load(&path);
        cache.observe("https://a/1", "<html>v1</html>");
        cache.save().unwrap();

        let mut reloaded = PageCache::load(&path);
        assert_eq!(reloaded.get("https://a/1"), cache.get("https://a/1"));
        assert!(!reloaded.observe("https://a/1", "<html>v1</html>"));
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".trawl_cache.json");
        fs::write(&path, "{not json").unwrap();
        assert!(PageCache::load(&path).is_empty());
    }

    #[test]
    fn refresh_depends_on_age() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PageCache::load(dir.path().join("c.json"));
        assert!(cache.should_refresh("https://a/1", TimeDelta::hours(24)));
        cache.observe("https://a/1", "x");
        assert!(!cache.should_refresh("https://a/1", TimeDelta::hours(24)));
        assert!(cache.should_refresh("https://a/1", TimeDelta::seconds(-1)));
    }
}

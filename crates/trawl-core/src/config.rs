use crate::error::AppError;

/// Tunables for one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeConfig {
    /// Maximum concurrent product fetches for parallel strategies.
    pub workers: usize,
    /// Cap on collected product URLs per strategy attempt.
    pub max_products: usize,
    /// Write a checkpoint every this many processed products.
    pub checkpoint_interval: usize,
    /// Skip products already present in the output file.
    pub skip_existing: bool,
    pub checkpointing: bool,
    /// Track page checksums across runs and count changed pages.
    pub track_changes: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            max_products: 100,
            checkpoint_interval: 25,
            skip_existing: true,
            checkpointing: true,
            track_changes: false,
        }
    }
}

impl ScrapeConfig {
    /// Read configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// - `TRAWL_WORKERS` (defaults to 5)
    /// - `TRAWL_MAX_PRODUCTS` (defaults to 100)
    /// - `TRAWL_CHECKPOINT_INTERVAL` (defaults to 25)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();
        Ok(Self {
            workers: positive(&lookup, "TRAWL_WORKERS", defaults.workers)?,
            max_products: positive(&lookup, "TRAWL_MAX_PRODUCTS", defaults.max_products)?,
            checkpoint_interval: positive(
                &lookup,
                "TRAWL_CHECKPOINT_INTERVAL",
                defaults.checkpoint_interval,
            )?,
            ..defaults
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_max_products(mut self, max_products: usize) -> Self {
        self.max_products = max_products.max(1);
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    pub fn with_skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    pub fn with_checkpointing(mut self, enabled: bool) -> Self {
        self.checkpointing = enabled;
        self
    }

    pub fn with_change_tracking(mut self, enabled: bool) -> Self {
        self.track_changes = enabled;
        self
    }
}

fn positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: usize,
) -> Result<usize, AppError> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let parsed: usize = raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid {key} '{raw}': must be a positive integer"))
    })?;
    if parsed == 0 {
        return Err(AppError::ConfigError(format!("{key} must be at least 1")));
    }
    Ok(parsed)
}

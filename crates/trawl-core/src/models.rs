use std::fmt;
use std::time::Duration;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::capability::CapabilityReport;

/// One extracted product record.
///
/// Opaque to the engine: the extraction callback decides the keys. The only
/// key the engine ever reads is [`PRODUCT_URL_FIELD`], and only when laying
/// records out as CSV.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Column holding the product page URL in persisted output.
pub const PRODUCT_URL_FIELD: &str = "product_url";

/// Statistics for one orchestrator run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub site: String,
    /// Name of the strategy that produced records, if any did.
    pub strategy_used: Option<String>,
    pub total_records: usize,
    /// Products whose fetch or extraction yielded nothing.
    pub failed_products: usize,
    /// Products skipped because prior output already contains them.
    pub skipped_products: usize,
    /// Products dropped because robots.txt disallows them.
    pub disallowed_products: usize,
    /// Product pages whose content differs from the previous run.
    pub changed_pages: usize,
    #[serde(with = "duration_secs")]
    pub final_delay: Duration,
}

impl RunStats {
    pub fn new(site: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            site: site.into(),
            strategy_used: None,
            total_records: 0,
            failed_products: 0,
            skipped_products: 0,
            disallowed_products: 0,
            changed_pages: 0,
            final_delay: Duration::ZERO,
        }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} for {}", self.run_id, self.site)?;
        writeln!(
            f,
            "  Strategy used:            {}",
            self.strategy_used.as_deref().unwrap_or("none")
        )?;
        writeln!(f, "  Total records:            {}", self.total_records)?;
        writeln!(f, "  Failed products:          {}", self.failed_products)?;
        writeln!(f, "  Skipped (already scraped): {}", self.skipped_products)?;
        writeln!(f, "  Disallowed by robots.txt: {}", self.disallowed_products)?;
        writeln!(f, "  Changed pages:            {}", self.changed_pages)?;
        write!(
            f,
            "  Final delay:              {:.2}s",
            self.final_delay.as_secs_f64()
        )
    }
}

/// Why a run ended without records.
#[derive(Debug, Clone)]
pub enum NoResultsReason {
    /// No configured strategy can run in this environment.
    NoViableStrategy {
        capabilities: CapabilityReport,
        configured: Vec<String>,
    },
    /// Every viable strategy ran and produced zero records.
    StrategiesExhausted { attempted: Vec<String> },
}

impl fmt::Display for NoResultsReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoResultsReason::NoViableStrategy {
                capabilities,
                configured,
            } => {
                writeln!(f, "No viable scraping strategy")?;
                writeln!(f, "Configured strategies: {}", configured.join(", "))?;
                if let Some(reason) = capabilities.blocking_reason() {
                    writeln!(f, "Blocked by: {reason}")?;
                }
                write!(f, "{capabilities}")
            }
            NoResultsReason::StrategiesExhausted { attempted } => {
                write!(
                    f,
                    "All strategies returned zero records (attempted: {})",
                    attempted.join(", ")
                )
            }
        }
    }
}

/// Terminal state of an orchestrator run.
#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        records: Vec<Record>,
        stats: RunStats,
    },
    NoResults {
        stats: RunStats,
        reason: NoResultsReason,
    },
}

impl RunOutcome {
    pub fn stats(&self) -> &RunStats {
        match self {
            RunOutcome::Completed { stats, .. } | RunOutcome::NoResults { stats, .. } => stats,
        }
    }

    /// Records gathered by the run; empty for `NoResults`.
    pub fn records(&self) -> &[Record] {
        match self {
            RunOutcome::Completed { records, .. } => records,
            RunOutcome::NoResults { .. } => &[],
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

mod duration_secs {
    use std::time::Duration;

    pub fn serialize<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

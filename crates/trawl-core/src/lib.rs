pub mod cache;
pub mod capability;
pub mod config;
pub mod error;
pub mod governor;
pub mod links;
pub mod models;
pub mod orchestrator;
pub mod persist;
pub mod profile;
pub mod strategy;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use capability::{CapabilityProbe, CapabilityReport, EnvProbe};
pub use config::ScrapeConfig;
pub use error::{AppError, FailureKind};
pub use governor::{GovernorConfig, RateGovernor};
pub use models::{NoResultsReason, PRODUCT_URL_FIELD, Record, RunOutcome, RunStats, compute_hash};
pub use orchestrator::ScrapeOrchestrator;
pub use persist::RecordWriter;
pub use profile::{Pagination, ProfileSpec, SiteConfig, SiteProfile, StrategySpec};
pub use strategy::{BrowserRendered, DirectHttp, FetchStrategy};
pub use traits::{
    AllowAll, BrowserDriver, BrowserSession, Extractor, Fetcher, NoBrowser, RobotsPolicy,
};

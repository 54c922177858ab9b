//! Run-level control: pick strategies, collect product URLs, fan out fetches,
//! aggregate records and decide the outcome.

use std::collections::{BTreeSet, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinSet;

use crate::cache::PageCache;
use crate::capability::CapabilityProbe;
use crate::config::ScrapeConfig;
use crate::governor::{GovernorConfig, RateGovernor};
use crate::models::{NoResultsReason, Record, RunOutcome, RunStats};
use crate::persist::{self, RecordWriter};
use crate::profile::{SiteConfig, SiteProfile};
use crate::strategy::{DirectHttp, FetchStrategy};
use crate::traits::{AllowAll, BrowserDriver, Extractor, Fetcher, RobotsPolicy};

/// Drives one site through its strategies, first productive one wins.
pub struct ScrapeOrchestrator<F, D: BrowserDriver, P, E> {
    profile: SiteProfile<F, D>,
    probe: P,
    extractor: Arc<E>,
    robots: Arc<dyn RobotsPolicy>,
    governor: GovernorConfig,
    config: ScrapeConfig,
}

impl<F, D, P, E> ScrapeOrchestrator<F, D, P, E>
where
    F: Fetcher,
    D: BrowserDriver,
    P: CapabilityProbe,
    E: Extractor,
{
    pub fn new(profile: SiteProfile<F, D>, probe: P, extractor: E) -> Self {
        Self {
            profile,
            probe,
            extractor: Arc::new(extractor),
            robots: Arc::new(AllowAll),
            governor: GovernorConfig::default(),
            config: ScrapeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ScrapeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_governor(mut self, governor: GovernorConfig) -> Self {
        self.governor = governor;
        self
    }

    pub fn with_robots(mut self, robots: impl RobotsPolicy + 'static) -> Self {
        self.robots = Arc::new(robots);
        self
    }

    pub fn site(&self) -> &SiteConfig {
        &self.profile.site
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub async fn run(&mut self) -> RunOutcome {
        let site = Arc::new(self.profile.site.clone());
        let mut stats = RunStats::new(&site.key);
        let governor = RateGovernor::new(self.governor.clone());

        tracing::info!(
            run_id = %stats.run_id,
            site = %site.name,
            workers = self.config.workers,
            max_products = self.config.max_products,
            "Starting run"
        );

        let skip = if self.config.skip_existing {
            persist::load_skip_set(&site.output_path())
        } else {
            HashSet::new()
        };

        let mut viable = Vec::new();
        for (idx, strategy) in self.profile.strategies.iter().enumerate() {
            let supported = strategy.supports(&self.probe).await;
            if supported {
                tracing::info!(strategy = strategy.name(), "{}", strategy.status_message(true));
                viable.push(idx);
            } else {
                tracing::warn!(strategy = strategy.name(), "{}", strategy.status_message(false));
            }
        }

        if viable.is_empty() {
            let capabilities = self.probe.report().await;
            stats.final_delay = governor.current_delay();
            tracing::warn!(site = %site.name, "No viable scraping strategy");
            return RunOutcome::NoResults {
                stats,
                reason: NoResultsReason::NoViableStrategy {
                    capabilities,
                    configured: names(self.profile.strategy_names()),
                },
            };
        }

        let observed = Arc::new(Observed {
            inner: self.extractor.clone(),
            cache: self
                .config
                .track_changes
                .then(|| Mutex::new(PageCache::load(site.cache_path()))),
            changed: AtomicUsize::new(0),
        });

        let mut attempted = Vec::new();
        let mut winner = None;

        for idx in viable {
            let strategy = &mut self.profile.strategies[idx];
            let name = strategy.name();
            attempted.push(name.to_string());
            tracing::info!(strategy = name, "Attempting strategy");

            let attempt = attempt_strategy(
                strategy,
                &site,
                &skip,
                self.robots.as_ref(),
                &observed,
                &governor,
                &self.config,
            )
            .await;
            strategy.cleanup().await;

            stats.failed_products += attempt.failed;
            stats.skipped_products = attempt.skipped;
            stats.disallowed_products = attempt.disallowed;

            if attempt.records.is_empty() {
                tracing::warn!(strategy = name, "Strategy returned no records, trying next");
                continue;
            }

            tracing::info!(
                strategy = name,
                records = attempt.records.len(),
                "Strategy succeeded"
            );
            stats.strategy_used = Some(name.to_string());
            winner = Some(attempt.records);
            break;
        }

        stats.changed_pages = observed.changed.load(Ordering::Relaxed);
        observed.save_cache();
        stats.final_delay = governor.current_delay();

        match winner {
            Some(records) => {
                stats.total_records = records.len();
                RunOutcome::Completed { records, stats }
            }
            None => {
                tracing::warn!(
                    site = %site.name,
                    ?attempted,
                    "All strategies returned zero records"
                );
                RunOutcome::NoResults {
                    stats,
                    reason: NoResultsReason::StrategiesExhausted { attempted },
                }
            }
        }
    }
}

fn names(names: Vec<&'static str>) -> Vec<String> {
    names.into_iter().map(str::to_string).collect()
}

struct Attempt {
    records: Vec<Record>,
    failed: usize,
    skipped: usize,
    disallowed: usize,
}

async fn attempt_strategy<F, D, E>(
    strategy: &mut FetchStrategy<F, D>,
    site: &Arc<SiteConfig>,
    skip: &HashSet<String>,
    robots: &dyn RobotsPolicy,
    extractor: &Arc<Observed<E>>,
    governor: &RateGovernor,
    config: &ScrapeConfig,
) -> Attempt
where
    F: Fetcher,
    D: BrowserDriver,
    E: Extractor,
{
    let collected = collect_product_urls(strategy, site, config.max_products).await;

    let mut urls: BTreeSet<String> = collected;
    let before_skip = urls.len();
    urls.retain(|url| !skip.contains(url));
    let skipped = before_skip - urls.len();
    if skipped > 0 {
        tracing::info!(skipped, "Skipping already-scraped products");
    }

    let before_robots = urls.len();
    urls.retain(|url| robots.is_allowed(url));
    let disallowed = before_robots - urls.len();
    if disallowed > 0 {
        tracing::info!(disallowed, "Dropping products disallowed by robots.txt");
    }

    let urls: Vec<String> = urls.into_iter().collect();
    tracing::info!(
        strategy = strategy.name(),
        total = urls.len(),
        concurrent = !strategy.runs_sequentially(),
        "Products to scrape"
    );

    let checkpoint = config
        .checkpointing
        .then(|| RecordWriter::new(site.checkpoint_path()));
    let aggregator = Arc::new(Aggregator::new(checkpoint, config.checkpoint_interval));

    if !urls.is_empty() {
        match strategy {
            FetchStrategy::DirectHttp(http) => {
                dispatch_concurrent(
                    http,
                    site,
                    urls,
                    extractor,
                    governor,
                    &aggregator,
                    config.workers,
                )
                .await
            }
            other => dispatch_sequential(other, site, urls, extractor, governor, &aggregator).await,
        }
    }

    let state = aggregator.take();
    Attempt {
        records: state.records,
        failed: state.failed,
        skipped,
        disallowed,
    }
}

/// Walk every listing (and its pagination) until `cap` product URLs are known.
async fn collect_product_urls<F: Fetcher, D: BrowserDriver>(
    strategy: &mut FetchStrategy<F, D>,
    site: &SiteConfig,
    cap: usize,
) -> BTreeSet<String> {
    let mut all = BTreeSet::new();
    let pages = site.pagination.as_ref().map_or(1, |p| p.max_pages.max(1));

    'listings: for listing in &site.listing_urls {
        for page in 1..=pages {
            let url = match &site.pagination {
                Some(pagination) => match pagination.page_url(listing, page) {
                    Some(url) => url,
                    None => break,
                },
                None => listing.clone(),
            };

            let found = strategy.list_product_urls(site, &url).await;
            let before = all.len();
            all.extend(found);
            let added = all.len() - before;
            tracing::info!(
                listing = %url,
                page,
                added,
                total = all.len(),
                "Collected product links"
            );

            if all.len() >= cap {
                tracing::info!(cap, "Reached product limit");
                break 'listings;
            }
            if added == 0 {
                break;
            }
        }
    }

    all.into_iter().take(cap).collect()
}

async fn dispatch_concurrent<F: Fetcher, E: Extractor>(
    http: &DirectHttp<F>,
    site: &Arc<SiteConfig>,
    urls: Vec<String>,
    extractor: &Arc<Observed<E>>,
    governor: &RateGovernor,
    aggregator: &Arc<Aggregator>,
    workers: usize,
) {
    let workers = workers.max(1);
    let total = urls.len();
    let mut pending = urls.into_iter().enumerate();
    let mut tasks = JoinSet::new();

    loop {
        while tasks.len() < workers {
            let Some((index, url)) = pending.next() else {
                break;
            };
            let http = http.clone();
            let site = site.clone();
            let extractor = extractor.clone();
            let governor = governor.clone();
            let aggregator = aggregator.clone();
            tasks.spawn(async move {
                tracing::debug!(index = index + 1, total, url = %url, "Scraping product");
                let records = http
                    .fetch_and_extract(&site, &url, &*extractor, &governor)
                    .await;
                aggregator.absorb(&url, records).await;
            });
        }

        match tasks.join_next().await {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "Product worker crashed");
                aggregator.record_failure();
            }
            None => break,
        }
    }
}

async fn dispatch_sequential<F: Fetcher, D: BrowserDriver, E: Extractor>(
    strategy: &mut FetchStrategy<F, D>,
    site: &SiteConfig,
    urls: Vec<String>,
    extractor: &Observed<E>,
    governor: &RateGovernor,
    aggregator: &Aggregator,
) {
    let total = urls.len();
    for (index, url) in urls.into_iter().enumerate() {
        tracing::debug!(index = index + 1, total, url = %url, "Scraping product");
        let records = strategy
            .fetch_and_extract(site, &url, extractor, governor)
            .await;
        aggregator.absorb(&url, records).await;
    }
}

#[derive(Default)]
struct RunState {
    records: Vec<Record>,
    processed: usize,
    failed: usize,
}

/// Fan-in point for worker results.
struct Aggregator {
    state: Mutex<RunState>,
    checkpoint: Option<Arc<Checkpoint>>,
    interval: usize,
}

impl Aggregator {
    fn new(checkpoint: Option<RecordWriter>, interval: usize) -> Self {
        Self {
            state: Mutex::new(RunState::default()),
            checkpoint: checkpoint.map(|writer| Arc::new(Checkpoint::new(writer))),
            interval: interval.max(1),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned aggregation mutex");
            poisoned.into_inner()
        })
    }

    /// Fold one product's records into the run. Every `interval` processed
    /// products the accumulated records are snapshotted under the lock and
    /// written off the async workers.
    async fn absorb(&self, url: &str, records: Vec<Record>) {
        let snapshot = {
            let mut state = self.lock_state();
            if records.is_empty() {
                state.failed += 1;
                tracing::warn!(url = %url, "No records extracted");
                return;
            }

            tracing::info!(url = %url, variants = records.len(), "Extracted product");
            state.records.extend(records);
            state.processed += 1;

            let due = self.checkpoint.is_some() && state.processed % self.interval == 0;
            due.then(|| (state.processed, state.records.clone()))
        };

        let (Some(checkpoint), Some((processed, records))) = (&self.checkpoint, snapshot) else {
            return;
        };
        let checkpoint = checkpoint.clone();
        let written =
            tokio::task::spawn_blocking(move || checkpoint.write(processed, &records)).await;
        if let Err(e) = written {
            tracing::warn!(error = %e, "Checkpoint task failed");
        }
    }

    fn record_failure(&self) {
        self.lock_state().failed += 1;
    }

    fn take(&self) -> RunState {
        std::mem::take(&mut *self.lock_state())
    }
}

/// Checkpoint file plus the processed count of the snapshot it holds.
/// Snapshots older than the one on disk are dropped.
struct Checkpoint {
    writer: RecordWriter,
    written: Mutex<usize>,
}

impl Checkpoint {
    fn new(writer: RecordWriter) -> Self {
        Self {
            writer,
            written: Mutex::new(0),
        }
    }

    fn write(&self, processed: usize, records: &[Record]) {
        let mut written = self.written.lock().unwrap_or_else(|p| p.into_inner());
        if processed <= *written {
            tracing::debug!(processed, on_disk = *written, "Skipping stale checkpoint");
            return;
        }
        match self.writer.write(records) {
            Ok(()) => {
                *written = processed;
                tracing::info!(
                    path = %self.writer.path().display(),
                    records = records.len(),
                    "Checkpoint saved"
                );
            }
            Err(e) => tracing::warn!(error = %e, "Checkpoint write failed"),
        }
    }
}

/// Extractor wrapper feeding the page cache on the way through.
struct Observed<E> {
    inner: Arc<E>,
    cache: Option<Mutex<PageCache>>,
    changed: AtomicUsize,
}

impl<E> Observed<E> {
    fn save_cache(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        let cache = cache.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = cache.save() {
            tracing::warn!(path = %cache.path().display(), error = %e, "Could not save page cache");
        }
    }
}

impl<E: Extractor> Extractor for Observed<E> {
    fn extract(&self, html: &str, product_url: &str, site: &SiteConfig) -> Vec<Record> {
        if let Some(cache) = &self.cache {
            let changed = cache
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .observe(product_url, html);
            if changed {
                self.changed.fetch_add(1, Ordering::Relaxed);
            }
        }
        // A panicking extractor costs one product, on either dispatch path.
        panic::catch_unwind(AssertUnwindSafe(|| self.inner.extract(html, product_url, site)))
            .unwrap_or_else(|_| {
                tracing::error!(url = %product_url, "Extractor panicked");
                Vec::new()
            })
    }
}

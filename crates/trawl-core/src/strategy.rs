//! Fetch strategies: how a page is retrieved and handed to the extractor.
//!
//! The set of transports is closed. [`FetchStrategy`] is an enum over the two
//! variants, and the orchestrator only talks to the enum:
//!
//! - [`DirectHttp`]: plain HTTP requests with local retry. Safe to clone
//!   into concurrent workers.
//! - [`BrowserRendered`]: a lazily launched headless browser for
//!   client-rendered sites. Owns one session and needs `&mut self`, so it
//!   can only ever serve one navigation at a time.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use crate::capability::CapabilityProbe;
use crate::error::AppError;
use crate::governor::RateGovernor;
use crate::links;
use crate::models::Record;
use crate::profile::SiteConfig;
use crate::traits::{BrowserDriver, BrowserSession, Extractor, Fetcher};

/// Plain HTTP transport.
#[derive(Clone)]
pub struct DirectHttp<F> {
    fetcher: F,
    listing_delay: Duration,
    max_attempts: u32,
    backoff_base: Duration,
}

impl<F: Fetcher> DirectHttp<F> {
    /// 3 attempts, 1 s exponential backoff base, 0.3 s pause after listings.
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            listing_delay: Duration::from_millis(300),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }

    pub fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Server errors sleep `backoff_base * 2^attempt` before retrying.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub async fn list_product_urls(
        &self,
        site: &SiteConfig,
        listing_url: &str,
    ) -> BTreeSet<String> {
        match self.fetcher.fetch(listing_url).await {
            Ok(html) => {
                let urls = links::product_links(&html, site);
                tokio::time::sleep(self.listing_delay).await;
                urls
            }
            Err(e) => {
                tracing::warn!(url = %listing_url, error = %e, "Listing fetch failed");
                BTreeSet::new()
            }
        }
    }

    pub async fn fetch_and_extract<E: Extractor + ?Sized>(
        &self,
        site: &SiteConfig,
        product_url: &str,
        extractor: &E,
        governor: &RateGovernor,
    ) -> Vec<Record> {
        for attempt in 0..self.max_attempts {
            let last = attempt + 1 == self.max_attempts;

            match self.fetcher.fetch(product_url).await {
                Ok(html) => {
                    governor.record_success();
                    let records = extractor.extract(&html, product_url, site);
                    if !records.is_empty() {
                        governor.wait().await;
                    }
                    return records;
                }
                Err(AppError::RateLimited(_)) => {
                    governor.record_rate_limited();
                    governor.wait().await;
                    if last {
                        tracing::warn!(url = %product_url, "Still rate limited after retries");
                        return Vec::new();
                    }
                }
                Err(AppError::ServerError { status, .. }) if !last => {
                    let backoff = self.backoff_base * 2u32.pow(attempt);
                    tracing::debug!(
                        url = %product_url,
                        status,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        "Server error, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
                // Timeouts give up without touching the governor.
                Err(AppError::Timeout(secs)) if last => {
                    tracing::warn!(
                        url = %product_url,
                        timeout_secs = secs,
                        "Timed out after retries"
                    );
                    return Vec::new();
                }
                Err(e) if e.is_retryable() && !last => {
                    tracing::debug!(
                        url = %product_url,
                        attempt = attempt + 1,
                        kind = %e.failure_kind(),
                        error = %e,
                        "Transient failure, retrying"
                    );
                }
                Err(e) => {
                    governor.record_error();
                    tracing::warn!(
                        url = %product_url,
                        kind = %e.failure_kind(),
                        error = %e,
                        "Product fetch failed"
                    );
                    return Vec::new();
                }
            }
        }
        Vec::new()
    }
}

/// Headless-browser transport for client-rendered catalogs.
pub struct BrowserRendered<D: BrowserDriver> {
    driver: D,
    session: Option<D::Session>,
    scroll_count: u32,
    scroll_pause: Duration,
    navigation_timeout: Duration,
    settle: Duration,
}

impl<D: BrowserDriver> BrowserRendered<D> {
    /// 10 scrolls, 60 s navigation timeout, 3 s settle delay.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            session: None,
            scroll_count: 10,
            scroll_pause: Duration::from_secs(1),
            navigation_timeout: Duration::from_secs(60),
            settle: Duration::from_secs(3),
        }
    }

    pub fn with_scroll_count(mut self, scrolls: u32) -> Self {
        self.scroll_count = scrolls;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    async fn session(&mut self) -> Result<&mut D::Session, AppError> {
        if self.session.is_none() {
            tracing::info!("Launching browser session");
            let session = self.driver.launch().await?;
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .ok_or_else(|| AppError::BrowserError("browser session unavailable".into()))
    }

    async fn within<T>(
        limit: Duration,
        fut: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(AppError::Timeout(limit.as_secs())))
    }

    pub async fn list_product_urls(
        &mut self,
        site: &SiteConfig,
        listing_url: &str,
    ) -> BTreeSet<String> {
        let selector = site
            .product_link_selectors()
            .first()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "a".to_string());
        let limit = self.navigation_timeout + self.scroll_pause * self.scroll_count;
        let scrolls = self.scroll_count;

        let rendered = match self.session().await {
            Ok(session) => {
                Self::within(limit, session.render_scrolled(listing_url, &selector, scrolls)).await
            }
            Err(e) => Err(e),
        };

        match rendered {
            Ok(html) => links::product_links(&html, site),
            Err(e) => {
                tracing::warn!(url = %listing_url, error = %e, "Browser listing render failed");
                BTreeSet::new()
            }
        }
    }

    pub async fn fetch_and_extract<E: Extractor + ?Sized>(
        &mut self,
        site: &SiteConfig,
        product_url: &str,
        extractor: &E,
        governor: &RateGovernor,
    ) -> Vec<Record> {
        let limit = self.navigation_timeout + self.settle;
        let settle = self.settle;

        let rendered = match self.session().await {
            Ok(session) => Self::within(limit, session.render(product_url, settle)).await,
            Err(e) => Err(e),
        };

        match rendered {
            Ok(html) => {
                governor.record_success();
                let records = extractor.extract(&html, product_url, site);
                if !records.is_empty() {
                    governor.wait().await;
                }
                records
            }
            Err(e) => {
                governor.record_error();
                tracing::warn!(url = %product_url, error = %e, "Browser product render failed");
                Vec::new()
            }
        }
    }

    /// Close the session if one was opened. Idempotent.
    pub async fn cleanup(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!("Closing browser session");
            session.close().await;
        }
    }
}

/// A transport, as seen by the orchestrator.
pub enum FetchStrategy<F, D: BrowserDriver> {
    DirectHttp(DirectHttp<F>),
    BrowserRendered(BrowserRendered<D>),
}

impl<F: Fetcher, D: BrowserDriver> FetchStrategy<F, D> {
    pub fn name(&self) -> &'static str {
        match self {
            FetchStrategy::DirectHttp(_) => "direct_http",
            FetchStrategy::BrowserRendered(_) => "browser_rendered",
        }
    }

    /// Browser sessions are not re-entrant, so product fetches run one at a time.
    pub fn runs_sequentially(&self) -> bool {
        matches!(self, FetchStrategy::BrowserRendered(_))
    }

    pub async fn supports<P: CapabilityProbe + ?Sized>(&self, probe: &P) -> bool {
        match self {
            FetchStrategy::DirectHttp(_) => true,
            FetchStrategy::BrowserRendered(_) => probe.browser_launchable().await,
        }
    }

    pub fn status_message(&self, supported: bool) -> String {
        if supported {
            format!("{} strategy available", self.name())
        } else {
            format!("{} strategy not available", self.name())
        }
    }

    pub async fn list_product_urls(
        &mut self,
        site: &SiteConfig,
        listing_url: &str,
    ) -> BTreeSet<String> {
        match self {
            FetchStrategy::DirectHttp(s) => s.list_product_urls(site, listing_url).await,
            FetchStrategy::BrowserRendered(s) => s.list_product_urls(site, listing_url).await,
        }
    }

    pub async fn fetch_and_extract<E: Extractor + ?Sized>(
        &mut self,
        site: &SiteConfig,
        product_url: &str,
        extractor: &E,
        governor: &RateGovernor,
    ) -> Vec<Record> {
        match self {
            FetchStrategy::DirectHttp(s) => {
                s.fetch_and_extract(site, product_url, extractor, governor)
                    .await
            }
            FetchStrategy::BrowserRendered(s) => {
                s.fetch_and_extract(site, product_url, extractor, governor)
                    .await
            }
        }
    }

    pub async fn cleanup(&mut self) {
        if let FetchStrategy::BrowserRendered(s) = self {
            s.cleanup().await;
        }
    }
}

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::models::Record;
use crate::profile::SiteConfig;

/// Fetches raw HTML content from a URL.
///
/// Implementations classify failures so retry policy can react to them:
/// HTTP 429 maps to [`AppError::RateLimited`], 5xx to
/// [`AppError::ServerError`], and client timeouts to [`AppError::Timeout`].
pub trait Fetcher: Send + Sync + Clone + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Launches headless browser sessions.
pub trait BrowserDriver: Send + Sync + 'static {
    type Session: BrowserSession;

    /// Whether the automation engine is compiled in and a browser binary
    /// can be located. Must not launch anything.
    fn is_installed(&self) -> bool;

    /// Start a fresh browser with one open tab.
    fn launch(&self) -> impl Future<Output = Result<Self::Session, AppError>> + Send;
}

/// A live browser with a single tab. Not re-entrant: one navigation at a time.
pub trait BrowserSession: Send + 'static {
    /// Navigate to `url`, wait `settle` for lazy content, return the rendered DOM.
    fn render(
        &mut self,
        url: &str,
        settle: Duration,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Navigate to `url` and scroll until the number of elements matching
    /// `selector` stops growing (at most `max_scrolls` times), then return
    /// the rendered DOM.
    fn render_scrolled(
        &mut self,
        url: &str,
        selector: &str,
        max_scrolls: u32,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Close the browser and release its process.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Turns a product page into records.
///
/// Infallible by contract: implementations catch their own errors and
/// return an empty list instead.
pub trait Extractor: Send + Sync + 'static {
    fn extract(&self, html: &str, product_url: &str, site: &SiteConfig) -> Vec<Record>;
}

impl<T> Extractor for T
where
    T: Fn(&str, &str, &SiteConfig) -> Vec<Record> + Send + Sync + 'static,
{
    fn extract(&self, html: &str, product_url: &str, site: &SiteConfig) -> Vec<Record> {
        self(html, product_url, site)
    }
}

/// Yes/no oracle for robots exclusion.
pub trait RobotsPolicy: Send + Sync {
    fn is_allowed(&self, url: &str) -> bool;
}

/// Policy that allows every URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl RobotsPolicy for AllowAll {
    fn is_allowed(&self, _url: &str) -> bool {
        true
    }
}

/// Driver for builds without browser automation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

/// Session type of [`NoBrowser`]; cannot be constructed.
#[derive(Debug)]
pub enum NoSession {}

impl BrowserDriver for NoBrowser {
    type Session = NoSession;

    fn is_installed(&self) -> bool {
        false
    }

    async fn launch(&self) -> Result<NoSession, AppError> {
        Err(AppError::BrowserError(
            "browser automation is not compiled into this build".into(),
        ))
    }
}

impl BrowserSession for NoSession {
    async fn render(&mut self, _url: &str, _settle: Duration) -> Result<String, AppError> {
        match *self {}
    }

    async fn render_scrolled(
        &mut self,
        _url: &str,
        _selector: &str,
        _max_scrolls: u32,
    ) -> Result<String, AppError> {
        match *self {}
    }

    async fn close(self) {
        match self {}
    }
}

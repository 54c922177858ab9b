//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::capability::CapabilityProbe;
use crate::error::AppError;
use crate::models::{PRODUCT_URL_FIELD, Record};
use crate::profile::SiteConfig;
use crate::traits::{BrowserDriver, BrowserSession, Extractor, Fetcher, RobotsPolicy};

const DEFAULT_HTML: &str = "<html><body>default</body></html>";

/// Anchor-only listing page, one `a.card` per href.
pub fn listing_html(hrefs: &[&str]) -> String {
    let anchors: String = hrefs
        .iter()
        .map(|href| format!("<a class=\"card\" href=\"{href}\">item</a>"))
        .collect();
    format!("<html><body>{anchors}</body></html>")
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// One scripted fetch result.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Html(String),
    RateLimited,
    ServerError(u16),
    Timeout,
    Network,
    NotFound,
}

impl MockResponse {
    fn into_result(self, url: &str) -> Result<String, AppError> {
        match self {
            MockResponse::Html(html) => Ok(html),
            MockResponse::RateLimited => Err(AppError::RateLimited(url.to_string())),
            MockResponse::ServerError(status) => Err(AppError::ServerError {
                status,
                url: url.to_string(),
            }),
            MockResponse::Timeout => Err(AppError::Timeout(30)),
            MockResponse::Network => Err(AppError::NetworkError("connection refused".into())),
            MockResponse::NotFound => Err(AppError::HttpError(format!("HTTP 404 for {url}"))),
        }
    }
}

#[derive(Default)]
struct FetcherState {
    /// Per-URL scripts. The last entry of a script repeats forever.
    routes: HashMap<String, VecDeque<MockResponse>>,
    /// Consumed in order by URLs without a route.
    queue: VecDeque<MockResponse>,
    calls: Vec<String>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Mock fetcher with URL routing and a fallback response queue.
#[derive(Clone)]
pub struct MockFetcher {
    default_html: String,
    latency: Duration,
    state: Arc<Mutex<FetcherState>>,
}

impl MockFetcher {
    /// Returns `html` for every URL.
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            default_html: html.into(),
            latency: Duration::ZERO,
            state: Arc::new(Mutex::new(FetcherState::default())),
        }
    }

    /// Returns `error` once, then the default page.
    pub fn with_error(error: MockResponse) -> Self {
        Self::with_responses(vec![error])
    }

    /// Consumes `responses` in order, then returns the default page.
    pub fn with_responses(responses: Vec<MockResponse>) -> Self {
        let fetcher = Self::new(DEFAULT_HTML);
        fetcher.state.lock().unwrap().queue = responses.into();
        fetcher
    }

    pub fn route(self, url: &str, html: impl Into<String>) -> Self {
        self.route_responses(url, vec![MockResponse::Html(html.into())])
    }

    pub fn route_responses(self, url: &str, responses: Vec<MockResponse>) -> Self {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(url.to_string(), responses.into());
        self
    }

    /// Sleep this long inside every fetch.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| *c == url)
            .count()
    }

    /// Highest number of fetches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    fn next_response(&self, url: &str) -> MockResponse {
        let mut state = self.state.lock().unwrap();
        state.calls.push(url.to_string());
        if let Some(script) = state.routes.get_mut(url) {
            if script.len() > 1 {
                if let Some(next) = script.pop_front() {
                    return next;
                }
            }
            if let Some(last) = script.front() {
                return last.clone();
            }
        }
        state
            .queue
            .pop_front()
            .unwrap_or_else(|| MockResponse::Html(self.default_html.clone()))
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self.next_response(url);
        {
            let mut state = self.state.lock().unwrap();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.state.lock().unwrap().in_flight -= 1;
        response.into_result(url)
    }
}

// ---------------------------------------------------------------------------
// MockBrowser
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BrowserState {
    pages: HashMap<String, String>,
    launches: usize,
    closes: usize,
    rendered: Vec<String>,
    scrolled: Vec<(String, String, u32)>,
}

/// Mock browser driver serving canned pages.
#[derive(Clone)]
pub struct MockBrowser {
    installed: bool,
    launch_fails: bool,
    state: Arc<Mutex<BrowserState>>,
}

impl MockBrowser {
    /// Installed and launchable.
    pub fn new() -> Self {
        Self {
            installed: true,
            launch_fails: false,
            state: Arc::new(Mutex::new(BrowserState::default())),
        }
    }

    pub fn not_installed() -> Self {
        Self {
            installed: false,
            ..Self::new()
        }
    }

    /// Installed, but every launch fails.
    pub fn failing_launch() -> Self {
        Self {
            launch_fails: true,
            ..Self::new()
        }
    }

    pub fn with_page(self, url: &str, html: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), html.into());
        self
    }

    pub fn launches(&self) -> usize {
        self.state.lock().unwrap().launches
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn rendered(&self) -> Vec<String> {
        self.state.lock().unwrap().rendered.clone()
    }

    pub fn scrolled(&self) -> Vec<(String, String, u32)> {
        self.state.lock().unwrap().scrolled.clone()
    }
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserDriver for MockBrowser {
    type Session = MockSession;

    fn is_installed(&self) -> bool {
        self.installed
    }

    async fn launch(&self) -> Result<MockSession, AppError> {
        self.state.lock().unwrap().launches += 1;
        if self.launch_fails {
            return Err(AppError::BrowserError(
                "error while loading shared libraries: libnss3.so".into(),
            ));
        }
        Ok(MockSession {
            state: self.state.clone(),
        })
    }
}

pub struct MockSession {
    state: Arc<Mutex<BrowserState>>,
}

impl MockSession {
    fn page(&self, url: &str) -> String {
        self.state
            .lock()
            .unwrap()
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string())
    }
}

impl BrowserSession for MockSession {
    async fn render(&mut self, url: &str, _settle: Duration) -> Result<String, AppError> {
        self.state.lock().unwrap().rendered.push(url.to_string());
        Ok(self.page(url))
    }

    async fn render_scrolled(
        &mut self,
        url: &str,
        selector: &str,
        max_scrolls: u32,
    ) -> Result<String, AppError> {
        self.state.lock().unwrap().scrolled.push((
            url.to_string(),
            selector.to_string(),
            max_scrolls,
        ));
        Ok(self.page(url))
    }

    async fn close(self) {
        self.state.lock().unwrap().closes += 1;
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ExtractorState {
    calls: Vec<String>,
    html: Vec<String>,
}

/// Emits a fixed number of records per page, overridable per URL.
#[derive(Clone)]
pub struct MockExtractor {
    per_page: usize,
    overrides: HashMap<String, usize>,
    state: Arc<Mutex<ExtractorState>>,
}

impl MockExtractor {
    pub fn per_page(count: usize) -> Self {
        Self {
            per_page: count,
            overrides: HashMap::new(),
            state: Arc::new(Mutex::new(ExtractorState::default())),
        }
    }

    /// Extracts nothing from any page.
    pub fn empty() -> Self {
        Self::per_page(0)
    }

    pub fn with_count(mut self, url: &str, count: usize) -> Self {
        self.overrides.insert(url.to_string(), count);
        self
    }

    /// Product URLs in call order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn seen_html(&self) -> Vec<String> {
        self.state.lock().unwrap().html.clone()
    }
}

impl Extractor for MockExtractor {
    fn extract(&self, html: &str, product_url: &str, site: &SiteConfig) -> Vec<Record> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(product_url.to_string());
            state.html.push(html.to_string());
        }
        let count = self
            .overrides
            .get(product_url)
            .copied()
            .unwrap_or(self.per_page);

        (0..count)
            .map(|variant| {
                let mut record = Record::new();
                record.insert(PRODUCT_URL_FIELD.into(), json!(product_url));
                record.insert("variant".into(), json!(variant));
                record.insert("source_site".into(), json!(site.source_site()));
                record
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// FakeProbe
// ---------------------------------------------------------------------------

/// Capability probe with fixed answers. The default can do nothing but HTTP.
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    pub sandboxed: bool,
    pub engine_installed: bool,
    pub launchable: bool,
    pub secrets: Vec<String>,
}

impl FakeProbe {
    pub fn with_browser() -> Self {
        Self {
            engine_installed: true,
            launchable: true,
            ..Self::default()
        }
    }

    /// A hosted sandbox with the engine present but unusable.
    pub fn sandboxed() -> Self {
        Self {
            sandboxed: true,
            engine_installed: true,
            launchable: true,
            ..Self::default()
        }
    }
}

impl CapabilityProbe for FakeProbe {
    fn is_sandboxed(&self) -> bool {
        self.sandboxed
    }

    fn automation_engine_installed(&self) -> bool {
        self.engine_installed
    }

    async fn browser_launchable(&self) -> bool {
        !self.sandboxed && self.engine_installed && self.launchable
    }

    fn has_secret(&self, name: &str) -> bool {
        self.secrets.iter().any(|s| s == name)
    }
}

// ---------------------------------------------------------------------------
// MockRobots
// ---------------------------------------------------------------------------

/// Disallows any URL containing one of the given fragments.
#[derive(Debug, Clone, Default)]
pub struct MockRobots {
    disallowed: Vec<String>,
}

impl MockRobots {
    pub fn disallow<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            disallowed: fragments.into_iter().map(Into::into).collect(),
        }
    }
}

impl RobotsPolicy for MockRobots {
    fn is_allowed(&self, url: &str) -> bool {
        !self.disallowed.iter().any(|d| url.contains(d.as_str()))
    }
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;
use crate::strategy::{BrowserRendered, DirectHttp, FetchStrategy};
use crate::traits::{BrowserDriver, Fetcher};

/// Selector key holding the product link selectors of a listing page.
pub const PRODUCT_LINKS_SELECTOR: &str = "product_links";

/// Static description of one target site, minus its strategies.
///
/// This is the part handed to the extraction callback; `selectors` are
/// passed through untouched except for [`PRODUCT_LINKS_SELECTOR`], which
/// drives listing link discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub key: String,
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub listing_urls: Vec<String>,
    /// Final CSV destination. Defaults to `<key>_raw.csv`.
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub selectors: BTreeMap<String, String>,
    /// Substrings identifying product page URLs.
    #[serde(default = "default_product_patterns")]
    pub product_url_patterns: Vec<String>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub source_site: Option<String>,
}

fn default_product_patterns() -> Vec<String> {
    vec!["/products/".into(), "/p/".into(), "pid=".into()]
}

impl SiteConfig {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            base_url: base_url.into(),
            listing_urls: Vec::new(),
            output_path: None,
            selectors: BTreeMap::new(),
            product_url_patterns: default_product_patterns(),
            pagination: None,
            brand_name: None,
            source_site: None,
        }
    }

    pub fn with_listing_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.listing_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_selector(mut self, name: impl Into<String>, selector: impl Into<String>) -> Self {
        self.selectors.insert(name.into(), selector.into());
        self
    }

    pub fn with_product_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.product_url_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}_raw.csv", self.key)))
    }

    /// Side file for incremental snapshots: `<output>.partial`.
    pub fn checkpoint_path(&self) -> PathBuf {
        with_suffix(&self.output_path(), ".partial")
    }

    /// Page checksum cache stored next to the output.
    pub fn cache_path(&self) -> PathBuf {
        let output = self.output_path();
        let dir = output.parent().unwrap_or_else(|| Path::new(""));
        dir.join(".trawl_cache.json")
    }

    pub fn brand_name(&self) -> &str {
        self.brand_name.as_deref().unwrap_or(&self.name)
    }

    /// Host of `base_url` unless set explicitly.
    pub fn source_site(&self) -> String {
        if let Some(site) = &self.source_site {
            return site.clone();
        }
        Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.base_url.trim_end_matches('/').to_string())
    }

    /// Comma-separated product link selectors, in priority order.
    pub fn product_link_selectors(&self) -> Vec<&str> {
        self.selectors
            .get(PRODUCT_LINKS_SELECTOR)
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_product_url(&self, url: &str) -> bool {
        self.product_url_patterns.iter().any(|p| url.contains(p.as_str()))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        Url::parse(&self.base_url).map_err(|e| {
            AppError::ConfigError(format!("Invalid base_url '{}': {e}", self.base_url))
        })?;
        if self.listing_urls.is_empty() {
            return Err(AppError::ConfigError(format!(
                "Site '{}' has no listing URLs",
                self.key
            )));
        }
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

/// How a listing paginates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum PaginationStyle {
    /// `?page=N`, keeping other query pairs.
    QueryParam {
        #[serde(default = "default_page_param")]
        name: String,
    },
    /// `<listing>/page/N`.
    PathSegment,
}

fn default_page_param() -> String {
    "page".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(flatten)]
    pub style: PaginationStyle,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_max_pages() -> u32 {
    10
}

impl Pagination {
    pub fn query_param(max_pages: u32) -> Self {
        Self {
            style: PaginationStyle::QueryParam {
                name: default_page_param(),
            },
            max_pages,
        }
    }

    pub fn path_segment(max_pages: u32) -> Self {
        Self {
            style: PaginationStyle::PathSegment,
            max_pages,
        }
    }

    /// URL of page `page` (1-based) of `listing_url`. Page 1 is the listing
    /// itself; `None` if the listing URL cannot be parsed.
    pub fn page_url(&self, listing_url: &str, page: u32) -> Option<String> {
        if page <= 1 {
            return Some(listing_url.to_string());
        }
        let mut url = Url::parse(listing_url).ok()?;
        match &self.style {
            PaginationStyle::QueryParam { name } => {
                let kept: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(k, _)| k != name)
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                url.query_pairs_mut()
                    .clear()
                    .extend_pairs(kept)
                    .append_pair(name, &page.to_string());
            }
            PaginationStyle::PathSegment => {
                let path = url.path().trim_end_matches('/').to_string();
                url.set_path(&format!("{path}/page/{page}"));
            }
        }
        Some(url.into())
    }
}

/// Declarative strategy entry in a profile file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySpec {
    DirectHttp {
        #[serde(default)]
        listing_delay_ms: Option<u64>,
    },
    BrowserRendered {
        #[serde(default)]
        scroll_count: Option<u32>,
        #[serde(default)]
        navigation_timeout_ms: Option<u64>,
        #[serde(default)]
        settle_ms: Option<u64>,
    },
}

/// A site profile as written in JSON: site fields plus strategy list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSpec {
    #[serde(flatten)]
    pub site: SiteConfig,
    pub strategies: Vec<StrategySpec>,
}

impl ProfileSpec {
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let spec: ProfileSpec = serde_json::from_str(json)?;
        spec.site.validate()?;
        if spec.strategies.is_empty() {
            return Err(AppError::ConfigError(format!(
                "Site '{}' declares no strategies",
                spec.site.key
            )));
        }
        Ok(spec)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies
            .iter()
            .map(|s| match s {
                StrategySpec::DirectHttp { .. } => "direct_http",
                StrategySpec::BrowserRendered { .. } => "browser_rendered",
            })
            .collect()
    }

    /// Instantiate the strategies. Every browser strategy gets its own
    /// driver clone so sessions are never shared.
    pub fn build<F, D>(self, fetcher: F, driver: D) -> SiteProfile<F, D>
    where
        F: Fetcher,
        D: BrowserDriver + Clone,
    {
        let strategies = self
            .strategies
            .into_iter()
            .map(|spec| match spec {
                StrategySpec::DirectHttp { listing_delay_ms } => {
                    let mut s = DirectHttp::new(fetcher.clone());
                    if let Some(ms) = listing_delay_ms {
                        s = s.with_listing_delay(Duration::from_millis(ms));
                    }
                    FetchStrategy::DirectHttp(s)
                }
                StrategySpec::BrowserRendered {
                    scroll_count,
                    navigation_timeout_ms,
                    settle_ms,
                } => {
                    let mut s = BrowserRendered::new(driver.clone());
                    if let Some(n) = scroll_count {
                        s = s.with_scroll_count(n);
                    }
                    if let Some(ms) = navigation_timeout_ms {
                        s = s.with_navigation_timeout(Duration::from_millis(ms));
                    }
                    if let Some(ms) = settle_ms {
                        s = s.with_settle(Duration::from_millis(ms));
                    }
                    FetchStrategy::BrowserRendered(s)
                }
            })
            .collect();
        SiteProfile::new(self.site, strategies)
    }
}

/// One site plus the strategies it owns, in priority order.
pub struct SiteProfile<F, D: BrowserDriver> {
    pub site: SiteConfig,
    pub strategies: Vec<FetchStrategy<F, D>>,
}

impl<F: Fetcher, D: BrowserDriver> SiteProfile<F, D> {
    pub fn new(site: SiteConfig, strategies: Vec<FetchStrategy<F, D>>) -> Self {
        Self { site, strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(FetchStrategy::name).collect()
    }
}

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use trawl_client::ReqwestFetcher;
use trawl_core::capability::EnvProbe;
use trawl_core::governor::GovernorConfig;
use trawl_core::models::Record;
use trawl_core::orchestrator::ScrapeOrchestrator;
use trawl_core::profile::{SiteConfig, SiteProfile};
use trawl_core::strategy::{DirectHttp, FetchStrategy};
use trawl_core::traits::NoBrowser;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub type TestExtractor = fn(&str, &str, &SiteConfig) -> Vec<Record>;

pub type TestOrchestrator =
    ScrapeOrchestrator<ReqwestFetcher, NoBrowser, EnvProbe<NoBrowser>, TestExtractor>;

/// Listing page linking to `/products/<slug>` for each slug, plus noise.
pub fn listing(slugs: &[&str]) -> String {
    let cards: String = slugs
        .iter()
        .map(|s| format!(r#"<div class="card"><a href="/products/{s}">{s}</a></div>"#))
        .collect();
    format!(r#"<html><body><nav><a href="/pages/about">About</a></nav>{cards}</body></html>"#)
}

pub fn product_page(title: &str) -> String {
    format!(r#"<html><body><h1 class="title">{title}</h1></body></html>"#)
}

/// Pulls the `<h1 class="title">` text out of a product page.
pub fn title_extractor(html: &str, product_url: &str, _site: &SiteConfig) -> Vec<Record> {
    let Some(start) = html.find(r#"<h1 class="title">"#) else {
        return Vec::new();
    };
    let rest = &html[start + r#"<h1 class="title">"#.len()..];
    let Some(end) = rest.find("</h1>") else {
        return Vec::new();
    };
    let mut record = Record::new();
    record.insert("product_url".into(), json!(product_url));
    record.insert("title".into(), json!(&rest[..end]));
    vec![record]
}

pub async fn mount_page(server: &MockServer, route: &str, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

pub fn site(server: &MockServer, output_dir: &Path) -> SiteConfig {
    SiteConfig::new("mockshop", "Mock Shop", server.uri())
        .with_listing_urls([format!("{}/collections/all", server.uri())])
        .with_selector("product_links", ".card a")
        .with_product_patterns(["/products/"])
        .with_output_path(output_dir.join("mockshop_raw.csv"))
}

pub fn orchestrator(site: SiteConfig) -> TestOrchestrator {
    let fetcher = ReqwestFetcher::with_timeout(Duration::from_secs(5)).unwrap();
    let http = DirectHttp::new(fetcher)
        .with_listing_delay(Duration::ZERO)
        .with_backoff_base(Duration::from_millis(10));
    let profile = SiteProfile::new(site, vec![FetchStrategy::DirectHttp(http)]);
    let probe = EnvProbe::with_env(NoBrowser, |_| None);

    ScrapeOrchestrator::new(profile, probe, title_extractor as TestExtractor).with_governor(
        GovernorConfig::new(Duration::from_millis(1), Duration::from_millis(40))
            .with_jitter_ratio(0.0),
    )
}

use std::time::Duration;

use trawl_client::{ReqwestFetcher, RobotsTxtPolicy};
use trawl_core::models::RunOutcome;
use trawl_core::persist;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::integration::common::{listing, mount_page, orchestrator, product_page, site};

#[tokio::test]
async fn scrapes_catalog_over_http() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_page(&server, "/collections/all", 200, listing(&["linen", "hemp", "wool"])).await;
    mount_page(&server, "/products/linen", 200, product_page("Linen Pant")).await;
    mount_page(&server, "/products/hemp", 200, product_page("Hemp Top")).await;
    mount_page(&server, "/products/wool", 404, String::new()).await;

    let mut orch = orchestrator(site(&server, dir.path()));
    let outcome = orch.run().await;

    let RunOutcome::Completed { records, stats } = outcome else {
        panic!("expected records");
    };
    assert_eq!(records.len(), 2);
    assert_eq!(stats.failed_products, 1);
    assert_eq!(stats.strategy_used.as_deref(), Some("direct_http"));

    let mut titles: Vec<&str> = records
        .iter()
        .filter_map(|r| r.get("title").and_then(|v| v.as_str()))
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["Hemp Top", "Linen Pant"]);
}

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_page(&server, "/collections/all", 200, listing(&["linen"])).await;
    Mock::given(method("GET"))
        .and(path("/products/linen"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page(&server, "/products/linen", 200, product_page("Linen Pant")).await;

    let mut orch = orchestrator(site(&server, dir.path()));
    let outcome = orch.run().await;

    assert!(outcome.is_success());
    assert_eq!(outcome.stats().total_records, 1);
    assert_eq!(outcome.stats().failed_products, 0);
}

#[tokio::test]
async fn rate_limit_slows_the_run_down() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_page(&server, "/collections/all", 200, listing(&["linen"])).await;
    Mock::given(method("GET"))
        .and(path("/products/linen"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page(&server, "/products/linen", 200, product_page("Linen Pant")).await;

    let mut orch = orchestrator(site(&server, dir.path()));
    let outcome = orch.run().await;

    assert_eq!(outcome.stats().total_records, 1);
    assert_eq!(outcome.stats().final_delay, Duration::from_millis(2));
}

#[tokio::test]
async fn robots_txt_excludes_products() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_page(
        &server,
        "/robots.txt",
        200,
        "User-agent: *\nDisallow: /products/hemp\n".to_string(),
    )
    .await;
    mount_page(&server, "/collections/all", 200, listing(&["linen", "hemp"])).await;
    mount_page(&server, "/products/linen", 200, product_page("Linen Pant")).await;
    mount_page(&server, "/products/hemp", 200, product_page("Hemp Top")).await;

    let fetcher = ReqwestFetcher::new().unwrap();
    let robots = RobotsTxtPolicy::load(&fetcher, &server.uri(), "trawl").await;
    let mut orch = orchestrator(site(&server, dir.path())).with_robots(robots);
    let outcome = orch.run().await;

    assert_eq!(outcome.stats().disallowed_products, 1);
    assert_eq!(outcome.stats().total_records, 1);
}

#[tokio::test]
async fn second_run_skips_products_already_written() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_page(&server, "/collections/all", 200, listing(&["linen", "hemp"])).await;
    mount_page(&server, "/products/linen", 200, product_page("Linen Pant")).await;
    mount_page(&server, "/products/hemp", 200, product_page("Hemp Top")).await;

    let site = site(&server, dir.path());
    let output = site.output_path();

    let mut first = orchestrator(site.clone());
    let outcome = first.run().await;
    persist::write_records(&output, outcome.records()).unwrap();

    let mut second = orchestrator(site);
    let outcome = second.run().await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.stats().skipped_products, 2);
}

/// Smoke-test for `ChromiumDriver`.
///
/// Launches a headless Chromium, renders <https://example.com>, and verifies
/// the rendered HTML contains the expected `<h1>`. Then probes the same
/// capability checks the orchestrator uses.
///
/// Run with:
///   cargo run -p trawl-client --example browser_smoke --features browser
use std::time::Duration;

use trawl_client::ChromiumDriver;
use trawl_core::capability::{CapabilityProbe, EnvProbe};
use trawl_core::traits::{BrowserDriver, BrowserSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let driver = ChromiumDriver::new();
    match driver.executable() {
        Some(bin) => println!("Chrome binary: {}", bin.display()),
        None => anyhow::bail!("No Chrome/Chromium binary found (set CHROME_BIN)"),
    }

    println!("Launching headless browser…");
    let mut session = driver.launch().await?;

    let url = "https://example.com";
    println!("Rendering {url} …");
    let html = session.render(url, Duration::from_millis(500)).await?;
    session.close().await;

    assert!(
        html.contains("<h1>Example Domain</h1>"),
        "Expected <h1> not found in rendered HTML"
    );
    assert!(
        html.len() > 500,
        "HTML suspiciously short ({} bytes)",
        html.len()
    );
    println!("OK: got {} bytes of rendered HTML", html.len());

    let probe = EnvProbe::new(driver);
    println!("{}", probe.report().await);
    Ok(())
}

use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use trawl_core::error::AppError;
use trawl_core::traits::{BrowserDriver, BrowserSession};

/// Pause between scroll steps while waiting for lazy-loaded listings.
const SCROLL_PAUSE: Duration = Duration::from_secs(1);

/// Launches headless Chromium over the Chrome DevTools Protocol.
///
/// Every [`launch`](BrowserDriver::launch) starts a fresh browser process
/// with one blank tab; the resulting [`ChromiumSession`] owns both.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use trawl_client::ChromiumDriver;
/// use trawl_core::traits::{BrowserDriver, BrowserSession};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let driver = ChromiumDriver::new();
/// let mut session = driver.launch().await?;
/// let html = session.render("https://example.com", Duration::from_secs(1)).await?;
/// println!("{}", &html[..200]);
/// session.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChromiumDriver {
    executable: Option<PathBuf>,
}

impl ChromiumDriver {
    pub fn new() -> Self {
        Self {
            executable: find_chrome_binary(),
        }
    }

    /// Use a specific Chrome/Chromium binary.
    pub fn with_executable(path: impl Into<PathBuf>) -> Self {
        Self {
            executable: Some(path.into()),
        }
    }

    pub fn executable(&self) -> Option<&PathBuf> {
        self.executable.as_ref()
    }

    fn config(&self) -> Result<BrowserConfig, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();
        if let Some(bin) = &self.executable {
            tracing::debug!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }
        builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))
    }
}

impl BrowserDriver for ChromiumDriver {
    type Session = ChromiumSession;

    fn is_installed(&self) -> bool {
        self.executable.is_some()
    }

    async fn launch(&self) -> Result<ChromiumSession, AppError> {
        let config = self.config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(AppError::BrowserError(format!("Failed to open tab: {e}")));
            }
        };

        Ok(ChromiumSession {
            browser,
            page,
            handler,
        })
    }
}

/// One Chromium process with a single reusable tab.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    /// Resolves once the page has fully loaded.
    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to navigate to {url}: {e}")))?;
        Ok(())
    }

    async fn content(&self) -> Result<String, AppError> {
        self.page
            .content()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to read page content: {e}")))
    }

    async fn count(&self, selector: &str) -> usize {
        self.page
            .find_elements(selector)
            .await
            .map(|elements| elements.len())
            .unwrap_or(0)
    }
}

impl BrowserSession for ChromiumSession {
    async fn render(&mut self, url: &str, settle: Duration) -> Result<String, AppError> {
        self.navigate(url).await?;
        tokio::time::sleep(settle).await;
        self.content().await
    }

    async fn render_scrolled(
        &mut self,
        url: &str,
        selector: &str,
        max_scrolls: u32,
    ) -> Result<String, AppError> {
        self.navigate(url).await?;

        let mut seen = self.count(selector).await;
        for scroll in 0..max_scrolls {
            if let Err(e) = self
                .page
                .evaluate("window.scrollTo(0, document.body.scrollHeight)")
                .await
            {
                tracing::debug!(url, error = %e, "Scroll failed");
                break;
            }
            tokio::time::sleep(SCROLL_PAUSE).await;

            let now = self.count(selector).await;
            tracing::debug!(url, scroll = scroll + 1, elements = now, "Scrolled listing");
            if now <= seen {
                break;
            }
            seen = now;
        }

        self.content().await
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!(error = %e, "Browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}

/// Tries to locate the real Chrome/Chromium binary.
///
/// `CHROME_BIN` wins when it points at an existing file. Otherwise the real
/// binary inside a snap install is preferred over the `/snap/bin` wrapper
/// (which strips headless flags), then well-known system paths.
pub fn find_chrome_binary() -> Option<PathBuf> {
    let candidates: &[&str] = &[
        // Snap (Ubuntu default)
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        // Flatpak
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        // Common apt / manual installs
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    candidates.iter().map(PathBuf::from).find(|p| p.exists())
}

#[cfg(feature = "browser")]
pub mod browser;
pub mod fetcher;
pub mod robots;

#[cfg(feature = "browser")]
pub use browser::{ChromiumDriver, ChromiumSession, find_chrome_binary};
pub use fetcher::{DEFAULT_USER_AGENT, ReqwestFetcher};
pub use robots::RobotsTxtPolicy;

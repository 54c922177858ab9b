//! Runtime capability detection.
//!
//! Strategies are gated on what the environment can actually do: a sandboxed
//! host cannot start a browser, a build without the automation engine has
//! nothing to start, and an installed browser may still fail to launch for
//! lack of system libraries. The probe answers each question once and never
//! fails; every check degrades to `false`.

use std::fmt;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::sync::OnceCell;

use crate::traits::{BrowserDriver, BrowserSession};

/// Environment variables whose presence marks a sandboxed host.
pub const SANDBOX_ENV_VARS: &[&str] = &["TRAWL_SANDBOXED", "REPL_ID"];

/// Upper bound on the one-time launch probe.
const LAUNCH_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only view of the runtime environment.
pub trait CapabilityProbe: Send + Sync {
    fn is_sandboxed(&self) -> bool;

    fn automation_engine_installed(&self) -> bool;

    /// Whether a browser can really be started. Expensive on first call.
    fn browser_launchable(&self) -> impl Future<Output = bool> + Send;

    fn has_secret(&self, name: &str) -> bool;

    fn report(&self) -> impl Future<Output = CapabilityReport> + Send {
        async move {
            CapabilityReport {
                sandboxed: self.is_sandboxed(),
                automation_engine_installed: self.automation_engine_installed(),
                browser_launchable: self.browser_launchable().await,
            }
        }
    }
}

/// Snapshot of the probed capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CapabilityReport {
    pub sandboxed: bool,
    pub automation_engine_installed: bool,
    pub browser_launchable: bool,
}

/// The first capability standing in the way of browser rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingCapability {
    Sandboxed,
    EngineMissing,
    BrowserNotLaunchable,
}

impl fmt::Display for BlockingCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingCapability::Sandboxed => {
                write!(f, "sandboxed environment (browser strategies unavailable)")
            }
            BlockingCapability::EngineMissing => {
                write!(f, "browser automation engine not installed")
            }
            BlockingCapability::BrowserNotLaunchable => {
                write!(f, "browser cannot be launched (missing system libraries?)")
            }
        }
    }
}

impl CapabilityReport {
    pub fn blocking_reason(&self) -> Option<BlockingCapability> {
        if self.sandboxed {
            Some(BlockingCapability::Sandboxed)
        } else if !self.automation_engine_installed {
            Some(BlockingCapability::EngineMissing)
        } else if !self.browser_launchable {
            Some(BlockingCapability::BrowserNotLaunchable)
        } else {
            None
        }
    }
}

impl fmt::Display for CapabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |v: bool| if v { "yes" } else { "no" };
        writeln!(f, "Environment capabilities:")?;
        writeln!(f, "  sandboxed:                   {}", mark(self.sandboxed))?;
        writeln!(
            f,
            "  automation_engine_installed: {}",
            mark(self.automation_engine_installed)
        )?;
        write!(
            f,
            "  browser_launchable:          {}",
            mark(self.browser_launchable)
        )
    }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Probe backed by process environment variables and a [`BrowserDriver`].
pub struct EnvProbe<D> {
    driver: D,
    env: EnvLookup,
    sandboxed: OnceLock<bool>,
    engine_installed: OnceLock<bool>,
    launchable: OnceCell<bool>,
}

impl<D: BrowserDriver> EnvProbe<D> {
    /// Probe reading the real process environment.
    pub fn new(driver: D) -> Self {
        Self::with_env(driver, |key| std::env::var(key).ok())
    }

    /// Probe reading variables through `lookup` instead of the process
    /// environment.
    pub fn with_env(
        driver: D,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            driver,
            env: Box::new(lookup),
            sandboxed: OnceLock::new(),
            engine_installed: OnceLock::new(),
            launchable: OnceCell::new(),
        }
    }

    fn env_flag(&self, key: &str) -> bool {
        (self.env)(key)
            .map(|v| {
                let v = v.trim();
                !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
            })
            .unwrap_or(false)
    }

    async fn try_launch(&self) -> bool {
        match tokio::time::timeout(LAUNCH_PROBE_TIMEOUT, self.driver.launch()).await {
            Ok(Ok(session)) => {
                session.close().await;
                true
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Browser launch probe failed");
                false
            }
            Err(_) => {
                tracing::debug!("Browser launch probe timed out");
                false
            }
        }
    }
}

impl<D: BrowserDriver> CapabilityProbe for EnvProbe<D> {
    fn is_sandboxed(&self) -> bool {
        *self
            .sandboxed
            .get_or_init(|| SANDBOX_ENV_VARS.iter().any(|key| self.env_flag(key)))
    }

    fn automation_engine_installed(&self) -> bool {
        *self
            .engine_installed
            .get_or_init(|| self.driver.is_installed())
    }

    async fn browser_launchable(&self) -> bool {
        if self.is_sandboxed() || !self.automation_engine_installed() {
            return false;
        }
        *self.launchable.get_or_init(|| self.try_launch()).await
    }

    fn has_secret(&self, name: &str) -> bool {
        (self.env)(name).is_some_and(|v| !v.trim().is_empty())
    }
}

//! Adaptive politeness delay shared by every fetch worker.
//!
//! A single delay value starts at the configured minimum, creeps down after
//! sustained success and climbs on rate-limit signals (fast) or generic
//! errors (slow). Workers call [`RateGovernor::wait`] after each productive
//! request.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use trawl_core::governor::{GovernorConfig, RateGovernor};
//!
//! # async fn run() {
//! let governor = RateGovernor::new(GovernorConfig::new(
//!     Duration::from_millis(300),
//!     Duration::from_secs(2),
//! ));
//! governor.record_rate_limited();
//! assert!(governor.current_delay() > Duration::from_millis(300));
//! governor.wait().await;
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;

/// Policy constants for the governor.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive successes needed before the delay shrinks.
    pub success_streak: u32,
    /// Multiplier applied after a success streak.
    pub speedup_factor: f64,
    /// Multiplier applied on HTTP 429.
    pub rate_limit_factor: f64,
    /// Multiplier applied on any other error.
    pub error_factor: f64,
    /// Jitter upper bound as a fraction of the current delay.
    pub jitter_ratio: f64,
}

impl GovernorConfig {
    /// Default multipliers with custom bounds. Swaps the bounds if reversed.
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };
        Self {
            min_delay,
            max_delay,
            ..Self::default()
        }
    }

    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.max(0.0);
        self
    }
}

impl Default for GovernorConfig {
    /// 0.3 s – 2.0 s, ×0.9 every 10 successes, ×2 on 429, ×1.2 on errors,
    /// up to 30 % jitter.
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(2),
            success_streak: 10,
            speedup_factor: 0.9,
            rate_limit_factor: 2.0,
            error_factor: 1.2,
            jitter_ratio: 0.3,
        }
    }
}

#[derive(Debug)]
struct RateState {
    current_delay: Duration,
    consecutive_successes: u32,
}

/// Thread-safe adaptive delay. Clones share state.
#[derive(Debug, Clone)]
pub struct RateGovernor {
    config: GovernorConfig,
    state: Arc<Mutex<RateState>>,
}

impl RateGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        let state = RateState {
            current_delay: config.min_delay,
            consecutive_successes: 0,
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Acquires the state lock, recovering from poison if necessary.
    fn lock_state(&self) -> MutexGuard<'_, RateState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned governor mutex");
            poisoned.into_inner()
        })
    }

    fn clamp(&self, delay: Duration) -> Duration {
        delay.clamp(self.config.min_delay, self.config.max_delay)
    }

    pub fn record_success(&self) {
        let mut state = self.lock_state();
        state.consecutive_successes += 1;
        if state.consecutive_successes >= self.config.success_streak {
            let next = state.current_delay.mul_f64(self.config.speedup_factor);
            state.current_delay = self.clamp(next.min(state.current_delay));
            state.consecutive_successes = 0;
        }
    }

    pub fn record_rate_limited(&self) {
        let mut state = self.lock_state();
        let next = state.current_delay.mul_f64(self.config.rate_limit_factor);
        state.current_delay = self.clamp(next.max(state.current_delay));
        state.consecutive_successes = 0;
        tracing::warn!(
            delay_secs = state.current_delay.as_secs_f64(),
            "Rate limit detected, slowing down"
        );
    }

    pub fn record_error(&self) {
        let mut state = self.lock_state();
        let next = state.current_delay.mul_f64(self.config.error_factor);
        state.current_delay = self.clamp(next.max(state.current_delay));
        state.consecutive_successes = 0;
    }

    pub fn current_delay(&self) -> Duration {
        self.lock_state().current_delay
    }

    /// Current delay plus uniform jitter in `[0, jitter_ratio * delay]`.
    pub fn jittered_delay(&self) -> Duration {
        let delay = self.current_delay();
        let ratio = rand::thread_rng().gen_range(0.0..=self.config.jitter_ratio);
        delay + delay.mul_f64(ratio)
    }

    /// Sleep for the jittered delay. The lock is released before sleeping.
    pub async fn wait(&self) {
        let delay = self.jittered_delay();
        tracing::trace!(delay_ms = delay.as_millis() as u64, "Governor wait");
        tokio::time::sleep(delay).await;
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(GovernorConfig::default())
    }
}

//! Reconnect backoff for the realtime channel.
//!
//! The delay before retry `n` (1-based) is `base_delay * 2^(n-1)`. After
//! `max_attempts` consecutive failures the caller must give up and surface a
//! fatal notification instead of retrying again.
//!
//! ## Example
//!
//! ```
//! use fleetwatch_core::backoff::ReconnectPolicy;
//! use std::time::Duration;
//!
//! let policy = ReconnectPolicy::default();
//! assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(1000)));
//! assert_eq!(policy.delay_for_attempt(5), Some(Duration::from_millis(16000)));
//! assert_eq!(policy.delay_for_attempt(6), None);
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Exponential reconnect policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum number of consecutive retries.
    pub max_attempts: u32,
    /// Random spread applied to each delay, as a fraction (0.25 = ±25%).
    /// Zero disables jitter.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter: 0.0,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy with the given base delay and attempt cap.
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay_ms: base_delay.as_millis() as u64,
            max_attempts,
            jitter: 0.0,
        }
    }

    /// Enable jitter.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Base delay as a [`Duration`].
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay before retry `attempt` (1-based), or `None` once the cap is exceeded.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }

        let factor = 2u64.saturating_pow(attempt - 1);
        let delay_ms = self.base_delay_ms.saturating_mul(factor);

        if self.jitter <= 0.0 {
            return Some(Duration::from_millis(delay_ms));
        }

        let spread = delay_ms as f64 * self.jitter;
        let mut rng = rand::rng();
        let offset = rng.random_range(-spread..=spread);
        Some(Duration::from_millis((delay_ms as f64 + offset).max(0.0) as u64))
    }

    /// The full delay schedule, one entry per permitted attempt.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts)
            .filter_map(|attempt| self.delay_for_attempt(attempt))
            .collect()
    }
}

/// Tracks consecutive failures against a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    retry_count: u32,
}

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStep {
    /// Wait, then make retry number `attempt`.
    Retry { attempt: u32, delay: Duration },
    /// The cap was exceeded; stop retrying.
    Exhausted { attempts: u32 },
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            retry_count: 0,
        }
    }

    /// Record a failure and decide the next step.
    pub fn next_step(&mut self) -> BackoffStep {
        self.retry_count = self.retry_count.saturating_add(1);
        match self.policy.delay_for_attempt(self.retry_count) {
            Some(delay) => BackoffStep::Retry {
                attempt: self.retry_count,
                delay,
            },
            None => BackoffStep::Exhausted {
                attempts: self.retry_count - 1,
            },
        }
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.retry_count = 0;
    }

    /// Consecutive failures recorded since the last reset.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }
}

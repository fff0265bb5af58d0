//! Reconnect backoff policy.

use rand::Rng;
use realtime_config::RetrySettings;
use std::time::Duration;

/// How long to wait between consecutive failed connect attempts.
///
/// The base delay grows linearly with the attempt number and is capped at
/// `max_delay`; jitter then scales it by a random factor in
/// `1 ± jitter_factor / 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt. `None` never gives up.
    pub max_attempts: Option<u32>,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Clamped to 0.0..=1.0.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.base_delay(),
            max_delay: settings.max_delay(),
            jitter_factor: settings.jitter_factor,
        }
    }
}

impl RetryPolicy {
    /// Whether the `attempt`-th consecutive failure may be retried.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Delay before jitter: `min(max_delay, base_delay * attempt)`.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(attempt)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Jittered delay for `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = self.jitter();
        if jitter == 0.0 {
            return self.base_delay_for(attempt);
        }
        let spread = rand::thread_rng().gen_range(-0.5..=0.5);
        self.apply_jitter(self.base_delay_for(attempt), spread)
    }

    /// Scale `base` by `1 + spread * jitter_factor`, `spread` in `-0.5..=0.5`.
    pub fn apply_jitter(&self, base: Duration, spread: f64) -> Duration {
        let factor = 1.0 + spread.clamp(-0.5, 0.5) * self.jitter();
        Duration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
    }

    fn jitter(&self) -> f64 {
        if self.jitter_factor.is_nan() {
            return 0.0;
        }
        self.jitter_factor.clamp(0.0, 1.0)
    }
}

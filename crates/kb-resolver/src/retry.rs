//! Intervals to wait between successive attempts against the catalog.
//!
//! All strategies are pure functions of the attempt index. They can only
//! fail at construction, when their parameters are inconsistent.

use std::time::Duration;

use enum_dispatch::enum_dispatch;
use rand::Rng;
use serde::Deserialize;

use crate::error::ConfigError;

#[enum_dispatch]
pub trait RetryIntervalStrategy {
    /// How long to wait before attempt `attempt` (0-based).
    fn determine_interval(&self, attempt: u32) -> Duration;
}

/// Always waits the same amount of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl RetryIntervalStrategy for FixedInterval {
    fn determine_interval(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

/// Exponential backoff with full jitter: a uniformly random wait in
/// `[0, min(max, base * 2^attempt)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base_interval: Duration,
    max_interval: Duration,
}

impl ExponentialBackoff {
    pub fn new(base_interval: Duration, max_interval: Duration) -> Result<Self, ConfigError> {
        if base_interval > max_interval {
            return Err(ConfigError::InvalidRetryInterval(format!(
                "base interval {base_interval:?} exceeds max interval {max_interval:?}"
            )));
        }
        Ok(Self {
            base_interval,
            max_interval,
        })
    }

    /// Upper bound of the jittered interval for `attempt`, in nanoseconds.
    fn capped_nanos(&self, attempt: u32) -> u64 {
        let base = duration_nanos(self.base_interval);
        let max = duration_nanos(self.max_interval);
        1u64.checked_shl(attempt)
            .and_then(|factor| base.checked_mul(factor))
            .map_or(max, |interval| interval.min(max))
    }
}

impl RetryIntervalStrategy for ExponentialBackoff {
    fn determine_interval(&self, attempt: u32) -> Duration {
        let capped = self.capped_nanos(attempt);
        Duration::from_nanos(rand::thread_rng().gen_range(0..=capped))
    }
}

/// Waits `multiplier * fib(attempt)`, capped at `max_wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FibonacciBackoff {
    multiplier: Duration,
    max_wait: Duration,
}

impl FibonacciBackoff {
    pub fn new(multiplier: Duration, max_wait: Duration) -> Result<Self, ConfigError> {
        if multiplier.is_zero() {
            return Err(ConfigError::InvalidRetryInterval(
                "fibonacci multiplier must be greater than zero".to_string(),
            ));
        }
        if multiplier >= max_wait {
            return Err(ConfigError::InvalidRetryInterval(format!(
                "fibonacci multiplier {multiplier:?} must be less than max wait {max_wait:?}"
            )));
        }
        Ok(Self {
            multiplier,
            max_wait,
        })
    }
}

impl RetryIntervalStrategy for FibonacciBackoff {
    fn determine_interval(&self, attempt: u32) -> Duration {
        let multiplier = duration_nanos(self.multiplier);
        let max = duration_nanos(self.max_wait);
        if attempt == 0 {
            return Duration::ZERO;
        }

        // (fib(n - 1), fib(n)), starting at n = 1
        let (mut previous, mut current) = (0u64, 1u64);
        for _ in 1..attempt {
            // fib is increasing, so once the cap is reached it stays reached
            if multiplier.saturating_mul(current) >= max {
                return self.max_wait;
            }
            let Some(next) = previous.checked_add(current) else {
                return self.max_wait;
            };
            previous = current;
            current = next;
        }
        Duration::from_nanos(multiplier.saturating_mul(current).min(max))
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// One of the supported strategies, chosen by configuration.
#[enum_dispatch(RetryIntervalStrategy)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryInterval {
    Fixed(FixedInterval),
    ExponentialBackoff(ExponentialBackoff),
    Fibonacci(FibonacciBackoff),
}

impl RetryInterval {
    /// Never wait between attempts.
    pub fn none() -> Self {
        FixedInterval::new(Duration::ZERO).into()
    }
}

/// Serialized form of a [`RetryInterval`].
///
/// ```toml
/// [resolution.retry]
/// strategy = "fibonacci"
/// multiplier_ms = 500
/// max_wait_secs = 30
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryIntervalConfig {
    Fixed {
        #[serde(default)]
        interval_ms: u64,
    },
    ExponentialBackoff {
        base_interval_ms: u64,
        max_interval_ms: u64,
    },
    Fibonacci {
        multiplier_ms: u64,
        max_wait_secs: u64,
    },
}

impl Default for RetryIntervalConfig {
    fn default() -> Self {
        RetryIntervalConfig::ExponentialBackoff {
            base_interval_ms: 250,
            max_interval_ms: 10_000,
        }
    }
}

impl TryFrom<&RetryIntervalConfig> for RetryInterval {
    type Error = ConfigError;

    fn try_from(config: &RetryIntervalConfig) -> Result<Self, Self::Error> {
        let interval = match *config {
            RetryIntervalConfig::Fixed { interval_ms } => {
                FixedInterval::new(Duration::from_millis(interval_ms)).into()
            },
            RetryIntervalConfig::ExponentialBackoff {
                base_interval_ms,
                max_interval_ms,
            } => ExponentialBackoff::new(
                Duration::from_millis(base_interval_ms),
                Duration::from_millis(max_interval_ms),
            )?
            .into(),
            RetryIntervalConfig::Fibonacci {
                multiplier_ms,
                max_wait_secs,
            } => FibonacciBackoff::new(
                Duration::from_millis(multiplier_ms),
                Duration::from_secs(max_wait_secs),
            )?
            .into(),
        };
        Ok(interval)
    }
}

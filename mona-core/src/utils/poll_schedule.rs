use crate::config::PollScheduleConfig;
use std::time::Duration;

/// Returns the delay before the next tick given how many ticks in a row
/// have failed.
///
/// Healthy: `poll_interval`. Failing: `poll_interval * 2^n`, capped at
/// `max_backoff`. Once `breaker_threshold` is reached: `breaker_cooldown`.
pub fn next_delay(config: &PollScheduleConfig, consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return config.poll_interval;
    }
    if breaker_open(config, consecutive_failures) {
        return config.breaker_cooldown;
    }
    let factor = 2u32.saturating_pow(consecutive_failures.min(16));
    config
        .poll_interval
        .saturating_mul(factor)
        .min(config.max_backoff)
        .max(config.poll_interval)
}

/// A threshold of zero disables the breaker.
pub fn breaker_open(config: &PollScheduleConfig, consecutive_failures: u32) -> bool {
    config.breaker_threshold > 0 && consecutive_failures >= config.breaker_threshold
}

/// Failure bookkeeping for the poll loop.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    config: PollScheduleConfig,
    consecutive_failures: u32,
}

impl PollSchedule {
    pub fn new(config: PollScheduleConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
        }
    }

    pub fn next_delay(&self) -> Duration {
        next_delay(&self.config, self.consecutive_failures)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_breaker_open(&self) -> bool {
        breaker_open(&self.config, self.consecutive_failures)
    }

    /// Returns `true` if this success closed an open breaker.
    pub fn record_success(&mut self) -> bool {
        let was_open = self.is_breaker_open();
        self.consecutive_failures = 0;
        was_open
    }

    /// Returns `true` if this failure opened the breaker.
    pub fn record_failure(&mut self) -> bool {
        let was_open = self.is_breaker_open();
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        !was_open && self.is_breaker_open()
    }
}

//! `RunStats` and the backoff scheduler (spec §4.2).

use std::time::{Duration, Instant};

/// Per-entry activation/exit counters, mutated only under the entry's
/// stats lock (spec §3). Only hosted entries carry one; application
/// services are requester-driven and aren't rescheduled on exit.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub last_exit_code: Option<i32>,
    pub last_activation: Option<Instant>,
    pub last_exit: Option<Instant>,
    pub last_successful_activation: Option<Instant>,
    pub last_successful_exit: Option<Instant>,
    pub continuous_activation_failure: u32,
    pub continuous_exit_failure: u32,
    pub activation_count: u32,
    pub exit_count: u32,
}

impl RunStats {
    pub fn update_activation(&mut self, success: bool) {
        self.activation_count += 1;
        if success {
            self.continuous_activation_failure = 0;
            self.last_successful_activation = Some(Instant::now());
        } else {
            self.continuous_activation_failure += 1;
            self.last_activation = Some(Instant::now());
        }
    }

    pub fn update_exit(&mut self, exit_code: i32) {
        self.exit_count += 1;
        self.last_exit = Some(Instant::now());
        self.last_exit_code = Some(exit_code);
        if exit_code == 0 {
            self.continuous_exit_failure = 0;
            self.last_successful_exit = Some(Instant::now());
        } else {
            self.continuous_exit_failure += 1;
        }
    }

    pub fn max_continuous_failure(&self) -> u32 {
        self.continuous_activation_failure
            .max(self.continuous_exit_failure)
    }

    /// A run that outlasted the reset window wipes the slate before the
    /// next backoff computation, so a long-lived service's old failure
    /// history can't delay its next restart (spec §4.2 "Reset window").
    pub fn reset_if_long_lived(&mut self, reset_interval: Duration) {
        if let (Some(activation), Some(exit)) = (self.last_activation, self.last_exit) {
            if exit.saturating_duration_since(activation) > reset_interval {
                self.continuous_activation_failure = 0;
                self.continuous_exit_failure = 0;
            }
        }
    }
}

/// The three configuration knobs the backoff formula is driven by (spec
/// §4.2), sourced from the `[host]` config section (spec §6.3).
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub backoff_interval: Duration,
    pub max_retry_interval: Duration,
    pub max_failure_count: u32,
    pub continuous_exit_failure_reset_interval: Duration,
}

/// The outcome of scheduling a hosted service's next activation attempt
/// after an unsuccessful exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    RetryAfter(Duration),
    Disable,
}

/// `due-time = now + min(max_retry_interval, max_continuous_failure *
/// backoff_interval)`, or `Disable` once the failure budget is exceeded
/// (spec §4.2).
pub fn compute_backoff(stats: &mut RunStats, config: &BackoffConfig) -> BackoffDecision {
    stats.reset_if_long_lived(config.continuous_exit_failure_reset_interval);
    let failures = stats.max_continuous_failure();
    if failures > config.max_failure_count {
        return BackoffDecision::Disable;
    }
    let scaled = config.backoff_interval * failures;
    BackoffDecision::RetryAfter(scaled.min(config.max_retry_interval))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resets_continuous_activation_failure_on_success() {
        let mut stats = RunStats::default();
        stats.update_activation(false);
        stats.update_activation(false);
        assert_eq!(stats.continuous_activation_failure, 2);
        stats.update_activation(true);
        assert_eq!(stats.continuous_activation_failure, 0);
    }

    #[test]
    fn exit_failure_counter_resets_only_on_zero_code() {
        let mut stats = RunStats::default();
        stats.update_exit(1);
        stats.update_exit(1);
        assert_eq!(stats.continuous_exit_failure, 2);
        stats.update_exit(0);
        assert_eq!(stats.continuous_exit_failure, 0);
        assert_eq!(stats.exit_count, 3);
    }

    #[test]
    fn backoff_is_monotonic_and_clamped() {
        let config = BackoffConfig {
            backoff_interval: Duration::from_secs(2),
            max_retry_interval: Duration::from_secs(6),
            max_failure_count: 3,
            continuous_exit_failure_reset_interval: Duration::from_secs(3600),
        };
        let mut stats = RunStats::default();

        stats.update_exit(1);
        stats.last_activation = Some(Instant::now());
        assert_eq!(
            compute_backoff(&mut stats, &config),
            BackoffDecision::RetryAfter(Duration::from_secs(2))
        );

        stats.update_exit(1);
        assert_eq!(
            compute_backoff(&mut stats, &config),
            BackoffDecision::RetryAfter(Duration::from_secs(4))
        );

        stats.update_exit(1);
        assert_eq!(
            compute_backoff(&mut stats, &config),
            BackoffDecision::RetryAfter(Duration::from_secs(6))
        );

        stats.update_exit(1);
        assert_eq!(compute_backoff(&mut stats, &config), BackoffDecision::Disable);
    }

    #[test]
    fn long_lived_run_resets_failure_history() {
        let config = BackoffConfig {
            backoff_interval: Duration::from_secs(2),
            max_retry_interval: Duration::from_secs(60),
            max_failure_count: 3,
            continuous_exit_failure_reset_interval: Duration::from_millis(1),
        };
        let mut stats = RunStats::default();
        stats.continuous_activation_failure = 5;
        stats.continuous_exit_failure = 5;
        stats.last_activation = Some(Instant::now() - Duration::from_secs(10));
        stats.last_exit = Some(Instant::now());

        assert_eq!(
            compute_backoff(&mut stats, &config),
            BackoffDecision::RetryAfter(Duration::from_secs(0))
        );
    }
}

//! Activity retry policies

use std::time::Duration;

use serde::{Deserialize, Serialize};

use keel_common::error::reasons;
use keel_common::retry::RetryConfig;
use keel_common::Error;

/// Retry policy for one activity
///
/// Backoff starts at `initial_interval`, is multiplied by
/// `backoff_coefficient` after each failure and capped at `maximum_interval`.
/// A failure whose reason is listed in `non_retryable_reasons`, or that
/// reports itself as non-retryable, aborts immediately.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityRetryPolicy {
    /// Delay before the first retry, in seconds
    pub initial_interval_secs: u64,
    /// Multiplier applied to the delay after each failure
    pub backoff_coefficient: f64,
    /// Upper bound for the delay, in seconds
    pub maximum_interval_secs: u64,
    /// Total attempts including the first (0 = unlimited)
    pub maximum_attempts: u32,
    /// Failure reasons that are never retried
    pub non_retryable_reasons: Vec<String>,
}

impl Default for ActivityRetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval_secs: 2,
            backoff_coefficient: 1.5,
            maximum_interval_secs: 30,
            maximum_attempts: 30,
            non_retryable_reasons: default_non_retryable_reasons(),
        }
    }
}

/// Reasons no activity should retry
pub fn default_non_retryable_reasons() -> Vec<String> {
    [
        reasons::VALIDATION,
        reasons::STACK_FAILED,
        reasons::UPDATE_FAILED,
        reasons::NOT_FOUND,
        reasons::CANCELLED,
    ]
    .iter()
    .map(|r| r.to_string())
    .collect()
}

impl ActivityRetryPolicy {
    /// Policy that runs the activity exactly once
    pub fn no_retry() -> Self {
        Self {
            maximum_attempts: 1,
            ..Default::default()
        }
    }

    /// Policy with a custom attempt budget
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            maximum_attempts: attempts,
            ..Default::default()
        }
    }

    /// Add a reason to the non-retryable list
    pub fn non_retryable(mut self, reason: impl Into<String>) -> Self {
        self.non_retryable_reasons.push(reason.into());
        self
    }

    /// Whether a failure should be retried under this policy
    pub fn should_retry(&self, error: &Error) -> bool {
        error.is_retryable()
            && !self
                .non_retryable_reasons
                .iter()
                .any(|r| r == error.reason() || Some(r.as_str()) == error.provider_code())
    }

    /// Settings the retry loop cannot run with, reported against `field`
    ///
    /// The backoff coefficient must be finite and at least 1, and the maximum
    /// interval may not be below the initial one.
    pub fn violations(&self, field: &str) -> Vec<Error> {
        let mut errors = Vec::new();
        if !self.backoff_coefficient.is_finite() || self.backoff_coefficient < 1.0 {
            errors.push(Error::validation_for_field(
                "config",
                format!("{field}.backoffCoefficient"),
                format!(
                    "backoff coefficient {} must be a finite number of at least 1",
                    self.backoff_coefficient
                ),
            ));
        }
        if self.maximum_interval_secs < self.initial_interval_secs {
            errors.push(Error::validation_for_field(
                "config",
                format!("{field}.maximumIntervalSecs"),
                format!(
                    "maximum interval {}s is below initial interval {}s",
                    self.maximum_interval_secs, self.initial_interval_secs
                ),
            ));
        }
        errors
    }

    /// Backoff settings for the generic retry loop
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.maximum_attempts,
            initial_delay: Duration::from_secs(self.initial_interval_secs),
            max_delay: Duration::from_secs(self.maximum_interval_secs),
            backoff_multiplier: self.backoff_coefficient,
            jitter: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_reasons_abort() {
        let policy = ActivityRetryPolicy::default();
        assert!(!policy.should_retry(&Error::validation("bad")));
        assert!(!policy.should_retry(&Error::infrastructure("s", "UPDATE_FAILED", "x")));
        assert!(policy.should_retry(&Error::provider_for("c", "eks", "throttled")));
    }

    #[test]
    fn provider_codes_can_be_listed() {
        let policy = ActivityRetryPolicy::default().non_retryable("AccessDenied");
        let err = Error::provider_with_code("c", "eks", "AccessDenied", "no");
        assert!(!policy.should_retry(&err));
        let err = Error::provider_with_code("c", "eks", "Throttling", "slow");
        assert!(policy.should_retry(&err));
    }

    #[test]
    fn permanent_errors_abort_even_when_unlisted() {
        let policy = ActivityRetryPolicy {
            non_retryable_reasons: Vec::new(),
            ..Default::default()
        };
        assert!(!policy.should_retry(&Error::provider_permanent("c", "eks", "denied")));
    }

    #[test]
    fn retry_config_mirrors_policy() {
        let policy = ActivityRetryPolicy {
            initial_interval_secs: 5,
            backoff_coefficient: 2.0,
            maximum_interval_secs: 60,
            maximum_attempts: 4,
            non_retryable_reasons: Vec::new(),
        };
        let config = policy.retry_config();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.initial_delay, Duration::from_secs(5));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert!(!config.jitter);
    }

    #[test]
    fn shrinking_or_unbounded_backoff_is_rejected() {
        assert!(ActivityRetryPolicy::default().violations("p").is_empty());

        let policy = ActivityRetryPolicy {
            backoff_coefficient: -2.0,
            initial_interval_secs: 10,
            maximum_interval_secs: 5,
            ..Default::default()
        };
        let errors = policy.violations("updateStack");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().contains("backoff coefficient"));

        let policy = ActivityRetryPolicy {
            backoff_coefficient: f64::NAN,
            ..Default::default()
        };
        assert_eq!(policy.violations("p").len(), 1);
    }

    #[test]
    fn deserializes_with_defaults() {
        let policy: ActivityRetryPolicy =
            serde_json::from_str(r#"{"maximumAttempts": 3}"#).unwrap();
        assert_eq!(policy.maximum_attempts, 3);
        assert_eq!(policy.initial_interval_secs, 2);
        assert!(!policy.non_retryable_reasons.is_empty());
    }
}

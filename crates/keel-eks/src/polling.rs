//! Waiting for provider-side operations
//!
//! A mutation is submitted once, then its status is polled on a fixed
//! interval. Each poll records a heartbeat carrying the attempt counter, so an
//! activity retried after a worker crash continues from the recorded attempt
//! instead of restarting its budget.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use keel_common::{Error, Result};
use keel_workflow::ActivityContext;

use crate::config::OrchestratorConfig;

/// Polling cadence and budget
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    /// Delay between polls
    pub interval: Duration,
    /// Polls before giving up
    pub max_attempts: u32,
}

impl From<&OrchestratorConfig> for PollConfig {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts,
        }
    }
}

/// Heartbeat payload of a poll loop
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PollProgress {
    /// Zero-based index of the poll in flight
    pub attempt: u32,
}

/// Outcome of one poll
#[derive(Debug, PartialEq, Eq)]
pub enum PollState<T> {
    /// Not finished; carries the observed status for logging
    Pending(String),
    /// Finished successfully
    Done(T),
}

/// Terminal classification of a stack status string
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackState {
    /// Operation still running
    InProgress,
    /// Operation finished successfully
    Complete,
    /// Operation failed or was rolled back
    Failed,
}

/// Classify a provider stack status
///
/// Rollback states count as failures even when the rollback itself completed
/// (`UPDATE_ROLLBACK_COMPLETE`), so they are checked before `_COMPLETE`.
pub fn classify_stack_status(status: &str) -> StackState {
    if status.contains("ROLLBACK") || status.ends_with("_FAILED") {
        StackState::Failed
    } else if status.ends_with("_COMPLETE") {
        StackState::Complete
    } else {
        StackState::InProgress
    }
}

/// Poll `check` until it reports done or the attempt budget runs out
///
/// Errors from `check` end the loop; the activity's retry policy decides
/// whether to try again, resuming from the last heartbeat.
pub async fn poll_until<T, F, Fut>(
    actx: &ActivityContext,
    config: &PollConfig,
    resource: &str,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollState<T>>>,
{
    let start = actx
        .heartbeat_details::<PollProgress>()
        .await?
        .map(|p| p.attempt)
        .unwrap_or(0);
    if start > 0 {
        info!(resource = %resource, attempt = start, "resuming wait from last heartbeat");
    }

    for attempt in start..config.max_attempts {
        actx.heartbeat(&PollProgress { attempt }).await?;

        match check().await? {
            PollState::Done(value) => return Ok(value),
            PollState::Pending(status) => {
                debug!(resource = %resource, attempt = attempt, status = %status, "still waiting");
            }
        }

        if attempt + 1 < config.max_attempts {
            tokio::time::sleep(config.interval).await;
        }
    }

    Err(Error::poll_timeout(resource, config.max_attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_workflow::{ActivityRetryPolicy, MemoryStepLog, WorkflowContext};
    use rstest::rstest;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn poll(max_attempts: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(30),
            max_attempts,
        }
    }

    fn policy(attempts: u32) -> ActivityRetryPolicy {
        ActivityRetryPolicy {
            initial_interval_secs: 0,
            maximum_interval_secs: 0,
            maximum_attempts: attempts,
            ..Default::default()
        }
    }

    #[rstest]
    #[case("UPDATE_COMPLETE", StackState::Complete)]
    #[case("CREATE_COMPLETE", StackState::Complete)]
    #[case("UPDATE_IN_PROGRESS", StackState::InProgress)]
    #[case("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS", StackState::InProgress)]
    #[case("UPDATE_FAILED", StackState::Failed)]
    #[case("UPDATE_ROLLBACK_IN_PROGRESS", StackState::Failed)]
    #[case("UPDATE_ROLLBACK_COMPLETE", StackState::Failed)]
    #[case("ROLLBACK_COMPLETE", StackState::Failed)]
    fn stack_status_vocabulary(#[case] status: &str, #[case] expected: StackState) {
        assert_eq!(classify_stack_status(status), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_done() {
        let wctx = WorkflowContext::new("poll-1", Arc::new(MemoryStepLog::new()));
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let value: u32 = wctx
            .execute_activity("wait", &policy(1), move |actx| {
                let c = c.clone();
                async move {
                    poll_until(&actx, &poll(10), "stack", || {
                        let n = c.fetch_add(1, Ordering::SeqCst);
                        async move {
                            if n < 3 {
                                Ok(PollState::Pending("UPDATE_IN_PROGRESS".into()))
                            } else {
                                Ok(PollState::Done(n))
                            }
                        }
                    })
                    .await
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let wctx = WorkflowContext::new("poll-2", Arc::new(MemoryStepLog::new()));
        let err = wctx
            .execute_activity::<(), _, _>("wait", &policy(1), |actx| async move {
                poll_until(&actx, &poll(4), "stack", || async {
                    Ok(PollState::Pending("UPDATE_IN_PROGRESS".into()))
                })
                .await
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PollTimeout { attempts: 4, .. }));
    }

    /// Story: a poller that crashed at attempt 7 resumes there instead of
    /// restarting its whole budget
    #[tokio::test(start_paused = true)]
    async fn story_retry_resumes_from_heartbeat() {
        let wctx = WorkflowContext::new("poll-3", Arc::new(MemoryStepLog::new()));
        let first_seen = Arc::new(AtomicU32::new(u32::MAX));
        let seen = first_seen.clone();

        let attempts: u32 = wctx
            .execute_activity("wait", &policy(2), move |actx| {
                let seen = seen.clone();
                async move {
                    let polls = Arc::new(AtomicU32::new(0));
                    let retry = actx.attempt();
                    if retry == 2 {
                        let resumed: Option<PollProgress> = actx.heartbeat_details().await?;
                        seen.store(resumed.map(|p| p.attempt).unwrap_or(0), Ordering::SeqCst);
                    }
                    poll_until(&actx, &poll(10), "stack", || {
                        let n = polls.fetch_add(1, Ordering::SeqCst);
                        async move {
                            match (retry, n) {
                                // First worker dies on its eighth poll
                                (1, 7) => Err(Error::provider_for("stack", "cloudformation", "reset")),
                                (1, _) => Ok(PollState::Pending("UPDATE_IN_PROGRESS".into())),
                                _ => Ok(PollState::Done(n + 1)),
                            }
                        }
                    })
                    .await
                }
            })
            .await
            .unwrap();

        assert_eq!(first_seen.load(Ordering::SeqCst), 7);
        assert_eq!(attempts, 1);
    }
}

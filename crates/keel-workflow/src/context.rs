//! Workflow and activity contexts
//!
//! A [`WorkflowContext`] drives one workflow run. Each call to
//! [`WorkflowContext::execute_activity`] takes the next step index; a step that
//! already has a recorded outcome is replayed from the log, so re-running a
//! workflow with the same run id after a crash never repeats finished work.
//!
//! Activities receive an [`ActivityContext`] for heartbeats and idempotency
//! tokens.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use keel_common::retry::retry_with_backoff_if;
use keel_common::{Error, Result};

use crate::log::{StepLog, StepOutcome, StepRecord};
use crate::policy::ActivityRetryPolicy;

/// Generate a fresh run id
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Execution context of one workflow run
#[derive(Clone)]
pub struct WorkflowContext {
    run_id: String,
    log: Arc<dyn StepLog>,
    cancel: CancellationToken,
    next_step: Arc<AtomicU32>,
    disconnected: bool,
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("run_id", &self.run_id)
            .field("next_step", &self.next_step.load(Ordering::SeqCst))
            .field("disconnected", &self.disconnected)
            .finish()
    }
}

impl WorkflowContext {
    /// Start or resume the run `run_id` backed by `log`
    pub fn new(run_id: impl Into<String>, log: Arc<dyn StepLog>) -> Self {
        Self {
            run_id: run_id.into(),
            log,
            cancel: CancellationToken::new(),
            next_step: Arc::new(AtomicU32::new(0)),
            disconnected: false,
        }
    }

    /// Attach a cancellation token for this run
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run identifier
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Token that cancels this run
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether cancellation has been requested and this context observes it
    pub fn is_cancelled(&self) -> bool {
        !self.disconnected && self.cancel.is_cancelled()
    }

    /// Context sharing this run's log and step sequence but ignoring
    /// cancellation
    ///
    /// Compensation steps (final status writes) run on it so they complete
    /// after the main flow was cancelled.
    pub fn disconnected(&self) -> Self {
        Self {
            disconnected: true,
            ..self.clone()
        }
    }

    async fn cancelled(&self) {
        if self.disconnected {
            std::future::pending::<()>().await
        } else {
            self.cancel.cancelled().await
        }
    }

    /// Durable timer; fails with [`Error::Cancelled`] when the run is cancelled
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancelled() => Err(Error::cancelled("timer")),
        }
    }

    /// Execute an activity as the next step of this run
    ///
    /// A recorded outcome for the step is replayed without invoking
    /// `activity`. Otherwise the activity runs under `policy` and its final
    /// outcome is recorded. Cancellation interrupts the activity and leaves
    /// the step unrecorded so a resumed run executes it again, continuing
    /// from its last heartbeat.
    pub async fn execute_activity<T, F, Fut>(
        &self,
        name: &str,
        policy: &ActivityRetryPolicy,
        mut activity: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(ActivityContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let step = self.next_step.fetch_add(1, Ordering::SeqCst);

        if let Some(record) = self.log.load(&self.run_id, step).await? {
            return self.replay(name, step, record);
        }

        if self.is_cancelled() {
            return Err(Error::cancelled(name));
        }

        debug!(run_id = %self.run_id, step = step, activity = %name, "executing activity");

        let attempt = AtomicU32::new(0);
        let retry_config = policy.retry_config();
        let run = retry_with_backoff_if(
            &retry_config,
            name,
            || {
                let n = attempt.fetch_add(1, Ordering::SeqCst) + 1;
                activity(ActivityContext {
                    run_id: self.run_id.clone(),
                    activity: name.to_string(),
                    step,
                    attempt: n,
                    log: self.log.clone(),
                })
            },
            |e: &Error| policy.should_retry(e),
        );

        let result = tokio::select! {
            result = run => result,
            _ = self.cancelled() => {
                warn!(run_id = %self.run_id, step = step, activity = %name, "activity cancelled");
                return Err(Error::cancelled(name));
            }
        };

        match result {
            Ok(output) => {
                let value = serde_json::to_value(&output)?;
                self.log
                    .record(&self.run_id, step, StepRecord::completed(name, value))
                    .await?;
                Ok(output)
            }
            Err(e) => {
                self.log
                    .record(&self.run_id, step, StepRecord::failed(name, &e))
                    .await?;
                Err(e)
            }
        }
    }

    fn replay<T: DeserializeOwned>(&self, name: &str, step: u32, record: StepRecord) -> Result<T> {
        if record.activity != name {
            return Err(Error::internal_with_context(
                "workflow",
                format!(
                    "non-deterministic replay of run {}: step {} recorded {} but workflow requested {}",
                    self.run_id, step, record.activity, name
                ),
            ));
        }

        info!(run_id = %self.run_id, step = step, activity = %name, "replaying recorded step");
        match record.outcome {
            StepOutcome::Completed { output } => serde_json::from_value(output).map_err(|e| {
                Error::serialization_for_kind(name, format!("cannot decode recorded output: {e}"))
            }),
            StepOutcome::Failed { reason, message } => {
                Err(Error::activity_failed(name, reason, message))
            }
        }
    }
}

/// Context handed to a running activity attempt
#[derive(Clone)]
pub struct ActivityContext {
    run_id: String,
    activity: String,
    step: u32,
    attempt: u32,
    log: Arc<dyn StepLog>,
}

impl std::fmt::Debug for ActivityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityContext")
            .field("run_id", &self.run_id)
            .field("activity", &self.activity)
            .field("step", &self.step)
            .field("attempt", &self.attempt)
            .finish()
    }
}

impl ActivityContext {
    /// Run this activity belongs to
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Activity name
    pub fn activity(&self) -> &str {
        &self.activity
    }

    /// Step index within the run
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Attempt number, starting at 1
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Token for provider mutation calls
    ///
    /// Stable across retries of the same step, so a resubmitted request is
    /// deduplicated by the provider instead of applied twice.
    pub fn idempotency_token(&self) -> String {
        format!("{}-{}", self.run_id, self.step)
    }

    /// Record progress for this step
    pub async fn heartbeat<D: Serialize>(&self, details: &D) -> Result<()> {
        let value = serde_json::to_value(details)?;
        self.log.heartbeat(&self.run_id, self.step, value).await
    }

    /// Last progress recorded for this step, by this or an earlier attempt
    pub async fn heartbeat_details<D: DeserializeOwned>(&self) -> Result<Option<D>> {
        match self.log.last_heartbeat(&self.run_id, self.step).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

//! Persisted step log
//!
//! Every activity outcome is stored under `(run_id, step)`. A workflow that is
//! restarted with the same run id replays completed steps from the log
//! instead of executing them again. Heartbeats are stored next to the step
//! so a long wait resumes from its last recorded attempt.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use keel_common::{Error, Result};

/// Outcome of a finished activity
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum StepOutcome {
    /// Activity returned a value
    Completed {
        /// JSON-encoded activity output
        output: serde_json::Value,
    },
    /// Activity failed after its retry policy gave up
    Failed {
        /// Stable failure reason
        reason: String,
        /// Failure message
        message: String,
    },
}

/// One recorded step
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    /// Activity name, checked on replay
    pub activity: String,
    /// What the activity produced
    #[serde(flatten)]
    pub outcome: StepOutcome,
    /// When the outcome was recorded
    pub recorded_at: DateTime<Utc>,
}

impl StepRecord {
    /// Record a successful activity
    pub fn completed(activity: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            activity: activity.into(),
            outcome: StepOutcome::Completed { output },
            recorded_at: Utc::now(),
        }
    }

    /// Record a failed activity
    pub fn failed(activity: impl Into<String>, error: &Error) -> Self {
        Self {
            activity: activity.into(),
            outcome: StepOutcome::Failed {
                reason: error.reason().to_string(),
                message: error.root_message(),
            },
            recorded_at: Utc::now(),
        }
    }
}

/// Storage for step outcomes and heartbeats
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StepLog: Send + Sync {
    /// Load the recorded outcome of a step, if any
    async fn load(&self, run_id: &str, step: u32) -> Result<Option<StepRecord>>;

    /// Record the final outcome of a step
    async fn record(&self, run_id: &str, step: u32, record: StepRecord) -> Result<()>;

    /// Store heartbeat details for a running step, replacing earlier ones
    async fn heartbeat(&self, run_id: &str, step: u32, details: serde_json::Value) -> Result<()>;

    /// Last heartbeat details recorded for a step
    async fn last_heartbeat(&self, run_id: &str, step: u32) -> Result<Option<serde_json::Value>>;
}

/// In-process step log
///
/// Survives workflow restarts within one process; used by tests and by
/// callers that persist outcomes elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStepLog {
    steps: DashMap<(String, u32), StepRecord>,
    heartbeats: DashMap<(String, u32), serde_json::Value>,
}

impl MemoryStepLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded steps for a run
    pub fn step_count(&self, run_id: &str) -> usize {
        self.steps.iter().filter(|e| e.key().0 == run_id).count()
    }
}

#[async_trait]
impl StepLog for MemoryStepLog {
    async fn load(&self, run_id: &str, step: u32) -> Result<Option<StepRecord>> {
        Ok(self
            .steps
            .get(&(run_id.to_string(), step))
            .map(|r| r.value().clone()))
    }

    async fn record(&self, run_id: &str, step: u32, record: StepRecord) -> Result<()> {
        self.steps.insert((run_id.to_string(), step), record);
        self.heartbeats.remove(&(run_id.to_string(), step));
        Ok(())
    }

    async fn heartbeat(&self, run_id: &str, step: u32, details: serde_json::Value) -> Result<()> {
        self.heartbeats.insert((run_id.to_string(), step), details);
        Ok(())
    }

    async fn last_heartbeat(&self, run_id: &str, step: u32) -> Result<Option<serde_json::Value>> {
        Ok(self
            .heartbeats
            .get(&(run_id.to_string(), step))
            .map(|h| h.value().clone()))
    }
}

/// On-disk contents of one run
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunFile {
    #[serde(default)]
    steps: BTreeMap<u32, StepRecord>,
    #[serde(default)]
    heartbeats: BTreeMap<u32, serde_json::Value>,
}

/// Step log keeping one JSON file per run in a directory
///
/// Files are replaced atomically (write to a temp file, then rename) so a
/// crash mid-write leaves the previous state intact.
#[derive(Debug)]
pub struct FileStepLog {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileStepLog {
    /// Open a log rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::internal_with_context(
                "step-log",
                format!("failed to create {}: {}", dir.display(), e),
            )
        })?;
        Ok(Self {
            dir,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn run_path(&self, run_id: &str) -> Result<PathBuf> {
        if run_id.is_empty()
            || !run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::validation_for_field(
                run_id,
                "runId",
                "run id may only contain letters, digits, '-' and '_'",
            ));
        }
        Ok(self.dir.join(format!("{run_id}.json")))
    }

    async fn read_run(&self, run_id: &str) -> Result<RunFile> {
        let path = self.run_path(run_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::serialization_for_kind(
                    "RunFile",
                    format!("corrupt step log {}: {}", path.display(), e),
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RunFile::default()),
            Err(e) => Err(Error::internal_with_context(
                "step-log",
                format!("failed to read {}: {}", path.display(), e),
            )),
        }
    }

    async fn write_run(&self, run_id: &str, run: &RunFile) -> Result<()> {
        let path = self.run_path(run_id)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(run)?;
        tokio::fs::write(&tmp, bytes).await.map_err(|e| {
            Error::internal_with_context(
                "step-log",
                format!("failed to write {}: {}", tmp.display(), e),
            )
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            Error::internal_with_context(
                "step-log",
                format!("failed to replace {}: {}", path.display(), e),
            )
        })
    }

    async fn update<F>(&self, run_id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut RunFile) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut run = self.read_run(run_id).await?;
        apply(&mut run);
        self.write_run(run_id, &run).await
    }
}

#[async_trait]
impl StepLog for FileStepLog {
    async fn load(&self, run_id: &str, step: u32) -> Result<Option<StepRecord>> {
        Ok(self.read_run(run_id).await?.steps.remove(&step))
    }

    async fn record(&self, run_id: &str, step: u32, record: StepRecord) -> Result<()> {
        debug!(run_id = %run_id, step = step, activity = %record.activity, "recording step");
        self.update(run_id, move |run| {
            run.heartbeats.remove(&step);
            run.steps.insert(step, record);
        })
        .await
    }

    async fn heartbeat(&self, run_id: &str, step: u32, details: serde_json::Value) -> Result<()> {
        self.update(run_id, move |run| {
            run.heartbeats.insert(step, details);
        })
        .await
    }

    async fn last_heartbeat(&self, run_id: &str, step: u32) -> Result<Option<serde_json::Value>> {
        Ok(self.read_run(run_id).await?.heartbeats.remove(&step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_log_roundtrips_steps_and_heartbeats() {
        let log = MemoryStepLog::new();
        assert!(log.load("run-1", 0).await.unwrap().is_none());

        log.heartbeat("run-1", 0, json!({"attempt": 3})).await.unwrap();
        assert_eq!(
            log.last_heartbeat("run-1", 0).await.unwrap(),
            Some(json!({"attempt": 3}))
        );

        log.record("run-1", 0, StepRecord::completed("a", json!("out")))
            .await
            .unwrap();
        let record = log.load("run-1", 0).await.unwrap().unwrap();
        assert_eq!(record.activity, "a");
        // Recording the outcome clears the heartbeat
        assert!(log.last_heartbeat("run-1", 0).await.unwrap().is_none());
        assert_eq!(log.step_count("run-1"), 1);
        assert_eq!(log.step_count("run-2"), 0);
    }

    #[tokio::test]
    async fn file_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = FileStepLog::open(dir.path()).await.unwrap();
            log.record("run-a", 0, StepRecord::completed("first", json!({"id": "u-1"})))
                .await
                .unwrap();
            let err = Error::infrastructure("stack", "UPDATE_FAILED", "boom");
            log.record("run-a", 1, StepRecord::failed("second", &err))
                .await
                .unwrap();
            log.heartbeat("run-a", 2, json!({"attempt": 7})).await.unwrap();
        }

        let log = FileStepLog::open(dir.path()).await.unwrap();
        let first = log.load("run-a", 0).await.unwrap().unwrap();
        assert_eq!(
            first.outcome,
            StepOutcome::Completed {
                output: json!({"id": "u-1"})
            }
        );
        match log.load("run-a", 1).await.unwrap().unwrap().outcome {
            StepOutcome::Failed { reason, message } => {
                assert_eq!(reason, "StackFailed");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(
            log.last_heartbeat("run-a", 2).await.unwrap(),
            Some(json!({"attempt": 7}))
        );
        assert!(log.load("run-b", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_log_rejects_path_like_run_ids() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileStepLog::open(dir.path()).await.unwrap();
        let err = log.load("../escape", 0).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}

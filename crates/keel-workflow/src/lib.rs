//! Durable execution for Keel pipelines
//!
//! A small replay engine in place of a full workflow service: activity
//! outcomes are persisted in a [`StepLog`] keyed by `(run_id, step)`, so a
//! pipeline restarted with the same run id skips every finished step and a
//! long poll resumes from its last heartbeat. Each activity runs under an
//! [`ActivityRetryPolicy`] with exponential backoff and a list of failure
//! reasons that are never retried.
//!
//! A run that was cancelled is finished: its compensation steps take the
//! step indices the interrupted flow would have used, so it is not resumed.

#![deny(missing_docs)]

pub mod context;
pub mod log;
pub mod policy;

pub use context::{new_run_id, ActivityContext, WorkflowContext};
pub use log::{FileStepLog, MemoryStepLog, StepLog, StepOutcome, StepRecord};
pub use policy::ActivityRetryPolicy;

//! Error types for Keel
//!
//! Errors are structured with fields to aid debugging in production. Each
//! variant carries the resource it concerns (cluster, node pool, stack) and,
//! for provider failures, whether the failure is worth retrying.
//!
//! Every variant maps to a stable machine reason via [`Error::reason`]. Activity
//! retry policies match on these reasons to abort immediately instead of
//! burning through their attempts.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Stable failure reasons used by activity retry policies
pub mod reasons {
    /// Malformed or incomplete request
    pub const VALIDATION: &str = "ValidationError";
    /// Transient provider failure (network, throttling, timeouts)
    pub const PROVIDER: &str = "ProviderError";
    /// Infrastructure stack reported a failed or rolled back state
    pub const STACK_FAILED: &str = "StackFailed";
    /// A provider-side update (version or addon) ended unsuccessfully
    pub const UPDATE_FAILED: &str = "UpdateFailed";
    /// Polling gave up after its attempt budget
    pub const POLL_TIMEOUT: &str = "PollTimeout";
    /// A referenced resource does not exist
    pub const NOT_FOUND: &str = "NotFound";
    /// Encoding or decoding failed
    pub const SERIALIZATION: &str = "SerializationError";
    /// The surrounding workflow was cancelled
    pub const CANCELLED: &str = "Cancelled";
    /// Unexpected internal failure
    pub const INTERNAL: &str = "InternalError";
}

/// Main error type for Keel operations
#[derive(Debug, Error)]
pub enum Error {
    /// Request validation error, surfaced before any cloud mutation
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Cluster or node pool the invalid request concerns
        resource: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field (e.g., "instanceType")
        field: Option<String>,
    },

    /// Cloud provider API error
    #[error("provider error [{provider}] for {resource}: {message}")]
    Provider {
        /// Cluster, stack or image the call concerned
        resource: String,
        /// Provider API that failed (eks, cloudformation, ec2)
        provider: String,
        /// Description of what failed
        message: String,
        /// Whether this error is retryable
        retryable: bool,
        /// Provider error code (e.g., "ValidationError", "Throttling")
        code: Option<String>,
    },

    /// Infrastructure stack ended in a failed or rolled back state
    #[error("stack {stack} reached {status}: {message}")]
    Infrastructure {
        /// Stack name
        stack: String,
        /// Terminal provider status (e.g., "UPDATE_ROLLBACK_COMPLETE")
        status: String,
        /// Status reason reported by the provider
        message: String,
    },

    /// Provider-side version or addon update did not succeed
    #[error("update {update_id} for {resource} ended {status}: {message}")]
    UpdateFailed {
        /// Cluster or addon being updated
        resource: String,
        /// Provider update identifier
        update_id: String,
        /// Final update status
        status: String,
        /// Collected provider error details
        message: String,
    },

    /// Polling exhausted its attempt budget
    #[error("timed out waiting for {resource} after {attempts} attempts")]
    PollTimeout {
        /// What was being waited on
        resource: String,
        /// Number of polls made
        attempts: u32,
    },

    /// Referenced resource does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The value kind being serialized (if known)
        kind: Option<String>,
    },

    /// Workflow cancellation reached this step
    #[error("cancelled during {context}")]
    Cancelled {
        /// Step or wait that observed the cancellation
        context: String,
    },

    /// A replayed activity failure read back from the step log
    #[error("activity {activity} failed [{reason}]: {message}")]
    ActivityFailed {
        /// Activity name
        activity: String,
        /// Reason recorded when the activity failed
        reason: String,
        /// Message recorded when the activity failed
        message: String,
    },

    /// Several independent failures combined into one
    #[error("{} errors occurred: {}", .errors.len(), join_messages(.errors))]
    Aggregate {
        /// The individual failures, in discovery order
        errors: Vec<Error>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "step-log", "workflow")
        context: String,
    },
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error naming the cluster or node pool
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error naming the resource and the offending field
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a retryable provider error
    pub fn provider_for(
        resource: impl Into<String>,
        provider: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Provider {
            resource: resource.into(),
            provider: provider.into(),
            message: msg.into(),
            retryable: true,
            code: None,
        }
    }

    /// Create a provider error carrying the provider's error code
    pub fn provider_with_code(
        resource: impl Into<String>,
        provider: impl Into<String>,
        code: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Provider {
            resource: resource.into(),
            provider: provider.into(),
            message: msg.into(),
            retryable: true,
            code: Some(code.into()),
        }
    }

    /// Create a non-retryable provider error (e.g., access denied)
    pub fn provider_permanent(
        resource: impl Into<String>,
        provider: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Provider {
            resource: resource.into(),
            provider: provider.into(),
            message: msg.into(),
            retryable: false,
            code: None,
        }
    }

    /// Create a terminal infrastructure error for a failed stack
    pub fn infrastructure(
        stack: impl Into<String>,
        status: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Infrastructure {
            stack: stack.into(),
            status: status.into(),
            message: msg.into(),
        }
    }

    /// Create an error for a version or addon update that did not succeed
    pub fn update_failed(
        resource: impl Into<String>,
        update_id: impl Into<String>,
        status: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::UpdateFailed {
            resource: resource.into(),
            update_id: update_id.into(),
            status: status.into(),
            message: msg.into(),
        }
    }

    /// Create a polling timeout error
    pub fn poll_timeout(resource: impl Into<String>, attempts: u32) -> Self {
        Self::PollTimeout {
            resource: resource.into(),
            attempts,
        }
    }

    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with value kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(context: impl Into<String>) -> Self {
        Self::Cancelled {
            context: context.into(),
        }
    }

    /// Rebuild an activity failure from its recorded reason and message
    pub fn activity_failed(
        activity: impl Into<String>,
        reason: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::ActivityFailed {
            activity: activity.into(),
            reason: reason.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Combine collected failures: `Ok` when empty, the single error when
    /// there is one, and [`Error::Aggregate`] otherwise.
    pub fn combine(mut errors: Vec<Error>) -> Result<(), Error> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Aggregate { errors }),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, terminal infrastructure and cancellation errors never retry.
    /// Provider errors carry their own flag.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Validation { .. } => false,
            Error::Provider { retryable, .. } => *retryable,
            Error::Infrastructure { .. } => false,
            Error::UpdateFailed { .. } => false,
            Error::PollTimeout { .. } => false,
            Error::NotFound { .. } => false,
            Error::Serialization { .. } => false,
            Error::Cancelled { .. } => false,
            Error::ActivityFailed { .. } => false,
            Error::Aggregate { errors } => errors.iter().all(Error::is_retryable),
            Error::Internal { .. } => true,
        }
    }

    /// Stable machine reason for this failure
    pub fn reason(&self) -> &str {
        match self {
            Error::Validation { .. } => reasons::VALIDATION,
            Error::Provider { .. } => reasons::PROVIDER,
            Error::Infrastructure { .. } => reasons::STACK_FAILED,
            Error::UpdateFailed { .. } => reasons::UPDATE_FAILED,
            Error::PollTimeout { .. } => reasons::POLL_TIMEOUT,
            Error::NotFound { .. } => reasons::NOT_FOUND,
            Error::Serialization { .. } => reasons::SERIALIZATION,
            Error::Cancelled { .. } => reasons::CANCELLED,
            Error::ActivityFailed { reason, .. } => reason,
            Error::Aggregate { errors } => {
                if errors.iter().all(|e| e.reason() == reasons::VALIDATION) {
                    reasons::VALIDATION
                } else {
                    reasons::INTERNAL
                }
            }
            Error::Internal { .. } => reasons::INTERNAL,
        }
    }

    /// Whether this failure came from workflow cancellation
    pub fn is_cancelled(&self) -> bool {
        self.reason() == reasons::CANCELLED
    }

    /// The innermost human-readable message, without the wrapping context
    ///
    /// Used when a failure is written to a status row.
    pub fn root_message(&self) -> String {
        match self {
            Error::Validation { message, .. }
            | Error::Provider { message, .. }
            | Error::Infrastructure { message, .. }
            | Error::UpdateFailed { message, .. }
            | Error::Serialization { message, .. }
            | Error::ActivityFailed { message, .. }
            | Error::Internal { message, .. } => message.clone(),
            Error::Aggregate { errors } => join_messages(errors),
            other => other.to_string(),
        }
    }

    /// Get the resource name if this error concerns a specific one
    pub fn resource(&self) -> Option<&str> {
        match self {
            Error::Validation { resource, .. } => Some(resource),
            Error::Provider { resource, .. } => Some(resource),
            Error::Infrastructure { stack, .. } => Some(stack),
            Error::UpdateFailed { resource, .. } => Some(resource),
            Error::PollTimeout { resource, .. } => Some(resource),
            Error::NotFound { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Provider error code, if the provider supplied one
    pub fn provider_code(&self) -> Option<&str> {
        match self {
            Error::Provider { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}

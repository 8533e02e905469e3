// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tofu-core.
//!
//! Every component returns a structured error so the caller can branch on the
//! kind of failure. [`Error::class`] maps each kind onto the control-loop
//! taxonomy used by [`crate::retry::RetryPolicy::disposition`].

use thiserror::Error;

use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::lock::StateLockError;
use crate::session::SessionError;
use crate::store::StoreError;

/// Result type using the tofu-core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// How the control loop should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Logic or lifecycle bug, or stale caller state. Never retried automatically.
    Fatal,
    /// Stored state does not match expectations. Surfaced to an operator.
    OperatorActionable,
    /// Another execution holds the distributed state lock. Back off and retry.
    Retryable,
    /// Anything else. Retried by the generic failure handling.
    Unclassified,
}

/// Plan artifact errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Encoding or reassembling chunks failed.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The persistence medium rejected or failed an operation.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The request targets a runner session that is not the active one.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The executor reported that the state lock is held.
    #[error(transparent)]
    StateLock(#[from] StateLockError),

    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No stored object exists for the requested plan.
    #[error("No plan found for '{name}' in namespace '{namespace}' (workspace '{workspace}')")]
    NoPlanFound {
        /// Name of the owning object.
        name: String,
        /// Namespace of the owning object.
        namespace: String,
        /// Workspace the plan was saved for.
        workspace: String,
    },

    /// The stored plan is not the one that is pending approval.
    #[error("Pending plan and stored plan do not match: {pending} != {stored}")]
    PlanMismatch {
        /// Plan ID the caller expects (the approved one).
        pending: String,
        /// Plan ID found on the stored object.
        stored: String,
    },

    /// A stored object is missing a required field or carries an unparsable one.
    #[error("Malformed plan object '{name}': {reason}")]
    MalformedObject {
        /// Name of the offending object.
        name: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl Error {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Codec(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::StateLock(_) => "STATE_LOCKED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::NoPlanFound { .. } => "NO_PLAN_FOUND",
            Self::PlanMismatch { .. } => "PLAN_MISMATCH",
            Self::MalformedObject { .. } => "MALFORMED_OBJECT",
        }
    }

    /// Classify this error for the control loop.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Codec(_) | Self::Session(_) | Self::Config(_) | Self::MalformedObject { .. } => {
                ErrorClass::Fatal
            }
            Self::Store(e) => e.class(),
            Self::StateLock(_) => ErrorClass::Retryable,
            Self::NoPlanFound { .. } | Self::PlanMismatch { .. } => {
                ErrorClass::OperatorActionable
            }
        }
    }

    /// Lock holder identifier when this is a state lock error with structured metadata.
    pub fn state_lock_identifier(&self) -> Option<&str> {
        match self {
            Self::StateLock(lock) if !lock.id.is_empty() => Some(&lock.id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_errors_are_operator_actionable() {
        let err = Error::NoPlanFound {
            name: "my-stack".to_string(),
            namespace: "flux-system".to_string(),
            workspace: "default".to_string(),
        };
        assert_eq!(err.class(), ErrorClass::OperatorActionable);
        assert_eq!(err.error_code(), "NO_PLAN_FOUND");

        let err = Error::PlanMismatch {
            pending: "plan-main-abc".to_string(),
            stored: "plan-main-def".to_string(),
        };
        assert_eq!(err.class(), ErrorClass::OperatorActionable);
        assert_eq!(
            err.to_string(),
            "Pending plan and stored plan do not match: plan-main-abc != plan-main-def"
        );
    }

    #[test]
    fn test_codec_and_session_errors_are_fatal() {
        let err: Error = CodecError::MissingChunk(2).into();
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert_eq!(err.error_code(), "MISSING_CHUNK");

        let err: Error = SessionError::SessionMismatch {
            requested: "B".to_string(),
            current: "A".to_string(),
        }
        .into();
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert_eq!(err.error_code(), "SESSION_MISMATCH");
    }

    #[test]
    fn test_state_lock_identifier() {
        let err: Error = StateLockError::default().into();
        assert_eq!(err.class(), ErrorClass::Retryable);
        assert_eq!(err.state_lock_identifier(), None);

        let err: Error = StateLockError {
            id: "f2ab685b".to_string(),
            ..Default::default()
        }
        .into();
        assert_eq!(err.state_lock_identifier(), Some("f2ab685b"));
    }
}

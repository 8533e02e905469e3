// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tofu-runner.

use thiserror::Error;
use tofu_core::{Classified, ErrorClass, SessionError, StateLockError, classify};

use crate::executor::ExecutorError;

/// Runner errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerError {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] tofu_core::ConfigError),

    /// The request belongs to a stale or unknown session.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Plan lifecycle operation failed.
    #[error("Plan error: {0}")]
    Plan(#[from] tofu_core::Error),

    /// Object store could not be opened.
    #[error("Store error: {0}")]
    Store(#[from] tofu_core::StoreError),

    /// The executor could not acquire the state lock.
    #[error(transparent)]
    StateLocked(StateLockError),

    /// The executor failed for any other reason.
    #[error("Executor error: {0}")]
    Executor(ExecutorError),

    /// Request validation failed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type using RunnerError.
pub type Result<T> = std::result::Result<T, RunnerError>;

impl From<ExecutorError> for RunnerError {
    /// Lifts "state lock held" output into [`RunnerError::StateLocked`].
    fn from(err: ExecutorError) -> Self {
        match classify(&err.stderr) {
            Classified::StateLock(lock) => Self::StateLocked(lock),
            Classified::Opaque(_) => Self::Executor(err),
        }
    }
}

impl RunnerError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Session(e) => e.error_code(),
            Self::Plan(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
            Self::StateLocked(_) => "STATE_LOCKED",
            Self::Executor(_) => "EXECUTOR_FAILED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }

    /// Classify this error for the control loop.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_) | Self::Session(_) | Self::InvalidRequest(_) => ErrorClass::Fatal,
            Self::Plan(e) => e.class(),
            Self::Store(e) => e.class(),
            Self::StateLocked(_) => ErrorClass::Retryable,
            Self::Executor(_) => ErrorClass::Unclassified,
        }
    }

    /// Identifier of the held lock, for recording as the pending lock.
    pub fn state_lock_identifier(&self) -> Option<&str> {
        match self {
            Self::StateLocked(lock) if !lock.id.is_empty() => Some(&lock.id),
            Self::Plan(e) => e.state_lock_identifier(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_error_with_lock_info_becomes_state_locked() {
        let err: RunnerError = ExecutorError::new(
            "plan",
            "Error acquiring the state lock\nLock Info:\n  ID: abc\n  Path: p\n  Operation: o\n  Who: w\n  Version: v\n  Created: c\n",
        )
        .into();
        assert!(matches!(err, RunnerError::StateLocked(_)));
        assert_eq!(err.error_code(), "STATE_LOCKED");
        assert_eq!(err.class(), ErrorClass::Retryable);
        assert_eq!(err.state_lock_identifier(), Some("abc"));
    }

    #[test]
    fn test_loose_lock_phrase_has_no_identifier() {
        let err: RunnerError = ExecutorError::new("init", "Error acquiring the state lock").into();
        assert_eq!(err.class(), ErrorClass::Retryable);
        assert_eq!(err.state_lock_identifier(), None);
    }

    #[test]
    fn test_other_executor_errors_are_unclassified() {
        let err: RunnerError = ExecutorError::new("apply", "Error: Unsupported argument").into();
        assert!(matches!(err, RunnerError::Executor(_)));
        assert_eq!(err.class(), ErrorClass::Unclassified);
        assert_eq!(err.to_string(), "Executor error: apply failed: Error: Unsupported argument");
    }

    #[test]
    fn test_session_error_is_fatal() {
        let err: RunnerError = SessionError::SessionMismatch {
            requested: "B".to_string(),
            current: "A".to_string(),
        }
        .into();
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert_eq!(err.error_code(), "SESSION_MISMATCH");
    }
}

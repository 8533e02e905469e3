// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runner session guard.
//!
//! A runner serves one execution generation at a time. The control plane binds
//! a fresh instance ID at the start of each generation; every later request
//! carries the ID it was issued under and is rejected unless it matches the
//! bound one. Requests from an older generation therefore cannot act on the
//! runner after a new one has started.
//!
//! ```text
//!            bind_new(id)              bind_new(id')
//!   Idle ──────────────────► Bound(id) ─────────────► Bound(id')
//!                               │
//!                     validate(x)│ x == id  → SessionPermit
//!                               │ x != id  → SessionMismatch
//! ```
//!
//! A successful [`SessionGuard::validate`] returns a [`SessionPermit`] that
//! holds the session mutex until dropped, so a rebind waits for in-flight
//! operations to finish.

use std::fmt;

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Errors from session validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    /// No session has been bound yet.
    #[error("no TF instance found: no active session (requested {requested})")]
    NoActiveSession {
        /// Instance ID carried by the request.
        requested: String,
    },

    /// The request belongs to a different execution generation.
    #[error("no TF instance found: session mismatch (requested {requested}, current {current})")]
    SessionMismatch {
        /// Instance ID carried by the request.
        requested: String,
        /// Instance ID currently bound.
        current: String,
    },
}

impl SessionError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoActiveSession { .. } => "NO_ACTIVE_SESSION",
            Self::SessionMismatch { .. } => "SESSION_MISMATCH",
        }
    }
}

/// Session state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No generation bound.
    #[default]
    Idle,
    /// Bound to an instance ID.
    Bound(String),
}

/// Compares a requested instance ID with the bound one.
pub type IdentityMatcher = Box<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Single-flight guard over the active execution generation.
pub struct SessionGuard {
    state: Mutex<SessionState>,
    matcher: IdentityMatcher,
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard").finish_non_exhaustive()
    }
}

impl SessionGuard {
    /// Create an idle guard comparing IDs by exact equality.
    pub fn new() -> Self {
        Self::with_matcher(|requested, current| requested == current)
    }

    /// Create an idle guard with a custom identity comparison.
    ///
    /// The matcher is called as `matcher(requested, current)`.
    pub fn with_matcher<F>(matcher: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(SessionState::Idle),
            matcher: Box::new(matcher),
        }
    }

    /// Bind a new generation, replacing any previous one.
    ///
    /// Waits for outstanding permits. Returns the previously bound ID.
    pub async fn bind_new(&self, instance_id: impl Into<String>) -> Option<String> {
        let instance_id = instance_id.into();
        let mut state = self.state.lock().await;
        let bound = SessionState::Bound(instance_id.clone());
        let previous = match std::mem::replace(&mut *state, bound) {
            SessionState::Idle => None,
            SessionState::Bound(previous) => Some(previous),
        };
        debug!(
            instance_id = %instance_id,
            previous = ?previous,
            "Bound runner session"
        );
        previous
    }

    /// Check that `requested` is the bound generation.
    ///
    /// The returned permit keeps the session bound until it is dropped.
    pub async fn validate(&self, requested: &str) -> Result<SessionPermit<'_>, SessionError> {
        let state = self.state.lock().await;
        match &*state {
            SessionState::Idle => {
                warn!(requested = %requested, "Rejected request: no active session");
                Err(SessionError::NoActiveSession {
                    requested: requested.to_string(),
                })
            }
            SessionState::Bound(current) if (self.matcher)(requested, current) => {
                Ok(SessionPermit { state })
            }
            SessionState::Bound(current) => {
                warn!(
                    requested = %requested,
                    current = %current,
                    "Rejected request from a stale session"
                );
                Err(SessionError::SessionMismatch {
                    requested: requested.to_string(),
                    current: current.clone(),
                })
            }
        }
    }

    /// Currently bound instance ID.
    pub async fn current(&self) -> Option<String> {
        match &*self.state.lock().await {
            SessionState::Idle => None,
            SessionState::Bound(id) => Some(id.clone()),
        }
    }
}

/// Proof that a request belongs to the bound generation.
pub struct SessionPermit<'a> {
    state: MutexGuard<'a, SessionState>,
}

impl SessionPermit<'_> {
    /// The bound instance ID.
    pub fn instance_id(&self) -> &str {
        match &*self.state {
            SessionState::Bound(id) => id,
            SessionState::Idle => "",
        }
    }
}

impl fmt::Debug for SessionPermit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPermit")
            .field("instance_id", &self.instance_id())
            .finish()
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! State lock detection.
//!
//! The executor reports failures as free text. [`classify`] recognizes the
//! "state lock held" condition in that text and lifts it into a typed
//! [`StateLockError`], extracting the lock metadata when the output carries a
//! full `Lock Info:` block. Everything else stays opaque.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static STATE_LOCK_ERR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)Error acquiring the state lock").expect("valid regex"));

static STATE_LOCK_INFO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Lock Info:\n\s*ID:\s*([^\n]+)\n\s*Path:\s*([^\n]+)\n\s*Operation:\s*([^\n]+)\n\s*Who:\s*([^\n]+)\n\s*Version:\s*([^\n]+)\n\s*Created:\s*([^\n]+)(?:\n|$)",
    )
    .expect("valid regex")
});

/// Another execution holds the distributed state lock.
///
/// All metadata fields are empty when the output only carried the generic
/// lock phrase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateLockError {
    /// Executor output the error was recognized in.
    pub original_error: String,
    /// Lock identifier, needed to force-unlock.
    pub id: String,
    /// State path the lock protects.
    pub path: String,
    /// Operation holding the lock.
    pub operation: String,
    /// Holder of the lock.
    pub who: String,
    /// Executor version of the holder.
    pub version: String,
    /// When the lock was taken.
    pub created: String,
}

impl fmt::Display for StateLockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            return write!(f, "error acquiring the state lock: {}", self.original_error);
        }

        write!(
            f,
            "error acquiring the state lock: Lock Info:\n  \
             ID:        {}\n  \
             Path:      {}\n  \
             Operation: {}\n  \
             Who:       {}\n  \
             Version:   {}\n  \
             Created:   {}\n",
            self.id, self.path, self.operation, self.who, self.version, self.created
        )
    }
}

impl std::error::Error for StateLockError {}

/// Result of classifying executor output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// The state lock is held elsewhere.
    StateLock(StateLockError),
    /// Any other failure, message unchanged.
    Opaque(String),
}

/// Classify executor failure output.
pub fn classify(output: &str) -> Classified {
    let trimmed = output.trim();

    if let Some(caps) = STATE_LOCK_INFO.captures(trimmed) {
        let field = |i: usize| {
            caps.get(i)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        };
        return Classified::StateLock(StateLockError {
            original_error: output.to_string(),
            id: field(1),
            path: field(2),
            operation: field(3),
            who: field(4),
            version: field(5),
            created: field(6),
        });
    }

    if STATE_LOCK_ERR.is_match(trimmed) {
        return Classified::StateLock(StateLockError {
            original_error: output.to_string(),
            ..Default::default()
        });
    }

    Classified::Opaque(output.to_string())
}

/// Operator policy for releasing a held state lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForceUnlock {
    /// Release only when the operator names the pending lock.
    Yes,
    /// Never release.
    #[default]
    No,
    /// Release whatever lock is pending.
    Auto,
}

impl FromStr for ForceUnlock {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown force unlock policy '{}'", other)),
        }
    }
}

/// Lock identifier to force-unlock, if any.
///
/// `requested` is the identifier the operator supplied, `pending` the one
/// recorded from the last [`StateLockError`].
pub fn lock_to_release(policy: ForceUnlock, requested: &str, pending: &str) -> Option<String> {
    if pending.is_empty() {
        return None;
    }

    match policy {
        ForceUnlock::Yes if requested == pending => Some(pending.to_string()),
        ForceUnlock::Auto => Some(pending.to_string()),
        ForceUnlock::Yes | ForceUnlock::No => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCKED_OUTPUT: &str = "
Error: Error acquiring the state lock

Error message: ConditionalCheckFailedException: The conditional request failed
Lock Info:
  ID:        f2ab685b-f84d-ac0b-a125-378a22877e8d
  Path:      terraform-state/terraform.tfstate
  Operation: OperationTypeApply
  Who:       runner@tf-runner
  Version:   1.5.7
  Created:   2023-11-10 10:31:14.382935 +0000 UTC

Terraform acquires a state lock to protect the state from being written
by multiple users at the same time.
";

    #[test]
    fn test_structured_lock_info() {
        let Classified::StateLock(lock) = classify(LOCKED_OUTPUT) else {
            panic!("expected a state lock");
        };
        assert_eq!(lock.id, "f2ab685b-f84d-ac0b-a125-378a22877e8d");
        assert_eq!(lock.path, "terraform-state/terraform.tfstate");
        assert_eq!(lock.operation, "OperationTypeApply");
        assert_eq!(lock.who, "runner@tf-runner");
        assert_eq!(lock.version, "1.5.7");
        assert_eq!(lock.created, "2023-11-10 10:31:14.382935 +0000 UTC");

        assert_eq!(
            lock.to_string(),
            "error acquiring the state lock: Lock Info:\n  \
             ID:        f2ab685b-f84d-ac0b-a125-378a22877e8d\n  \
             Path:      terraform-state/terraform.tfstate\n  \
             Operation: OperationTypeApply\n  \
             Who:       runner@tf-runner\n  \
             Version:   1.5.7\n  \
             Created:   2023-11-10 10:31:14.382935 +0000 UTC\n"
        );
    }

    #[test]
    fn test_loose_lock_phrase() {
        let output = "Error: Error acquiring the state lock\n\nsomething went wrong";
        let Classified::StateLock(lock) = classify(output) else {
            panic!("expected a state lock");
        };
        assert!(lock.id.is_empty());
        assert!(lock.path.is_empty());
        assert_eq!(
            lock.to_string(),
            format!("error acquiring the state lock: {output}")
        );
    }

    #[test]
    fn test_unrelated_output_is_opaque() {
        let output = "Error: Invalid provider configuration";
        assert_eq!(classify(output), Classified::Opaque(output.to_string()));
        assert_eq!(classify(""), Classified::Opaque(String::new()));
    }

    #[test]
    fn test_lock_info_at_end_of_output() {
        // trailing whitespace is trimmed, so Created is matched against end of input
        let output = "Lock Info:\n  ID: abc\n  Path: p\n  Operation: o\n  Who: w\n  Version: v\n  Created: c\n\n";
        let Classified::StateLock(lock) = classify(output) else {
            panic!("expected a state lock");
        };
        assert_eq!(lock.id, "abc");
        assert_eq!(lock.created, "c");
    }

    #[test]
    fn test_force_unlock_parse() {
        assert_eq!("yes".parse::<ForceUnlock>().unwrap(), ForceUnlock::Yes);
        assert_eq!("auto".parse::<ForceUnlock>().unwrap(), ForceUnlock::Auto);
        assert_eq!("no".parse::<ForceUnlock>().unwrap(), ForceUnlock::No);
        assert!("always".parse::<ForceUnlock>().is_err());
        assert_eq!(ForceUnlock::default(), ForceUnlock::No);
    }

    #[test]
    fn test_lock_to_release() {
        assert_eq!(
            lock_to_release(ForceUnlock::Yes, "lock-1", "lock-1"),
            Some("lock-1".to_string())
        );
        assert_eq!(lock_to_release(ForceUnlock::Yes, "lock-2", "lock-1"), None);
        assert_eq!(
            lock_to_release(ForceUnlock::Auto, "", "lock-1"),
            Some("lock-1".to_string())
        );
        assert_eq!(lock_to_release(ForceUnlock::No, "lock-1", "lock-1"), None);
        assert_eq!(lock_to_release(ForceUnlock::Auto, "", ""), None);
    }

    #[test]
    fn test_lock_phrase_with_trailing_period() {
        match classify("Error acquiring the state lock.") {
            Classified::StateLock(lock) => {
                assert_eq!(lock.original_error, "Error acquiring the state lock.");
                assert!(lock.id.is_empty());
                assert!(lock.created.is_empty());
            }
            other => panic!("expected a state lock, got {other:?}"),
        }
    }

    #[test]
    fn test_tab_indented_lock_info() {
        let output = "Lock Info:\n\
            \t\tID:        24c59e5b-fa0a-0f35-a5af-841d64651804\n\
            \t\tPath:      terraform-bucket/ec2-instance.tfstate\n\
            \t\tOperation: OperationTypePlan\n\
            \t\tWho:       runner@ec2-instance\n\
            \t\tVersion:   1.13.1\n\
            \t\tCreated:   2025-11-06 22:52:22.260153039 +0000 UTC\n";

        match classify(output) {
            Classified::StateLock(lock) => {
                assert_eq!(lock.id, "24c59e5b-fa0a-0f35-a5af-841d64651804");
                assert_eq!(lock.path, "terraform-bucket/ec2-instance.tfstate");
                assert_eq!(lock.operation, "OperationTypePlan");
                assert_eq!(lock.who, "runner@ec2-instance");
                assert_eq!(lock.version, "1.13.1");
                assert_eq!(lock.created, "2025-11-06 22:52:22.260153039 +0000 UTC");
            }
            other => panic!("expected a state lock, got {other:?}"),
        }
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Plan identity.
//!
//! Derives the short, human-referenced plan ID from an upstream revision.
//! Two revision grammars are accepted:
//!
//! | Grammar | Example | Plan ID |
//! |---------|---------|---------|
//! | `branch@algo:hash` | `main@sha1:b8e362c206e3d0cb` | `plan-main-b8e362c206` |
//! | `branch/hash` (legacy) | `main/b8e362c206e3d0cb` | `plan-main-b8e362c206` |
//! | bare hash (legacy) | `b8e362c206e3d0cb` | `plan-b8e362c206` |
//!
//! Derivation is total: malformed revisions degrade to `plan-<prefix>` rather
//! than failing. Two revisions sharing the first 10 hash characters map to the
//! same ID.

/// Number of hash characters kept in a plan ID.
pub const PLAN_ID_HASH_LEN: usize = 10;

const PLAN_ID_PREFIX: &str = "plan-";

/// Derive the plan ID for a revision.
pub fn derive_plan_id(revision: &str) -> String {
    let parts: Vec<&str> = revision.split('@').collect();
    if parts.len() != 2 {
        return derive_legacy_plan_id(revision);
    }

    let branch = parts[0];
    // "algo:hash"; without a colon the whole right-hand side is the hash
    let mut algo_and_hash = parts[1].split(':');
    let first = algo_and_hash.next().unwrap_or_default();
    let hash = algo_and_hash.next().unwrap_or(first);

    format_plan_id(Some(branch), hash)
}

/// `branch/hash` or a bare hash.
fn derive_legacy_plan_id(revision: &str) -> String {
    let parts: Vec<&str> = revision.split('/').collect();
    match parts.as_slice() {
        [branch, hash] => format_plan_id(Some(branch), hash),
        _ => format_plan_id(None, revision),
    }
}

fn format_plan_id(branch: Option<&str>, hash: &str) -> String {
    let hash: String = hash.chars().take(PLAN_ID_HASH_LEN).collect();
    match branch {
        Some(branch) => format!("{PLAN_ID_PREFIX}{branch}-{hash}"),
        None => format!("{PLAN_ID_PREFIX}{hash}"),
    }
}

/// Operator hint telling how to approve a pending plan.
pub fn approve_message(plan_id: &str, message: &str) -> String {
    format!("{message}: set approvePlan: \"{plan_id}\" to approve this plan.")
}

/// Whether an approval value asks to discard the pending plan and plan again.
///
/// The token is `replan`, optionally followed by any prefix of the pending
/// plan ID with its leading `plan` (`replan-main-b8e3`, `replan`).
pub fn is_replan_request(approve_plan: &str, pending_plan_id: &str) -> bool {
    approve_plan.starts_with("replan")
        && format!("re{pending_plan_id}").starts_with(approve_plan)
}

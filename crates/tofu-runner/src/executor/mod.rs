// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Executor module - the boundary to the infrastructure-as-code CLI.

pub mod mock;
mod traits;

pub use mock::MockExecutor;
pub use traits::*;

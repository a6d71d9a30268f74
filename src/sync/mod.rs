// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Work queue, reconciler and the periodic producers that feed it.

pub mod backoff;
pub mod manager;
pub mod queue;
pub mod reconciler;
pub mod resync;

pub use backoff::BackoffStrategy;
pub use manager::{SyncManager, SyncSettings};
pub use queue::WorkQueue;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use resync::{ResyncTicker, UpdatePoller};

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation logic for Snapshot and Restore resources.
//!
//! Both kinds share one finite phase machine:
//!
//! ```text
//! ""        -> InQueue        [queuer step; sets TTL defaults]
//! ""        -> Failed         [spec.availableUntil already past]
//! InQueue   -> InProgress     [executor step picks up]
//! InProgress-> Completed      [capture+upload / full restore succeeded]
//! InProgress-> Failed         [permanent error or retry budget exhausted]
//! InProgress-> Failed         [observed on restart: stale in-progress]
//! Completed/Failed -> deleted [expiration]
//! ```
//!
//! The queuer step never performs long work; all target-cluster and
//! object-store traffic happens in the executor step under the retry budget.

pub mod expire;
pub mod restore;
pub mod retry;
pub mod snapshot;
pub mod status;

pub use restore::{error_policy_restore, reconcile_restore};
pub use snapshot::{error_policy_snapshot, reconcile_snapshot};

use chrono::{DateTime, Utc};

/// Error type surfaced to the controller runtime.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ReconcileError(#[from] anyhow::Error);

/// What the queuer step does with an unprocessed resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueStep {
    /// `spec.availableUntil` is already past; fail without queueing.
    FailPast,
    /// Queue the resource, defaulting `spec.ttl` when nothing sets expiry.
    Queue { set_default_ttl: Option<String> },
}

/// Decide the queuer step for a resource in phase "".
#[must_use]
pub fn queue_step(
    spec_available_until: Option<DateTime<Utc>>,
    spec_ttl: Option<&str>,
    default_ttl: &str,
    now: DateTime<Utc>,
) -> QueueStep {
    if let Some(until) = spec_available_until {
        if until <= now {
            return QueueStep::FailPast;
        }
    }
    let set_default_ttl = if spec_available_until.is_none() && spec_ttl.is_none() {
        Some(default_ttl.to_string())
    } else {
        None
    };
    QueueStep::Queue { set_default_ttl }
}

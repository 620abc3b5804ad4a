// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Expiration semantics shared by Snapshot and Restore.
//!
//! Exactly one of `spec.availableUntil` / `spec.ttl` determines
//! `status.availableUntil`; once that moment passes the resource is
//! deleted. Users may edit `spec.availableUntil` both forward and backward,
//! so any mismatch between spec and status is an update, re-checked against
//! the delete condition in the same pass.

use crate::duration::{format_duration, parse_duration};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Outcome of one expiration evaluation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Expiration {
    /// New `(status.availableUntil, status.ttl)` to write, when the status
    /// disagrees with the spec.
    pub set_status: Option<(DateTime<Utc>, String)>,

    /// The resource's expiry has passed; delete it.
    pub expired: bool,

    /// Time until expiry, for scheduling the next look.
    pub requeue_after: Option<Duration>,
}

/// Evaluate the expiration state of a resource.
///
/// - `spec.availableUntil` set: status gets that instant, TTL becomes the
///   distance from creation.
/// - else `spec.ttl` set: status gets `creation + ttl`.
/// - a status disagreeing with the spec is overwritten (expiration edits).
///
/// # Errors
///
/// Fails when `spec.ttl` does not parse as a duration.
pub fn evaluate(
    creation: DateTime<Utc>,
    spec_available_until: Option<DateTime<Utc>>,
    spec_ttl: Option<&str>,
    status_available_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Expiration> {
    let desired: Option<(DateTime<Utc>, String)> = if let Some(until) = spec_available_until {
        let ttl = (until - creation).to_std().unwrap_or_default();
        Some((until, format_duration(ttl)))
    } else if let Some(ttl_str) = spec_ttl {
        let ttl = parse_duration(ttl_str)?;
        let until = creation
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(720));
        Some((until, ttl_str.to_string()))
    } else {
        None
    };

    let set_status = desired
        .clone()
        .filter(|(until, _)| status_available_until != Some(*until));

    let effective_until = desired.map(|(until, _)| until).or(status_available_until);
    let expired = effective_until.is_some_and(|until| until <= now);
    let requeue_after = effective_until
        .filter(|_| !expired)
        .and_then(|until| (until - now).to_std().ok());

    Ok(Expiration {
        set_status,
        expired,
        requeue_after,
    })
}

#[cfg(test)]
#[path = "expire_tests.rs"]
mod expire_tests;

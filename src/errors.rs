// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types and permanence classification.
//!
//! Snapshot and restore operations distinguish **permanent** failures
//! (credential rejections, wrong bucket) from **retryable** ones (flaky
//! lists, interrupted uploads). Permanent errors fail the resource
//! immediately; retryable ones are retried under the executor's backoff
//! budget.

use crate::constants::{API_PERM_ERRORS, OBJECTSTORE_PERM_ERRORS};
use thiserror::Error;

/// Error of one snapshot/restore engine operation, tagged with permanence.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Never retried; the resource moves to `Failed` immediately.
    #[error("{0}")]
    Permanent(anyhow::Error),

    /// Retried with backoff until the per-operation deadline passes.
    #[error("{0}")]
    Retryable(anyhow::Error),
}

impl EngineError {
    /// Whether retrying can not help.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, EngineError::Permanent(_))
    }

    /// The failure message, as surfaced in `status.reason`.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            EngineError::Permanent(e) | EngineError::Retryable(e) => e.to_string(),
        }
    }

    /// Classify a target-cluster API error by its message.
    #[must_use]
    pub fn from_api(err: anyhow::Error) -> Self {
        if api_perm_error(&err.to_string()) {
            EngineError::Permanent(err)
        } else {
            EngineError::Retryable(err)
        }
    }

    /// Classify an object-store error by its message.
    #[must_use]
    pub fn from_objectstore(err: anyhow::Error) -> Self {
        if objectstore_perm_error(&err.to_string()) {
            EngineError::Permanent(err)
        } else {
            EngineError::Retryable(err)
        }
    }
}

/// Whether a target-cluster API error message marks a permanent failure.
#[must_use]
pub fn api_perm_error(message: &str) -> bool {
    API_PERM_ERRORS.iter().any(|e| message.contains(e))
}

/// Whether an object-store error message marks a permanent failure.
#[must_use]
pub fn objectstore_perm_error(message: &str) -> bool {
    OBJECTSTORE_PERM_ERRORS.iter().any(|e| message.contains(e))
}

/// A kind that could not be resolved against the target cluster's
/// discovery information.
#[derive(Debug, Error)]
#[error("unable to find {api_version}/{kind} in server resources")]
pub struct UnknownKind {
    pub api_version: String,
    pub kind: String,
}

/// Extract the API server's message from a kube error.
///
/// For API-level errors this is the server's own text (e.g.
/// `secrets "cloudCredentialSecret" not found`), which is surfaced verbatim
/// in `status.reason`. Other error kinds fall back to their display form.
#[must_use]
pub fn kube_error_message(err: &kube::Error) -> String {
    match err {
        kube::Error::Api(api_err) => api_err.message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;

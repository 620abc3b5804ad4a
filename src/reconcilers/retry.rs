// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry logic with exponential backoff for snapshot/restore operations.
//!
//! Retryable engine errors are retried with exponential backoff until the
//! per-operation deadline (`maxRetryMin` minutes) passes. Permanent errors
//! skip backoff and fail the operation immediately.

use crate::errors::EngineError;
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Initial retry interval (500ms)
const INITIAL_INTERVAL_MILLIS: u64 = 500;

/// Maximum interval between retries (60 seconds)
const MAX_INTERVAL_SECS: u64 = 60;

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Simple exponential backoff with randomization (jitter).
pub struct ExponentialBackoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Maximum total elapsed time
    pub max_elapsed_time: Duration,
    /// Backoff multiplier (typically 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
    start_time: Instant,
}

impl ExponentialBackoff {
    /// Get the next backoff interval, or None if max elapsed time exceeded.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.start_time.elapsed() >= self.max_elapsed_time {
            return None;
        }

        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        Some(jittered)
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let mut rng = rand::thread_rng();
        let jittered = rng.gen_range((secs - delta)..=(secs + delta));

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Create the backoff configuration for engine operations.
///
/// - **Initial interval**: 500ms
/// - **Max interval**: 60 seconds
/// - **Max elapsed time**: the caller's per-operation deadline
/// - **Multiplier**: 2.0
/// - **Randomization**: ±10%
#[must_use]
pub fn engine_backoff(max_elapsed_time: Duration) -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: Duration::from_millis(INITIAL_INTERVAL_MILLIS),
        max_interval: Duration::from_secs(MAX_INTERVAL_SECS),
        max_elapsed_time,
        multiplier: BACKOFF_MULTIPLIER,
        randomization_factor: RANDOMIZATION_FACTOR,
        start_time: Instant::now(),
    }
}

/// Retry an engine operation with exponential backoff.
///
/// Retries on [`EngineError::Retryable`] until `deadline` elapses; fails
/// immediately on [`EngineError::Permanent`].
///
/// # Arguments
///
/// * `deadline` - Maximum total time to keep retrying
/// * `operation_name` - Human-readable name for logging
/// * `operation` - The operation; called once per attempt
///
/// # Errors
///
/// Returns the last error when permanent, or when the deadline passes.
pub async fn retry_engine<T, F, Fut>(
    deadline: Duration,
    operation_name: &str,
    mut operation: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut backoff = engine_backoff(deadline);
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt,
                        elapsed = ?start_time.elapsed(),
                        "operation succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) if e.is_permanent() => {
                error!(
                    operation = operation_name,
                    error = %e,
                    "permanent error, failing immediately"
                );
                return Err(e);
            }
            Err(e) => {
                if let Some(duration) = backoff.next_backoff() {
                    warn!(
                        operation = operation_name,
                        attempt,
                        retry_after = ?duration,
                        error = %e,
                        "retryable error, will retry"
                    );
                    tokio::time::sleep(duration).await;
                } else {
                    error!(
                        operation = operation_name,
                        attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "retry budget exhausted, giving up"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;

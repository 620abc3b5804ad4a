// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

use super::{engine_backoff, retry_engine};
use crate::errors::EngineError;
use anyhow::anyhow;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[test]
fn test_backoff_configuration() {
    let backoff = engine_backoff(Duration::from_secs(300));
    assert_eq!(backoff.current_interval, Duration::from_millis(500));
    assert_eq!(backoff.max_interval, Duration::from_secs(60));
    assert_eq!(backoff.max_elapsed_time, Duration::from_secs(300));
    #[allow(clippy::float_cmp)]
    {
        assert_eq!(backoff.multiplier, 2.0);
        assert_eq!(backoff.randomization_factor, 0.1);
    }
}

#[test]
fn test_backoff_grows_and_caps() {
    let mut backoff = engine_backoff(Duration::from_secs(3600));
    backoff.randomization_factor = 0.0;
    assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(500)));
    assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(1)));
    assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(2)));
    for _ in 0..10 {
        backoff.next_backoff();
    }
    assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(60)));
}

#[tokio::test]
async fn test_first_success_returns_immediately() {
    let calls = AtomicU32::new(0);
    let result = retry_engine(Duration::from_secs(60), "op", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, EngineError>(42) }
    })
    .await
    .unwrap();
    assert_eq!(result, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_permanent_error_fails_without_retry() {
    let calls = AtomicU32::new(0);
    let result: Result<u32, _> = retry_engine(Duration::from_secs(60), "op", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(EngineError::Permanent(anyhow!("Unauthorized"))) }
    })
    .await;
    assert!(result.unwrap_err().is_permanent());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retryable_error_is_retried_until_success() {
    let calls = AtomicU32::new(0);
    let result = retry_engine(Duration::from_secs(600), "op", || {
        let attempt = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt < 3 {
                Err(EngineError::Retryable(anyhow!("transient")))
            } else {
                Ok(attempt)
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(result, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_deadline_exhausts_retries() {
    // A 50ms deadline is spent by the first 500ms backoff sleep, so the
    // second attempt's budget check gives up.
    let result: Result<u32, _> = retry_engine(Duration::from_millis(50), "op", || async {
        Err(EngineError::Retryable(anyhow!(
            "Mock cluster returns not perm error"
        )))
    })
    .await;
    let err = result.unwrap_err();
    assert!(!err.is_permanent());
    assert_eq!(err.message(), "Mock cluster returns not perm error");
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

use super::{api_perm_error, kube_error_message, objectstore_perm_error, EngineError};
use anyhow::anyhow;

#[test]
fn test_unauthorized_is_permanent() {
    assert!(api_perm_error(
        "Get server preferred resources failed : Unauthorized"
    ));
    let err = EngineError::from_api(anyhow!("Unauthorized"));
    assert!(err.is_permanent());
}

#[test]
fn test_other_api_errors_are_retryable() {
    assert!(!api_perm_error("connection refused"));
    let err = EngineError::from_api(anyhow!("etcdserver: request timed out"));
    assert!(!err.is_permanent());
}

#[test]
fn test_objectstore_permanent_errors() {
    for msg in [
        "SignatureDoesNotMatch: The request signature we calculated does not match",
        "InvalidAccessKeyId: The AWS Access Key Id you provided does not exist",
        "NoSuchBucket: The specified bucket does not exist",
    ] {
        assert!(objectstore_perm_error(msg), "{msg} should be permanent");
        assert!(EngineError::from_objectstore(anyhow!("{msg}")).is_permanent());
    }
}

#[test]
fn test_objectstore_transient_errors() {
    assert!(!objectstore_perm_error("connection reset by peer"));
    assert!(!EngineError::from_objectstore(anyhow!("upload interrupted")).is_permanent());
}

#[test]
fn test_message_passthrough() {
    let err = EngineError::Retryable(anyhow!("Mock cluster returns not perm error"));
    assert_eq!(err.message(), "Mock cluster returns not perm error");
    assert_eq!(err.to_string(), "Mock cluster returns not perm error");
}

#[test]
fn test_kube_error_message_uses_api_server_text() {
    let err = kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: "secrets \"cloudCredentialSecret\" not found".to_string(),
        reason: "NotFound".to_string(),
        code: 404,
    });
    assert_eq!(
        kube_error_message(&err),
        "secrets \"cloudCredentialSecret\" not found"
    );
}

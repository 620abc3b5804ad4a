// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `metrics.rs`

use super::{gather_metrics, record_reconciliation, record_sync};
use std::time::Duration;

#[test]
fn test_gather_after_recording() {
    record_reconciliation("Snapshot", "success", Duration::from_millis(120));
    record_reconciliation("Restore", "error", Duration::from_secs(3));
    record_sync("success");

    let text = gather_metrics().unwrap();
    assert!(text.contains("clustersnap_firestoned_io_reconciliations_total"));
    assert!(text.contains("clustersnap_firestoned_io_reconciliation_duration_seconds"));
    assert!(text.contains("clustersnap_firestoned_io_objectstore_syncs_total"));
}

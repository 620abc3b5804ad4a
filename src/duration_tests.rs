// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `duration.rs`

use super::{format_duration, parse_duration};
use std::time::Duration;

#[test]
fn test_parse_hours() {
    assert_eq!(parse_duration("720h").unwrap(), Duration::from_secs(2_592_000));
    assert_eq!(parse_duration("168h").unwrap(), Duration::from_secs(604_800));
    assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
}

#[test]
fn test_parse_compound_go_form() {
    // The form metav1.Duration serializes to
    assert_eq!(
        parse_duration("720h0m0s").unwrap(),
        Duration::from_secs(2_592_000)
    );
    assert_eq!(
        parse_duration("1h30m5s").unwrap(),
        Duration::from_secs(3600 + 1800 + 5)
    );
}

#[test]
fn test_parse_days_and_weeks() {
    assert_eq!(parse_duration("30d").unwrap(), Duration::from_secs(2_592_000));
    assert_eq!(parse_duration("4w").unwrap(), Duration::from_secs(2_419_200));
}

#[test]
fn test_parse_invalid() {
    assert!(parse_duration("").is_err());
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("10x").is_err());
    assert!(parse_duration("h").is_err());
    assert!(parse_duration("10h7").is_err());
}

#[test]
fn test_format_whole_hours() {
    assert_eq!(format_duration(Duration::from_secs(2_592_000)), "720h");
    assert_eq!(format_duration(Duration::from_secs(604_800)), "168h");
}

#[test]
fn test_format_with_remainder() {
    assert_eq!(format_duration(Duration::from_secs(3600 + 1800 + 5)), "1h30m5s");
    assert_eq!(format_duration(Duration::from_secs(59)), "0h0m59s");
}

#[test]
fn test_round_trip() {
    for s in ["720h", "168h", "1h30m5s", "0h0m59s"] {
        assert_eq!(format_duration(parse_duration(s).unwrap()), s);
    }
}

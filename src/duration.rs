// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Duration parsing for Go-style duration strings.
//!
//! Snapshot and Restore TTLs travel on the wire as Go-style duration strings
//! (e.g. "720h", "168h0m0s"). This module parses those strings into Rust
//! `std::time::Duration` and formats durations back in the same style.

use anyhow::{bail, Context, Result};
use std::time::Duration;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3600;
const SECONDS_PER_DAY: u64 = 86400;
const SECONDS_PER_WEEK: u64 = 604_800;

/// Parse a Go-style duration string into a Rust `Duration`.
///
/// Supported units:
/// - `s` (seconds)
/// - `m` (minutes)
/// - `h` (hours): "720h" = 30 days
/// - `d` (days)
/// - `w` (weeks)
///
/// Compound strings such as "168h0m0s" (the form `metav1.Duration`
/// serializes to) are summed segment by segment.
///
/// # Examples
///
/// ```
/// use clustersnap::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86400));
/// assert_eq!(parse_duration("720h0m0s").unwrap(), Duration::from_secs(2_592_000));
/// assert!(parse_duration("").is_err());
/// assert!(parse_duration("10").is_err());  // Missing unit
/// assert!(parse_duration("10x").is_err()); // Invalid unit
/// ```
///
/// # Errors
///
/// Returns an error if the format is invalid (empty string, missing unit,
/// non-numeric value, overflow).
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    if duration_str.is_empty() {
        bail!("Duration string cannot be empty");
    }

    let mut total: u64 = 0;
    let mut rest = duration_str;

    while !rest.is_empty() {
        let split_pos = rest
            .chars()
            .position(|c| !c.is_ascii_digit())
            .context("Duration must end with a unit (s, m, h, d or w)")?;

        if split_pos == 0 {
            bail!("Duration segment '{rest}' does not start with a number");
        }

        let (value_str, unit_rest) = rest.split_at(split_pos);
        let value: u64 = value_str
            .parse()
            .context("Duration value must be a positive integer")?;

        let unit = &unit_rest[..1];
        rest = &unit_rest[1..];

        let factor = match unit {
            "s" => 1,
            "m" => SECONDS_PER_MINUTE,
            "h" => SECONDS_PER_HOUR,
            "d" => SECONDS_PER_DAY,
            "w" => SECONDS_PER_WEEK,
            _ => {
                bail!("Unsupported duration unit '{unit}'. Use 's', 'm', 'h', 'd' or 'w'")
            }
        };

        let seconds = value
            .checked_mul(factor)
            .context("Duration value too large (overflow)")?;
        total = total
            .checked_add(seconds)
            .context("Duration value too large (overflow)")?;
    }

    Ok(Duration::from_secs(total))
}

/// Format a `Duration` as a Go-style duration string.
///
/// Whole hours print as "720h"; anything with a minute/second remainder
/// prints all three components, e.g. "1h30m5s".
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / SECONDS_PER_HOUR;
    let minutes = (secs % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let seconds = secs % SECONDS_PER_MINUTE;
    if minutes == 0 && seconds == 0 {
        format!("{hours}h")
    } else {
        format!("{hours}h{minutes}m{seconds}s")
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod duration_tests;

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Duration strings and TTL normalization.
//!
//! Parsing is done by `humantime`, so `"30m"`, `"1h30m"`, `"300ms"` and
//! `"7d"` all work. Fractional components in the Go style (`"1.5h"`,
//! `".5s"`) are expanded to whole nanoseconds before handing off.
//! Negative durations are not accepted.

use std::fmt::Write as _;
use std::time::Duration;

use tracing::debug;

/// TTL applied when the sender gives none or an unusable one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Upper bound on any TTL unless configured otherwise.
pub const DEFAULT_MAX_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Fraction digits beyond this carry no weight at nanosecond resolution.
const MAX_FRACTION_DIGITS: usize = 18;

/// Units allowed on a fractional component.
fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60_000_000_000),
        "h" => Some(3_600_000_000_000),
        _ => None,
    }
}

/// Parse a duration string. Returns `None` for anything malformed,
/// negative, or too large to represent.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if trimmed == "0" {
        return Some(Duration::ZERO);
    }
    if trimmed.is_empty() {
        return None;
    }

    let normalized = trimmed.replace(['µ', 'μ'], "u");
    let expanded = if normalized.contains('.') {
        expand_fractions(&normalized)?
    } else {
        normalized
    };
    humantime::parse_duration(&expanded).ok()
}

/// Rewrite each `<whole>.<fraction><unit>` component as `<n>ns`, leaving
/// whole-number components untouched.
fn expand_fractions(input: &str) -> Option<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        match number.split_once('.') {
            None => {
                out.push_str(number);
                out.push_str(unit);
            }
            Some((whole, fraction)) => {
                if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
                    return None;
                }
                let scale = unit_nanos(unit)?;
                let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
                let digits = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
                let part = if digits.is_empty() {
                    0
                } else {
                    digits.parse::<u128>().ok()? * scale / 10u128.pow(digits.len() as u32)
                };
                let nanos = whole.checked_mul(scale)?.checked_add(part)?;
                write!(out, "{nanos}ns").ok()?;
            }
        }
        rest = tail;
    }
    Some(out)
}

/// TTL bounds applied to every deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub default_ttl: Duration,
    pub max_ttl: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            max_ttl: DEFAULT_MAX_TTL,
        }
    }
}

impl TtlPolicy {
    /// Resolve the sender's requested TTL.
    ///
    /// Missing, unparsable and zero durations fall back to the default;
    /// a parse failure is never an error. Durations above the maximum are
    /// clamped.
    pub fn normalize(&self, requested: Option<&str>) -> Duration {
        let parsed = requested
            .filter(|raw| !raw.trim().is_empty())
            .and_then(parse_duration)
            .filter(|ttl| !ttl.is_zero());

        match parsed {
            Some(ttl) if ttl > self.max_ttl => {
                debug!(
                    requested_secs = ttl.as_secs(),
                    max_secs = self.max_ttl.as_secs(),
                    "requested ttl clamped to maximum"
                );
                self.max_ttl
            }
            Some(ttl) => ttl,
            None => {
                if requested.is_some_and(|raw| !raw.trim().is_empty()) {
                    debug!("unusable ttl, using default");
                }
                self.default_ttl
            }
        }
    }
}

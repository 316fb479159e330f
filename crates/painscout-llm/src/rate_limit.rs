//! Parsing of the rate-limit headers model services attach to every response.

use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::header::HeaderMap;

use crate::types::RateLimitSnapshot;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit-requests";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining-requests";
pub const RESET_HEADER: &str = "x-ratelimit-reset-requests";

/// Values at or above this are treated as unix timestamps rather than durations.
const EPOCH_THRESHOLD_SECS: i64 = 1_000_000_000;

/// Read the service's self-reported window from response headers.
///
/// Returns `None` unless both the limit and remaining headers are present and
/// numeric. A missing or unparseable reset header leaves `reset_at` empty.
#[must_use]
pub fn parse_rate_limit(headers: &HeaderMap, now: DateTime<Utc>) -> Option<RateLimitSnapshot> {
    let header_u32 = |name: &str| -> Option<u32> {
        headers
            .get(name)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u32>()
            .ok()
    };

    let limit = header_u32(LIMIT_HEADER)?;
    let remaining = header_u32(REMAINING_HEADER)?;
    let reset_at = headers
        .get(RESET_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| parse_reset(raw, now));

    Some(RateLimitSnapshot {
        limit,
        remaining,
        reset_at,
    })
}

/// Parse a reset header value.
///
/// Accepts a unix timestamp in seconds (`1735689600`), a bare number of
/// seconds (`42`, `1.5`), or a compound duration (`6m0s`, `250ms`, `1h2m`).
#[must_use]
pub fn parse_reset(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(secs) = raw.parse::<i64>() {
        if secs >= EPOCH_THRESHOLD_SECS {
            return Utc.timestamp_opt(secs, 0).single();
        }
        return now.checked_add_signed(Duration::try_seconds(secs.max(0))?);
    }

    let delta = match raw.parse::<f64>() {
        Ok(secs) => millis_from_secs(secs)?,
        Err(_) => parse_compound_duration(raw)?,
    };
    // Out-of-range values are dropped rather than trusted.
    now.checked_add_signed(delta)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn millis_from_secs(secs: f64) -> Option<Duration> {
    let millis = (secs * 1_000.0).round();
    if !millis.is_finite() || millis < 0.0 || millis >= i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(millis as i64)
}

fn parse_compound_duration(raw: &str) -> Option<Duration> {
    let mut total = Duration::zero();
    let mut rest = raw;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let secs = match unit {
            "h" => value * 3_600.0,
            "m" => value * 60.0,
            "s" | "" => value,
            "ms" => value / 1_000.0,
            _ => return None,
        };
        total = total.checked_add(&millis_from_secs(secs)?)?;
    }

    Some(total)
}

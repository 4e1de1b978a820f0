// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Time parsing for the time comparison operators.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde_json::Value;

/// Naive date-time layouts, read in local time
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Date-only layouts, read as local midnight
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Bare clock times, anchored to today
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Parse a value into epoch milliseconds.
pub fn parse_time(value: &Value) -> Option<i64> {
    parse_time_at(value, Local::now())
}

/// Parse a value into epoch milliseconds, anchoring bare times to `now`'s date.
///
/// Tried in order: numeric epoch (milliseconds), RFC 3339, naive date-time,
/// date-only, then `HH:mm[:ss]`.
pub fn parse_time_at(value: &Value, now: DateTime<Local>) -> Option<i64> {
    let text = match value {
        Value::Number(n) => {
            return n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64));
        }
        Value::String(s) => s.trim(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }

    if let Ok(epoch) = text.parse::<i64>() {
        return Some(epoch);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return local_millis(naive);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return local_millis(date.and_time(NaiveTime::MIN));
        }
    }

    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(text, format) {
            return local_millis(now.date_naive().and_time(time));
        }
    }

    None
}

fn local_millis(naive: NaiveDateTime) -> Option<i64> {
    // Ambiguous local times (DST fold) resolve to the earlier instant
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

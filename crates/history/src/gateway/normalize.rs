//! History record normalization
//!
//! Converts wire records from the analysis backend into domain models.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use super::api::HistoryRecord;
use crate::models::{AnalysisKind, Artifact, HistoryId, HistoryItem, normalize_language};

/// Normalize a wire record to a HistoryItem.
///
/// `requested_username` is used when the record carries no owner.
pub fn normalize_record(record: HistoryRecord, requested_username: &str) -> HistoryItem {
    let username = record
        .user
        .map(|owner| owner.username)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| requested_username.to_string());

    let kind = record
        .kind
        .as_deref()
        .and_then(AnalysisKind::parse)
        .unwrap_or_default();

    let created_at = record
        .created_at
        .as_ref()
        .and_then(parse_created_at)
        .unwrap_or_else(Utc::now);

    let error_lines = record
        .error_lines
        .as_ref()
        .map(parse_error_lines)
        .unwrap_or_default();

    HistoryItem::builder(HistoryId::new(record.id), username)
        .language(record.language.unwrap_or_default())
        .kind(kind)
        .original_code(record.original_code.unwrap_or_default())
        .artifact(Artifact {
            feedback: non_blank(record.review_summary),
            revised_code: non_blank(record.fixed_code),
        })
        .error_lines(error_lines)
        .created_at(created_at)
        .build()
}

/// Parse a creation timestamp.
///
/// Accepts RFC 3339, naive ISO-8601 (interpreted as UTC, which is what the
/// backend's local date-times are), and the `[y, m, d, h, min, s, nanos]`
/// array some serializers emit.
pub fn parse_created_at(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Array(parts) => parse_timestamp_parts(parts),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_timestamp_parts(parts: &[Value]) -> Option<DateTime<Utc>> {
    let field = |i: usize| parts.get(i).and_then(Value::as_i64).unwrap_or(0);
    if parts.len() < 3 {
        return None;
    }

    let date = NaiveDate::from_ymd_opt(field(0) as i32, field(1) as u32, field(2) as u32)?;
    let time = date.and_hms_nano_opt(field(3) as u32, field(4) as u32, field(5) as u32, field(6) as u32)?;
    Some(time.and_utc())
}

/// Parse flagged error lines from either a JSON array or a string holding one.
///
/// Anything unparseable yields an empty list; the lines are decoration, not
/// data worth failing a whole list over.
pub fn parse_error_lines(value: &Value) -> Vec<u32> {
    match value {
        Value::Array(lines) => lines
            .iter()
            .filter_map(Value::as_u64)
            .filter_map(|n| u32::try_from(n).ok())
            .collect(),
        Value::String(s) => serde_json::from_str::<Value>(s)
            .map(|inner| match inner {
                Value::Array(_) => parse_error_lines(&inner),
                _ => Vec::new(),
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

//! `RDATE`/`EXDATE`/exception `VEVENT`s ↔ `recurrenceOverrides` (§4.4).
//!
//! This translator runs last within one event translation (§4.1, §5): it is
//! the only aspect that needs a fully-materialized master to diff against.

use chrono::{Duration, NaiveDateTime};
use json_patch::{diff, patch as apply_patch, Patch};
use serde_json::Value;

use crate::translate::time;

pub const FORBIDDEN_KEYS: &[&str] = &[
    "uid",
    "relatedTo",
    "prodId",
    "isAllDay",
    "recurrenceRule",
    "recurrenceOverrides",
    "replyTo",
    "participantId",
];

/// True if any top-level key touched by the patch is on the forbidden list
/// (§3 invariants) — such a patch is discarded wholesale, not partially applied.
pub fn is_forbidden(patch_value: &Value) -> bool {
    let Value::Array(ops) = patch_value else {
        return false;
    };
    ops.iter().any(|op| {
        op.get("path")
            .and_then(|p| p.as_str())
            .map(|path| {
                let top = path.trim_start_matches('/').split('/').next().unwrap_or("");
                FORBIDDEN_KEYS.contains(&top)
            })
            .unwrap_or(false)
    })
}

/// RFC 6902 diff from the master event JSON to one exception event JSON.
pub fn compute_patch(master: &Value, exception: &Value) -> Value {
    let p: Patch = diff(master, exception);
    serde_json::to_value(p).unwrap_or_else(|_| Value::Array(vec![]))
}

/// Applies a previously-computed patch to the master, producing the
/// exception's JSON. Returns `None` if the patch cannot be applied cleanly.
pub fn apply(master: &Value, patch_value: &Value) -> Option<Value> {
    let patch: Patch = serde_json::from_value(patch_value.clone()).ok()?;
    let mut doc = master.clone();
    apply_patch(&mut doc, &patch).ok()?;
    Some(doc)
}

pub fn is_excluded_patch(patch_value: &Value) -> bool {
    matches!(patch_value, Value::Object(map) if map.get("excluded") == Some(&Value::Bool(true)) && map.len() == 1)
}

pub fn is_empty_patch(patch_value: &Value) -> bool {
    matches!(patch_value, Value::Array(ops) if ops.is_empty())
}

pub fn excluded_patch() -> Value {
    serde_json::json!({ "excluded": true })
}

pub fn empty_patch() -> Value {
    Value::Array(vec![])
}

#[derive(Debug, Clone, PartialEq)]
pub struct RDateEntry {
    pub start: NaiveDateTime,
    pub duration: Option<Duration>,
}

/// Parses a raw `RDATE` value: a comma-separated list of either plain
/// date-times or `start/end-or-duration` periods.
pub fn parse_rdate_values(raw: &str) -> Vec<RDateEntry> {
    raw.split(',')
        .filter_map(|token| {
            if let Some((start, rest)) = token.split_once('/') {
                let start_dt = parse_wire_date_time(start)?;
                let duration = if let Some(d) = time::parse_duration(rest) {
                    Some(d)
                } else {
                    parse_wire_date_time(rest).map(|end| end - start_dt)
                };
                Some(RDateEntry { start: start_dt, duration })
            } else {
                parse_wire_date_time(token).map(|start| RDateEntry { start, duration: None })
            }
        })
        .collect()
}

pub fn parse_exdate_values(raw: &str) -> Vec<NaiveDateTime> {
    raw.split(',').filter_map(parse_wire_date_time).collect()
}

/// Parses the iCal wire form `YYYYMMDDTHHMMSS[Z]`, stripping any trailing `Z`.
fn parse_wire_date_time(token: &str) -> Option<NaiveDateTime> {
    let token = token.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(token, "%Y%m%dT%H%M%S").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_patch_round_trips() {
        let patch = excluded_patch();
        assert!(is_excluded_patch(&patch));
    }

    #[test]
    fn empty_patch_is_rdate_marker() {
        assert!(is_empty_patch(&empty_patch()));
    }

    #[test]
    fn forbidden_patch_is_detected() {
        let patch = serde_json::json!([{ "op": "replace", "path": "/uid", "value": "x" }]);
        assert!(is_forbidden(&patch));
    }

    #[test]
    fn non_forbidden_patch_passes() {
        let patch = serde_json::json!([{ "op": "replace", "path": "/title", "value": "x" }]);
        assert!(!is_forbidden(&patch));
    }

    #[test]
    fn parses_exdate_list() {
        let values = parse_exdate_values("20220103T090000Z,20220105T090000Z");
        assert_eq!(values.len(), 2);
    }
}

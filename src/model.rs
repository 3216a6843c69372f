//! The JSCalendar `JsEvent` wire type (§3) and the small enums it closes over.
//!
//! This is a typed model, not a loose `serde_json::Value` tree: every field
//! named in §3 gets a Rust field here, camelCase on the wire via `rename`.
//! The one exception is `recurrenceOverrides`' patch objects, which stay
//! `serde_json::Value` — they are arbitrary partial `JsEvent` patches, and
//! giving them a dedicated type would just reinvent `json-patch`'s own.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsEvent {
    #[serde(rename = "@type")]
    pub type_: String,

    pub uid: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prod_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_content_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_all_day: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_busy_status: Option<FreeBusyStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy: Option<Privacy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<BTreeMap<String, bool>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_to: Option<BTreeMap<String, Relation>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<RecurrenceRule>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_overrides: Option<BTreeMap<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants: Option<BTreeMap<String, Participant>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts: Option<BTreeMap<String, Alert>>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub use_default_alerts: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<BTreeMap<String, Location>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_locations: Option<BTreeMap<String, VirtualLocation>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<BTreeMap<String, Link>>,
}

pub const JSEVENT_TYPE: &str = "jsevent";

impl JsEvent {
    /// A bare event carrying only the fields every JsEvent must have (§3).
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            type_: JSEVENT_TYPE.to_string(),
            uid: uid.into(),
            prod_id: None,
            title: None,
            description: None,
            description_content_type: None,
            start: None,
            duration: None,
            time_zone: None,
            is_all_day: None,
            status: None,
            free_busy_status: None,
            privacy: None,
            sequence: None,
            priority: None,
            color: None,
            locale: None,
            method: None,
            created: None,
            updated: None,
            keywords: None,
            related_to: None,
            recurrence_rule: None,
            recurrence_overrides: None,
            participants: None,
            reply_to: None,
            alerts: None,
            use_default_alerts: false,
            locations: None,
            virtual_locations: None,
            links: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Confirmed,
    Tentative,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreeBusyStatus {
    Free,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    Private,
    Secret,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<BTreeMap<String, bool>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Skip {
    Omit,
    Backward,
    Forward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    #[serde(rename = "@type")]
    pub type_: String,
    pub frequency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rscale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<Skip>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_day_of_week: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_day: Option<Vec<NDay>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_month: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_date: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_year_day: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_week_no: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_hour: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_minute: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_second: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_set_position: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
}

impl RecurrenceRule {
    pub fn new(frequency: impl Into<String>) -> Self {
        Self {
            type_: "RecurrenceRule".to_string(),
            frequency: frequency.into(),
            interval: None,
            rscale: None,
            skip: None,
            first_day_of_week: None,
            by_day: None,
            by_month: None,
            by_date: None,
            by_year_day: None,
            by_week_no: None,
            by_hour: None,
            by_minute: None,
            by_second: None,
            by_set_position: None,
            count: None,
            until: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NDay {
    #[serde(rename = "@type")]
    pub type_: String,
    pub day: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nth_of_period: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParticipationStatus {
    NeedsAction,
    Accepted,
    Declined,
    Tentative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    Individual,
    Group,
    Resource,
    Location,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attendance {
    Required,
    Optional,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_to: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ParticipantKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance: Option<Attendance>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub roles: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participation_status: Option<ParticipationStatus>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub expect_reply: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegated_to: Option<BTreeMap<String, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegated_from: Option<BTreeMap<String, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_of: Option<BTreeMap<String, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_ids: Option<BTreeMap<String, bool>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub schedule_sequence: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_updated: Option<String>,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl Participant {
    pub fn new() -> Self {
        Self {
            type_: "Participant".to_string(),
            send_to: None,
            email: None,
            name: String::new(),
            kind: None,
            attendance: None,
            roles: BTreeMap::new(),
            location_id: None,
            participation_status: None,
            expect_reply: false,
            delegated_to: None,
            delegated_from: None,
            member_of: None,
            link_ids: None,
            schedule_sequence: 0,
            schedule_updated: None,
        }
    }
}

impl Default for Participant {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertAction {
    Display,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelativeTo {
    BeforeStart,
    AfterStart,
    BeforeEnd,
    AfterEnd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "@type")]
    pub type_: String,
    pub action: AlertAction,
    pub relative_to: RelativeTo,
    /// ISO-8601 duration, always unsigned on the wire.
    pub offset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snoozed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_ids: Option<BTreeMap<String, bool>>,
}

impl Location {
    pub fn new() -> Self {
        Self {
            type_: "Location".to_string(),
            name: None,
            description: None,
            rel: None,
            time_zone: None,
            coordinates: None,
            link_ids: None,
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualLocation {
    #[serde(rename = "@type")]
    pub type_: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "@type")]
    pub type_: String,
    pub href: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// `recurrenceOverrides`/`recurrenceId` keys use the `LocalDateTime` grammar.
pub fn is_local_date_time(s: &str) -> bool {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
}

pub fn is_date_only(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_event_serializes_minimal_fields() {
        let event = JsEvent::new("uid-1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["@type"], "jsevent");
        assert_eq!(json["uid"], "uid-1");
        assert!(json.get("title").is_none());
        assert!(json.get("useDefaultAlerts").is_none());
    }

    #[test]
    fn local_date_time_grammar() {
        assert!(is_local_date_time("2022-03-07T09:15:00"));
        assert!(!is_local_date_time("2022-03-07"));
        assert!(is_date_only("2022-03-07"));
    }

    #[test]
    fn recurrence_rule_camel_case_fields() {
        let mut rule = RecurrenceRule::new("daily");
        rule.count = Some(5);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["frequency"], "daily");
        assert_eq!(json["count"], 5);
        assert!(json.get("byDate").is_none());
    }
}

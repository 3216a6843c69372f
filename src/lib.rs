//! Bidirectional translator between RFC 5545 iCalendar `VEVENT`s and the
//! JSCalendar JSON event model (§1). The wire-format parsing/serialization on
//! both sides — the iCal text grammar and JSON text — is left to the
//! `icalendar` and `serde_json` crates; this crate only does the semantic
//! mapping between the two in-memory trees.

pub mod config;
pub mod context;
pub mod error;
pub mod ical;
pub mod model;
pub mod translate;
pub mod xparam;

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;
use icalendar::{Calendar, CalendarComponent, Component, Event as IcalEvent};
use serde_json::Value;
use tracing::{debug, instrument, warn};

pub use config::TranslatorConfig;
pub use error::{ConversionError, ConversionResult};
pub use model::JsEvent;

use translate::event;
use translate::overrides;
use translate::time as time_translate;

/// Top-level keys this crate's public API understands as a read-time
/// projection filter (§9 "Dynamic property filter").
pub type WantProps = HashSet<String>;

fn strip_keys(value: &mut Value, keys: &[&str]) {
    if let Value::Object(map) = value {
        for key in keys {
            map.remove(*key);
        }
    }
}

/// `method`/`prodId` are calendar-scoped in iCal (`METHOD`/`PRODID` live on
/// `VCALENDAR`, not `VEVENT`) but event-scoped in JSCalendar (§4, SPEC_FULL
/// [SUPPLEMENT]). Fills them in from the enclosing `VCALENDAR` when the
/// per-event read didn't already find an inline copy.
fn fill_calendar_scoped(doc: &Calendar, js: &mut JsEvent) {
    if js.prod_id.is_none() {
        js.prod_id = doc.property_value("PRODID").map(|s| s.to_string());
    }
    if js.method.is_none() {
        js.method = doc.property_value("METHOD").map(|s| s.to_string());
    }
}

fn is_main_event(event: &IcalEvent) -> bool {
    event.get_uid().is_some() && event.property_value("RECURRENCE-ID").is_none()
}

fn vevents(doc: &Calendar) -> Vec<&IcalEvent> {
    doc.components
        .iter()
        .filter_map(|c| match c {
            CalendarComponent::Event(e) => Some(e),
            _ => None,
        })
        .collect()
}

/// Builds the `recurrenceOverrides` map for one main event: `RDATE`s,
/// `EXDATE`s, and exception `VEVENT`s sharing its `UID` (§4.4). Run last,
/// against a snapshot of the already-built master (§5 ordering guarantee, §9).
fn build_overrides(
    main: &IcalEvent,
    all_events: &[&IcalEvent],
    master: &mut JsEvent,
    ctx: &mut context::ConversionContext,
) {
    let start_tz = master.time_zone.clone();
    let mut overrides_map: BTreeMap<String, Value> = BTreeMap::new();

    for prop in ical::all_properties(main, "EXDATE") {
        let from_tz = wire_value_tzid(prop.value(), ical::param(prop, "TZID"));
        for dt in overrides::parse_exdate_values(prop.value()) {
            let rezoned = time_translate::rezone(dt, from_tz.as_deref(), start_tz.as_deref());
            overrides_map.insert(local_key(rezoned), overrides::excluded_patch());
        }
    }

    for prop in ical::all_properties(main, "RDATE") {
        let from_tz = wire_value_tzid(prop.value(), ical::param(prop, "TZID"));
        for entry in overrides::parse_rdate_values(prop.value()) {
            let rezoned_start = time_translate::rezone(entry.start, from_tz.as_deref(), start_tz.as_deref());
            let patch = match entry.duration {
                Some(duration) => serde_json::json!([{
                    "op": "replace",
                    "path": "/duration",
                    "value": time_duration_to_iso(duration),
                }]),
                None => overrides::empty_patch(),
            };
            overrides_map.insert(local_key(rezoned_start), patch);
        }
    }

    let mut master_json = serde_json::to_value(&master).unwrap_or(Value::Null);
    strip_keys(&mut master_json, event::EXCEPTION_ONLY_SUPPRESSED);

    let uid = main.get_uid().unwrap_or_default();
    for exception in all_events {
        if exception.get_uid() != Some(uid) {
            continue;
        }
        let Some(recurrence_id_prop) = exception.properties().get("RECURRENCE-ID") else {
            continue;
        };
        let mut exc_ctx = context::ConversionContext::new();
        let exc_js = event::read(exception, &mut exc_ctx);
        let mut exc_json = serde_json::to_value(&exc_js).unwrap_or(Value::Null);
        strip_keys(&mut exc_json, event::EXCEPTION_ONLY_SUPPRESSED);

        let recurrence_id = recurrence_id_prop.value();
        let from_tz = wire_value_tzid(recurrence_id, ical::param(recurrence_id_prop, "TZID"));
        let key = match overrides::parse_exdate_values(recurrence_id).into_iter().next() {
            Some(dt) => local_key(time_translate::rezone(dt, from_tz.as_deref(), start_tz.as_deref())),
            None => recurrence_id.trim_end_matches('Z').to_string(),
        };
        if exc_js.start.as_deref() == Some(key.as_str()) && exc_json == master_json {
            continue; // implicit: no delta from the master beyond the key itself.
        }
        overrides_map.insert(key, overrides::compute_patch(&master_json, &exc_json));
    }

    if !overrides_map.is_empty() {
        master.recurrence_overrides = Some(overrides_map);
    }
}

/// The Olson zone a raw `EXDATE`/`RDATE`/`RECURRENCE-ID` wire value is
/// expressed in: `UTC` if it carries a trailing `Z`, else its `TZID`
/// parameter if present, else `None` (floating, or implicitly the start
/// zone — either way no conversion is needed; see `time::rezone`).
fn wire_value_tzid(raw: &str, tzid_param: Option<&str>) -> Option<String> {
    if raw.trim_end().ends_with('Z') {
        Some("UTC".to_string())
    } else {
        tzid_param.map(|s| s.to_string())
    }
}

fn local_key(dt: NaiveDateTime) -> String {
    ical::format_local_date_time(dt)
}

fn time_duration_to_iso(d: chrono::Duration) -> String {
    translate::time::format_duration(d)
}

fn apply_want_props(js: &mut JsEvent, want_props: Option<&WantProps>) {
    let Some(wanted) = want_props else {
        return;
    };
    let mut value = serde_json::to_value(&*js).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.retain(|k, _| k == "@type" || k == "uid" || wanted.contains(k.as_str()));
    }
    if let Ok(trimmed) = serde_json::from_value(value) {
        *js = trimmed;
    }
}

/// `toJs`: the first main event, or `None` if the document has none (§6).
#[instrument(skip_all)]
pub fn to_js(doc: &Calendar, want_props: Option<&WantProps>) -> ConversionResult<Option<JsEvent>> {
    let events = vevents(doc);
    let mains: Vec<&IcalEvent> = events.iter().copied().filter(|e| is_main_event(e)).collect();

    let chosen = if let Some(first) = mains.first() {
        Some(*first)
    } else if events.len() == 1 && events[0].get_uid().is_none() {
        Some(events[0])
    } else {
        None
    };

    let Some(main) = chosen else {
        return Ok(None);
    };

    let mut ctx = context::ConversionContext::new();
    let wants_overrides = want_props.map(|w| w.contains("recurrenceOverrides")).unwrap_or(true);
    let mut js = event::read(main, &mut ctx);
    fill_calendar_scoped(doc, &mut js);
    if wants_overrides {
        build_overrides(main, &events, &mut js, &mut ctx);
    }
    if ctx.has_errors() {
        let paths = ctx.into_invalid_paths();
        warn!(paths = ?paths, "property errors during toJs");
        return Err(ConversionError::Props(paths));
    }
    apply_want_props(&mut js, want_props);
    debug!(uid = %js.uid, "translated iCal event to JSCalendar");
    Ok(Some(js))
}

/// `toJsAll`: every main event; a lone unidentified `VEVENT` is promoted (§6).
#[instrument(skip_all)]
pub fn to_js_all(doc: &Calendar, want_props: Option<&WantProps>) -> ConversionResult<Vec<JsEvent>> {
    let events = vevents(doc);
    let mains: Vec<&IcalEvent> = events.iter().copied().filter(|e| is_main_event(e)).collect();

    let targets: Vec<&IcalEvent> = if !mains.is_empty() {
        mains
    } else if events.len() == 1 && events[0].get_uid().is_none() {
        vec![events[0]]
    } else {
        vec![]
    };

    let mut out = Vec::with_capacity(targets.len());
    for main in &targets {
        let mut ctx = context::ConversionContext::new();
        let mut js = event::read(main, &mut ctx);
        fill_calendar_scoped(doc, &mut js);
        build_overrides(main, &events, &mut js, &mut ctx);
        if ctx.has_errors() {
            return Err(ConversionError::Props(ctx.into_invalid_paths()));
        }
        apply_want_props(&mut js, want_props);
        out.push(js);
    }
    Ok(out)
}

/// `toICal`: a fresh `VCALENDAR` containing one `VEVENT` plus any exception
/// `VEVENT`s implied by `recurrenceOverrides` (§6).
#[instrument(skip_all, fields(uid = %js.uid))]
pub fn to_ical(js: &JsEvent, config: &TranslatorConfig) -> ConversionResult<Calendar> {
    if js.uid.trim().is_empty() {
        return Err(ConversionError::UidMissing);
    }

    let mut calendar = Calendar::new();
    calendar.append_property(icalendar::Property::new("VERSION", "2.0"));
    calendar.append_property(icalendar::Property::new("CALSCALE", "GREGORIAN"));
    if let Some(prod_id) = &js.prod_id {
        calendar.append_property(icalendar::Property::new("PRODID", prod_id.clone()));
    }
    if let Some(method) = &js.method {
        calendar.append_property(icalendar::Property::new("METHOD", method.clone()));
    }

    let mut ctx = context::ConversionContext::new();
    let mut main_event = IcalEvent::new();
    let now = chrono::Utc::now();
    main_event.append_property(icalendar::Property::new("CREATED", ical::format_utc_date(now)));
    main_event.append_property(icalendar::Property::new("DTSTAMP", ical::format_utc_date(now)));

    event::write(js, &mut main_event, config, &mut ctx);

    let master_json = {
        let mut v = serde_json::to_value(js).unwrap_or(Value::Null);
        strip_keys(&mut v, &["recurrenceOverrides", "recurrenceRule"]);
        v
    };

    let mut rdates = Vec::new();
    let mut exdates = Vec::new();

    if let Some(overrides_map) = &js.recurrence_overrides {
        for (key, patch) in overrides_map {
            if overrides::is_forbidden(patch) {
                continue;
            }
            if overrides::is_excluded_patch(patch) {
                exdates.push(key.clone());
                continue;
            }
            if overrides::is_empty_patch(patch) {
                rdates.push(key.clone());
                continue;
            }
            let Some(mut exc_json) = overrides::apply(&master_json, patch) else {
                ctx.invalid_prop(Some(&format!("recurrenceOverrides/{key}")));
                continue;
            };
            if exc_json.get("start").is_none() {
                if let Value::Object(map) = &mut exc_json {
                    map.insert("start".to_string(), Value::String(key.clone()));
                }
            }
            let Ok(exc_js): Result<JsEvent, _> = serde_json::from_value(exc_json) else {
                ctx.invalid_prop(Some(&format!("recurrenceOverrides/{key}")));
                continue;
            };
            let mut exc_event = IcalEvent::new();
            exc_event.append_property(icalendar::Property::new("RECURRENCE-ID", key.replace(['-', ':'], "")));
            exc_event.append_property(icalendar::Property::new("CREATED", ical::format_utc_date(now)));
            exc_event.append_property(icalendar::Property::new("DTSTAMP", ical::format_utc_date(now)));
            let mut exc_ctx = context::ConversionContext::new();
            event::write(&exc_js, &mut exc_event, config, &mut exc_ctx);
            calendar.push(exc_event);
        }
    }

    if !exdates.is_empty() {
        main_event.append_property(icalendar::Property::new("EXDATE", exdates.join(",")));
    }
    if !rdates.is_empty() {
        main_event.append_property(icalendar::Property::new("RDATE", rdates.join(",")));
    }

    calendar.push(main_event);

    if ctx.has_errors() {
        return Err(ConversionError::Props(ctx.into_invalid_paths()));
    }
    Ok(calendar)
}

/// `strerror`: diagnostic string for an error kind (§6).
pub fn strerror(err: &ConversionError) -> String {
    err.strerror()
}

#[cfg(test)]
mod tests {
    use super::*;
    use icalendar::{Component, Event as IcalEvent};

    fn calendar_with(event: IcalEvent) -> Calendar {
        let mut cal = Calendar::new();
        cal.push(event);
        cal
    }

    #[test]
    fn all_day_event_translates_to_js() {
        let mut event = IcalEvent::new();
        event.uid("holiday-1");
        event.all_day(chrono::NaiveDate::from_ymd_opt(2022, 3, 7).unwrap());
        event.summary("Holiday");
        let cal = calendar_with(event);

        let js = to_js(&cal, None).unwrap().unwrap();
        assert_eq!(js.uid, "holiday-1");
        assert_eq!(js.is_all_day, Some(true));
        assert_eq!(js.start.as_deref(), Some("2022-03-07T00:00:00"));
        assert_eq!(js.time_zone, None);
        assert_eq!(js.duration.as_deref(), Some("PT0S"));
        assert_eq!(js.title.as_deref(), Some("Holiday"));
    }

    #[test]
    fn to_ical_requires_uid() {
        let js = JsEvent::new("");
        let config = TranslatorConfig::default();
        assert!(matches!(to_ical(&js, &config), Err(ConversionError::UidMissing)));
    }

    #[test]
    fn to_js_returns_none_for_empty_calendar() {
        let cal = Calendar::new();
        assert_eq!(to_js(&cal, None).unwrap(), None);
    }

    #[test]
    fn exdate_in_start_zone_becomes_excluded_override() {
        use chrono::TimeZone;
        use chrono_tz::Europe::Berlin;

        let mut event = IcalEvent::new();
        event.uid("daily-1");
        event.starts(Berlin.with_ymd_and_hms(2022, 1, 1, 9, 0, 0).unwrap());
        event.append_property(icalendar::Property::new("RRULE", "FREQ=DAILY;COUNT=5"));
        let mut exdate = icalendar::Property::new("EXDATE", "20220103T090000");
        exdate.add_parameter("TZID", "Europe/Berlin");
        event.append_property(exdate);
        let cal = calendar_with(event);

        let js = to_js(&cal, None).unwrap().unwrap();
        let overrides = js.recurrence_overrides.unwrap();
        let patch = &overrides["2022-01-03T09:00:00"];
        assert_eq!(patch, &serde_json::json!({"excluded": true}));
    }

    #[test]
    fn exdate_in_differing_zone_is_rezoned_to_start_zone() {
        use chrono::TimeZone;
        use chrono_tz::Europe::Berlin;

        let mut event = IcalEvent::new();
        event.uid("daily-2");
        event.starts(Berlin.with_ymd_and_hms(2022, 1, 1, 9, 0, 0).unwrap());
        event.append_property(icalendar::Property::new("RRULE", "FREQ=DAILY;COUNT=5"));
        // 08:00 America/New_York on 2022-01-03 is 14:00 Europe/Berlin, not 09:00.
        let mut exdate = icalendar::Property::new("EXDATE", "20220103T080000");
        exdate.add_parameter("TZID", "America/New_York");
        event.append_property(exdate);
        let cal = calendar_with(event);

        let js = to_js(&cal, None).unwrap().unwrap();
        let overrides = js.recurrence_overrides.unwrap();
        assert!(overrides.contains_key("2022-01-03T14:00:00"));
        assert!(!overrides.contains_key("2022-01-03T08:00:00"));
    }

    #[test]
    fn differing_end_timezone_produces_end_location() {
        use chrono::TimeZone;
        use chrono_tz::{America::New_York, Europe::Berlin};

        let mut event = IcalEvent::new();
        event.uid("meeting-1");
        event.starts(Berlin.with_ymd_and_hms(2022, 1, 1, 9, 0, 0).unwrap());
        event.ends(New_York.with_ymd_and_hms(2022, 1, 1, 6, 0, 0).unwrap());
        let cal = calendar_with(event);

        let js = to_js(&cal, None).unwrap().unwrap();
        assert_eq!(js.start.as_deref(), Some("2022-01-01T09:00:00"));
        assert_eq!(js.time_zone.as_deref(), Some("Europe/Berlin"));
        assert_eq!(js.duration.as_deref(), Some("PT3H"));
        let locations = js.locations.unwrap();
        let end_loc = locations.values().find(|l| l.rel.as_deref() == Some("end")).unwrap();
        assert_eq!(end_loc.time_zone.as_deref(), Some("America/New_York"));
    }

    #[test]
    fn delegated_attendee_resolves_through_delegation_chain() {
        let mut event = IcalEvent::new();
        event.uid("delegation-1");
        event.all_day(chrono::NaiveDate::from_ymd_opt(2022, 1, 1).unwrap());

        let mut attendee_a = icalendar::Property::new("ATTENDEE", "mailto:a@example.com");
        attendee_a.add_parameter("PARTSTAT", "DELEGATED");
        attendee_a.add_parameter("DELEGATED-TO", "mailto:b@example.com");
        event.append_multi_property(attendee_a);

        let mut attendee_b = icalendar::Property::new("ATTENDEE", "mailto:b@example.com");
        attendee_b.add_parameter("PARTSTAT", "ACCEPTED");
        event.append_multi_property(attendee_b);

        let cal = calendar_with(event);
        let js = to_js(&cal, None).unwrap().unwrap();
        let participants = js.participants.unwrap();
        let a = participants
            .values()
            .find(|p| p.send_to.as_ref().map(|s| s.values().any(|v| v == "mailto:a@example.com")).unwrap_or(false))
            .unwrap();
        assert_eq!(a.participation_status, Some(model::ParticipationStatus::Accepted));
    }

    #[test]
    fn snooze_alarm_pairs_with_its_target_via_related_to() {
        use icalendar::{Alarm, Trigger};

        let mut event = IcalEvent::new();
        event.uid("alert-1");
        event.starts(chrono::NaiveDate::from_ymd_opt(2022, 1, 1).unwrap().and_hms_opt(10, 30, 0).unwrap());

        let mut alarm = Alarm::display("reminder", Trigger::before_start(chrono::Duration::minutes(15)));
        alarm.append_property(icalendar::Property::new("UID", "X"));
        event.alarm(alarm);

        let mut snooze = Alarm::display("reminder", Trigger::before_start(chrono::Duration::zero()));
        let mut related_to = icalendar::Property::new("RELATED-TO", "X");
        related_to.add_parameter("RELTYPE", "SNOOZE");
        snooze.append_property(related_to);
        snooze.append_property(icalendar::Property::new("TRIGGER", "20220101T101500Z"));
        event.alarm(snooze);

        let cal = calendar_with(event);
        let js = to_js(&cal, None).unwrap().unwrap();
        let alert = &js.alerts.unwrap()["X"];
        assert_eq!(alert.action, model::AlertAction::Display);
        assert_eq!(alert.relative_to, model::RelativeTo::BeforeStart);
        assert_eq!(alert.offset, "PT15M");
        assert_eq!(alert.snoozed.as_deref(), Some("2022-01-01T10:15:00Z"));
    }

    #[test]
    fn organizer_only_participant_collapses_to_bare_organizer() {
        use std::collections::BTreeMap;

        use crate::model::Participant;

        let mut js = JsEvent::new("collapse-1");
        js.start = Some("2022-01-01T09:00:00".to_string());
        js.duration = Some("PT1H".to_string());

        let mut reply_to = BTreeMap::new();
        reply_to.insert("imip".to_string(), "mailto:a@x".to_string());
        js.reply_to = Some(reply_to);

        let mut participant = Participant::new();
        participant.name = "Alice".to_string();
        let mut send_to = BTreeMap::new();
        send_to.insert("imip".to_string(), "mailto:a@x".to_string());
        participant.send_to = Some(send_to);
        participant.roles.insert("owner".to_string(), true);

        let mut participants = BTreeMap::new();
        participants.insert("p".to_string(), participant);
        js.participants = Some(participants);

        let config = TranslatorConfig::default();
        let cal = to_ical(&js, &config).unwrap();
        let main = vevents(&cal)[0];
        assert_eq!(main.property_value("ORGANIZER"), Some("mailto:a@x"));
        assert!(main.properties().get("ATTENDEE").is_none());
    }
}

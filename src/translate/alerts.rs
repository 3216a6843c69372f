//! `VALARM` ↔ `alerts`, snooze pairing via `RELATED-TO` (§4.6).

use std::collections::BTreeMap;

use chrono::Duration;
use icalendar::{Alarm, Component, Event as IcalEvent, Property, Trigger};

use crate::context::ConversionContext;
use crate::ical;
use crate::model::{Alert, AlertAction, RelativeTo};
use crate::translate::time::{self, ResolvedTime};

fn anchor_is_end(related: Option<&str>) -> bool {
    related.map(|r| r.eq_ignore_ascii_case("END")).unwrap_or(false)
}

fn relative_to(is_end: bool, negative: bool) -> RelativeTo {
    match (is_end, negative) {
        (false, true) => RelativeTo::BeforeStart,
        (false, false) => RelativeTo::AfterStart,
        (true, true) => RelativeTo::BeforeEnd,
        (true, false) => RelativeTo::AfterEnd,
    }
}

/// Collects the snooze `VALARM`s into a target-UID → `TRIGGER` index (§4.6).
fn snooze_index(event: &IcalEvent) -> BTreeMap<String, &Property> {
    let mut snoozes = BTreeMap::new();
    for valarm in event.alarms() {
        let related_to = valarm.property_value("RELATED-TO");
        let reltype = valarm
            .properties()
            .get("RELATED-TO")
            .and_then(|p| ical::param(p, "RELTYPE"));
        if reltype.map(|r| r.eq_ignore_ascii_case("SNOOZE")).unwrap_or(false) {
            if let Some(target) = related_to {
                if let Some(trigger) = valarm.properties().get("TRIGGER") {
                    snoozes.insert(target.to_string(), trigger);
                }
            }
        }
    }
    snoozes
}

pub fn read(
    event: &IcalEvent,
    start: &ResolvedTime,
    end: Option<&ResolvedTime>,
    ctx: &mut ConversionContext,
) -> BTreeMap<String, Alert> {
    let mut alerts = BTreeMap::new();
    let snoozes = snooze_index(event);

    for valarm in event.alarms() {
        let action_raw = valarm.property_value("ACTION").unwrap_or("DISPLAY");
        if action_raw.eq_ignore_ascii_case("NONE") {
            continue;
        }
        let is_snooze = valarm
            .properties()
            .get("RELATED-TO")
            .and_then(|p| ical::param(p, "RELTYPE"))
            .map(|r| r.eq_ignore_ascii_case("SNOOZE"))
            .unwrap_or(false);
        if is_snooze {
            continue;
        }

        let Some(uid) = valarm.property_value("UID") else {
            ctx.invalid_prop(Some("alerts"));
            continue;
        };
        let Some(trigger) = valarm.properties().get("TRIGGER") else {
            ctx.invalid_prop(Some("alerts"));
            continue;
        };
        let related = ical::param(trigger, "RELATED");
        let is_end = anchor_is_end(related);
        let value = trigger.value();

        let offset = if let Some(duration) = time::parse_duration(value.trim_start_matches('-')) {
            let negative = value.starts_with('-');
            (duration, negative)
        } else {
            // absolute trigger: subtract the referenced anchor in UTC.
            let Some(trigger_utc) = ical::parse_utc_date(value) else {
                ctx.invalid_prop(Some("alerts"));
                continue;
            };
            let anchor = if is_end { end } else { Some(start) };
            let Some(anchor_utc) = anchor.and_then(ResolvedTime::to_utc) else {
                ctx.invalid_prop(Some("alerts"));
                continue;
            };
            let delta = trigger_utc - anchor_utc;
            (delta.abs(), delta < Duration::zero())
        };

        let action = if action_raw.eq_ignore_ascii_case("EMAIL") {
            AlertAction::Email
        } else {
            AlertAction::Display
        };

        let snoozed = snoozes.get(uid).and_then(|t| {
            let v = t.value();
            ical::parse_utc_date(v).map(|_| v.to_string())
        });

        let alert = Alert {
            type_: "Alert".to_string(),
            action,
            relative_to: relative_to(is_end, offset.1),
            offset: time::format_duration(offset.0),
            acknowledged: valarm.property_value("ACKNOWLEDGED").map(|s| s.to_string()),
            snoozed,
        };
        alerts.insert(uid.to_string(), alert);
    }
    alerts
}

fn duration_trigger(relative_to: RelativeTo, duration: Duration) -> Trigger {
    match relative_to {
        RelativeTo::BeforeStart => Trigger::before_start(duration),
        RelativeTo::AfterStart => Trigger::after_start(duration),
        RelativeTo::BeforeEnd => Trigger::before_end(duration),
        RelativeTo::AfterEnd => Trigger::after_end(duration),
    }
}

/// Writes every `alerts` entry as a `VALARM` subcomponent (pushed via
/// `Event::alarm`, never as a plain property — VALARM is a subcomponent).
/// `event` is always freshly built by this crate's `toICal` entry point, so
/// there is never a pre-existing `VALARM` to purge first.
pub fn write(
    event: &mut IcalEvent,
    alerts: &BTreeMap<String, Alert>,
    calendar_user_address: Option<&str>,
    ctx: &mut ConversionContext,
) {
    for (id, alert) in alerts {
        let Some(duration) = time::parse_duration(&alert.offset) else {
            ctx.with_prop("alerts", |ctx| ctx.invalid_prop(Some(id)));
            continue;
        };
        let description = event
            .get_summary()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "Your event alert".to_string());
        let trigger = duration_trigger(alert.relative_to, duration);

        let mut alarm = Alarm::display(&description, trigger);
        alarm.append_property(Property::new("UID", id.clone()));
        if alert.action == AlertAction::Email {
            alarm.append_property(Property::new("ACTION", "EMAIL"));
            alarm.append_property(Property::new("SUMMARY", description.clone()));
            if let Some(addr) = calendar_user_address {
                alarm.append_property(Property::new("ATTENDEE", addr.to_string()));
            }
        }
        if let Some(ack) = &alert.acknowledged {
            alarm.append_property(Property::new("ACKNOWLEDGED", ack.clone()));
        }
        event.alarm(alarm);

        if let Some(snoozed) = &alert.snoozed {
            // Placeholder duration trigger, immediately overwritten below with
            // the absolute snooze time — `Alarm::display` requires a `Trigger`
            // up front but `TRIGGER` is single-valued, so the overwrite sticks.
            let mut snooze = Alarm::display(&description, Trigger::before_start(Duration::zero()));
            let mut related_to = Property::new("RELATED-TO", id.clone());
            related_to.add_parameter("RELTYPE", "SNOOZE");
            snooze.append_property(related_to);
            snooze.append_property(Property::new("TRIGGER", snoozed.clone()));
            event.alarm(snooze);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_to_combines_sign_and_anchor() {
        assert_eq!(relative_to(false, true), RelativeTo::BeforeStart);
        assert_eq!(relative_to(false, false), RelativeTo::AfterStart);
        assert_eq!(relative_to(true, true), RelativeTo::BeforeEnd);
        assert_eq!(relative_to(true, false), RelativeTo::AfterEnd);
    }
}

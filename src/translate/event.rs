//! The event translator: dispatches every JSCalendar property to its aspect
//! translator (§4.1). `recurrenceOverrides` is deliberately not handled here
//! — it needs sibling `VEVENT`s from the enclosing `VCALENDAR`, so the entry
//! points in `lib.rs` own that step and run it last.

use std::collections::BTreeMap;

use chrono::Duration;
use icalendar::{Component, Event as IcalEvent, Property};

use crate::config::TranslatorConfig;
use crate::context::ConversionContext;
use crate::model::{FreeBusyStatus, JsEvent, Privacy, Relation, Status};
use crate::translate::{alerts, links, locations, participants, recurrence, time};
use crate::{ical, xparam};

/// Fields suppressed from an exception event's own JSON before it is diffed
/// against the master (§4.4).
pub const EXCEPTION_ONLY_SUPPRESSED: &[&str] = &[
    "uid",
    "relatedTo",
    "prodId",
    "method",
    "isAllDay",
    "recurrenceRule",
    "recurrenceOverrides",
    "replyTo",
    "created",
    "updated",
];

fn status_from_ical(value: &str) -> Option<Status> {
    Some(match value.to_ascii_uppercase().as_str() {
        "CONFIRMED" => Status::Confirmed,
        "TENTATIVE" => Status::Tentative,
        "CANCELLED" => Status::Cancelled,
        _ => return None,
    })
}

fn status_to_ical(status: Status) -> &'static str {
    match status {
        Status::Confirmed => "CONFIRMED",
        Status::Tentative => "TENTATIVE",
        Status::Cancelled => "CANCELLED",
    }
}

fn privacy_from_class(value: &str) -> Option<Privacy> {
    Some(match value.to_ascii_uppercase().as_str() {
        "PUBLIC" => Privacy::Public,
        "PRIVATE" => Privacy::Private,
        "CONFIDENTIAL" => Privacy::Secret,
        _ => return None,
    })
}

fn privacy_to_class(privacy: Privacy) -> &'static str {
    match privacy {
        Privacy::Public => "PUBLIC",
        Privacy::Private => "PRIVATE",
        // CONFIDENTIAL is the closest iCal concept to JSCalendar's "secret".
        Privacy::Secret => "CONFIDENTIAL",
    }
}

/// Reads every field this module owns directly (everything in §2's "Other"
/// row) into `js`.
fn read_other(event: &IcalEvent, js: &mut JsEvent, ctx: &mut ConversionContext) {
    js.title = event.get_summary().map(|s| s.to_string());
    js.description = event.get_description().map(|s| s.to_string());
    if js.description.is_some() {
        js.description_content_type = Some("text/plain".to_string());
    }

    if let Some(prop) = event.properties().get("SUMMARY") {
        if let Some(lang) = ical::param(prop, "LANGUAGE") {
            js.locale = Some(lang.to_string());
        }
    }

    js.status = event.property_value("STATUS").and_then(status_from_ical);
    js.privacy = event.property_value("CLASS").and_then(privacy_from_class);
    js.free_busy_status = event.property_value("TRANSP").map(|v| {
        if v.eq_ignore_ascii_case("TRANSPARENT") {
            FreeBusyStatus::Free
        } else {
            FreeBusyStatus::Busy
        }
    });
    js.color = event.property_value("COLOR").map(|s| s.to_string());
    js.priority = event.property_value("PRIORITY").and_then(|v| v.parse().ok());
    js.sequence = event.property_value("SEQUENCE").and_then(|v| v.parse().ok());
    js.created = event.property_value("CREATED").map(|s| s.to_string());
    js.updated = event
        .property_value("DTSTAMP")
        .or_else(|| event.property_value("LAST-MODIFIED"))
        .map(|s| s.to_string());
    js.method = event.property_value("METHOD").map(|s| s.to_string());
    js.prod_id = event.property_value("PRODID").map(|s| s.to_string());

    if let Some(categories) = event.property_value("CATEGORIES") {
        let keywords: BTreeMap<String, bool> = categories
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| (s.to_string(), true))
            .collect();
        if !keywords.is_empty() {
            js.keywords = Some(keywords);
        }
    }

    let mut related_to = BTreeMap::new();
    for prop in ical::all_properties(event, "RELATED-TO") {
        let reltype = ical::param(prop, "RELTYPE").unwrap_or("PARENT").to_ascii_lowercase();
        let mut relation = BTreeMap::new();
        relation.insert(reltype, true);
        related_to.insert(
            prop.value().to_string(),
            Relation {
                type_: "Relation".to_string(),
                relation: Some(relation),
            },
        );
    }
    if !related_to.is_empty() {
        js.related_to = Some(related_to);
    }

    if let Some(rule) = recurrence::read(event, ctx) {
        js.recurrence_rule = Some(rule);
    }
}

fn write_other(event: &mut IcalEvent, js: &JsEvent, ctx: &mut ConversionContext) {
    if let Some(title) = &js.title {
        event.summary(title);
    }
    if let Some(description) = &js.description {
        event.description(description);
    }
    if let Some(locale) = &js.locale {
        if let Some(prop) = event.properties().get("SUMMARY").cloned() {
            let mut prop = prop;
            prop.add_parameter("LANGUAGE", locale.clone());
            event.append_property(prop);
        }
    }

    ical::purge(event, "STATUS");
    if let Some(status) = js.status {
        event.append_property(Property::new("STATUS", status_to_ical(status)));
    }

    ical::purge(event, "CLASS");
    if let Some(privacy) = js.privacy {
        event.append_property(Property::new("CLASS", privacy_to_class(privacy)));
    }

    ical::purge(event, "TRANSP");
    if let Some(free_busy) = js.free_busy_status {
        let transp = match free_busy {
            FreeBusyStatus::Free => "TRANSPARENT",
            FreeBusyStatus::Busy => "OPAQUE",
        };
        event.append_property(Property::new("TRANSP", transp));
    }

    ical::purge(event, "COLOR");
    if let Some(color) = &js.color {
        event.append_property(Property::new("COLOR", color.clone()));
    }

    ical::purge(event, "PRIORITY");
    if let Some(priority) = js.priority {
        event.append_property(Property::new("PRIORITY", priority.to_string()));
    }

    event.append_property(Property::new("SEQUENCE", "0"));

    ical::purge(event, "CATEGORIES");
    if let Some(keywords) = &js.keywords {
        let joined = keywords.keys().cloned().collect::<Vec<_>>().join(",");
        if !joined.is_empty() {
            event.append_property(Property::new("CATEGORIES", joined));
        }
    }

    ical::purge(event, "RELATED-TO");
    if let Some(related_to) = &js.related_to {
        for (uid, relation) in related_to {
            let reltype = relation
                .relation
                .as_ref()
                .and_then(|r| r.keys().next())
                .cloned()
                .unwrap_or_else(|| "parent".to_string());
            let mut prop = Property::new("RELATED-TO", uid.clone());
            prop.add_parameter("RELTYPE", reltype.to_ascii_uppercase());
            ical::append(event, prop);
        }
    }

    if let Some(rule) = &js.recurrence_rule {
        recurrence::write(event, rule, ctx);
    }
}

/// `iCalToJs` for a single `VEVENT`, excluding `recurrenceOverrides` — the
/// caller in `lib.rs` assembles that after this returns, once it knows the
/// sibling exception `VEVENT`s.
pub fn read(event: &IcalEvent, ctx: &mut ConversionContext) -> JsEvent {
    let uid = event.get_uid().unwrap_or_default().to_string();
    let mut js = JsEvent::new(uid);

    let (start, end) = time::read(event, ctx);
    js.is_all_day = Some(start.is_date);
    js.start = Some(time::start_local_date_time(&start));
    js.time_zone = if start.is_date { None } else { start.tzid.clone() };
    js.duration = Some(time::duration_between(&start, end.as_ref()));

    read_other(event, &mut js, ctx);

    let end_tzid = end.as_ref().filter(|e| e.tzid != start.tzid).and_then(|e| e.tzid.clone());
    let end_id = event
        .properties()
        .get("DTEND")
        .map(|p| xparam::stable_id(p));

    ctx.with_prop("participants", |ctx| {
        let (participants, reply_to) = participants::read(event, ctx);
        if !participants.is_empty() || !reply_to.is_empty() {
            js.participants = Some(participants);
            js.reply_to = Some(reply_to);
        }
    });

    ctx.with_prop("alerts", |ctx| {
        let a = alerts::read(event, &start, end.as_ref(), ctx);
        if !a.is_empty() {
            js.alerts = Some(a);
        }
    });
    js.use_default_alerts = event.property_value(xparam::X_JMAP_USEDEFAULTALERTS)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    ctx.with_prop("locations", |ctx| {
        let (locs, vlocs) = locations::read(event, end_tzid.as_deref(), end_id.as_deref(), ctx);
        if !locs.is_empty() {
            js.locations = Some(locs);
        }
        if !vlocs.is_empty() {
            js.virtual_locations = Some(vlocs);
        }
    });

    let link_map = links::read(event);
    if !link_map.is_empty() {
        js.links = Some(link_map);
    }

    js
}

/// `jsToICal` for a single `VEVENT`. Each aspect writer purges its own
/// properties before (re)writing, per §4.1.
pub fn write(js: &JsEvent, event: &mut IcalEvent, config: &TranslatorConfig, ctx: &mut ConversionContext) {
    event.uid(&js.uid);

    let duration = js
        .duration
        .as_deref()
        .and_then(time::parse_duration)
        .unwrap_or_else(Duration::zero);
    let is_all_day = js.is_all_day.unwrap_or(false);

    let start_has_time_of_day = js
        .start
        .as_deref()
        .and_then(ical::parse_local_date_time)
        .map(|dt| dt.time() != chrono::NaiveTime::MIN)
        .unwrap_or(false);

    if is_all_day
        && (js.time_zone.is_some() || start_has_time_of_day || duration.num_seconds() % 86_400 != 0)
    {
        ctx.invalid_prop(Some("isAllDay"));
    }

    let end_tzid = js
        .locations
        .as_ref()
        .and_then(|locs| locs.values().find(|l| l.rel.as_deref() == Some("end")))
        .and_then(|l| l.time_zone.clone());

    if let Some(start) = &js.start {
        time::write(
            event,
            start,
            js.time_zone.as_deref(),
            duration,
            end_tzid.as_deref(),
            is_all_day,
        );
    }

    write_other(event, js, ctx);

    ctx.with_prop("participants", |ctx| {
        participants::write(
            event,
            js.participants.as_ref().unwrap_or(&BTreeMap::new()),
            js.reply_to.as_ref().unwrap_or(&BTreeMap::new()),
            ctx,
        );
    });

    ctx.with_prop("alerts", |ctx| {
        alerts::write(
            event,
            js.alerts.as_ref().unwrap_or(&BTreeMap::new()),
            config.calendar_user_address.as_deref(),
            ctx,
        );
    });
    if js.use_default_alerts {
        event.append_property(Property::new(xparam::X_JMAP_USEDEFAULTALERTS, "TRUE"));
    }

    ctx.with_prop("locations", |ctx| {
        locations::write(
            event,
            js.locations.as_ref().unwrap_or(&BTreeMap::new()),
            js.virtual_locations.as_ref().unwrap_or(&BTreeMap::new()),
            ctx,
        );
    });

    links::write(event, js.links.as_ref().unwrap_or(&BTreeMap::new()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_round_trips() {
        for status in [Status::Confirmed, Status::Tentative, Status::Cancelled] {
            let raw = status_to_ical(status);
            assert_eq!(status_from_ical(raw), Some(status));
        }
    }

    #[test]
    fn privacy_maps_confidential_to_secret() {
        assert_eq!(privacy_from_class("CONFIDENTIAL"), Some(Privacy::Secret));
        assert_eq!(privacy_to_class(Privacy::Secret), "CONFIDENTIAL");
    }
}

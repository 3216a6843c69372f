//! `ORGANIZER` + `ATTENDEE` ↔ `replyTo` + `participants` (§4.5).

use std::collections::BTreeMap;

use icalendar::{Component, Event as IcalEvent, Property};

use crate::context::ConversionContext;
use crate::ical;
use crate::model::{Attendance, Participant, ParticipantKind, ParticipationStatus};
use crate::xparam;

const MAX_DELEGATION_HOPS: usize = 64;

/// Lowercase the URI scheme; leave everything after the first `:` untouched.
pub fn normalize_uri(uri: &str) -> String {
    match uri.split_once(':') {
        Some((scheme, rest)) => format!("{}:{}", scheme.to_ascii_lowercase(), rest),
        None => uri.to_string(),
    }
}

/// Scheme case-insensitive, rest case-sensitive; plain equality if no scheme.
pub fn uri_equal(a: &str, b: &str) -> bool {
    match (a.split_once(':'), b.split_once(':')) {
        (Some((sa, ra)), Some((sb, rb))) => sa.eq_ignore_ascii_case(sb) && ra == rb,
        _ => a == b,
    }
}

struct AttendeeIndex<'a> {
    by_uri: Vec<(&'a str, &'a Property)>,
}

impl<'a> AttendeeIndex<'a> {
    fn find(&self, uri: &str) -> Option<&'a Property> {
        self.by_uri
            .iter()
            .find(|(u, _)| uri_equal(u, uri))
            .map(|(_, p)| *p)
    }

    fn id_for(&self, uri: &str) -> Option<String> {
        self.find(uri).map(xparam::stable_id)
    }
}

fn cutype_to_kind(cutype: Option<&str>) -> Option<ParticipantKind> {
    Some(match cutype?.to_ascii_uppercase().as_str() {
        "INDIVIDUAL" => ParticipantKind::Individual,
        "GROUP" => ParticipantKind::Group,
        "RESOURCE" => ParticipantKind::Resource,
        "ROOM" => ParticipantKind::Location,
        _ => ParticipantKind::Unknown,
    })
}

fn kind_to_cutype(kind: ParticipantKind) -> &'static str {
    match kind {
        ParticipantKind::Individual => "INDIVIDUAL",
        ParticipantKind::Group => "GROUP",
        ParticipantKind::Resource => "RESOURCE",
        ParticipantKind::Location => "ROOM",
        ParticipantKind::Unknown => "UNKNOWN",
    }
}

fn role_to_attendance(role: Option<&str>) -> (Attendance, bool) {
    match role.map(|r| r.to_ascii_uppercase()) {
        Some(r) if r == "REQ-PARTICIPANT" => (Attendance::Required, false),
        Some(r) if r == "OPT-PARTICIPANT" => (Attendance::Optional, false),
        Some(r) if r == "NON-PARTICIPANT" => (Attendance::None, false),
        Some(r) if r == "CHAIR" => (Attendance::Required, true),
        _ => (Attendance::Required, false),
    }
}

fn send_to_from_attendee(prop: &Property, uri: &str) -> BTreeMap<String, String> {
    let mut send_to = BTreeMap::new();
    for (name, param) in prop.params().iter() {
        if !name.eq_ignore_ascii_case(xparam::X_JMAP_RSVP_URI) {
            continue;
        }
        let value = param.value();
        match value.split_once(':') {
            Some((method, rest)) => send_to.insert(method.to_string(), rest.to_string()),
            None => send_to.insert("web".to_string(), value.to_string()),
        };
    }
    let already_present = send_to.values().any(|v| uri_equal(v, uri));
    if !already_present {
        if let Some(email) = uri.strip_prefix("mailto:").or_else(|| uri.strip_prefix("MAILTO:")) {
            send_to.insert("imip".to_string(), format!("mailto:{email}"));
        } else {
            send_to.insert("other".to_string(), uri.to_string());
        }
    }
    send_to
}

fn email_from(prop: &Property, send_to: &BTreeMap<String, String>) -> Option<String> {
    if let Some(email) = ical::param(prop, "EMAIL") {
        return Some(email.to_string());
    }
    send_to
        .get("imip")
        .and_then(|uri| uri.strip_prefix("mailto:").or_else(|| uri.strip_prefix("MAILTO:")))
        .map(|s| s.to_string())
}

fn resolve_participation_status(
    event: &IcalEvent,
    start_uri: &str,
    index: &AttendeeIndex,
) -> Option<ParticipationStatus> {
    let mut seen = std::collections::HashSet::new();
    let mut current = start_uri.to_string();
    for _ in 0..MAX_DELEGATION_HOPS {
        if !seen.insert(current.clone()) {
            return None;
        }
        let prop = index.find(&current)?;
        let partstat = ical::param(prop, "PARTSTAT").unwrap_or("NEEDS-ACTION").to_ascii_uppercase();
        if partstat == "DELEGATED" {
            if let Some(target) = ical::param(prop, "DELEGATED-TO") {
                current = target.to_string();
                continue;
            }
            return None;
        }
        return Some(match partstat.as_str() {
            "ACCEPTED" => ParticipationStatus::Accepted,
            "DECLINED" => ParticipationStatus::Declined,
            "TENTATIVE" => ParticipationStatus::Tentative,
            _ => ParticipationStatus::NeedsAction,
        });
    }
    None
}

fn uri_list(prop: &Property, param_name: &str) -> Vec<String> {
    prop.params()
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case(param_name))
        .map(|(_, param)| param.value().to_string())
        .collect()
}

fn ids_for_uris(uris: &[String], index: &AttendeeIndex) -> BTreeMap<String, bool> {
    uris.iter()
        .map(|uri| {
            index
                .id_for(uri)
                .unwrap_or_else(|| xparam::sha1_id_for_value(uri))
        })
        .map(|id| (id, true))
        .collect()
}

pub fn read(
    event: &IcalEvent,
    ctx: &mut ConversionContext,
) -> (BTreeMap<String, Participant>, BTreeMap<String, String>) {
    let attendee_props = ical::all_properties(event, "ATTENDEE");
    let organizer = event.properties().get("ORGANIZER");

    let index = AttendeeIndex {
        by_uri: attendee_props.iter().map(|p| (p.value(), *p)).collect(),
    };

    let mut participants = BTreeMap::new();

    for prop in &attendee_props {
        let uri = normalize_uri(prop.value());
        let id = xparam::stable_id(prop);
        let send_to = send_to_from_attendee(prop, &uri);
        let (attendance, is_chair) = role_to_attendance(ical::param(prop, "ROLE"));

        let mut roles: BTreeMap<String, bool> = prop
            .params()
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(xparam::X_JMAP_ROLE))
            .map(|(_, v)| (v.value().to_ascii_lowercase(), true))
            .collect();
        if is_chair {
            roles.insert("chair".to_string(), true);
        }
        if let Some(org) = organizer {
            if uri_equal(org.value(), prop.value()) {
                roles.insert("owner".to_string(), true);
            }
        }
        if roles.is_empty() {
            roles.insert("attendee".to_string(), true);
        }

        let delegated_to = uri_list(prop, "DELEGATED-TO");
        let delegated_from = uri_list(prop, "DELEGATED-FROM");
        let member_of = uri_list(prop, "MEMBER");

        let participant = Participant {
            type_: "Participant".to_string(),
            email: email_from(prop, &send_to),
            name: ical::param(prop, "CN").unwrap_or_default().to_string(),
            kind: cutype_to_kind(ical::param(prop, "CUTYPE")),
            attendance: Some(attendance),
            roles,
            location_id: None,
            participation_status: resolve_participation_status(event, prop.value(), &index),
            expect_reply: ical::param(prop, "RSVP")
                .map(|v| v.eq_ignore_ascii_case("TRUE"))
                .unwrap_or(false),
            delegated_to: (!delegated_to.is_empty()).then(|| ids_for_uris(&delegated_to, &index)),
            delegated_from: (!delegated_from.is_empty())
                .then(|| ids_for_uris(&delegated_from, &index)),
            member_of: (!member_of.is_empty()).then(|| ids_for_uris(&member_of, &index)),
            link_ids: None,
            schedule_sequence: ical::param(prop, xparam::X_JMAP_SEQUENCE)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            schedule_updated: ical::param(prop, xparam::X_JMAP_DTSTAMP).map(|s| s.to_string()),
            send_to: Some(send_to),
        };
        participants.insert(id, participant);
    }

    if let Some(org) = organizer {
        let already_attendee = attendee_props.iter().any(|a| uri_equal(a.value(), org.value()));
        if !already_attendee {
            let id = xparam::stable_id(org);
            let uri = normalize_uri(org.value());
            let mut roles = BTreeMap::new();
            roles.insert("owner".to_string(), true);
            let send_to = send_to_from_attendee(org, &uri);
            let participant = Participant {
                type_: "Participant".to_string(),
                email: email_from(org, &send_to),
                name: ical::param(org, "CN").unwrap_or_default().to_string(),
                kind: cutype_to_kind(ical::param(org, "CUTYPE")).or(Some(ParticipantKind::Individual)),
                attendance: Some(Attendance::Required),
                roles,
                location_id: None,
                participation_status: None,
                expect_reply: false,
                delegated_to: None,
                delegated_from: None,
                member_of: None,
                link_ids: None,
                schedule_sequence: 0,
                schedule_updated: None,
                send_to: Some(send_to),
            };
            participants.insert(id, participant);
        }
    }

    let reply_to = organizer
        .map(|org| send_to_from_attendee(org, &normalize_uri(org.value())))
        .unwrap_or_default();

    let _ = ctx;
    (participants, reply_to)
}

fn caladdress_for(participant: &Participant) -> Option<String> {
    let send_to = participant.send_to.as_ref()?;
    send_to
        .get("imip")
        .or_else(|| send_to.get("other"))
        .or_else(|| send_to.values().next())
        .cloned()
        .or_else(|| participant.email.as_ref().map(|e| format!("mailto:{e}")))
}

fn organizer_uri(reply_to: &BTreeMap<String, String>) -> Option<&String> {
    reply_to
        .get("imip")
        .or_else(|| reply_to.get("other"))
        .or_else(|| reply_to.values().next())
}

/// Structural equality per §7: the defaults that make an attendee collapse
/// into the bare `ORGANIZER` property.
fn equals_organizer_defaults(participant: &Participant, organizer_uri: &str) -> bool {
    let send_to_matches = participant
        .send_to
        .as_ref()
        .map(|send_to| {
            send_to.len() <= 1
                && send_to
                    .values()
                    .next()
                    .map(|v| uri_equal(v, organizer_uri))
                    .unwrap_or(true)
        })
        .unwrap_or(true);

    send_to_matches
        && participant.participation_status.is_none()
        && matches!(participant.attendance, Some(Attendance::Required) | None)
        && !participant.expect_reply
        && participant.schedule_sequence == 0
        && participant.schedule_updated.is_none()
        && participant.delegated_to.is_none()
        && participant.delegated_from.is_none()
        && participant.member_of.is_none()
        && participant
            .roles
            .iter()
            .all(|(k, v)| *v && (k == "owner" || k == "chair"))
}

pub fn write(
    event: &mut IcalEvent,
    participants: &BTreeMap<String, Participant>,
    reply_to: &BTreeMap<String, String>,
    ctx: &mut ConversionContext,
) {
    ical::purge(event, "ORGANIZER");
    ical::purge(event, "ATTENDEE");

    if participants.is_empty() && reply_to.is_empty() {
        return;
    }

    let Some(org_uri) = organizer_uri(reply_to) else {
        ctx.invalid_prop(Some("replyTo"));
        return;
    };

    let mut organizer = Property::new("ORGANIZER", org_uri.clone());
    for (method, uri) in reply_to {
        if method == "imip" && uri_equal(uri, org_uri) {
            continue;
        }
        organizer.add_parameter(xparam::X_JMAP_RSVP_URI, format!("{method}:{uri}"));
    }
    // Carry the organizer's own participant fields (if one matches `org_uri`)
    // onto `ORGANIZER` itself, since that participant may collapse below and
    // never get its own `ATTENDEE` to carry them (§4.5, §7 organizer-collapse).
    if let Some(org_participant) = participants
        .values()
        .find(|p| caladdress_for(p).map(|addr| uri_equal(&addr, org_uri)).unwrap_or(false))
    {
        if !org_participant.name.is_empty() {
            organizer.add_parameter("CN", org_participant.name.clone());
        }
        if let Some(email) = &org_participant.email {
            organizer.add_parameter("EMAIL", email.clone());
        }
        if let Some(kind) = org_participant.kind {
            organizer.add_parameter("CUTYPE", kind_to_cutype(kind));
        }
    }
    event.append_property(organizer);

    for (id, participant) in participants {
        if equals_organizer_defaults(participant, org_uri) {
            continue;
        }
        let Some(address) = caladdress_for(participant) else {
            ctx.with_prop("participants", |ctx| {
                ctx.with_prop(id.as_str(), |ctx| ctx.invalid_prop(Some("sendTo")))
            });
            continue;
        };
        let mut prop = Property::new("ATTENDEE", address);
        prop.add_parameter(xparam::X_JMAP_ID, id);
        if !participant.name.is_empty() {
            prop.add_parameter("CN", participant.name.clone());
        }
        if let Some(kind) = participant.kind {
            prop.add_parameter("CUTYPE", kind_to_cutype(kind));
        }
        let role = if participant.roles.contains_key("chair") {
            "CHAIR"
        } else {
            match participant.attendance {
                Some(Attendance::Optional) => "OPT-PARTICIPANT",
                Some(Attendance::None) => "NON-PARTICIPANT",
                _ => "REQ-PARTICIPANT",
            }
        };
        prop.add_parameter("ROLE", role);
        for (role_name, present) in &participant.roles {
            if *present && role_name != "chair" && role_name != "owner" && role_name != "attendee" {
                prop.add_parameter(xparam::X_JMAP_ROLE, role_name.to_ascii_uppercase());
            }
        }
        if participant.expect_reply {
            prop.add_parameter("RSVP", "TRUE");
        }
        if let Some(status) = participant.participation_status {
            let partstat = match status {
                ParticipationStatus::NeedsAction => "NEEDS-ACTION",
                ParticipationStatus::Accepted => "ACCEPTED",
                ParticipationStatus::Declined => "DECLINED",
                ParticipationStatus::Tentative => "TENTATIVE",
            };
            prop.add_parameter("PARTSTAT", partstat);
        }
        if let Some(send_to) = &participant.send_to {
            for (method, uri) in send_to {
                if method == "imip" && uri_equal(uri, &address) {
                    continue;
                }
                prop.add_parameter(xparam::X_JMAP_RSVP_URI, format!("{method}:{uri}"));
            }
        }
        if participant.schedule_sequence != 0 {
            prop.add_parameter(xparam::X_JMAP_SEQUENCE, participant.schedule_sequence.to_string());
        }
        if let Some(updated) = &participant.schedule_updated {
            prop.add_parameter(xparam::X_JMAP_DTSTAMP, updated.clone());
        }
        ical::append(event, prop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_normalization_lowercases_scheme_only() {
        assert_eq!(normalize_uri("MAILTO:Alice@Example.com"), "mailto:Alice@Example.com");
    }

    #[test]
    fn uri_equal_is_scheme_insensitive_rest_sensitive() {
        assert!(uri_equal("MAILTO:a@x", "mailto:a@x"));
        assert!(!uri_equal("mailto:a@x", "mailto:A@x"));
    }
}

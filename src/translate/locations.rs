//! `LOCATION`/`GEO`/`X-APPLE-STRUCTURED-LOCATION`/`X-JMAP-LOCATION`/`CONFERENCE`
//! ↔ `locations` + `virtualLocations` (§4.7).

use std::collections::BTreeMap;

use icalendar::{Component, Event as IcalEvent, Property};

use crate::context::ConversionContext;
use crate::ical;
use crate::model::{Location, VirtualLocation};
use crate::xparam;

fn location_from_property(prop: &Property, name_from_value: bool) -> Location {
    let mut location = Location::new();
    if name_from_value {
        location.name = Some(prop.value().to_string());
    }
    location.rel = ical::param(prop, xparam::X_JMAP_REL).map(|s| s.to_string());
    location.description = ical::param(prop, xparam::X_JMAP_DESCRIPTION).map(|s| s.to_string());
    location.time_zone = ical::param(prop, xparam::X_JMAP_TZID).map(|s| s.to_string());
    location.coordinates = ical::param(prop, xparam::X_JMAP_GEO).map(|s| s.to_string());
    let link_ids: BTreeMap<String, bool> = prop
        .params()
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case(xparam::X_JMAP_LINKID))
        .map(|(_, v)| (v.value().to_string(), true))
        .collect();
    if !link_ids.is_empty() {
        location.link_ids = Some(link_ids);
    }
    location
}

fn geo_uri_coordinates(value: &str) -> Option<String> {
    value.strip_prefix("geo:").map(|rest| format!("geo:{rest}"))
}

pub fn read(
    event: &IcalEvent,
    end_tzid: Option<&str>,
    end_id: Option<&str>,
    ctx: &mut ConversionContext,
) -> (BTreeMap<String, Location>, BTreeMap<String, VirtualLocation>) {
    let mut locations = BTreeMap::new();
    let mut virtual_locations = BTreeMap::new();

    if let (Some(tzid), Some(id)) = (end_tzid, end_id) {
        let mut loc = Location::new();
        loc.time_zone = Some(tzid.to_string());
        loc.rel = Some("end".to_string());
        locations.insert(id.to_string(), loc);
    }

    if let Some(prop) = event.properties().get("LOCATION") {
        let id = xparam::stable_id(prop);
        locations.insert(id, location_from_property(prop, true));
    }

    if let Some(prop) = event.properties().get("GEO") {
        let id = xparam::stable_id(prop);
        let mut loc = Location::new();
        loc.coordinates = Some(format!("geo:{}", prop.value()));
        locations.insert(id, loc);
    }

    if let Some(prop) = event.properties().get("X-APPLE-STRUCTURED-LOCATION") {
        if let Some(coords) = geo_uri_coordinates(prop.value()) {
            let id = xparam::stable_id(prop);
            let mut loc = Location::new();
            loc.coordinates = Some(coords);
            loc.name = ical::param(prop, "X-TITLE").map(|s| s.to_string());
            locations.insert(id, loc);
        }
    }

    for prop in ical::all_properties(event, "X-JMAP-LOCATION") {
        let id = xparam::stable_id(prop);
        locations.insert(id, location_from_property(prop, true));
    }

    for prop in ical::all_properties(event, "CONFERENCE") {
        let id = xparam::stable_id(prop);
        let vloc = VirtualLocation {
            type_: "VirtualLocation".to_string(),
            uri: prop.value().to_string(),
            name: ical::param(prop, "LABEL").map(|s| s.to_string()),
            description: None,
        };
        virtual_locations.insert(id, vloc);
    }

    let _ = ctx;
    (locations, virtual_locations)
}

/// A location is invalid (§4.7) if it carries no property besides `rel` —
/// skipped on write with a property error, but other locations still write.
fn is_invalid_location(location: &Location) -> bool {
    location.name.is_none()
        && location.description.is_none()
        && location.time_zone.is_none()
        && location.coordinates.is_none()
        && location.link_ids.is_none()
}

pub fn write(
    event: &mut IcalEvent,
    locations: &BTreeMap<String, Location>,
    virtual_locations: &BTreeMap<String, VirtualLocation>,
    ctx: &mut ConversionContext,
) {
    ical::purge(event, "LOCATION");
    ical::purge(event, "GEO");
    ical::purge(event, "X-APPLE-STRUCTURED-LOCATION");
    ical::purge(event, "X-JMAP-LOCATION");
    ical::purge(event, "CONFERENCE");

    let mut first = true;
    for (id, location) in locations {
        if location.rel.as_deref() == Some("end") {
            continue; // absorbed by the time/zone translator.
        }
        if is_invalid_location(location) {
            ctx.with_prop(id.as_str(), |ctx| ctx.invalid_prop(None));
            continue;
        }
        let name = location.name.clone().unwrap_or_default();
        let prop_name = if first { "LOCATION" } else { "X-JMAP-LOCATION" };
        first = false;
        let mut prop = Property::new(prop_name, name);
        prop.add_parameter(xparam::X_JMAP_ID, id);
        if let Some(rel) = &location.rel {
            prop.add_parameter(xparam::X_JMAP_REL, rel.clone());
        }
        if let Some(description) = &location.description {
            prop.add_parameter(xparam::X_JMAP_DESCRIPTION, description.clone());
        }
        if let Some(tz) = &location.time_zone {
            prop.add_parameter(xparam::X_JMAP_TZID, tz.clone());
        }
        if let Some(coords) = &location.coordinates {
            prop.add_parameter(xparam::X_JMAP_GEO, coords.clone());
        }
        if let Some(link_ids) = &location.link_ids {
            for link_id in link_ids.keys() {
                prop.add_parameter(xparam::X_JMAP_LINKID, link_id.clone());
            }
        }
        if prop_name == "LOCATION" {
            event.append_property(prop);
        } else {
            ical::append(event, prop);
        }
    }

    for (id, vloc) in virtual_locations {
        let mut prop = Property::new("CONFERENCE", vloc.uri.clone());
        prop.add_parameter(xparam::X_JMAP_ID, id);
        if let Some(name) = &vloc.name {
            prop.add_parameter("LABEL", name.clone());
        }
        ical::append(event, prop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_uri_prefix_is_recognized() {
        assert_eq!(
            geo_uri_coordinates("geo:48.85,2.35"),
            Some("geo:48.85,2.35".to_string())
        );
        assert_eq!(geo_uri_coordinates("https://example.com"), None);
    }

    #[test]
    fn location_with_only_rel_is_invalid() {
        let mut loc = Location::new();
        loc.rel = Some("parking".to_string());
        assert!(is_invalid_location(&loc));
    }

    #[test]
    fn location_with_a_name_is_valid() {
        let mut loc = Location::new();
        loc.name = Some("Room 1".to_string());
        assert!(!is_invalid_location(&loc));
    }

    #[test]
    fn invalid_location_is_skipped_but_recorded() {
        let mut event = IcalEvent::new();
        let mut locations = BTreeMap::new();
        let mut bad = Location::new();
        bad.rel = Some("parking".to_string());
        locations.insert("loc1".to_string(), bad);
        let mut good = Location::new();
        good.name = Some("Room 1".to_string());
        locations.insert("loc2".to_string(), good);

        let mut ctx = ConversionContext::new();
        write(&mut event, &locations, &BTreeMap::new(), &mut ctx);

        assert!(ctx.has_errors());
        assert_eq!(event.property_value("LOCATION"), Some("Room 1"));
    }
}

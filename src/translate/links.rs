//! `ATTACH` + `URL` ↔ `links` (§4.8).

use std::collections::BTreeMap;

use icalendar::{Component, Event as IcalEvent, Property};

use crate::ical;
use crate::model::Link;
use crate::xparam;

fn looks_like_url(value: &str) -> bool {
    value.contains("://")
}

pub fn read(event: &IcalEvent) -> BTreeMap<String, Link> {
    let mut links = BTreeMap::new();

    for prop in ical::all_properties(event, "ATTACH") {
        if !looks_like_url(prop.value()) {
            continue; // binary ATTACH is skipped.
        }
        let id = xparam::stable_id(prop);
        let link = Link {
            type_: "Link".to_string(),
            href: prop.value().to_string(),
            content_type: ical::param(prop, "FMTTYPE").map(|s| s.to_string()),
            title: ical::param(prop, xparam::X_JMAP_TITLE).map(|s| s.to_string()),
            rel: ical::param(prop, xparam::X_JMAP_REL).map(|s| s.to_string()),
            cid: ical::param(prop, xparam::X_JMAP_CID).map(|s| s.to_string()),
            display: ical::param(prop, xparam::X_JMAP_DISPLAY).map(|s| s.to_string()),
            size: ical::param(prop, "SIZE").and_then(|s| s.parse().ok()),
        };
        links.insert(id, link);
    }

    if let Some(prop) = event.properties().get("URL") {
        let id = xparam::stable_id(prop);
        let link = Link {
            type_: "Link".to_string(),
            href: prop.value().to_string(),
            content_type: None,
            title: ical::param(prop, xparam::X_JMAP_TITLE).map(|s| s.to_string()),
            rel: ical::param(prop, xparam::X_JMAP_REL)
                .map(|s| s.to_string())
                .or_else(|| Some("describedby".to_string())),
            cid: None,
            display: None,
            size: None,
        };
        links.insert(id, link);
    }

    links
}

fn is_bare_describedby(link: &Link) -> bool {
    link.rel.as_deref() == Some("describedby")
        && link.content_type.is_none()
        && link.title.is_none()
        && link.cid.is_none()
        && link.display.is_none()
        && link.size.is_none()
}

pub fn write(event: &mut IcalEvent, links: &BTreeMap<String, Link>) {
    ical::purge(event, "ATTACH");
    ical::purge(event, "URL");

    let mut url_written = false;
    for (id, link) in links {
        if !url_written && is_bare_describedby(link) {
            let mut prop = Property::new("URL", link.href.clone());
            prop.add_parameter(xparam::X_JMAP_ID, id);
            event.append_property(prop);
            url_written = true;
            continue;
        }
        let mut prop = Property::new("ATTACH", link.href.clone());
        prop.add_parameter(xparam::X_JMAP_ID, id);
        if let Some(content_type) = &link.content_type {
            prop.add_parameter("FMTTYPE", content_type.clone());
        }
        if let Some(size) = link.size {
            prop.add_parameter("SIZE", size.to_string());
        }
        if let Some(title) = &link.title {
            prop.add_parameter(xparam::X_JMAP_TITLE, title.clone());
        }
        if let Some(cid) = &link.cid {
            prop.add_parameter(xparam::X_JMAP_CID, cid.clone());
        }
        if let Some(display) = &link.display {
            prop.add_parameter(xparam::X_JMAP_DISPLAY, display.clone());
        }
        if let Some(rel) = &link.rel {
            if rel != "describedby" {
                prop.add_parameter(xparam::X_JMAP_REL, rel.clone());
            }
        }
        ical::append(event, prop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_describedby_link_collapses_to_url() {
        let link = Link {
            type_: "Link".to_string(),
            href: "https://example.com/doc".to_string(),
            content_type: None,
            title: None,
            rel: Some("describedby".to_string()),
            cid: None,
            display: None,
            size: None,
        };
        assert!(is_bare_describedby(&link));
    }
}

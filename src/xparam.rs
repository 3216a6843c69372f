//! The `X-JMAP-*` side channel (§6) and the SHA-1 identity fallback used
//! when an iCal property carries no stable id of its own (§3, §9).

use icalendar::Property;
use sha1::{Digest, Sha1};

pub const X_JMAP_ID: &str = "X-JMAP-ID";
pub const X_JMAP_ROLE: &str = "X-JMAP-ROLE";
pub const X_JMAP_RSVP_URI: &str = "X-JMAP-RSVP-URI";
pub const X_JMAP_LOCATIONID: &str = "X-JMAP-LOCATIONID";
pub const X_JMAP_LINKID: &str = "X-JMAP-LINKID";
pub const X_JMAP_SEQUENCE: &str = "X-JMAP-SEQUENCE";
pub const X_JMAP_DTSTAMP: &str = "X-JMAP-DTSTAMP";
pub const X_JMAP_TITLE: &str = "X-JMAP-TITLE";
pub const X_JMAP_REL: &str = "X-JMAP-REL";
pub const X_JMAP_DESCRIPTION: &str = "X-JMAP-DESCRIPTION";
pub const X_JMAP_TZID: &str = "X-JMAP-TZID";
pub const X_JMAP_GEO: &str = "X-JMAP-GEO";
pub const X_JMAP_CID: &str = "X-JMAP-CID";
pub const X_JMAP_DISPLAY: &str = "X-JMAP-DISPLAY";
pub const X_JMAP_LOCATION_PROP: &str = "X-JMAP-LOCATION";
pub const X_JMAP_USEDEFAULTALERTS: &str = "X-JMAP-USEDEFAULTALERTS";

/// `[A-Za-z0-9_-]{1,255}` — the JSCalendar id grammar (§3).
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 255
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Deterministic fallback id: lower-hex SHA-1 of the property's canonical
/// textual form, as produced by the iCal library's own stringifier.
///
/// Callers must pass the *exact* bytes the iCal library would write for this
/// property (name, parameters in their serialized order, and value) — a
/// hand-rolled re-serialization would drift the id across implementations.
pub fn sha1_id(canonical_text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(canonical_text.as_bytes());
    hex::encode(hasher.finalize())
}

/// The canonical text of a `Property` as this crate hashes it: `NAME;PARAM=val;...:VALUE`,
/// parameters sorted by name to make the hash stable regardless of insertion order.
pub fn canonical_property_text(prop: &Property) -> String {
    let mut out = String::new();
    out.push_str(prop.key());
    let mut params: Vec<(&str, &str)> = prop
        .params()
        .iter()
        .map(|(k, v)| (k.as_str(), v.value()))
        .collect();
    params.sort_unstable_by_key(|(k, _)| *k);
    for (key, value) in params {
        out.push(';');
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out.push(':');
    out.push_str(prop.value());
    out
}

/// Stable participant/location/link id for a property: its `X-JMAP-ID`
/// parameter if present, else the SHA-1 fallback over its canonical text.
pub fn stable_id(prop: &Property) -> String {
    prop.params()
        .get(X_JMAP_ID)
        .map(|p| p.value().to_string())
        .unwrap_or_else(|| sha1_id(&canonical_property_text(prop)))
}

/// Stable id derived from a raw value string (used where there is no single
/// backing `Property`, e.g. a `memberOf` URI that resolves to no attendee).
pub fn sha1_id_for_value(value: &str) -> String {
    sha1_id(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_id_accepts_alnum_underscore_dash() {
        assert!(is_valid_id("abc_123-X"));
    }

    #[test]
    fn valid_id_rejects_empty_and_bad_chars() {
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("has space"));
        assert!(!is_valid_id("has/slash"));
    }

    #[test]
    fn sha1_id_is_deterministic() {
        let a = sha1_id_for_value("mailto:alice@example.com");
        let b = sha1_id_for_value("mailto:alice@example.com");
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn sha1_id_differs_for_different_input() {
        let a = sha1_id_for_value("mailto:alice@example.com");
        let b = sha1_id_for_value("mailto:bob@example.com");
        assert_ne!(a, b);
    }
}

//! Thin adapter over the `icalendar` crate: the one place this crate leans
//! on the iCal library's exact property/parameter API, so every other
//! translator module talks in terms of plain Rust values.

use chrono::{DateTime, NaiveDateTime, Utc};
use icalendar::{Component, Parameter, Property};

/// Read a single parameter's raw string value off a property, if present and valid UTF-8.
///
/// Per §7 recovery policy, a malformed parameter value is treated as absent
/// rather than as a fatal error.
pub fn param<'a>(prop: &'a Property, name: &str) -> Option<&'a str> {
    prop.params().get(name).map(Parameter::value)
}

/// Build (or extend) a property with a set of `(name, value)` parameters.
pub fn with_params(mut prop: Property, params: &[(&str, &str)]) -> Property {
    for (k, v) in params {
        prop.add_parameter(*k, *v);
    }
    prop
}

/// A plain property with no parameters.
pub fn simple_property(name: &str, value: impl Into<String>) -> Property {
    Property::new(name, value.into())
}

/// Append a property that may repeat (`ATTENDEE`, `ATTACH`, `RDATE`, `EXDATE`,
/// `RELATED-TO`, `CATEGORIES`), landing it in the `multi_properties()` store
/// `all_properties` reads back from — `append_property` would instead
/// overwrite the single-valued `properties` map entry of the same name.
pub fn append<C: Component>(component: &mut C, prop: Property) {
    component.append_multi_property(prop);
}

/// All values of a possibly-repeated property.
pub fn all_properties<'a, C: Component>(component: &'a C, name: &str) -> Vec<&'a Property> {
    component
        .multi_properties()
        .get(name)
        .map(|v| v.iter().collect())
        .unwrap_or_default()
}

/// Remove every occurrence of a property, single- or multi-valued.
pub fn purge<C: Component>(component: &mut C, name: &str) {
    component.remove_property(name);
}

// -- LocalDateTime / UTC-Date formatting (glossary) --

/// `2022-03-07T09:15:00` — RFC-3339 with the trailing zone designator stripped.
pub fn format_local_date_time(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub fn parse_local_date_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok()
}

/// `2022-01-01T10:15:00Z` — RFC-3339 with a trailing `Z`.
pub fn format_utc_date(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn parse_utc_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn local_date_time_roundtrip() {
        let dt = NaiveDate::from_ymd_opt(2022, 3, 7)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        let s = format_local_date_time(dt);
        assert_eq!(s, "2022-03-07T09:15:00");
        assert_eq!(parse_local_date_time(&s), Some(dt));
    }

    #[test]
    fn utc_date_roundtrip() {
        let dt = DateTime::parse_from_rfc3339("2022-01-01T10:15:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let s = format_utc_date(dt);
        assert_eq!(s, "2022-01-01T10:15:00Z");
        assert_eq!(parse_utc_date(&s), Some(dt));
    }

    #[test]
    fn param_reads_parameter_value() {
        let mut prop = Property::new("ATTENDEE", "mailto:a@example.com");
        prop.add_parameter("ROLE", "CHAIR");
        assert_eq!(param(&prop, "ROLE"), Some("CHAIR"));
        assert_eq!(param(&prop, "MISSING"), None);
    }
}

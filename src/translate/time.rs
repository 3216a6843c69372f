//! DTSTART/DTEND ↔ `start`/`duration`/`timeZone`/`isAllDay` (§4.2).

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use icalendar::{Component, DatePerhapsTime, Event as IcalEvent};

use crate::context::ConversionContext;
use crate::ical;

/// A `DTSTART`/`DTEND` value resolved into the three things the rest of the
/// translator cares about: its naive wall-clock value, the Olson zone it's
/// pinned to (`None` = floating), and whether it was a bare `DATE`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTime {
    pub naive: NaiveDateTime,
    pub tzid: Option<String>,
    pub is_date: bool,
}

impl ResolvedTime {
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        let tz: Tz = self.tzid.as_deref()?.parse().ok()?;
        let local = tz.from_local_datetime(&self.naive).single()?;
        Some(local.with_timezone(&Utc))
    }
}

use chrono::TimeZone;

pub fn resolve(dpt: &DatePerhapsTime) -> ResolvedTime {
    match dpt {
        DatePerhapsTime::Date(date) => ResolvedTime {
            naive: date.and_hms_opt(0, 0, 0).unwrap(),
            tzid: None,
            is_date: true,
        },
        DatePerhapsTime::DateTime(cdt) => match cdt {
            icalendar::CalendarDateTime::Utc(dt) => ResolvedTime {
                naive: dt.naive_utc(),
                tzid: Some("UTC".to_string()),
                is_date: false,
            },
            icalendar::CalendarDateTime::Floating(dt) => ResolvedTime {
                naive: *dt,
                tzid: None,
                is_date: false,
            },
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => ResolvedTime {
                naive: *date_time,
                tzid: Some(tzid.clone()),
                is_date: false,
            },
        },
    }
}

/// Converts a naive date-time from one Olson zone to another, passing it
/// through UTC. Leaves the value untouched if either zone is missing or
/// unrecognized — a floating value, or one already sharing the target zone
/// implicitly (no `TZID` given), needs no conversion (§4.4 "rezoning to the
/// start zone").
pub fn rezone(naive: NaiveDateTime, from_tzid: Option<&str>, to_tzid: Option<&str>) -> NaiveDateTime {
    let (Some(from), Some(to)) = (from_tzid, to_tzid) else {
        return naive;
    };
    if from.eq_ignore_ascii_case(to) {
        return naive;
    }
    let (Ok(from_tz), Ok(to_tz)) = (Tz::from_str(from), Tz::from_str(to)) else {
        return naive;
    };
    let Some(localized) = from_tz.from_local_datetime(&naive).single() else {
        return naive;
    };
    localized.with_timezone(&to_tz).naive_local()
}

/// `start` as a LocalDateTime string (trailing zone designator always stripped).
pub fn start_local_date_time(resolved: &ResolvedTime) -> String {
    ical::format_local_date_time(resolved.naive)
}

/// Positive ISO-8601 duration between two resolved instants, each evaluated
/// in its own zone, per §4.2. `PT0S` if `end` is missing or not after `start`.
pub fn duration_between(start: &ResolvedTime, end: Option<&ResolvedTime>) -> String {
    let end = match end {
        Some(e) => e,
        None => return "PT0S".to_string(),
    };
    let delta = match (start.to_utc(), end.to_utc()) {
        (Some(s), Some(e)) => e - s,
        _ => end.naive - start.naive,
    };
    if delta <= Duration::zero() {
        return "PT0S".to_string();
    }
    format_duration(delta)
}

/// Formats a positive `Duration` as `P[nD][T[nH][nM][nS]]`, always emitting
/// at least one component (`PT0S` for a zero duration).
pub fn format_duration(delta: Duration) -> String {
    let total_seconds = delta.num_seconds();
    if total_seconds == 0 {
        return "PT0S".to_string();
    }
    let days = total_seconds / 86_400;
    let rem = total_seconds % 86_400;
    let hours = rem / 3_600;
    let minutes = (rem % 3_600) / 60;
    let seconds = rem % 60;

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || seconds > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 {
            out.push_str(&format!("{seconds}S"));
        }
    }
    out
}

/// Parses a subset of ISO-8601 durations sufficient for this translator's
/// own output: `P[nD]T[nH][nM][nS]`. Returns `None` on anything else (weeks,
/// months, years are not produced by this translator and are rejected as a
/// property error by the caller).
pub fn parse_duration(s: &str) -> Option<Duration> {
    let rest = s.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };
    let mut total = Duration::zero();
    if !date_part.is_empty() {
        let days: i64 = date_part.strip_suffix('D')?.parse().ok()?;
        total += Duration::days(days);
    }
    if let Some(time_part) = time_part {
        let mut remaining = time_part;
        if let Some(idx) = remaining.find('H') {
            let hours: i64 = remaining[..idx].parse().ok()?;
            total += Duration::hours(hours);
            remaining = &remaining[idx + 1..];
        }
        if let Some(idx) = remaining.find('M') {
            let minutes: i64 = remaining[..idx].parse().ok()?;
            total += Duration::minutes(minutes);
            remaining = &remaining[idx + 1..];
        }
        if let Some(idx) = remaining.find('S') {
            let seconds: i64 = remaining[..idx].parse().ok()?;
            total += Duration::seconds(seconds);
        }
    }
    Some(total)
}

/// Reads `DTSTART`/`DTEND` off a VEVENT and fills in the JsEvent fields this
/// module owns: `start`, `timeZone`, `isAllDay`, `duration`. Returns the
/// resolved start/end pair so callers (locations, recurrence) can reuse them
/// without re-parsing the property.
pub fn read(event: &IcalEvent, ctx: &mut ConversionContext) -> (ResolvedTime, Option<ResolvedTime>) {
    let start = event
        .get_start()
        .map(|dpt| resolve(&dpt))
        .unwrap_or_else(|| {
            ctx.invalid_prop(Some("start"));
            ResolvedTime {
                naive: NaiveDate::from_ymd_opt(1970, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                tzid: None,
                is_date: false,
            }
        });
    let end = event.get_end().map(|dpt| resolve(&dpt));
    (start, end)
}

/// Writes `DTSTART`/`DTEND` given a resolved start and a duration, honoring
/// an optional differing end-zone (carried by the locations translator).
/// When `end_tzid` differs from the start zone, `DTEND` is written explicitly
/// and `DURATION` is omitted; otherwise `DTSTART + DURATION` is encoded.
pub fn write(
    event: &mut IcalEvent,
    start_local: &str,
    time_zone: Option<&str>,
    duration: Duration,
    end_tzid: Option<&str>,
    is_all_day: bool,
) {
    ical::purge(event, "DTSTART");
    ical::purge(event, "DTEND");
    ical::purge(event, "DURATION");

    if is_all_day {
        let date = NaiveDate::parse_from_str(&start_local[..10], "%Y-%m-%d").unwrap_or_else(|_| {
            NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
        });
        event.starts(date);
        if duration > Duration::zero() {
            let days = duration.num_days().max(1);
            event.ends(date + Duration::days(days));
        }
        return;
    }

    let naive = ical::parse_local_date_time(start_local).unwrap_or_else(|| {
        NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    });

    match time_zone {
        None => {
            event.append_property(icalendar::Property::new(
                "DTSTART",
                ical::format_local_date_time(naive),
            ));
        }
        Some(tzid) => {
            let tz: Option<Tz> = Tz::from_str(tzid).ok();
            if let Some(tz) = tz {
                if let Some(local) = tz.from_local_datetime(&naive).single() {
                    event.starts(local);
                }
            }
        }
    }

    let end_zone = end_tzid.or(time_zone);
    if end_zone == time_zone {
        if duration > Duration::zero() {
            event.append_property(icalendar::Property::new(
                "DURATION",
                format_duration(duration),
            ));
        }
    } else if let Some(end_tzid) = end_tzid {
        let end_naive = naive + duration;
        if let Ok(tz) = Tz::from_str(end_tzid) {
            if let Some(local) = tz.from_local_datetime(&end_naive).single() {
                event.ends(local);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_hours() {
        assert_eq!(format_duration(Duration::hours(3)), "PT3H");
    }

    #[test]
    fn format_duration_zero() {
        assert_eq!(format_duration(Duration::zero()), "PT0S");
    }

    #[test]
    fn parse_duration_roundtrip() {
        let d = Duration::hours(3) + Duration::minutes(30);
        let s = format_duration(d);
        assert_eq!(parse_duration(&s), Some(d));
    }

    #[test]
    fn resolve_bare_date_is_all_day() {
        let date = NaiveDate::from_ymd_opt(2022, 3, 7).unwrap();
        let resolved = resolve(&DatePerhapsTime::Date(date));
        assert!(resolved.is_date);
        assert_eq!(resolved.tzid, None);
        assert_eq!(start_local_date_time(&resolved), "2022-03-07T00:00:00");
    }

    #[test]
    fn rezone_converts_between_named_zones() {
        let naive = NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let converted = rezone(naive, Some("UTC"), Some("Europe/Berlin"));
        assert_eq!(converted.format("%H:%M").to_string(), "10:00");
    }

    #[test]
    fn rezone_is_noop_without_both_zones() {
        let naive = NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        assert_eq!(rezone(naive, None, Some("Europe/Berlin")), naive);
        assert_eq!(rezone(naive, Some("Europe/Berlin"), None), naive);
    }
}

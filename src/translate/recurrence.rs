//! `RRULE` ↔ `recurrenceRule` (§4.3).
//!
//! This translator only ever reads and writes the rule's *text*; it never
//! enumerates instances, so it has no dependency on a recurrence-expansion
//! crate — just a small parser/serializer for the RFC 5545 grammar.

use icalendar::{Component, Event as IcalEvent, Property};

use crate::context::ConversionContext;
use crate::ical;
use crate::model::{NDay, RecurrenceRule, Skip};

const WEEKDAYS: [&str; 7] = ["mo", "tu", "we", "th", "fr", "sa", "su"];

fn freq_to_js(freq: &str) -> Option<&'static str> {
    Some(match freq {
        "SECONDLY" => "secondly",
        "MINUTELY" => "minutely",
        "HOURLY" => "hourly",
        "DAILY" => "daily",
        "WEEKLY" => "weekly",
        "MONTHLY" => "monthly",
        "YEARLY" => "yearly",
        _ => return None,
    })
}

fn freq_to_ical(freq: &str) -> Option<&'static str> {
    Some(match freq {
        "secondly" => "SECONDLY",
        "minutely" => "MINUTELY",
        "hourly" => "HOURLY",
        "daily" => "DAILY",
        "weekly" => "WEEKLY",
        "monthly" => "MONTHLY",
        "yearly" => "YEARLY",
        _ => return None,
    })
}

fn parse_byday(token: &str) -> Option<NDay> {
    let (nth, day) = token.split_at(token.len().saturating_sub(2));
    if !WEEKDAYS.contains(&day.to_ascii_lowercase().as_str()) {
        return None;
    }
    let nth_of_period = if nth.is_empty() {
        None
    } else {
        nth.parse::<i32>().ok()
    };
    Some(NDay {
        type_: "NDay".to_string(),
        day: day.to_ascii_lowercase(),
        nth_of_period,
    })
}

fn byday_to_ical(nday: &NDay) -> String {
    let mut out = String::new();
    if let Some(n) = nday.nth_of_period {
        out.push_str(&n.to_string());
    }
    out.push_str(&nday.day.to_ascii_uppercase());
    out
}

/// Parses a raw `RRULE` value (without the `RRULE:` prefix) into a
/// `recurrenceRule`. Unknown or malformed parts are ignored per-field rather
/// than failing the whole rule, matching the translator's general recovery
/// stance on enumerations (§7) — the overall rule is only rejected (via the
/// caller recording a property error) if `FREQ` itself is missing/unknown.
pub fn parse_rrule(raw: &str, ctx: &mut ConversionContext) -> Option<RecurrenceRule> {
    let mut freq: Option<&str> = None;
    let mut rule = RecurrenceRule::new("");

    for part in raw.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.to_ascii_uppercase().as_str() {
            "FREQ" => freq = freq_to_js(&value.to_ascii_uppercase()),
            "INTERVAL" => rule.interval = value.parse().ok().filter(|v| *v != 1),
            "RSCALE" => rule.rscale = Some(value.to_string()),
            "SKIP" => {
                rule.skip = match value.to_ascii_uppercase().as_str() {
                    "OMIT" => Some(Skip::Omit),
                    "BACKWARD" => Some(Skip::Backward),
                    "FORWARD" => Some(Skip::Forward),
                    _ => None,
                }
            }
            "WKST" => {
                let lower = value.to_ascii_lowercase();
                if lower != "mo" {
                    rule.first_day_of_week = Some(lower);
                }
            }
            "BYDAY" => {
                let days: Vec<NDay> = value.split(',').filter_map(parse_byday).collect();
                if !days.is_empty() {
                    rule.by_day = Some(days);
                }
            }
            "BYMONTH" => {
                rule.by_month = Some(value.split(',').map(|s| s.to_string()).collect());
            }
            "BYMONTHDAY" => {
                let mut v: Vec<i32> = value.split(',').filter_map(|s| s.parse().ok()).collect();
                v.sort_unstable();
                rule.by_date = Some(v);
            }
            "BYYEARDAY" => {
                let mut v: Vec<i32> = value.split(',').filter_map(|s| s.parse().ok()).collect();
                v.sort_unstable();
                rule.by_year_day = Some(v);
            }
            "BYWEEKNO" => {
                let mut v: Vec<i32> = value.split(',').filter_map(|s| s.parse().ok()).collect();
                v.sort_unstable();
                rule.by_week_no = Some(v);
            }
            "BYHOUR" => {
                let mut v: Vec<u32> = value.split(',').filter_map(|s| s.parse().ok()).collect();
                v.sort_unstable();
                rule.by_hour = Some(v);
            }
            "BYMINUTE" => {
                let mut v: Vec<u32> = value.split(',').filter_map(|s| s.parse().ok()).collect();
                v.sort_unstable();
                rule.by_minute = Some(v);
            }
            "BYSECOND" => {
                let mut v: Vec<u32> = value.split(',').filter_map(|s| s.parse().ok()).collect();
                v.sort_unstable();
                rule.by_second = Some(v);
            }
            "BYSETPOS" => {
                let mut v: Vec<i32> = value.split(',').filter_map(|s| s.parse().ok()).collect();
                v.sort_unstable();
                rule.by_set_position = Some(v);
            }
            "COUNT" => rule.count = value.parse().ok(),
            "UNTIL" => rule.until = Some(value.to_string()),
            _ => {}
        }
    }

    let Some(freq) = freq else {
        ctx.invalid_prop(Some("recurrenceRule/frequency"));
        return None;
    };
    if rule.count.is_some() && rule.until.is_some() {
        ctx.invalid_prop(Some("recurrenceRule"));
        return None;
    }
    rule.frequency = freq.to_string();
    Some(rule)
}

/// Serializes a `recurrenceRule` back into a raw `RRULE` value.
pub fn write_rrule(rule: &RecurrenceRule, ctx: &mut ConversionContext) -> Option<String> {
    if rule.count.is_some() && rule.until.is_some() {
        ctx.invalid_prop(Some("recurrenceRule"));
        return None;
    }
    let Some(freq) = freq_to_ical(&rule.frequency) else {
        ctx.invalid_prop(Some("recurrenceRule/frequency"));
        return None;
    };

    let mut parts = vec![format!("FREQ={freq}")];
    if let Some(rscale) = &rule.rscale {
        parts.push(format!("RSCALE={rscale}"));
    }
    if let Some(interval) = rule.interval {
        if interval != 1 {
            parts.push(format!("INTERVAL={interval}"));
        }
    }
    if let Some(skip) = rule.skip {
        let s = match skip {
            Skip::Omit => "OMIT",
            Skip::Backward => "BACKWARD",
            Skip::Forward => "FORWARD",
        };
        parts.push(format!("SKIP={s}"));
    }
    if let Some(wkst) = &rule.first_day_of_week {
        if wkst != "mo" {
            parts.push(format!("WKST={}", wkst.to_ascii_uppercase()));
        }
    }
    if let Some(by_day) = &rule.by_day {
        for nday in by_day {
            if nday.nth_of_period == Some(0) {
                ctx.invalid_prop(Some("recurrenceRule/byDay"));
                return None;
            }
        }
        let joined = by_day.iter().map(byday_to_ical).collect::<Vec<_>>().join(",");
        parts.push(format!("BYDAY={joined}"));
    }
    if let Some(by_month) = &rule.by_month {
        parts.push(format!("BYMONTH={}", by_month.join(",")));
    }
    if let Some(by_date) = &rule.by_date {
        if !by_date.iter().all(|d| (1..=31).contains(&d.abs())) {
            ctx.invalid_prop(Some("recurrenceRule/byDate"));
            return None;
        }
        parts.push(format!("BYMONTHDAY={}", join_i32(by_date)));
    }
    if let Some(by_year_day) = &rule.by_year_day {
        if !by_year_day.iter().all(|d| (1..=366).contains(&d.abs())) {
            ctx.invalid_prop(Some("recurrenceRule/byYearDay"));
            return None;
        }
        parts.push(format!("BYYEARDAY={}", join_i32(by_year_day)));
    }
    if let Some(by_week_no) = &rule.by_week_no {
        if !by_week_no.iter().all(|d| (1..=53).contains(&d.abs())) {
            ctx.invalid_prop(Some("recurrenceRule/byWeekNo"));
            return None;
        }
        parts.push(format!("BYWEEKNO={}", join_i32(by_week_no)));
    }
    if let Some(by_hour) = &rule.by_hour {
        if !by_hour.iter().all(|h| *h <= 23) {
            ctx.invalid_prop(Some("recurrenceRule/byHour"));
            return None;
        }
        parts.push(format!("BYHOUR={}", join_u32(by_hour)));
    }
    if let Some(by_minute) = &rule.by_minute {
        if !by_minute.iter().all(|m| *m <= 59) {
            ctx.invalid_prop(Some("recurrenceRule/byMinute"));
            return None;
        }
        parts.push(format!("BYMINUTE={}", join_u32(by_minute)));
    }
    if let Some(by_second) = &rule.by_second {
        if !by_second.iter().all(|s| *s <= 59) {
            ctx.invalid_prop(Some("recurrenceRule/bySecond"));
            return None;
        }
        parts.push(format!("BYSECOND={}", join_u32(by_second)));
    }
    if let Some(by_set_position) = &rule.by_set_position {
        parts.push(format!("BYSETPOS={}", join_i32(by_set_position)));
    }
    if let Some(count) = rule.count {
        parts.push(format!("COUNT={count}"));
    }
    if let Some(until) = &rule.until {
        parts.push(format!("UNTIL={until}"));
    }

    Some(parts.join(";"))
}

fn join_i32(values: &[i32]) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

fn join_u32(values: &[u32]) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

pub fn read(event: &IcalEvent, ctx: &mut ConversionContext) -> Option<RecurrenceRule> {
    let raw = event.property_value("RRULE")?;
    ctx.with_prop("recurrenceRule", |ctx| parse_rrule(raw, ctx))
}

pub fn write(event: &mut IcalEvent, rule: &RecurrenceRule, ctx: &mut ConversionContext) {
    ical::purge(event, "RRULE");
    if let Some(raw) = ctx.with_prop("recurrenceRule", |ctx| write_rrule(rule, ctx)) {
        event.append_property(Property::new("RRULE", raw));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_daily_rule() {
        let mut ctx = ConversionContext::new();
        let rule = parse_rrule("FREQ=DAILY;COUNT=5", &mut ctx).unwrap();
        assert_eq!(rule.frequency, "daily");
        assert_eq!(rule.count, Some(5));
        assert_eq!(rule.until, None);
        assert!(!ctx.has_errors());
    }

    #[test]
    fn count_and_until_together_is_rejected() {
        let mut ctx = ConversionContext::new();
        assert!(parse_rrule("FREQ=DAILY;COUNT=5;UNTIL=20220101T000000Z", &mut ctx).is_none());
        assert!(ctx.has_errors());
    }

    #[test]
    fn interval_of_one_is_omitted_on_write() {
        let mut ctx = ConversionContext::new();
        let mut rule = RecurrenceRule::new("weekly");
        rule.interval = Some(1);
        let raw = write_rrule(&rule, &mut ctx).unwrap();
        assert_eq!(raw, "FREQ=WEEKLY");
    }

    #[test]
    fn byday_roundtrips_nth_of_period() {
        let mut ctx = ConversionContext::new();
        let rule = parse_rrule("FREQ=MONTHLY;BYDAY=-1FR", &mut ctx).unwrap();
        let days = rule.by_day.as_ref().unwrap();
        assert_eq!(days[0].day, "fr");
        assert_eq!(days[0].nth_of_period, Some(-1));
    }
}

//! Decides whether an event occurs on a given calendar date.
//!
//! Monthly and yearly rules match the anchor's day (and month) exactly. An
//! event anchored on the 31st has no occurrence in shorter months, and one
//! anchored on Feb 29 only recurs in leap years; nothing rolls over to the
//! last day of the month.

use crate::domain::date::{format_date, parse_local_date};
use crate::domain::models::{Event, RepeatType};
use chrono::{Datelike, NaiveDate};

pub fn occurs_on(target_date: &str, event: &Event) -> bool {
    let Some(repeat) = event.repeat.as_ref().filter(|rule| rule.is_recurring()) else {
        return event.date == target_date;
    };

    let (Some(target), Some(start)) = (parse_local_date(target_date), parse_local_date(&event.date))
    else {
        return false;
    };
    if target < start {
        return false;
    }
    if let Some(end_date) = repeat.end_date.as_deref() {
        // An unparseable end date excludes nothing.
        if parse_local_date(end_date).is_some_and(|end| target > end) {
            return false;
        }
    }
    if target == start {
        return true;
    }

    let interval = i64::from(repeat.effective_interval());
    match repeat.kind {
        RepeatType::Daily => days_between(start, target) % interval == 0,
        RepeatType::Weekly => days_between(start, target) % (interval * 7) == 0,
        RepeatType::Monthly => {
            if target.day() != start.day() {
                return false;
            }
            let months = months_between(start, target);
            months >= 0 && months % interval == 0
        }
        RepeatType::Yearly => {
            if target.month() != start.month() || target.day() != start.day() {
                return false;
            }
            let years = i64::from(target.year() - start.year());
            years >= 0 && years % interval == 0
        }
        RepeatType::None | RepeatType::Unknown => false,
    }
}

/// Whole calendar days from `start` to `target`.
fn days_between(start: NaiveDate, target: NaiveDate) -> i64 {
    target.signed_duration_since(start).num_days()
}

fn months_between(start: NaiveDate, target: NaiveDate) -> i64 {
    i64::from(target.year() - start.year()) * 12 + i64::from(target.month0())
        - i64::from(start.month0())
}

/// Lists the occurrence dates of `event` within `[from, to]`, both inclusive.
pub fn occurrences_between(event: &Event, from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    if to < from {
        return Vec::new();
    }
    from.iter_days()
        .take_while(|day| *day <= to)
        .filter(|day| occurs_on(&format_date(*day), event))
        .collect()
}

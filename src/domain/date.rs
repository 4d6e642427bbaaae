use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a `YYYY-MM-DD` calendar date. Surrounding whitespace is not
/// accepted; callers trim at the input boundary.
///
/// The result carries no time of day, so day arithmetic uses calendar days
/// and ignores DST offsets. Malformed input yields `None`; every predicate
/// built on top of this treats `None` as "does not occur".
pub fn parse_local_date(value: &str) -> Option<NaiveDate> {
    let mut parts = value.split('-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u32>().ok()?;
    let day = parts.next()?.parse::<u32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Zero-padded form of a parseable date, e.g. `2024-1-5` becomes `2024-01-05`.
pub fn canonical_date(value: &str) -> Option<String> {
    parse_local_date(value).map(format_date)
}

/// True when `value` is already stored in its zero-padded form.
pub fn is_canonical_date(value: &str) -> bool {
    canonical_date(value).is_some_and(|canonical| canonical == value)
}

/// Formats the local calendar date of an instant, never its UTC date.
pub fn local_date_string<Tz: TimeZone>(instant: &DateTime<Tz>) -> String {
    format_date(instant.date_naive())
}

pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

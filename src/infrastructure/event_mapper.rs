use crate::domain::date::{format_date, parse_hhmm, parse_local_date};
use crate::domain::models::{google_local_id, Event};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Duration, TimeZone};
use chrono_tz::Tz;
use std::collections::HashMap;

const KEY_LOCAL_ID: &str = "memocal_id";
const KEY_COMPLETED: &str = "memocal_completed";
const DEFAULT_EVENT_MINUTES: i64 = 60;
const UNTITLED: &str = "(no title)";

/// `date` is set for all-day events, `dateTime` for timed ones.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventExtendedProperties {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub private: HashMap<String, String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct GoogleCalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default)]
    pub start: CalendarEventDateTime,
    #[serde(default)]
    pub end: CalendarEventDateTime,
    #[serde(rename = "extendedProperties", skip_serializing_if = "Option::is_none")]
    pub extended_properties: Option<CalendarEventExtendedProperties>,
}

impl GoogleCalendarEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("cancelled"))
    }
}

/// Encodes the anchor occurrence of `event`. Recurrence is never sent, so a
/// recurring template appears remotely as a single event on its anchor date.
pub fn encode_event(event: &Event, tz: Tz) -> Result<GoogleCalendarEvent, InfraError> {
    let date = parse_local_date(&event.date)
        .ok_or_else(|| InfraError::InvalidInput(format!("invalid event date '{}'", event.date)))?;

    let (start, end) = match event.time.as_deref() {
        Some(raw_time) => {
            let time = parse_hhmm(raw_time)
                .ok_or_else(|| InfraError::InvalidInput(format!("invalid event time '{raw_time}'")))?;
            let start_at = tz
                .from_local_datetime(&date.and_time(time))
                .earliest()
                .ok_or_else(|| {
                    InfraError::InvalidInput(format!(
                        "event time {} {raw_time} does not exist in {}",
                        event.date,
                        tz.name()
                    ))
                })?;
            let end_at = start_at + Duration::minutes(DEFAULT_EVENT_MINUTES);
            (timed(start_at, tz), timed(end_at, tz))
        }
        None => {
            let next_day = date
                .succ_opt()
                .ok_or_else(|| InfraError::InvalidInput(format!("date out of range '{}'", event.date)))?;
            (all_day(&event.date), all_day(&format_date(next_day)))
        }
    };

    let mut private = HashMap::new();
    private.insert(KEY_LOCAL_ID.to_string(), event.id.clone());
    private.insert(KEY_COMPLETED.to_string(), event.completed.to_string());

    Ok(GoogleCalendarEvent {
        id: event.google_event_id.clone(),
        summary: Some(event.title.clone()),
        description: None,
        status: Some("confirmed".to_string()),
        updated: None,
        start,
        end,
        extended_properties: Some(CalendarEventExtendedProperties { private }),
    })
}

fn timed(instant: DateTime<Tz>, tz: Tz) -> CalendarEventDateTime {
    CalendarEventDateTime {
        date: None,
        date_time: Some(instant.to_rfc3339()),
        time_zone: Some(tz.name().to_string()),
    }
}

fn all_day(date: &str) -> CalendarEventDateTime {
    CalendarEventDateTime {
        date: Some(date.to_string()),
        date_time: None,
        time_zone: None,
    }
}

/// Decodes a remote event into a flat, non-recurring local event. Returns
/// `Ok(None)` for events without an id.
pub fn decode_event(event: &GoogleCalendarEvent, tz: Tz) -> Result<Option<Event>, InfraError> {
    let Some(google_id) = event
        .id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Ok(None);
    };

    let (date, time) = match (event.start.date.as_deref(), event.start.date_time.as_deref()) {
        (Some(date), _) => {
            let parsed = parse_local_date(date).ok_or_else(|| {
                InfraError::Google(format!("invalid calendar event start.date '{date}'"))
            })?;
            (format_date(parsed), None)
        }
        (None, Some(date_time)) => {
            let local = DateTime::parse_from_rfc3339(date_time)
                .map_err(|error| {
                    InfraError::Google(format!(
                        "invalid calendar event start.dateTime '{date_time}': {error}"
                    ))
                })?
                .with_timezone(&tz);
            (
                format_date(local.date_naive()),
                Some(local.format("%H:%M").to_string()),
            )
        }
        (None, None) => {
            return Err(InfraError::Google(format!(
                "calendar event {google_id} has no start"
            )));
        }
    };

    let completed = event
        .extended_properties
        .as_ref()
        .and_then(|properties| properties.private.get(KEY_COMPLETED))
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"));

    let title = event
        .summary
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNTITLED)
        .to_string();

    Ok(Some(Event {
        id: google_local_id(google_id),
        title,
        date,
        time,
        completed,
        repeat: None,
        repeat_group_id: None,
        is_repeat_instance: false,
        google_event_id: Some(google_id.to_string()),
        is_google_event: true,
        reminder: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::fixtures::{event, recurring};
    use crate::domain::models::RepeatType;
    use chrono_tz::Asia::Tokyo;

    #[test]
    fn encode_all_day_event_uses_exclusive_end_date() {
        let encoded = encode_event(&event("a", "2024-12-31"), Tokyo).expect("encode");
        assert_eq!(encoded.start.date.as_deref(), Some("2024-12-31"));
        assert_eq!(encoded.end.date.as_deref(), Some("2025-01-01"));
        assert!(encoded.start.date_time.is_none());
    }

    #[test]
    fn encode_timed_event_uses_local_offset() {
        let mut sample = event("a", "2024-01-15");
        sample.time = Some("09:30".to_string());
        let encoded = encode_event(&sample, Tokyo).expect("encode");
        assert_eq!(
            encoded.start.date_time.as_deref(),
            Some("2024-01-15T09:30:00+09:00")
        );
        assert_eq!(
            encoded.end.date_time.as_deref(),
            Some("2024-01-15T10:30:00+09:00")
        );
        assert_eq!(encoded.start.time_zone.as_deref(), Some("Asia/Tokyo"));
    }

    #[test]
    fn encode_sends_only_the_anchor_of_recurring_events() {
        let template = recurring("a", "2024-01-01", RepeatType::Weekly, 1);
        let encoded = encode_event(&template, Tokyo).expect("encode");
        let json = serde_json::to_value(&encoded).expect("serialize");
        assert!(json.get("recurrence").is_none());
        assert_eq!(json["start"]["date"], "2024-01-01");
    }

    #[test]
    fn decode_roundtrip_keeps_date_time_and_completion() {
        let mut sample = event("a", "2024-01-15");
        sample.time = Some("23:45".to_string());
        sample.completed = true;
        sample.google_event_id = Some("g123".to_string());
        let encoded = encode_event(&sample, Tokyo).expect("encode");

        let decoded = decode_event(&encoded, Tokyo)
            .expect("decode")
            .expect("event with id");

        assert_eq!(decoded.id, "google_g123");
        assert_eq!(decoded.date, "2024-01-15");
        assert_eq!(decoded.time.as_deref(), Some("23:45"));
        assert!(decoded.completed);
        assert!(decoded.is_google_event);
        assert_eq!(decoded.repeat, None);
    }

    #[test]
    fn decode_converts_to_configured_timezone() {
        let remote = GoogleCalendarEvent {
            id: Some("g1".to_string()),
            summary: None,
            description: None,
            status: Some("confirmed".to_string()),
            updated: None,
            start: CalendarEventDateTime {
                date: None,
                date_time: Some("2024-01-15T20:00:00Z".to_string()),
                time_zone: None,
            },
            end: CalendarEventDateTime::default(),
            extended_properties: None,
        };
        let decoded = decode_event(&remote, Tokyo).expect("decode").expect("event");
        assert_eq!(decoded.date, "2024-01-16");
        assert_eq!(decoded.time.as_deref(), Some("05:00"));
        assert_eq!(decoded.title, "(no title)");
    }

    #[test]
    fn decode_skips_events_without_id_and_rejects_bad_start() {
        let mut remote = encode_event(&event("a", "2024-01-15"), Tokyo).expect("encode");
        remote.id = None;
        assert!(decode_event(&remote, Tokyo).expect("decode").is_none());

        remote.id = Some("g1".to_string());
        remote.start = CalendarEventDateTime {
            date: None,
            date_time: Some("invalid-timestamp".to_string()),
            time_zone: None,
        };
        assert!(decode_event(&remote, Tokyo).is_err());
    }
}

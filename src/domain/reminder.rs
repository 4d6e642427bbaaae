use crate::domain::date::{format_date, parse_hhmm};
use crate::domain::models::Event;
use crate::domain::recurrence::occurs_on;
use crate::domain::resolver::is_detached_on;
use chrono::{Duration, NaiveDateTime};
use std::collections::HashSet;

pub const DEFAULT_FIRE_WINDOW_SECONDS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderNotice {
    pub dedup_key: String,
    pub event_id: String,
    pub title: String,
    pub body: String,
}

/// Decides which reminders fire at a given local instant and remembers the
/// ones already shown so each occurrence fires at most once.
#[derive(Debug, Clone)]
pub struct ReminderTracker {
    shown: HashSet<String>,
    window: Duration,
}

impl Default for ReminderTracker {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_FIRE_WINDOW_SECONDS))
    }
}

impl ReminderTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            shown: HashSet::new(),
            window,
        }
    }

    /// Returns the reminders due at `now` (local wall-clock time) and marks
    /// them as shown. Keys recorded yesterday are evicted first.
    pub fn due_reminders(&mut self, now: NaiveDateTime, events: &[Event]) -> Vec<ReminderNotice> {
        let today_date = now.date();
        let today = format_date(today_date);
        if let Some(yesterday) = today_date.pred_opt().map(format_date) {
            self.shown.retain(|key| !key.contains(&yesterday));
        }

        let mut due = Vec::new();
        for event in events {
            let Some(reminder) = event.reminder.as_ref().filter(|reminder| reminder.enabled) else {
                continue;
            };
            let Some(time) = event.time.as_deref().and_then(parse_hhmm) else {
                continue;
            };
            if !occurs_on(&today, event) {
                continue;
            }
            if event.is_recurring() && is_detached_on(events, &event.id, &today) {
                continue;
            }

            let event_instant = today_date.and_time(time);
            let notify_instant = event_instant - Duration::minutes(i64::from(reminder.minutes_before));
            let dedup_key = format!("{}_{}_{}", event.id, today, reminder.minutes_before);
            if self.shown.contains(&dedup_key) {
                continue;
            }

            let elapsed = now - notify_instant;
            if elapsed >= Duration::zero() && elapsed < self.window {
                self.shown.insert(dedup_key.clone());
                due.push(ReminderNotice {
                    dedup_key,
                    event_id: event.id.clone(),
                    title: event.title.clone(),
                    body: notice_body(reminder.minutes_before, &time.format("%H:%M").to_string()),
                });
            }
        }
        due
    }

    pub fn has_shown(&self, dedup_key: &str) -> bool {
        self.shown.contains(dedup_key)
    }

    pub fn shown_count(&self) -> usize {
        self.shown.len()
    }
}

fn notice_body(minutes_before: u32, time: &str) -> String {
    match minutes_before {
        0 => format!("Starts now ({time})"),
        1 => format!("Starts in 1 minute ({time})"),
        minutes => format!("Starts in {minutes} minutes ({time})"),
    }
}

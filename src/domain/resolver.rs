//! Resolves which events are visible on a calendar date.

use crate::domain::date::{format_date, parse_hhmm};
use crate::domain::instance::materialize;
use crate::domain::instance_state::InstanceStateStore;
use crate::domain::models::Event;
use crate::domain::recurrence::occurs_on;
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Returns the events visible on `target_date`, in collection order.
///
/// Non-recurring events appear only on their own date with their stored
/// completion. Recurring templates contribute the template itself on the
/// anchor date and a materialized copy on every other matching date, with any
/// instance-state override applied. An occurrence that was detached into its
/// own event is represented by that event alone.
pub fn events_on(target_date: &str, events: &[Event], states: &InstanceStateStore) -> Vec<Event> {
    let mut visible = Vec::new();
    for event in events {
        if !event.is_recurring() {
            if event.date == target_date {
                visible.push(event.clone());
            }
            continue;
        }
        if !occurs_on(target_date, event) || is_detached_on(events, &event.id, target_date) {
            continue;
        }

        let mut occurrence = if event.date == target_date {
            event.clone()
        } else {
            materialize(event, target_date)
        };
        if let Some(completed) = states.get(&event.id, target_date) {
            occurrence.completed = completed;
        }
        visible.push(occurrence);
    }
    visible
}

/// True when the occurrence of `template_id` on `date` has been detached into
/// its own event.
pub fn is_detached_on(events: &[Event], template_id: &str, date: &str) -> bool {
    events.iter().any(|candidate| {
        !candidate.is_recurring()
            && candidate.date == date
            && candidate.repeat_group_id.as_deref() == Some(template_id)
    })
}

/// Resolves every date in `[from, to]` (inclusive) for month and week grids.
/// Dates without events are omitted.
pub fn events_between(
    from: NaiveDate,
    to: NaiveDate,
    events: &[Event],
    states: &InstanceStateStore,
) -> BTreeMap<String, Vec<Event>> {
    let mut by_date = BTreeMap::new();
    if to < from {
        return by_date;
    }
    for day in from.iter_days().take_while(|day| *day <= to) {
        let date = format_date(day);
        let visible = events_on(&date, events, states);
        if !visible.is_empty() {
            by_date.insert(date, visible);
        }
    }
    by_date
}

/// Display order for a single day: incomplete before completed, then timed
/// events by time of day, then all-day events in their existing order.
pub fn sort_for_display(events: &mut [Event]) {
    events.sort_by(|left, right| {
        left.completed
            .cmp(&right.completed)
            .then_with(|| compare_time_of_day(left, right))
    });
}

fn compare_time_of_day(left: &Event, right: &Event) -> Ordering {
    let left = left.time.as_deref().and_then(parse_hhmm);
    let right = right.time.as_deref().and_then(parse_hhmm);
    match (left, right) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

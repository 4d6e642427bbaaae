use crate::domain::models::{instance_handle, Event, EventPatch};

/// Builds the display copy of one occurrence of `template`.
///
/// The copy keeps the template's id; callers that need a per-occurrence handle
/// use [`instance_handle`] or [`materialize_with_handle`].
pub fn materialize(template: &Event, instance_date: &str) -> Event {
    Event {
        date: instance_date.to_string(),
        repeat: None,
        repeat_group_id: Some(template.id.clone()),
        is_repeat_instance: true,
        ..template.clone()
    }
}

pub fn materialize_with_handle(template: &Event, instance_date: &str) -> Event {
    Event {
        id: instance_handle(&template.id, instance_date),
        ..materialize(template, instance_date)
    }
}

/// Forks one occurrence into a standalone, non-recurring event carrying the
/// edited fields. The template is left untouched, so every other date keeps
/// resolving from it.
pub fn detach(template: &Event, instance_date: &str, patch: &EventPatch, new_id: String) -> Event {
    let mut detached = Event {
        id: new_id,
        google_event_id: None,
        is_google_event: false,
        ..materialize(template, instance_date)
    };
    patch.apply_to(&mut detached, false);
    detached
}

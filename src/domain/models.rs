use crate::domain::date::{canonical_date, is_canonical_date, parse_hhmm, parse_local_date};
use serde::{Deserialize, Deserializer, Serialize};

const GOOGLE_ID_PREFIX: &str = "google_";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepeatType {
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepeatRule {
    #[serde(rename = "type")]
    pub kind: RepeatType,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl RepeatRule {
    pub fn new(kind: RepeatType, interval: u32) -> Self {
        Self {
            kind,
            interval,
            end_date: None,
        }
    }

    pub fn until(mut self, end_date: &str) -> Self {
        self.end_date = Some(end_date.to_string());
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.kind != RepeatType::None
    }

    /// Stored records may carry `0`; treat it like an absent interval.
    pub fn effective_interval(&self) -> u32 {
        self.interval.max(1)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.kind == RepeatType::Unknown {
            return Err("event.repeat.type is not supported".to_string());
        }
        if self.is_recurring() && self.interval < 1 {
            return Err("event.repeat.interval must be >= 1".to_string());
        }
        if let Some(end_date) = self.end_date.as_deref() {
            validate_date(end_date, "event.repeat.end_date")?;
        }
        Ok(())
    }
}

fn default_interval() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub enabled: bool,
    #[serde(default)]
    pub minutes_before: u32,
}

/// A persisted calendar entry. Recurring entries act as templates from which
/// every other occurrence is derived.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_repeat_instance: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_google_event: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<Reminder>,
}

impl Event {
    pub fn is_recurring(&self) -> bool {
        self.repeat.as_ref().is_some_and(RepeatRule::is_recurring)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "event.id")?;
        validate_non_empty(&self.title, "event.title")?;
        validate_date(&self.date, "event.date")?;
        if let Some(time) = self.time.as_deref() {
            if parse_hhmm(time).is_none() {
                return Err("event.time must be HH:MM".to_string());
            }
        }
        if let Some(repeat) = &self.repeat {
            repeat.validate()?;
            if let Some(end_date) = repeat.end_date.as_deref() {
                if end_date < self.date.as_str() {
                    return Err("event.repeat.end_date must not precede event.date".to_string());
                }
            }
        }
        if self.is_recurring() && self.repeat_group_id.is_some() {
            return Err("event.repeat_group_id must not be set on a recurring template".to_string());
        }
        Ok(())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Sparse per-occurrence completion override, unique per `(event_id, instance_date)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepeatInstanceState {
    pub event_id: String,
    pub instance_date: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Memo {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Points either at a stored event or at one occurrence of a recurring template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InstanceRef {
    Template { id: String },
    Instance { template_id: String, date: String },
}

impl InstanceRef {
    pub fn template(id: impl Into<String>) -> Self {
        Self::Template { id: id.into() }
    }

    pub fn instance(template_id: impl Into<String>, date: impl Into<String>) -> Self {
        Self::Instance {
            template_id: template_id.into(),
            date: date.into(),
        }
    }

    /// Reads the `"<templateId>_<YYYY-MM-DD>"` handle stored by older UI state.
    /// Google-sourced ids carry an underscore of their own and are always plain.
    pub fn parse_legacy(handle: &str) -> Self {
        let handle = handle.trim();
        if handle.starts_with(GOOGLE_ID_PREFIX) {
            return Self::template(handle);
        }
        match handle.rsplit_once('_') {
            Some((template_id, date))
                if !template_id.is_empty() && parse_local_date(date).is_some() =>
            {
                Self::instance(template_id, date)
            }
            _ => Self::template(handle),
        }
    }

    pub fn handle(&self) -> String {
        match self {
            Self::Template { id } => id.clone(),
            Self::Instance { template_id, date } => instance_handle(template_id, date),
        }
    }

    pub fn template_id(&self) -> &str {
        match self {
            Self::Template { id } => id,
            Self::Instance { template_id, .. } => template_id,
        }
    }
}

pub fn instance_handle(template_id: &str, date: &str) -> String {
    format!("{template_id}_{date}")
}

pub fn google_local_id(google_event_id: &str) -> String {
    format!("{GOOGLE_ID_PREFIX}{google_event_id}")
}

/// Field edits coming from the event form. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub reminder: Option<Option<Reminder>>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub repeat: Option<Option<RepeatRule>>,
}

fn present_or_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl EventPatch {
    /// Applies the patch to `event`. Recurrence edits are only honoured when
    /// `allow_repeat` is set, so a detached occurrence stays non-recurring.
    pub fn apply_to(&self, event: &mut Event, allow_repeat: bool) {
        if let Some(title) = &self.title {
            event.title = title.trim().to_string();
        }
        if let Some(time) = &self.time {
            event.time = time
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned);
        }
        if let Some(completed) = self.completed {
            event.completed = completed;
        }
        if let Some(reminder) = &self.reminder {
            event.reminder = reminder.clone();
        }
        if allow_repeat {
            if let Some(repeat) = &self.repeat {
                event.repeat = repeat.clone();
            }
        }
    }
}

/// The two override tiers, stated explicitly: a completion toggle writes a
/// sparse instance state, a full edit of one occurrence detaches it into its
/// own event. `EditTemplate` changes every occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventUpdate {
    ToggleCompletion {
        target: InstanceRef,
        completed: bool,
    },
    DetachAndEdit {
        template_id: String,
        date: String,
        patch: EventPatch,
    },
    EditTemplate {
        id: String,
        patch: EventPatch,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    pub date: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub repeat: Option<RepeatRule>,
    #[serde(default)]
    pub reminder: Option<Reminder>,
}

impl NewEvent {
    pub fn into_event(self, id: String) -> Event {
        Event {
            id,
            title: self.title.trim().to_string(),
            date: normalize_date(&self.date),
            time: self
                .time
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            completed: false,
            repeat: self.repeat.filter(RepeatRule::is_recurring).map(|mut rule| {
                rule.end_date = rule.end_date.as_deref().map(normalize_date);
                rule
            }),
            repeat_group_id: None,
            is_repeat_instance: false,
            google_event_id: None,
            is_google_event: false,
            reminder: self.reminder,
        }
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

/// Stored dates are compared as strings, so only the zero-padded form passes.
fn validate_date(value: &str, field_name: &str) -> Result<(), String> {
    if !is_canonical_date(value) {
        return Err(format!("{field_name} must be YYYY-MM-DD"));
    }
    Ok(())
}

fn normalize_date(value: &str) -> String {
    let value = value.trim();
    canonical_date(value).unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn event(id: &str, date: &str) -> Event {
        Event {
            id: id.to_string(),
            title: format!("Event {id}"),
            date: date.to_string(),
            time: None,
            completed: false,
            repeat: None,
            repeat_group_id: None,
            is_repeat_instance: false,
            google_event_id: None,
            is_google_event: false,
            reminder: None,
        }
    }

    pub fn recurring(id: &str, date: &str, kind: RepeatType, interval: u32) -> Event {
        Event {
            repeat: Some(RepeatRule::new(kind, interval)),
            ..event(id, date)
        }
    }
}

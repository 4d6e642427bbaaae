use crate::domain::models::{Event, Memo, RepeatInstanceState};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: String,
    pub exported_at: String,
    pub events: Vec<Event>,
    pub memos: Vec<Memo>,
    pub settings: serde_json::Value,
    pub repeat_instance_states: Vec<RepeatInstanceState>,
}

impl ExportDocument {
    pub fn new(
        exported_at: DateTime<Utc>,
        events: Vec<Event>,
        memos: Vec<Memo>,
        settings: serde_json::Value,
        repeat_instance_states: Vec<RepeatInstanceState>,
    ) -> Self {
        Self {
            version: EXPORT_VERSION.to_string(),
            exported_at: exported_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            events,
            memos,
            settings,
            repeat_instance_states,
        }
    }

    pub fn to_json(&self) -> Result<String, InfraError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// An import payload. Every top-level collection is optional: a present key
/// replaces the whole collection, a missing key leaves it untouched.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportDocument {
    pub version: Option<String>,
    #[serde(default)]
    pub exported_at: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<Event>>,
    #[serde(default)]
    pub memos: Option<Vec<Memo>>,
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
    #[serde(default)]
    pub repeat_instance_states: Option<Vec<RepeatInstanceState>>,
}

impl ImportDocument {
    pub fn parse(raw: &str) -> Result<Self, InfraError> {
        let document: ImportDocument = serde_json::from_str(raw)?;
        document.validate()?;
        Ok(document)
    }

    pub fn validate(&self) -> Result<(), InfraError> {
        match self.version.as_deref() {
            Some(EXPORT_VERSION) => {}
            Some(other) => {
                return Err(InfraError::InvalidInput(format!(
                    "unsupported export version '{other}'"
                )));
            }
            None => {
                return Err(InfraError::InvalidInput(
                    "export document is missing version".to_string(),
                ));
            }
        }
        for event in self.events.iter().flatten() {
            event.validate().map_err(InfraError::InvalidInput)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::fixtures::event;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-15T08:30:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn export_uses_documented_top_level_keys() {
        let document = ExportDocument::new(
            fixed_time(),
            vec![event("a", "2024-01-01")],
            Vec::new(),
            serde_json::json!({ "theme": "dark" }),
            Vec::new(),
        );
        let value: serde_json::Value =
            serde_json::from_str(&document.to_json().expect("serialize")).expect("parse json");

        assert_eq!(value["version"], "1.0");
        assert_eq!(value["exportedAt"], "2024-01-15T08:30:00.000Z");
        assert!(value["events"].is_array());
        assert!(value["memos"].is_array());
        assert_eq!(value["settings"]["theme"], "dark");
        assert!(value["repeatInstanceStates"].is_array());
    }

    #[test]
    fn import_keeps_missing_keys_absent() {
        let document = ImportDocument::parse(
            r#"{"version":"1.0","repeatInstanceStates":[{"eventId":"a","instanceDate":"2024-01-15","completed":true}]}"#,
        )
        .expect("parse import");
        assert!(document.events.is_none());
        assert!(document.memos.is_none());
        assert_eq!(document.repeat_instance_states.map(|states| states.len()), Some(1));
    }

    #[test]
    fn import_rejects_unknown_version_and_invalid_events() {
        assert!(ImportDocument::parse(r#"{"version":"2.0"}"#).is_err());
        assert!(ImportDocument::parse(r#"{"events":[]}"#).is_err());
        assert!(
            ImportDocument::parse(
                r#"{"version":"1.0","events":[{"id":"a","title":"","date":"2024-01-01"}]}"#
            )
            .is_err()
        );
    }
}

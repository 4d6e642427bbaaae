use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const APP_JSON: &str = "app.json";
const SUPPORTED_SCHEMA: u64 = 1;
const DEFAULT_CALENDAR_ID: &str = "primary";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSettings {
    pub poll_seconds: u64,
    pub window_seconds: u64,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            poll_seconds: 15,
            window_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub schema: u8,
    pub app_name: String,
    pub timezone: String,
    #[serde(default)]
    pub reminders: ReminderSettings,
    #[serde(default = "default_calendar_id")]
    pub google_calendar_id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: 1,
            app_name: "MemoCal".to_string(),
            timezone: "UTC".to_string(),
            reminders: ReminderSettings::default(),
            google_calendar_id: default_calendar_id(),
        }
    }
}

fn default_calendar_id() -> String {
    DEFAULT_CALENDAR_ID.to_string()
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        self.time_zone()?;
        if self.reminders.poll_seconds == 0 {
            return Err(InfraError::InvalidConfig(
                "reminders.pollSeconds must be >= 1".to_string(),
            ));
        }
        // Polling slower than the firing window could skip a reminder entirely.
        if self.reminders.window_seconds < self.reminders.poll_seconds {
            return Err(InfraError::InvalidConfig(
                "reminders.windowSeconds must be >= reminders.pollSeconds".to_string(),
            ));
        }
        if self.google_calendar_id.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "googleCalendarId must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn time_zone(&self) -> Result<Tz, InfraError> {
        self.timezone.trim().parse::<Tz>().map_err(|error| {
            InfraError::InvalidConfig(format!("invalid timezone '{}': {error}", self.timezone))
        })
    }
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        write_json_pretty(&path, &AppConfig::default())?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let config: AppConfig = serde_json::from_value(read_config(&path)?)?;
    config.validate()?;
    Ok(config)
}

pub fn save_google_calendar_id(config_dir: &Path, calendar_id: &str) -> Result<(), InfraError> {
    let calendar_id = calendar_id.trim();
    if calendar_id.is_empty() {
        return Err(InfraError::InvalidConfig(
            "googleCalendarId must not be empty".to_string(),
        ));
    }

    let path = config_dir.join(APP_JSON);
    let mut app = read_config(&path)?;
    let object = app.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    object.insert(
        "googleCalendarId".to_string(),
        serde_json::Value::String(calendar_id.to_string()),
    );
    write_json_pretty(&path, &app)
}

/// Writes `value` as 2-space indented JSON with a trailing newline.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

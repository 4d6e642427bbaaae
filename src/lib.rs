//! Recurring-event expansion, per-occurrence completion state and reminder
//! scheduling for the memo calendar widget.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::{AppState, ImportSummary, RemoteMergeSummary, UpdateOutcome};
pub use application::google_sync::{GoogleSyncService, RetryPolicy};
pub use application::reminder_scheduler::{NotificationSink, ReminderScheduler};
pub use domain::models::{
    Event, EventPatch, EventUpdate, InstanceRef, Memo, NewEvent, Reminder, RepeatInstanceState,
    RepeatRule, RepeatType,
};
pub use infrastructure::error::InfraError;

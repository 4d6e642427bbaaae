use crate::application::commands::{list_events, AppState};
use crate::domain::reminder::{ReminderNotice, ReminderTracker};
use crate::infrastructure::error::InfraError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Destination for fired reminders, typically a desktop notification.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: &ReminderNotice) -> Result<(), InfraError>;
}

/// Writes fired reminders to the command log. Used when no desktop
/// notification backend is attached.
pub struct LogNotificationSink {
    state: Arc<AppState>,
}

impl LogNotificationSink {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl NotificationSink for LogNotificationSink {
    fn notify(&self, notice: &ReminderNotice) -> Result<(), InfraError> {
        self.state.log_info(
            "reminder",
            &format!("event_id={} {}: {}", notice.event_id, notice.title, notice.body),
        );
        Ok(())
    }
}

struct ReminderWorker {
    state: Arc<AppState>,
    sink: Arc<dyn NotificationSink>,
    tracker: Mutex<ReminderTracker>,
}

impl ReminderWorker {
    fn tick(&self) -> Result<Vec<ReminderNotice>, InfraError> {
        let events = list_events(&self.state)?;
        let now = self.state.now_local();
        let due = {
            let mut tracker = self.tracker.lock().map_err(|error| {
                InfraError::InvalidConfig(format!("reminder tracker lock poisoned: {error}"))
            })?;
            tracker.due_reminders(now, &events)
        };

        for notice in &due {
            if let Err(error) = self.sink.notify(notice) {
                self.state.log_error(
                    "reminder",
                    &format!("failed to deliver {}: {error}", notice.dedup_key),
                );
            }
        }
        Ok(due)
    }
}

/// Polls the event collection on a fixed period and hands due reminders to a
/// [`NotificationSink`].
pub struct ReminderScheduler {
    worker: Arc<ReminderWorker>,
    poll_period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReminderScheduler {
    pub fn new(state: Arc<AppState>, sink: Arc<dyn NotificationSink>) -> Self {
        let reminders = state.config().reminders.clone();
        let window = chrono::Duration::seconds(reminders.window_seconds.min(86_400) as i64);
        Self {
            worker: Arc::new(ReminderWorker {
                state,
                sink,
                tracker: Mutex::new(ReminderTracker::new(window)),
            }),
            poll_period: Duration::from_secs(reminders.poll_seconds.max(1)),
            task: Mutex::new(None),
        }
    }

    /// Runs one poll immediately, outside the background loop.
    pub fn tick(&self) -> Result<Vec<ReminderNotice>, InfraError> {
        self.worker.tick()
    }

    /// Starts the polling loop on the current tokio runtime. Returns `false`
    /// when a loop is already running.
    pub fn start(&self) -> Result<bool, InfraError> {
        let mut task = self.lock_task()?;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(false);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|error| {
            InfraError::InvalidConfig(format!("reminder scheduler needs a tokio runtime: {error}"))
        })?;

        let worker = Arc::clone(&self.worker);
        let period = self.poll_period;
        *task = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Err(error) = worker.tick() {
                    worker.state.log_error("reminder", &error.to_string());
                }
            }
        }));
        self.worker.state.log_info(
            "reminder",
            &format!("scheduler started poll_seconds={}", period.as_secs()),
        );
        Ok(true)
    }

    /// Stops the polling loop. Returns `false` when none was running.
    pub fn stop(&self) -> Result<bool, InfraError> {
        let Some(handle) = self.lock_task()?.take() else {
            return Ok(false);
        };
        let was_running = !handle.is_finished();
        handle.abort();
        if was_running {
            self.worker.state.log_info("reminder", "scheduler stopped");
        }
        Ok(was_running)
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|task| task.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    fn lock_task(&self) -> Result<std::sync::MutexGuard<'_, Option<JoinHandle<()>>>, InfraError> {
        self.task
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("reminder task lock poisoned: {error}")))
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::commands::{add_event, tests::TempWorkspace};
    use crate::domain::models::{NewEvent, Reminder, RepeatRule, RepeatType};
    use chrono::{DateTime, Utc};

    #[derive(Default)]
    struct RecordingSink {
        notices: Mutex<Vec<ReminderNotice>>,
    }

    impl RecordingSink {
        fn delivered(&self) -> Vec<ReminderNotice> {
            self.notices.lock().expect("lock notices").clone()
        }
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, notice: &ReminderNotice) -> Result<(), InfraError> {
            self.notices.lock().expect("lock notices").push(notice.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn notify(&self, _notice: &ReminderNotice) -> Result<(), InfraError> {
            Err(InfraError::InvalidInput("notifications disabled".to_string()))
        }
    }

    fn state_at(workspace: &TempWorkspace, instant: &'static str) -> Arc<AppState> {
        let state = workspace.app_state().with_now_provider(Arc::new(move || {
            DateTime::parse_from_rfc3339(instant)
                .expect("valid datetime")
                .with_timezone(&Utc)
        }));
        add_event(
            &state,
            NewEvent {
                title: "Standup".to_string(),
                date: "2024-01-01".to_string(),
                time: Some("09:00".to_string()),
                repeat: Some(RepeatRule::new(RepeatType::Daily, 1)),
                reminder: Some(Reminder {
                    enabled: true,
                    minutes_before: 5,
                }),
            },
        )
        .expect("add event");
        Arc::new(state)
    }

    #[test]
    fn tick_delivers_each_occurrence_once() {
        let workspace = TempWorkspace::new();
        let state = state_at(&workspace, "2024-01-10T08:55:10Z");
        let sink = Arc::new(RecordingSink::default());
        let scheduler = ReminderScheduler::new(Arc::clone(&state), sink.clone());

        let first = scheduler.tick().expect("first tick");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].title, "Standup");
        assert_eq!(first[0].body, "Starts in 5 minutes (09:00)");

        assert!(scheduler.tick().expect("second tick").is_empty());
        assert_eq!(sink.delivered().len(), 1);
    }

    #[test]
    fn sink_failure_is_logged_not_raised() {
        let workspace = TempWorkspace::new();
        let state = state_at(&workspace, "2024-01-10T08:55:00Z");
        let scheduler = ReminderScheduler::new(Arc::clone(&state), Arc::new(FailingSink));

        assert_eq!(scheduler.tick().expect("tick").len(), 1);
        let log = std::fs::read_to_string(workspace.path.join("logs").join("commands.log"))
            .expect("read log");
        assert!(log.contains("notifications disabled"));
    }

    #[test]
    fn start_without_runtime_is_an_error() {
        let workspace = TempWorkspace::new();
        let state = state_at(&workspace, "2024-01-10T07:00:00Z");
        let scheduler = ReminderScheduler::new(state, Arc::new(RecordingSink::default()));
        assert!(scheduler.start().is_err());
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let workspace = TempWorkspace::new();
        let state = state_at(&workspace, "2024-01-10T08:55:00Z");
        let sink = Arc::new(RecordingSink::default());
        let scheduler = ReminderScheduler::new(state, sink.clone());

        assert!(scheduler.start().expect("start"));
        assert!(!scheduler.start().expect("start again"));
        assert!(scheduler.is_running());

        for _ in 0..50 {
            if !sink.delivered().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.delivered().len(), 1);

        assert!(scheduler.stop().expect("stop"));
        assert!(!scheduler.stop().expect("stop again"));
        assert!(!scheduler.is_running());
    }
}

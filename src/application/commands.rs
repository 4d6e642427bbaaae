use crate::application::bootstrap::bootstrap_workspace;
use crate::domain::date::{format_date, local_date_string, parse_local_date};
use crate::domain::instance::detach;
use crate::domain::instance_state::InstanceStateStore;
use crate::domain::models::{Event, EventPatch, EventUpdate, InstanceRef, Memo, NewEvent, RepeatInstanceState};
use crate::domain::recurrence::occurs_on;
use crate::domain::resolver;
use crate::infrastructure::config::{load_app_config, AppConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{
    load_value, save_value, JsonFileStore, KeyValueStore, EVENTS_KEY, INSTANCE_STATES_KEY, MEMOS_KEY,
    SETTINGS_KEY,
};
use crate::infrastructure::transfer::{ExportDocument, ImportDocument};
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn next_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Owns the event and instance-state collections for one workspace.
///
/// Every mutation updates memory first and then writes the whole affected
/// collection to the store. A failed write is logged and otherwise ignored:
/// the in-memory state stays authoritative for the running session.
pub struct AppState {
    config: AppConfig,
    time_zone: Tz,
    config_dir: PathBuf,
    logs_dir: PathBuf,
    store: Arc<dyn KeyValueStore>,
    now_provider: NowProvider,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config = load_app_config(&bootstrap.config_dir)?;
        let store = Arc::new(JsonFileStore::open(&bootstrap.store_path)?);
        Self::with_store(config, bootstrap.config_dir, bootstrap.logs_dir, store)
    }

    pub fn with_store(
        config: AppConfig,
        config_dir: PathBuf,
        logs_dir: PathBuf,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, InfraError> {
        let time_zone = config.time_zone()?;
        let runtime = RuntimeState::load(store.as_ref())?;
        Ok(Self {
            config,
            time_zone,
            config_dir,
            logs_dir,
            store,
            now_provider: Arc::new(Utc::now),
            runtime: Mutex::new(runtime),
            log_guard: Mutex::new(()),
        })
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    /// Wall-clock time in the configured timezone.
    pub fn now_local(&self) -> NaiveDateTime {
        self.now_utc().with_timezone(&self.time_zone).naive_local()
    }

    pub fn today(&self) -> String {
        local_date_string(&self.now_utc().with_timezone(&self.time_zone))
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        if fs::create_dir_all(&self.logs_dir).is_err() {
            return;
        }
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn persist<T: Serialize + ?Sized>(&self, command: &str, key: &str, value: &T) {
        if let Err(error) = save_value(self.store.as_ref(), key, value) {
            self.log_error(command, &format!("failed to persist {key}: {error}"));
        }
    }
}

#[derive(Debug, Default)]
struct RuntimeState {
    events: Vec<Event>,
    instance_states: InstanceStateStore,
    memos: Vec<Memo>,
    settings: serde_json::Value,
}

impl RuntimeState {
    fn load(store: &dyn KeyValueStore) -> Result<Self, InfraError> {
        let events: Vec<Event> = load_value(store, EVENTS_KEY)?.unwrap_or_default();
        let states: Vec<RepeatInstanceState> =
            load_value(store, INSTANCE_STATES_KEY)?.unwrap_or_default();
        let memos: Vec<Memo> = load_value(store, MEMOS_KEY)?.unwrap_or_default();
        let settings = load_value(store, SETTINGS_KEY)?
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
        Ok(Self {
            events,
            instance_states: InstanceStateStore::from_records(states),
            memos,
            settings,
        })
    }

    fn find_event(&self, event_id: &str) -> Result<&Event, InfraError> {
        self.events
            .iter()
            .find(|event| event.id == event_id)
            .ok_or_else(|| InfraError::NotFound(format!("event not found: {event_id}")))
    }

    fn find_event_mut(&mut self, event_id: &str) -> Result<&mut Event, InfraError> {
        self.events
            .iter_mut()
            .find(|event| event.id == event_id)
            .ok_or_else(|| InfraError::NotFound(format!("event not found: {event_id}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Template(Event),
    InstanceState(RepeatInstanceState),
    Detached(Event),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub events: Option<usize>,
    pub memos: Option<usize>,
    pub settings: bool,
    pub repeat_instance_states: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteMergeSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("runtime state lock poisoned: {error}")))
}

fn require_id<'a>(value: &'a str, field_name: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidInput(format!("{field_name} must not be empty")));
    }
    Ok(value)
}

fn require_date(value: &str, field_name: &str) -> Result<String, InfraError> {
    parse_local_date(value.trim())
        .map(format_date)
        .ok_or_else(|| InfraError::InvalidInput(format!("{field_name} must be YYYY-MM-DD")))
}

pub fn list_events(state: &AppState) -> Result<Vec<Event>, InfraError> {
    Ok(lock_runtime(state)?.events.clone())
}

pub fn events_on(state: &AppState, date: &str) -> Result<Vec<Event>, InfraError> {
    let date = require_date(date, "date")?;
    let runtime = lock_runtime(state)?;
    Ok(resolver::events_on(&date, &runtime.events, &runtime.instance_states))
}

/// Occurrences on `date` ordered for a day list: open items first, timed
/// entries by start time, then all-day entries.
pub fn day_agenda(state: &AppState, date: &str) -> Result<Vec<Event>, InfraError> {
    let mut events = events_on(state, date)?;
    resolver::sort_for_display(&mut events);
    Ok(events)
}

pub fn events_between(
    state: &AppState,
    from: &str,
    to: &str,
) -> Result<BTreeMap<String, Vec<Event>>, InfraError> {
    let from = parse_local_date(from.trim())
        .ok_or_else(|| InfraError::InvalidInput("from must be YYYY-MM-DD".to_string()))?;
    let to = parse_local_date(to.trim())
        .ok_or_else(|| InfraError::InvalidInput("to must be YYYY-MM-DD".to_string()))?;
    if to < from {
        return Err(InfraError::InvalidInput("to must not precede from".to_string()));
    }
    let runtime = lock_runtime(state)?;
    Ok(resolver::events_between(from, to, &runtime.events, &runtime.instance_states))
}

pub fn instance_states(state: &AppState) -> Result<Vec<RepeatInstanceState>, InfraError> {
    Ok(lock_runtime(state)?.instance_states.records().to_vec())
}

pub fn add_event(state: &AppState, draft: NewEvent) -> Result<Event, InfraError> {
    let event = draft.into_event(next_id());
    event.validate().map_err(InfraError::InvalidInput)?;

    let events = {
        let mut runtime = lock_runtime(state)?;
        runtime.events.push(event.clone());
        runtime.events.clone()
    };
    state.persist("add_event", EVENTS_KEY, &events);
    state.log_info("add_event", &format!("created event_id={}", event.id));
    Ok(event)
}

pub fn apply_update(state: &AppState, update: EventUpdate) -> Result<UpdateOutcome, InfraError> {
    match update {
        EventUpdate::ToggleCompletion { target, completed } => {
            toggle_completion(state, &target, completed)
        }
        EventUpdate::DetachAndEdit {
            template_id,
            date,
            patch,
        } => detach_and_edit(state, &template_id, &date, &patch).map(UpdateOutcome::Detached),
        EventUpdate::EditTemplate { id, patch } => {
            edit_template(state, &id, &patch).map(UpdateOutcome::Template)
        }
    }
}

/// Completion on a recurring event is always stored per occurrence, the
/// anchor included, so that toggling one date never flips the fallback flag
/// every other occurrence inherits.
fn toggle_completion(
    state: &AppState,
    target: &InstanceRef,
    completed: bool,
) -> Result<UpdateOutcome, InfraError> {
    let template_id = require_id(target.template_id(), "event id")?;
    let mut runtime = lock_runtime(state)?;
    let template = runtime.find_event(template_id)?;

    let occurrence_date = match target {
        InstanceRef::Template { .. } => template.date.clone(),
        InstanceRef::Instance { date, .. } => require_date(date, "instance date")?,
    };

    if !template.is_recurring() {
        if occurrence_date != template.date {
            return Err(InfraError::InvalidInput(format!(
                "event {template_id} does not occur on {occurrence_date}"
            )));
        }
        let event = runtime.find_event_mut(template_id)?;
        event.completed = completed;
        let updated = event.clone();
        let events = runtime.events.clone();
        drop(runtime);
        state.persist("toggle_completion", EVENTS_KEY, &events);
        state.log_info(
            "toggle_completion",
            &format!("event_id={template_id} completed={completed}"),
        );
        return Ok(UpdateOutcome::Template(updated));
    }

    if !occurs_on(&occurrence_date, template) {
        return Err(InfraError::InvalidInput(format!(
            "event {template_id} does not occur on {occurrence_date}"
        )));
    }
    runtime
        .instance_states
        .set(template_id, &occurrence_date, completed);
    let records = runtime.instance_states.records().to_vec();
    drop(runtime);

    state.persist("toggle_completion", INSTANCE_STATES_KEY, &records);
    state.log_info(
        "toggle_completion",
        &format!("event_id={template_id} date={occurrence_date} completed={completed}"),
    );
    Ok(UpdateOutcome::InstanceState(RepeatInstanceState {
        event_id: template_id.to_string(),
        instance_date: occurrence_date,
        completed,
    }))
}

fn detach_and_edit(
    state: &AppState,
    template_id: &str,
    date: &str,
    patch: &EventPatch,
) -> Result<Event, InfraError> {
    let template_id = require_id(template_id, "template id")?;
    let date = require_date(date, "instance date")?;
    let mut runtime = lock_runtime(state)?;
    let template = runtime.find_event(template_id)?;

    if !template.is_recurring() {
        return Err(InfraError::InvalidInput(format!(
            "event {template_id} is not recurring; edit it directly"
        )));
    }
    if !occurs_on(&date, template) {
        return Err(InfraError::InvalidInput(format!(
            "event {template_id} does not occur on {date}"
        )));
    }
    let already_detached = runtime.events.iter().any(|event| {
        event.repeat_group_id.as_deref() == Some(template_id) && event.date == date
    });
    if already_detached {
        return Err(InfraError::InvalidInput(format!(
            "occurrence {template_id} on {date} is already detached"
        )));
    }

    let mut detached = detach(template, &date, patch, next_id());
    if patch.completed.is_none() {
        if let Some(completed) = runtime.instance_states.get(template_id, &date) {
            detached.completed = completed;
        }
    }
    detached.validate().map_err(InfraError::InvalidInput)?;

    runtime.events.push(detached.clone());
    let events = runtime.events.clone();
    drop(runtime);

    state.persist("detach_and_edit", EVENTS_KEY, &events);
    state.log_info(
        "detach_and_edit",
        &format!("detached event_id={} from template_id={template_id} date={date}", detached.id),
    );
    Ok(detached)
}

fn edit_template(state: &AppState, event_id: &str, patch: &EventPatch) -> Result<Event, InfraError> {
    let event_id = require_id(event_id, "event id")?;
    let mut runtime = lock_runtime(state)?;
    let event = runtime.find_event_mut(event_id)?;

    let mut edited = event.clone();
    let allow_repeat = edited.repeat_group_id.is_none();
    patch.apply_to(&mut edited, allow_repeat);
    edited.validate().map_err(InfraError::InvalidInput)?;
    let schedule_changed = event.repeat != edited.repeat || event.date != edited.date;
    *event = edited.clone();

    // Overrides survive only on dates the edited rule still generates.
    let pruned = match (schedule_changed, edited.is_recurring()) {
        (false, _) => 0,
        (true, true) => runtime
            .instance_states
            .retain_for_event(event_id, |date| occurs_on(date, &edited)),
        (true, false) => runtime.instance_states.delete_all_for_event(event_id),
    };
    let events = runtime.events.clone();
    let records = runtime.instance_states.records().to_vec();
    drop(runtime);

    state.persist("edit_template", EVENTS_KEY, &events);
    if pruned > 0 {
        state.persist("edit_template", INSTANCE_STATES_KEY, &records);
    }
    state.log_info(
        "edit_template",
        &format!("updated event_id={event_id} pruned_instance_states={pruned}"),
    );
    Ok(edited)
}

/// Deletes an event and every completion override that belongs to it.
pub fn delete_event(state: &AppState, event_id: &str) -> Result<bool, InfraError> {
    let event_id = require_id(event_id, "event id")?;
    let mut runtime = lock_runtime(state)?;
    let before = runtime.events.len();
    runtime.events.retain(|event| event.id != event_id);
    if runtime.events.len() == before {
        return Ok(false);
    }
    let removed_states = runtime.instance_states.delete_all_for_event(event_id);
    let events = runtime.events.clone();
    let records = runtime.instance_states.records().to_vec();
    drop(runtime);

    state.persist("delete_event", EVENTS_KEY, &events);
    state.persist("delete_event", INSTANCE_STATES_KEY, &records);
    state.log_info(
        "delete_event",
        &format!("deleted event_id={event_id} instance_states={removed_states}"),
    );
    Ok(true)
}

pub fn export_document(state: &AppState) -> Result<ExportDocument, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(ExportDocument::new(
        state.now_utc(),
        runtime.events.clone(),
        runtime.memos.clone(),
        runtime.settings.clone(),
        runtime.instance_states.records().to_vec(),
    ))
}

/// Replaces each collection present in `document`; absent ones are untouched.
pub fn import_document(state: &AppState, document: ImportDocument) -> Result<ImportSummary, InfraError> {
    document.validate()?;
    let mut summary = ImportSummary::default();
    let mut runtime = lock_runtime(state)?;

    if let Some(events) = document.events {
        summary.events = Some(events.len());
        runtime.events = events;
        state.persist("import_document", EVENTS_KEY, &runtime.events);
    }
    if let Some(memos) = document.memos {
        summary.memos = Some(memos.len());
        runtime.memos = memos;
        state.persist("import_document", MEMOS_KEY, &runtime.memos);
    }
    if let Some(settings) = document.settings {
        summary.settings = true;
        runtime.settings = settings;
        state.persist("import_document", SETTINGS_KEY, &runtime.settings);
    }
    if let Some(states) = document.repeat_instance_states {
        runtime.instance_states = InstanceStateStore::from_records(states);
        summary.repeat_instance_states = Some(runtime.instance_states.len());
        state.persist(
            "import_document",
            INSTANCE_STATES_KEY,
            runtime.instance_states.records(),
        );
    }
    drop(runtime);

    state.log_info("import_document", &format!("imported {summary:?}"));
    Ok(summary)
}

/// Folds remotely fetched Google events into the local collection, matching
/// on `google_event_id`. Remote events are flat, so the local recurrence rule,
/// template link and reminder are kept; local completion survives an update
/// when the remote copy does not carry one.
pub fn merge_remote_events(
    state: &AppState,
    upserts: Vec<Event>,
    removed_google_ids: &[String],
) -> Result<RemoteMergeSummary, InfraError> {
    let mut summary = RemoteMergeSummary::default();
    let mut runtime = lock_runtime(state)?;

    for remote in upserts {
        let Some(google_id) = remote.google_event_id.clone() else {
            continue;
        };
        match runtime
            .events
            .iter_mut()
            .find(|event| event.google_event_id.as_deref() == Some(google_id.as_str()))
        {
            Some(existing) => {
                let merged = Event {
                    id: existing.id.clone(),
                    completed: existing.completed || remote.completed,
                    repeat: existing.repeat.clone(),
                    repeat_group_id: existing.repeat_group_id.clone(),
                    is_repeat_instance: existing.is_repeat_instance,
                    reminder: existing.reminder.clone(),
                    is_google_event: existing.is_google_event,
                    ..remote
                };
                if *existing != merged {
                    *existing = merged;
                    summary.updated += 1;
                }
            }
            None => {
                runtime.events.push(remote);
                summary.added += 1;
            }
        }
    }

    for google_id in removed_google_ids {
        let before = runtime.events.len();
        let removed_ids: Vec<String> = runtime
            .events
            .iter()
            .filter(|event| event.is_google_event && event.google_event_id.as_deref() == Some(google_id.as_str()))
            .map(|event| event.id.clone())
            .collect();
        runtime
            .events
            .retain(|event| !removed_ids.contains(&event.id));
        for event_id in &removed_ids {
            runtime.instance_states.delete_all_for_event(event_id);
        }
        summary.removed += before - runtime.events.len();
    }

    let events = runtime.events.clone();
    let records = runtime.instance_states.records().to_vec();
    drop(runtime);

    if summary != RemoteMergeSummary::default() {
        state.persist("merge_remote_events", EVENTS_KEY, &events);
        if summary.removed > 0 {
            state.persist("merge_remote_events", INSTANCE_STATES_KEY, &records);
        }
    }
    state.log_info(
        "merge_remote_events",
        &format!(
            "added={} updated={} removed={}",
            summary.added, summary.updated, summary.removed
        ),
    );
    Ok(summary)
}

/// Records the remote id assigned to a local event after it was pushed.
pub fn link_google_event(state: &AppState, event_id: &str, google_event_id: &str) -> Result<Event, InfraError> {
    let event_id = require_id(event_id, "event id")?;
    let google_event_id = require_id(google_event_id, "google event id")?;
    let mut runtime = lock_runtime(state)?;
    let event = runtime.find_event_mut(event_id)?;
    event.google_event_id = Some(google_event_id.to_string());
    let linked = event.clone();
    let events = runtime.events.clone();
    drop(runtime);

    state.persist("link_google_event", EVENTS_KEY, &events);
    Ok(linked)
}

pub fn find_event(state: &AppState, event_id: &str) -> Result<Event, InfraError> {
    lock_runtime(state)?.find_event(event_id).cloned()
}

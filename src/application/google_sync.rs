use crate::application::commands::{
    delete_event, find_event, link_google_event, merge_remote_events, AppState, RemoteMergeSummary,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{decode_event, encode_event};
use crate::infrastructure::google_calendar_client::{
    GoogleCalendarClient, ListEventsRequest, ListEventsResponse,
};
use crate::infrastructure::storage::{load_value, save_value, GOOGLE_SYNC_KEY};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{sleep, Duration as TokioDuration};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStateRecord {
    pub sync_token: Option<String>,
    pub last_synced_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullResult {
    pub merged: RemoteMergeSummary,
    pub skipped: usize,
    pub next_sync_token: Option<String>,
}

/// Mirrors flat events between the local collection and one Google calendar.
/// Only anchor occurrences travel; recurrence rules stay local.
pub struct GoogleSyncService<C>
where
    C: GoogleCalendarClient,
{
    client: Arc<C>,
    state: Arc<AppState>,
    retry_policy: RetryPolicy,
}

impl<C> GoogleSyncService<C>
where
    C: GoogleCalendarClient,
{
    pub fn new(client: Arc<C>, state: Arc<AppState>) -> Self {
        Self {
            client,
            state,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn calendar_id(&self) -> &str {
        &self.state.config().google_calendar_id
    }

    pub fn sync_state(&self) -> Result<Option<SyncStateRecord>, InfraError> {
        load_value(self.state.store(), GOOGLE_SYNC_KEY)
    }

    /// Fetches remote changes and merges them into local events. Uses the
    /// stored sync token when present and falls back to a full window fetch
    /// once the token has expired.
    pub async fn pull(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<PullResult, InfraError> {
        let previous_token = self.sync_state()?.and_then(|record| record.sync_token);
        let full_window = ListEventsRequest {
            time_min: Some(time_min),
            time_max: Some(time_max),
            sync_token: None,
        };

        let response = match previous_token {
            Some(sync_token) => {
                let incremental = ListEventsRequest {
                    sync_token: Some(sync_token),
                    ..full_window.clone()
                };
                match self.list_events_with_retry(access_token, incremental).await {
                    Err(InfraError::SyncTokenExpired) => {
                        self.state
                            .log_info("google_pull", "sync token expired; refetching window");
                        self.list_events_with_retry(access_token, full_window).await?
                    }
                    other => other?,
                }
            }
            None => self.list_events_with_retry(access_token, full_window).await?,
        };

        let time_zone = self.state.time_zone();
        let mut upserts = Vec::new();
        let mut removed = Vec::new();
        let mut skipped = 0;
        for remote in &response.events {
            if remote.is_cancelled() {
                removed.extend(remote.id.clone());
                continue;
            }
            match decode_event(remote, time_zone) {
                Ok(Some(event)) => upserts.push(event),
                Ok(None) => skipped += 1,
                Err(error) => {
                    skipped += 1;
                    self.state.log_error("google_pull", &error.to_string());
                }
            }
        }

        let merged = merge_remote_events(&self.state, upserts, &removed)?;
        save_value(
            self.state.store(),
            GOOGLE_SYNC_KEY,
            &SyncStateRecord {
                sync_token: response.next_sync_token.clone(),
                last_synced_at: Some(
                    self.state
                        .now_utc()
                        .to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
            },
        )?;

        Ok(PullResult {
            merged,
            skipped,
            next_sync_token: response.next_sync_token,
        })
    }

    /// Sends the local event to Google, creating it remotely on first push.
    /// Returns the remote id.
    pub async fn push(&self, access_token: &str, event_id: &str) -> Result<String, InfraError> {
        let event = find_event(&self.state, event_id)?;
        let payload = encode_event(&event, self.state.time_zone())?;

        match event.google_event_id.as_deref() {
            Some(google_id) => {
                self.client
                    .update_event(access_token, self.calendar_id(), google_id, &payload)
                    .await?;
                self.state
                    .log_info("google_push", &format!("updated event_id={event_id}"));
                Ok(google_id.to_string())
            }
            None => {
                let google_id = self
                    .client
                    .create_event(access_token, self.calendar_id(), &payload)
                    .await?;
                link_google_event(&self.state, event_id, &google_id)?;
                self.state.log_info(
                    "google_push",
                    &format!("created event_id={event_id} google_event_id={google_id}"),
                );
                Ok(google_id)
            }
        }
    }

    /// Deletes the remote copy, if any, and then the local event.
    pub async fn remove(&self, access_token: &str, event_id: &str) -> Result<bool, InfraError> {
        let event = find_event(&self.state, event_id)?;
        if let Some(google_id) = event.google_event_id.as_deref() {
            self.client
                .delete_event(access_token, self.calendar_id(), google_id)
                .await?;
        }
        delete_event(&self.state, event_id)
    }

    async fn list_events_with_retry(
        &self,
        access_token: &str,
        request: ListEventsRequest,
    ) -> Result<ListEventsResponse, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self
                .client
                .list_events(access_token, self.calendar_id(), request.clone())
                .await
            {
                Ok(response) => return Ok(response),
                Err(error) if is_transient(&error) && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(u32::from(attempt)));
                    self.state.log_error("google_pull", &format!("retrying: {error}"));
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn is_transient(error: &InfraError) -> bool {
    let InfraError::Google(message) = error else {
        return false;
    };
    let message = message.to_ascii_lowercase();
    ["network error", "timeout", "timed out", "temporarily unavailable", "connection reset"]
        .iter()
        .any(|needle| message.contains(needle))
}

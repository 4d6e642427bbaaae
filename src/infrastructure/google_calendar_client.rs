use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::GoogleCalendarEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use url::Url;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const PAGE_SIZE: &str = "2500";

#[derive(Debug, Clone, Default)]
pub struct ListEventsRequest {
    pub time_min: Option<DateTime<Utc>>,
    pub time_max: Option<DateTime<Utc>>,
    pub sync_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListEventsResponse {
    pub events: Vec<GoogleCalendarEvent>,
    pub next_sync_token: Option<String>,
}

/// Event CRUD against one Google calendar, authorized by a bearer access token.
#[async_trait]
pub trait GoogleCalendarClient: Send + Sync {
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        request: ListEventsRequest,
    ) -> Result<ListEventsResponse, InfraError>;

    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<String, InfraError>;

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<(), InfraError>;

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestGoogleCalendarClient {
    client: Client,
}

impl ReqwestGoogleCalendarClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn require(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Google(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn endpoint(calendar_id: &str, event_id: Option<&str>) -> Result<Url, InfraError> {
        let mut url = Url::parse(CALENDAR_API_BASE)
            .map_err(|error| InfraError::Google(format!("invalid calendar api base url: {error}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::Google("calendar api url cannot be a base".to_string()))?;
            segments.pop_if_empty().push("calendars").push(calendar_id).push("events");
            if let Some(event_id) = event_id {
                segments.push(event_id);
            }
        }
        Ok(url)
    }

    /// Sends `request` and returns the body of a successful response.
    async fn execute(&self, request: RequestBuilder, action: &str) -> Result<String, InfraError> {
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Google(format!("network error while {action}: {error}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Google(format!("failed reading response while {action}: {error}")))?;

        if status == StatusCode::GONE {
            return Err(InfraError::SyncTokenExpired);
        }
        if !status.is_success() {
            let detail = if body.trim().is_empty() {
                String::new()
            } else {
                format!("; body={body}")
            };
            return Err(InfraError::Google(format!(
                "http {} while {action}{detail}",
                status.as_u16()
            )));
        }
        Ok(body)
    }
}

#[derive(Debug, serde::Deserialize)]
struct EventsPage {
    items: Option<Vec<GoogleCalendarEvent>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(rename = "nextSyncToken")]
    next_sync_token: Option<String>,
}

#[async_trait]
impl GoogleCalendarClient for ReqwestGoogleCalendarClient {
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        request: ListEventsRequest,
    ) -> Result<ListEventsResponse, InfraError> {
        Self::require(access_token, "access token")?;
        Self::require(calendar_id, "calendar id")?;

        let endpoint = Self::endpoint(calendar_id, None)?;
        let mut collected = ListEventsResponse::default();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("showDeleted", "true".to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            match request.sync_token.as_deref() {
                Some(sync_token) => query.push(("syncToken", sync_token.to_string())),
                None => {
                    if let Some(time_min) = request.time_min {
                        query.push(("timeMin", time_min.to_rfc3339()));
                    }
                    if let Some(time_max) = request.time_max {
                        query.push(("timeMax", time_max.to_rfc3339()));
                    }
                }
            }
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let body = self
                .execute(
                    self.client
                        .get(endpoint.clone())
                        .bearer_auth(access_token)
                        .query(&query),
                    "listing calendar events",
                )
                .await?;
            let page: EventsPage = serde_json::from_str(&body).map_err(|error| {
                InfraError::Google(format!("invalid events list payload: {error}"))
            })?;

            collected.events.extend(page.items.unwrap_or_default());
            if page.next_sync_token.is_some() {
                collected.next_sync_token = page.next_sync_token;
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(collected)
    }

    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<String, InfraError> {
        Self::require(access_token, "access token")?;
        Self::require(calendar_id, "calendar id")?;

        let body = self
            .execute(
                self.client
                    .post(Self::endpoint(calendar_id, None)?)
                    .bearer_auth(access_token)
                    .json(event),
                "creating event",
            )
            .await?;
        let created: GoogleCalendarEvent = serde_json::from_str(&body).map_err(|error| {
            InfraError::Google(format!("invalid event create payload: {error}"))
        })?;
        created
            .id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| InfraError::Google("event create response did not include id".to_string()))
    }

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<(), InfraError> {
        Self::require(access_token, "access token")?;
        Self::require(calendar_id, "calendar id")?;
        Self::require(event_id, "event id")?;

        self.execute(
            self.client
                .put(Self::endpoint(calendar_id, Some(event_id))?)
                .bearer_auth(access_token)
                .json(event),
            "updating event",
        )
        .await?;
        Ok(())
    }

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), InfraError> {
        Self::require(access_token, "access token")?;
        Self::require(calendar_id, "calendar id")?;
        Self::require(event_id, "event id")?;

        self.execute(
            self.client
                .delete(Self::endpoint(calendar_id, Some(event_id))?)
                .bearer_auth(access_token),
            "deleting event",
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_escapes_calendar_and_event_ids() {
        let url = ReqwestGoogleCalendarClient::endpoint("team@example.com", Some("evt/1"))
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/team@example.com/events/evt%2F1"
        );
    }

    #[tokio::test]
    async fn rejects_empty_access_token_before_sending() {
        let client = ReqwestGoogleCalendarClient::new();
        let result = client.delete_event("  ", "primary", "evt-1").await;
        assert!(matches!(result, Err(InfraError::Google(message)) if message.contains("access token")));
    }
}

//! `PagerDuty` incident channel.
//!
//! Triggers and resolves incidents through the `PagerDuty` Events API v2.
//! The integration key travels with each call, so one channel serves every
//! pipeline regardless of which `PagerDuty` service it routes to.
//!
//! # Usage
//!
//! ```no_run
//! use pagerduty_notify::channels::pagerduty::{PagerDutyChannel, EVENTS_API_URL};
//! use pagerduty_notify::channels::{IncidentChannel, IncidentRequest};
//! use pagerduty_notify::config::Credential;
//!
//! # async fn example() -> Result<(), pagerduty_notify::ChannelError> {
//! let channel = PagerDutyChannel::new(EVENTS_API_URL, std::time::Duration::from_secs(10))?;
//! let key = Credential::new("integration-key");
//!
//! let request = IncidentRequest {
//!     summary: "Failed Build: deploy/42/test/1 build Failed on gocd".to_string(),
//!     source: "gocd".to_string(),
//!     client: "GoCD".to_string(),
//!     client_url: Some("https://gocd/go/pipelines/deploy/42/test/1".to_string()),
//!     timestamp: None,
//!     jobs: vec![],
//! };
//!
//! let incident_id = channel.open(&request, &key).await?;
//! channel.resolve(&incident_id, "deploy/43/test/1 build Passed", &key).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{IncidentChannel, IncidentRequest};
use crate::config::Credential;
use crate::error::ChannelError;

/// `PagerDuty` Events API v2 endpoint.
pub const EVENTS_API_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// `PagerDuty` channel for Events API v2.
#[derive(Debug, Clone)]
pub struct PagerDutyChannel {
    events_url: String,
    client: reqwest::Client,
}

impl PagerDutyChannel {
    /// Create a channel posting to `events_url`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(events_url: impl Into<String>, timeout: Duration) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            events_url: events_url.into(),
            client,
        })
    }

    /// Send an event to `PagerDuty`.
    ///
    /// Returns the `dedup_key` `PagerDuty` assigned (or echoed back).
    ///
    /// # Errors
    /// Returns error if the API request fails or is rejected.
    pub async fn send_event(
        &self,
        event: &PagerDutyEvent,
        credential: &Credential,
    ) -> Result<String, ChannelError> {
        let payload = ApiPayload {
            routing_key: credential.expose(),
            event_action: event.event_action,
            dedup_key: event.dedup_key.as_deref(),
            client: event.client.as_deref(),
            client_url: event.client_url.as_deref(),
            payload: &event.payload,
        };

        debug!(
            action = ?event.event_action,
            dedup_key = ?event.dedup_key,
            "Sending PagerDuty event"
        );

        let response = self
            .client
            .post(&self.events_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let result: ApiResponse = response.json().await?;
            debug!(dedup_key = %result.dedup_key, "PagerDuty event accepted");
            return Ok(result.dedup_key);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            warn!(retry_after_secs, "PagerDuty rate limited the request");
            return Err(ChannelError::RateLimited { retry_after_secs });
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            status = %status,
            body = %body,
            "PagerDuty API request failed"
        );

        Err(ChannelError::Rejected {
            service: "PagerDuty",
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl IncidentChannel for PagerDutyChannel {
    fn name(&self) -> &'static str {
        "pagerduty"
    }

    async fn open(
        &self,
        request: &IncidentRequest,
        credential: &Credential,
    ) -> Result<String, ChannelError> {
        let mut event = PagerDutyEvent::trigger(&request.summary, &request.source)
            .with_client(&request.client);

        if let Some(url) = &request.client_url {
            event = event.with_client_url(url);
        }
        if let Some(timestamp) = request.timestamp {
            event = event.with_timestamp(timestamp.to_rfc3339());
        }
        if !request.jobs.is_empty() {
            event = event.with_custom_details(json!({ "jobs": request.jobs }));
        }

        self.send_event(&event, credential).await
    }

    async fn resolve(
        &self,
        incident_id: &str,
        description: &str,
        credential: &Credential,
    ) -> Result<(), ChannelError> {
        let event = PagerDutyEvent::resolve(incident_id, description);
        self.send_event(&event, credential).await?;
        Ok(())
    }
}

/// `PagerDuty` event for Events API v2.
#[derive(Debug, Clone, Serialize)]
pub struct PagerDutyEvent {
    /// Event action (trigger, resolve)
    pub event_action: EventAction,
    /// Dedup key identifying the incident
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
    /// Name of the monitoring client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    /// Link shown next to the client name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_url: Option<String>,
    /// Event payload
    pub payload: EventPayload,
}

/// `PagerDuty` event action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    /// Trigger a new incident or add to existing
    Trigger,
    /// Resolve an incident
    Resolve,
}

/// `PagerDuty` event payload.
#[derive(Debug, Clone, Serialize)]
pub struct EventPayload {
    /// Brief summary of the event
    pub summary: String,
    /// Source of the event
    pub source: String,
    /// Severity level
    pub severity: EventSeverity,
    /// Timestamp (ISO 8601)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Custom details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_details: Option<serde_json::Value>,
}

/// `PagerDuty` event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Failed stage
    Error,
    /// Recovery
    Info,
}

impl PagerDutyEvent {
    /// Create a trigger event.
    #[must_use]
    pub fn trigger(summary: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_action: EventAction::Trigger,
            dedup_key: None,
            client: None,
            client_url: None,
            payload: EventPayload {
                summary: summary.into(),
                source: source.into(),
                severity: EventSeverity::Error,
                timestamp: None,
                custom_details: None,
            },
        }
    }

    /// Create a resolve event for an existing incident.
    #[must_use]
    pub fn resolve(dedup_key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            event_action: EventAction::Resolve,
            dedup_key: Some(dedup_key.into()),
            client: None,
            client_url: None,
            payload: EventPayload {
                summary: description.into(),
                source: super::CLIENT_NAME.to_string(),
                severity: EventSeverity::Info,
                timestamp: None,
                custom_details: None,
            },
        }
    }

    /// Set the client name.
    #[must_use]
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Set the link shown next to the client name.
    #[must_use]
    pub fn with_client_url(mut self, url: impl Into<String>) -> Self {
        self.client_url = Some(url.into());
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.payload.timestamp = Some(timestamp.into());
        self
    }

    /// Set custom details.
    #[must_use]
    pub fn with_custom_details(mut self, details: serde_json::Value) -> Self {
        self.payload.custom_details = Some(details);
        self
    }
}

// =============================================================================
// API types (internal)
// =============================================================================

#[derive(Debug, Serialize)]
struct ApiPayload<'a> {
    routing_key: &'a str,
    event_action: EventAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    dedup_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_url: Option<&'a str>,
    payload: &'a EventPayload,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ApiResponse {
    status: String,
    message: String,
    dedup_key: String,
}

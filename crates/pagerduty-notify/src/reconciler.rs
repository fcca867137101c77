//! Reconciles stage-status events with open incidents.
//!
//! A failing stage of a monitored pipeline opens one incident per
//! `pipeline-stage` key; the next passing run of that stage resolves it.
//! Repeated failures while an incident is open are suppressed.

use std::sync::Arc;

use tracing::{debug, info};

use crate::channels::{IncidentChannel, IncidentRequest, CLIENT_NAME};
use crate::config::{Credential, MonitorConfig};
use crate::error::HandlingError;
use crate::events::StatusEvent;
use crate::host;
use crate::table::IncidentTable;

/// What handling an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A new incident was opened
    Opened { key: String, incident_id: String },
    /// The tracked incident was resolved
    Resolved { key: String, incident_id: String },
    /// The stage failed again while its incident is still open
    AlreadyOpen { key: String },
    /// Nothing to do for this event
    Ignored,
}

/// Opens and resolves incidents for stage-status events.
pub struct IncidentReconciler {
    monitor: MonitorConfig,
    hostname: String,
    server_url: Option<String>,
    channel: Arc<dyn IncidentChannel>,
    incidents: IncidentTable,
}

impl IncidentReconciler {
    #[must_use]
    pub fn new(
        monitor: MonitorConfig,
        hostname: impl Into<String>,
        channel: Arc<dyn IncidentChannel>,
    ) -> Self {
        Self {
            monitor,
            hostname: hostname.into(),
            server_url: None,
            channel,
            incidents: IncidentTable::new(),
        }
    }

    /// Link runs under `server_url` instead of `https://<hostname>`.
    #[must_use]
    pub fn with_server_url(mut self, server_url: Option<String>) -> Self {
        self.server_url = server_url;
        self
    }

    #[must_use]
    pub fn incidents(&self) -> &IncidentTable {
        &self.incidents
    }

    #[must_use]
    pub fn channel_name(&self) -> &'static str {
        self.channel.name()
    }

    /// Handle one stage-status event.
    ///
    /// The incident table only changes after the channel call succeeds, and
    /// the table lock is held across check, call and update.
    ///
    /// # Errors
    /// Returns an error if the run link cannot be built or the channel call
    /// fails. The table is left untouched in both cases.
    pub async fn handle(&self, event: &StatusEvent) -> Result<Outcome, HandlingError> {
        let key = event.incident_key();
        let pipeline = event.pipeline_name();

        let mut open = self.incidents.lock().await;

        if self.monitor.is_monitored(pipeline) && self.monitor.should_alert_on(event.stage_state())
        {
            if open.contains_key(&key) {
                debug!(key = %key, "Incident already open, not alerting again");
                return Ok(Outcome::AlreadyOpen { key });
            }

            let credential = self.credential_for(pipeline)?;
            let request = self.incident_request(event)?;
            let incident_id = self.channel.open(&request, credential).await?;

            info!(
                key = %key,
                incident_id = %incident_id,
                channel = self.channel.name(),
                "Opened incident"
            );
            open.insert(key.clone(), incident_id.clone());
            return Ok(Outcome::Opened { key, incident_id });
        }

        if event.passed() {
            if let Some(incident_id) = open.get(&key).cloned() {
                let credential = self.credential_for(pipeline)?;
                let description = self.describe(event);
                self.channel
                    .resolve(&incident_id, &description, credential)
                    .await?;

                info!(
                    key = %key,
                    incident_id = %incident_id,
                    channel = self.channel.name(),
                    "Resolved incident"
                );
                open.remove(&key);
                return Ok(Outcome::Resolved { key, incident_id });
            }
        }

        debug!(
            key = %key,
            state = %event.stage_state(),
            result = %event.stage_result(),
            "No incident action for event"
        );
        Ok(Outcome::Ignored)
    }

    fn credential_for(&self, pipeline: &str) -> Result<&Credential, HandlingError> {
        self.monitor
            .credential_for(pipeline)
            .ok_or_else(|| HandlingError::MissingCredential(pipeline.to_string()))
    }

    fn describe(&self, event: &StatusEvent) -> String {
        format!(
            "{} build {} on {}",
            event.fully_qualified_name(),
            event.stage_state(),
            self.hostname
        )
    }

    fn incident_request(&self, event: &StatusEvent) -> Result<IncidentRequest, HandlingError> {
        let client_url = host::run_url(self.server_url.as_deref(), &self.hostname, event)?;
        if client_url.is_none() {
            debug!(
                key = %event.incident_key(),
                "Host name unknown, opening incident without a link"
            );
        }

        Ok(IncidentRequest {
            summary: format!("Failed Build: {}", self.describe(event)),
            source: if self.hostname.is_empty() {
                CLIENT_NAME.to_string()
            } else {
                self.hostname.clone()
            },
            client: CLIENT_NAME.to_string(),
            client_url: client_url.map(String::from),
            timestamp: event.pipeline.stage.last_transition_time,
            jobs: event.pipeline.stage.jobs.clone(),
        })
    }
}

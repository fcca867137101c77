//! Incident channel implementations.

pub mod pagerduty;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Credential;
use crate::error::ChannelError;
use crate::events::JobStatus;

/// Client name reported to the alerting service.
pub const CLIENT_NAME: &str = "GoCD";

/// Everything needed to open an incident for a failed stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentRequest {
    /// One-line incident summary
    pub summary: String,
    /// Where the failure was reported from
    pub source: String,
    /// Name of the reporting client
    pub client: String,
    /// Link back to the failed run, if the server address is known
    pub client_url: Option<String>,
    /// When the stage last changed state
    pub timestamp: Option<DateTime<Utc>>,
    /// Jobs of the failed stage
    pub jobs: Vec<JobStatus>,
}

/// Trait for incident channels (`PagerDuty`, test doubles).
///
/// Implementations are not expected to retry; a failed call is reported once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IncidentChannel: Send + Sync {
    /// Get the name of this channel.
    fn name(&self) -> &'static str;

    /// Open an incident, returning its identifier.
    async fn open(
        &self,
        request: &IncidentRequest,
        credential: &Credential,
    ) -> Result<String, ChannelError>;

    /// Resolve the incident previously returned by [`IncidentChannel::open`].
    async fn resolve(
        &self,
        incident_id: &str,
        description: &str,
        credential: &Credential,
    ) -> Result<(), ChannelError>;
}

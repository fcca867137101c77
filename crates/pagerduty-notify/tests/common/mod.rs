//! Shared test doubles.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pagerduty_notify::{
    ChannelError, Credential, IncidentChannel, IncidentReconciler, IncidentRequest, MonitorConfig,
    StatusEvent,
};
use rand::Rng;

pub const HOSTNAME: &str = "gocd.internal";

/// In-memory stand-in for PagerDuty that records every incident.
#[derive(Default)]
pub struct FakePagerDuty {
    next_id: AtomicUsize,
    open_calls: AtomicUsize,
    resolve_calls: AtomicUsize,
    /// incident id -> summary
    open: Mutex<HashMap<String, String>>,
    /// incident id -> summary
    closed: Mutex<HashMap<String, String>>,
    /// Link sent with the most recent `open`
    last_link: Mutex<Option<String>>,
    /// Sleep a random few milliseconds inside `open`
    jitter: bool,
}

impl FakePagerDuty {
    pub fn with_jitter() -> Self {
        Self {
            jitter: true,
            ..Self::default()
        }
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn open_incidents(&self) -> HashMap<String, String> {
        self.open.lock().unwrap().clone()
    }

    pub fn closed_incidents(&self) -> HashMap<String, String> {
        self.closed.lock().unwrap().clone()
    }

    pub fn last_link(&self) -> Option<String> {
        self.last_link.lock().unwrap().clone()
    }
}

#[async_trait]
impl IncidentChannel for FakePagerDuty {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn open(
        &self,
        request: &IncidentRequest,
        _credential: &Credential,
    ) -> Result<String, ChannelError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.jitter {
            let delay = rand::thread_rng().gen_range(0..3);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.last_link
            .lock()
            .unwrap()
            .clone_from(&request.client_url);
        let id = format!("id{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.open
            .lock()
            .unwrap()
            .insert(id.clone(), request.summary.clone());
        Ok(id)
    }

    async fn resolve(
        &self,
        incident_id: &str,
        _description: &str,
        _credential: &Credential,
    ) -> Result<(), ChannelError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let summary = self
            .open
            .lock()
            .unwrap()
            .remove(incident_id)
            .ok_or_else(|| ChannelError::Other(format!("unknown incident {incident_id}")))?;
        self.closed
            .lock()
            .unwrap()
            .insert(incident_id.to_string(), summary);
        Ok(())
    }
}

/// Monitors `deploy-api` and `deploy-web`, alerting on `Failed`.
pub fn monitor() -> MonitorConfig {
    MonitorConfig::new(["Failed"])
        .with_pipeline("deploy-api", Credential::new("key-api"))
        .with_pipeline("deploy-web", Credential::new("key-web"))
}

pub fn reconciler(fake: &Arc<FakePagerDuty>) -> IncidentReconciler {
    IncidentReconciler::new(monitor(), HOSTNAME, fake.clone())
}

pub fn failed(pipeline: &str, counter: &str, stage: &str) -> StatusEvent {
    StatusEvent::new(pipeline, counter, stage, "1", "Failed", "Failed")
}

pub fn passed(pipeline: &str, counter: &str, stage: &str) -> StatusEvent {
    StatusEvent::new(pipeline, counter, stage, "1", "Passed", "Passed")
}

/// Summary the reconciler is expected to send for a failed event.
pub fn expected_summary(event: &StatusEvent) -> String {
    format!(
        "Failed Build: {} build {} on {HOSTNAME}",
        event.fully_qualified_name(),
        event.stage_state()
    )
}

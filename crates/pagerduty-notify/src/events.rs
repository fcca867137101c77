//! GoCD stage-status notification types.
//!
//! The CI server posts one of these per stage transition. Field names follow
//! GoCD's notification JSON (`pipeline.stage.jobs[]`, hyphenated timestamps).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Stage result that resolves an open incident.
pub const RESULT_PASSED: &str = "Passed";

/// A stage-status notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    /// The pipeline run the stage belongs to
    pub pipeline: PipelineStatus,
}

/// Pipeline run details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    /// Pipeline name
    pub name: String,
    /// Pipeline run counter
    pub counter: String,
    /// Pipeline group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// The stage that transitioned
    pub stage: StageStatus,
}

/// Stage run details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    /// Stage name
    pub name: String,
    /// Stage run counter
    pub counter: String,
    /// Stage state (`Building`, `Failed`, `Passed`, `Cancelled`, ...)
    pub state: String,
    /// Stage result (`Unknown`, `Failed`, `Passed`, `Cancelled`)
    pub result: String,
    /// When the stage run was created
    #[serde(
        rename = "create-time",
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub create_time: Option<DateTime<Utc>>,
    /// When the stage last changed state
    #[serde(
        rename = "last-transition-time",
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<DateTime<Utc>>,
    /// Jobs in the stage
    #[serde(default)]
    pub jobs: Vec<JobStatus>,
}

/// A job inside a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Job name
    pub name: String,
    /// Job state (`Scheduled`, `Building`, `Completed`, ...)
    pub state: String,
    /// Job result
    #[serde(default)]
    pub result: String,
}

impl StatusEvent {
    /// Build an event with no jobs or timestamps.
    #[must_use]
    pub fn new(
        pipeline: impl Into<String>,
        pipeline_counter: impl Into<String>,
        stage: impl Into<String>,
        stage_counter: impl Into<String>,
        state: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            pipeline: PipelineStatus {
                name: pipeline.into(),
                counter: pipeline_counter.into(),
                group: None,
                stage: StageStatus {
                    name: stage.into(),
                    counter: stage_counter.into(),
                    state: state.into(),
                    result: result.into(),
                    create_time: None,
                    last_transition_time: None,
                    jobs: vec![],
                },
            },
        }
    }

    /// Add a job to the stage.
    #[must_use]
    pub fn with_job(
        mut self,
        name: impl Into<String>,
        state: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        self.pipeline.stage.jobs.push(JobStatus {
            name: name.into(),
            state: state.into(),
            result: result.into(),
        });
        self
    }

    /// Parse a notification body.
    ///
    /// # Errors
    /// Returns the JSON error if the body is not a stage-status notification.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline.name
    }

    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.pipeline.stage.name
    }

    #[must_use]
    pub fn stage_state(&self) -> &str {
        &self.pipeline.stage.state
    }

    #[must_use]
    pub fn stage_result(&self) -> &str {
        &self.pipeline.stage.result
    }

    /// Whether the stage finished with a passing result.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.stage_result() == RESULT_PASSED
    }

    /// Key under which an open incident for this pipeline/stage is tracked.
    #[must_use]
    pub fn incident_key(&self) -> String {
        format!("{}-{}", self.pipeline.name, self.pipeline.stage.name)
    }

    /// `pipeline/counter/stage/counter`, as shown in GoCD.
    #[must_use]
    pub fn fully_qualified_name(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.pipeline.name,
            self.pipeline.counter,
            self.pipeline.stage.name,
            self.pipeline.stage.counter
        )
    }

    /// Path of the stage run on the GoCD server.
    #[must_use]
    pub fn run_path(&self) -> String {
        format!("/go/pipelines/{}", self.fully_qualified_name())
    }

    /// Jobs that did not pass.
    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobStatus> {
        self.pipeline
            .stage
            .jobs
            .iter()
            .filter(|job| job.result != RESULT_PASSED)
    }
}

/// GoCD has emitted both RFC 3339 and `+0000` offsets over the years; an
/// unreadable timestamp is dropped rather than failing the whole event.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .or_else(|_| DateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f%z"))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAILED_STAGE: &str = r#"{
        "pipeline": {
            "name": "deploy-api",
            "counter": "42",
            "group": "production",
            "stage": {
                "name": "integration",
                "counter": "1",
                "approval-type": "success",
                "approved-by": "changes",
                "state": "Failed",
                "result": "Failed",
                "create-time": "2016-06-17T19:09:03.402Z",
                "last-transition-time": "2016-06-17T19:12:11.000+0000",
                "jobs": [
                    {
                        "name": "smoke",
                        "schedule-time": "2016-06-17T19:09:03.402Z",
                        "state": "Completed",
                        "result": "Failed",
                        "agent-uuid": "7a2c-11"
                    },
                    {
                        "name": "unit",
                        "state": "Completed",
                        "result": "Passed"
                    }
                ]
            }
        }
    }"#;

    #[test]
    fn test_parse_gocd_notification() {
        let event = StatusEvent::from_json(FAILED_STAGE).unwrap();

        assert_eq!(event.pipeline_name(), "deploy-api");
        assert_eq!(event.stage_name(), "integration");
        assert_eq!(event.stage_state(), "Failed");
        assert_eq!(event.stage_result(), "Failed");
        assert_eq!(event.pipeline.group.as_deref(), Some("production"));
        assert_eq!(event.pipeline.stage.jobs.len(), 2);
        assert!(event.pipeline.stage.create_time.is_some());
        assert!(event.pipeline.stage.last_transition_time.is_some());
    }

    #[test]
    fn test_unreadable_timestamp_is_dropped() {
        let body = r#"{"pipeline": {"name": "p", "counter": "1", "stage": {
            "name": "s", "counter": "1", "state": "Failed", "result": "Failed",
            "create-time": "yesterday"
        }}}"#;
        let event = StatusEvent::from_json(body).unwrap();
        assert!(event.pipeline.stage.create_time.is_none());
        assert!(event.pipeline.stage.jobs.is_empty());
    }

    #[test]
    fn test_missing_stage_is_rejected() {
        let result = StatusEvent::from_json(r#"{"pipeline": {"name": "p", "counter": "1"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_names_and_key() {
        let event = StatusEvent::new("deploy-api", "42", "integration", "3", "Failed", "Failed");

        assert_eq!(event.incident_key(), "deploy-api-integration");
        assert_eq!(event.fully_qualified_name(), "deploy-api/42/integration/3");
        assert_eq!(event.run_path(), "/go/pipelines/deploy-api/42/integration/3");
        assert!(!event.passed());
    }

    #[test]
    fn test_failed_jobs() {
        let event = StatusEvent::from_json(FAILED_STAGE).unwrap();
        let failed: Vec<_> = event.failed_jobs().map(|job| job.name.as_str()).collect();
        assert_eq!(failed, vec!["smoke"]);
    }
}

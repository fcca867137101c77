//! Service configuration.
//!
//! Everything is read from the environment once at startup:
//!
//! - `PAGERDUTY_PIPELINE_API_KEYS`: `pipeline=key,pipeline=key`; each named
//!   pipeline is monitored with its own integration key
//! - `PAGERDUTY_PIPELINES`: monitored pipelines that share `PAGERDUTY_API_KEY`
//! - `PAGERDUTY_API_KEY`: default integration key
//! - `PAGERDUTY_STATUSES_TO_ALERT`: stage states that open an incident
//!   (default: `Failed`)
//! - `PAGERDUTY_EVENTS_URL`: Events API endpoint
//! - `PAGERDUTY_TIMEOUT_SECS`: outbound request timeout (default: 10)
//! - `GOCD_SERVER_URL`: base URL for links back to the run (default:
//!   `https://<hostname>`)

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use crate::channels::pagerduty::EVENTS_API_URL;
use crate::error::ConfigError;

const ENV_PIPELINE_API_KEYS: &str = "PAGERDUTY_PIPELINE_API_KEYS";
const ENV_PIPELINES: &str = "PAGERDUTY_PIPELINES";
const ENV_API_KEY: &str = "PAGERDUTY_API_KEY";
const ENV_STATUSES_TO_ALERT: &str = "PAGERDUTY_STATUSES_TO_ALERT";
const ENV_EVENTS_URL: &str = "PAGERDUTY_EVENTS_URL";
const ENV_TIMEOUT_SECS: &str = "PAGERDUTY_TIMEOUT_SECS";
const ENV_SERVER_URL: &str = "GOCD_SERVER_URL";

/// Stage state that alerts when nothing else is configured.
pub const DEFAULT_STATUS_TO_ALERT: &str = "Failed";

/// Default outbound request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// A PagerDuty integration (routing) key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

// Keys end up in logs via `?config`; never print them.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Which pipelines are monitored, with which key, and on which stage states.
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    pipelines: HashSet<String>,
    credentials: HashMap<String, Credential>,
    statuses_to_alert: HashSet<String>,
}

impl MonitorConfig {
    /// Create a config alerting on the given stage states, with no pipelines.
    #[must_use]
    pub fn new<I, S>(statuses_to_alert: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pipelines: HashSet::new(),
            credentials: HashMap::new(),
            statuses_to_alert: statuses_to_alert.into_iter().map(Into::into).collect(),
        }
    }

    /// Monitor a pipeline with the given key.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: impl Into<String>, credential: Credential) -> Self {
        let pipeline = pipeline.into();
        self.pipelines.insert(pipeline.clone());
        self.credentials.insert(pipeline, credential);
        self
    }

    #[must_use]
    pub fn is_monitored(&self, pipeline: &str) -> bool {
        self.pipelines.contains(pipeline)
    }

    #[must_use]
    pub fn should_alert_on(&self, stage_state: &str) -> bool {
        self.statuses_to_alert.contains(stage_state)
    }

    #[must_use]
    pub fn credential_for(&self, pipeline: &str) -> Option<&Credential> {
        self.credentials.get(pipeline)
    }

    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Build from an arbitrary variable source.
    ///
    /// # Errors
    /// Returns an error if a monitored pipeline has no usable key or a
    /// variable is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let statuses_to_alert = match lookup(ENV_STATUSES_TO_ALERT) {
            Some(raw) => {
                let statuses = split_list(&raw);
                if statuses.is_empty() {
                    return Err(ConfigError::Malformed {
                        var: ENV_STATUSES_TO_ALERT,
                        reason: "no stage states listed".to_string(),
                    });
                }
                statuses
            }
            None => vec![DEFAULT_STATUS_TO_ALERT.to_string()],
        };

        let mut config = Self::new(statuses_to_alert);

        if let Some(raw) = lookup(ENV_PIPELINE_API_KEYS) {
            for (pipeline, key) in parse_pairs(&raw)? {
                config = config.with_pipeline(pipeline, key);
            }
        }

        let default_key = lookup(ENV_API_KEY);
        let shared = lookup(ENV_PIPELINES)
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        for pipeline in shared {
            if config.is_monitored(&pipeline) {
                continue;
            }
            let key = match default_key.as_deref().map(str::trim) {
                None => return Err(ConfigError::MissingCredential(pipeline)),
                Some("") => return Err(ConfigError::InvalidCredential(pipeline)),
                Some(key) => key,
            };
            config = config.with_pipeline(pipeline, Credential::new(key));
        }

        Ok(config)
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Alerting rules
    pub monitor: MonitorConfig,
    /// PagerDuty Events API endpoint
    pub events_url: String,
    /// Timeout for calls to PagerDuty
    pub timeout: Duration,
    /// Base URL for links back to GoCD, if not derived from the host name
    pub server_url: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    /// See [`MonitorConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    /// See [`MonitorConfig::from_lookup`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let monitor = MonitorConfig::from_lookup(&lookup)?;

        let timeout_secs = match lookup(ENV_TIMEOUT_SECS) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::Malformed {
                var: ENV_TIMEOUT_SECS,
                reason: format!("{e}"),
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let config = Self {
            monitor,
            events_url: lookup(ENV_EVENTS_URL)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| EVENTS_API_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            server_url: lookup(ENV_SERVER_URL).filter(|s| !s.is_empty()),
        };

        if config.monitor.pipeline_count() == 0 {
            warn!("No pipelines configured for PagerDuty alerting; events will be ignored");
        } else {
            info!(
                pipelines = config.monitor.pipeline_count(),
                "PagerDuty alerting configured"
            );
        }

        Ok(config)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_pairs(raw: &str) -> Result<Vec<(String, Credential)>, ConfigError> {
    split_list(raw)
        .into_iter()
        .map(|entry| {
            let Some((pipeline, key)) = entry.split_once('=') else {
                return Err(ConfigError::Malformed {
                    var: ENV_PIPELINE_API_KEYS,
                    reason: format!("expected pipeline=key, got `{entry}`"),
                });
            };
            let (pipeline, key) = (pipeline.trim(), key.trim());
            if pipeline.is_empty() {
                return Err(ConfigError::Malformed {
                    var: ENV_PIPELINE_API_KEYS,
                    reason: "empty pipeline name".to_string(),
                });
            }
            if key.is_empty() {
                return Err(ConfigError::InvalidCredential(pipeline.to_string()));
            }
            Ok((pipeline.to_string(), Credential::new(key)))
        })
        .collect()
}

//! Error types for the notification service.

use thiserror::Error;

/// Errors returned by an incident channel (the alerting service client).
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate limited by the service
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the service asked us to wait
        retry_after_secs: u64,
    },

    /// The service rejected the request
    #[error("{service} returned {status}: {body}")]
    Rejected {
        /// Service name
        service: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors raised while handling a single stage-status event.
///
/// A handling error never leaves the incident table partially updated.
#[derive(Debug, Error)]
pub enum HandlingError {
    /// The request body was not a stage-status notification
    #[error("Malformed stage-status event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    /// The deep link back to the CI run could not be built
    #[error("Invalid run URL {url}: {reason}")]
    InvalidRunUrl {
        /// The URL that failed to parse
        url: String,
        /// Parser message
        reason: String,
    },

    /// A monitored pipeline had no credential at handling time
    #[error("No alerting credential for pipeline {0}")]
    MissingCredential(String),

    /// The alerting service call failed
    #[error("Alerting call failed: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration errors. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A monitored pipeline has no credential
    #[error("Pipeline {0} is monitored but has no PagerDuty API key")]
    MissingCredential(String),

    /// A credential is present but empty
    #[error("Empty PagerDuty API key for pipeline {0}")]
    InvalidCredential(String),

    /// A variable could not be parsed
    #[error("Malformed {var}: {reason}")]
    Malformed {
        /// Environment variable name
        var: &'static str,
        /// What was wrong with it
        reason: String,
    },
}

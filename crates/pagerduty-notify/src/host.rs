//! Host identity and links back to the CI run.

use tracing::warn;
use url::Url;

use crate::error::HandlingError;
use crate::events::StatusEvent;

/// Local host name, or an empty string if it cannot be determined.
#[must_use]
pub fn discover_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!(error = %e, "Unable to discern hostname, using blank hostname");
            String::new()
        }
    }
}

/// Link to the stage run on the GoCD server.
///
/// Uses `server_url` when configured, otherwise `https://<hostname>`.
/// Returns `None` when the host name is blank and no server URL is set.
///
/// # Errors
/// Returns [`HandlingError::InvalidRunUrl`] if the result is not a valid URL.
pub fn run_url(
    server_url: Option<&str>,
    hostname: &str,
    event: &StatusEvent,
) -> Result<Option<Url>, HandlingError> {
    let base = match server_url {
        Some(base) => base.trim_end_matches('/').to_string(),
        None if hostname.is_empty() => return Ok(None),
        None => format!("https://{hostname}"),
    };

    let raw = format!("{base}{}", event.run_path());
    Url::parse(&raw)
        .map(Some)
        .map_err(|e| HandlingError::InvalidRunUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })
}

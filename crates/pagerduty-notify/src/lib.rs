//! PagerDuty notifications for GoCD pipelines.
//!
//! This crate receives GoCD stage-status notifications and keeps PagerDuty
//! in step with them: a failing stage of a monitored pipeline opens an
//! incident, and the next passing run of the same stage resolves it.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use pagerduty_notify::{Config, IncidentReconciler, PagerDutyChannel, StatusEvent};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let channel = PagerDutyChannel::new(config.events_url.clone(), config.timeout)?;
//! let reconciler = IncidentReconciler::new(
//!     config.monitor,
//!     pagerduty_notify::host::discover_hostname(),
//!     Arc::new(channel),
//! );
//!
//! let event = StatusEvent::new("deploy-api", "42", "integration", "1", "Failed", "Failed");
//! reconciler.handle(&event).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`IncidentChannel`] trait defines the alerting service interface
//! - [`PagerDutyChannel`] implements it over the Events API v2
//! - [`IncidentReconciler`] decides, per event, whether to open or resolve
//! - [`IncidentTable`] tracks open incidents per `pipeline-stage`
//! - [`server`] exposes the reconciler over HTTP

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod reconciler;
pub mod server;
pub mod table;

pub use channels::pagerduty::PagerDutyChannel;
pub use channels::{IncidentChannel, IncidentRequest};
pub use config::{Config, Credential, MonitorConfig};
pub use error::{ChannelError, ConfigError, HandlingError};
pub use events::StatusEvent;
pub use reconciler::{IncidentReconciler, Outcome};
pub use table::IncidentTable;

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Session orchestration for the traffic map.
//!
//! [`RefreshScheduler`] owns the query settings for one map session
//! (center, radius or zoom, filters, active route) and keeps a
//! [`Snapshot`] of incidents current by refreshing on a timer and on
//! every setting change. Configuration is loaded from TOML by
//! [`TrafficMapConfig`].

pub mod config;
pub mod scheduler;
pub mod snapshot;

pub use config::{ConfigError, SchedulerConfig, TrafficMapConfig};
pub use scheduler::{AreaExtent, RefreshOutcome, RefreshScheduler, SchedulerError, SessionSettings};
pub use snapshot::{Mode, RouteView, Snapshot, Status};

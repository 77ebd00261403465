//! Live occupancy monitor for an Antares-connected parking lot.
//!
//! The device publishes cumulative entry/exit totals; this crate turns them
//! into same-day counts against a persisted daily baseline and publishes a
//! dashboard view over HTTP.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod model;
pub mod poller;
pub mod source;
pub mod store;
pub mod tracker;

pub use error::{MonitorError, Result};
pub use model::{DailyBaseline, DerivedStatus, RawCounters, CAPACITY};
pub use tracker::{derive_status, reconcile_baseline};

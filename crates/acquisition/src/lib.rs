//! Telemetry Acquisition Task
//!
//! The long-lived worker that owns the adapter link: it connects, fetches
//! vehicle identity and stored codes once, then rotates through the engine
//! parameters forever, servicing consumer DTC requests between cycles and
//! reconnecting when the link drops. Every result lands in the shared
//! telemetry store; nothing is surfaced to consumers any other way.

mod config;
mod error;
mod poller;
mod services;

pub use config::AcquisitionConfig;
pub use error::AcquisitionError;
pub use poller::AcquisitionLoop;

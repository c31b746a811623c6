//! Shared Telemetry Store
//!
//! The synchronization point between the acquisition task and its
//! consumers: one mutex-guarded record holding the latest decoded values,
//! connection status, trouble codes, VIN, and the two consumer command
//! flags. Consumers read whole-record snapshots; the acquisition task
//! writes field groups. No I/O happens while the lock is held.

mod store;

pub use store::{CommandFlags, StoreError, TelemetrySnapshot, TelemetryStore, ERROR_MESSAGE_MAX};

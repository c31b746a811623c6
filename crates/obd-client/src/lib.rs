//! ELM327 OBD-II Client
//!
//! This crate provides async text-protocol communication with
//! ELM327-compatible adapters, reached over TCP (WiFi adapters) or a
//! serial device (Bluetooth RFCOMM bindings, USB). It covers the link
//! lifecycle, the command/response channel, and pure decoding of
//! parameter, trouble-code, and vehicle-identity responses.

mod channel;
mod connection;
mod decode;
mod error;
pub mod mock;
mod transport;

pub mod dtc;
pub mod pid;
pub mod vin;

pub use channel::{CommandChannel, ReadOutcome, RESPONSE_PROMPT};
pub use connection::{ConnectionManager, LinkConfig};
pub use decode::{is_error_response, payload_byte};
pub use error::LinkError;
pub use pid::{Parameter, ParameterReading};
pub use transport::{Connector, LinkStream, NetConnector};

/// Diagnostic command strings
pub mod command {
    /// Read stored trouble codes (mode 03)
    pub const READ_STORED_CODES: &str = "03";
    /// Clear trouble codes and the MIL (mode 04)
    pub const CLEAR_CODES: &str = "04";
    /// Vehicle identification number (mode 09 PID 02)
    pub const VEHICLE_ID: &str = "0902";
}

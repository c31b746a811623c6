//! Store Implementation

use obd_client::dtc::{Dtc, MAX_STORED_CODES};
use obd_client::{Parameter, ParameterReading};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

/// Error messages longer than this are truncated
pub const ERROR_MESSAGE_MAX: usize = 64;

/// Store access errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another holder panicked while writing; the record can no longer be
    /// trusted and the acquisition task treats this as fatal.
    #[error("Telemetry store lock poisoned: {0}")]
    Poisoned(String),
}

/// Pending consumer commands, drained by the acquisition task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandFlags {
    pub refresh_requested: bool,
    pub clear_requested: bool,
}

/// Full copy of the record, taken under one lock acquisition.
///
/// Parameter fields hold their sentinel value until the first successful
/// reading. Consumers may see a mix of old and new parameter values across
/// snapshots; within one snapshot the record is self-consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Engine RPM (-1 until read)
    pub rpm: i32,
    /// Vehicle speed in km/h (-1 until read)
    pub speed: i32,
    /// Coolant temperature in °C (-999 until read)
    pub coolant_temp: f64,
    /// Intake air temperature in °C (-999 until read)
    pub intake_temp: f64,
    /// Throttle position in % (-1 until read)
    pub throttle: f64,
    /// Battery voltage in V (-1 until read)
    pub battery_voltage: f64,

    /// Adapter connection status
    pub connected: bool,
    /// Why the link is down, empty while connected
    pub error: String,

    /// Stored trouble codes, severity-sorted, at most twelve
    pub dtc_codes: Vec<Dtc>,
    pub dtc_count: usize,
    /// Whether codes have been fetched at least once
    pub dtc_fetched: bool,

    pub refresh_requested: bool,
    pub clear_requested: bool,

    /// Vehicle identification number or a fixed placeholder
    pub vin: String,
    pub vin_fetched: bool,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            rpm: Parameter::Rpm.sentinel() as i32,
            speed: Parameter::Speed.sentinel() as i32,
            coolant_temp: Parameter::CoolantTemp.sentinel(),
            intake_temp: Parameter::IntakeTemp.sentinel(),
            throttle: Parameter::Throttle.sentinel(),
            battery_voltage: Parameter::BatteryVoltage.sentinel(),
            connected: false,
            error: String::new(),
            dtc_codes: Vec::new(),
            dtc_count: 0,
            dtc_fetched: false,
            refresh_requested: false,
            clear_requested: false,
            vin: String::new(),
            vin_fetched: false,
        }
    }
}

/// The shared store. Cloning is cheap and every clone refers to the same
/// record.
#[derive(Clone, Default)]
pub struct TelemetryStore {
    inner: Arc<Mutex<TelemetrySnapshot>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> Result<MutexGuard<'_, TelemetrySnapshot>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    /// Copy the whole record out under the lock
    pub fn snapshot(&self) -> Result<TelemetrySnapshot, StoreError> {
        Ok(self.locked()?.clone())
    }

    /// Write one decoded parameter value
    pub fn apply_reading(&self, reading: &ParameterReading) -> Result<(), StoreError> {
        let mut record = self.locked()?;
        match reading.parameter {
            Parameter::Rpm => record.rpm = reading.value as i32,
            Parameter::Speed => record.speed = reading.value as i32,
            Parameter::CoolantTemp => record.coolant_temp = reading.value,
            Parameter::IntakeTemp => record.intake_temp = reading.value,
            Parameter::Throttle => record.throttle = reading.value,
            Parameter::BatteryVoltage => record.battery_voltage = reading.value,
        }
        Ok(())
    }

    /// Mark the link up and clear the error message
    pub fn set_connected(&self) -> Result<(), StoreError> {
        let mut record = self.locked()?;
        record.connected = true;
        record.error.clear();
        Ok(())
    }

    /// Mark the link down with an explanatory message (truncated to
    /// [`ERROR_MESSAGE_MAX`] characters)
    pub fn set_disconnected(&self, message: &str) -> Result<(), StoreError> {
        let mut record = self.locked()?;
        record.connected = false;
        record.error = message.chars().take(ERROR_MESSAGE_MAX).collect();
        Ok(())
    }

    /// Replace the trouble-code list wholesale and mark it fetched
    pub fn set_dtcs(&self, mut codes: Vec<Dtc>) -> Result<(), StoreError> {
        codes.truncate(MAX_STORED_CODES);
        let mut record = self.locked()?;
        record.dtc_count = codes.len();
        record.dtc_codes = codes;
        record.dtc_fetched = true;
        Ok(())
    }

    /// Empty the trouble-code list (after a successful clear command)
    pub fn clear_dtcs(&self) -> Result<(), StoreError> {
        let mut record = self.locked()?;
        record.dtc_codes.clear();
        record.dtc_count = 0;
        Ok(())
    }

    /// Store the VIN (or a placeholder) and its fetched flag
    pub fn set_vin(&self, vin: &str, fetched: bool) -> Result<(), StoreError> {
        let mut record = self.locked()?;
        record.vin = vin.to_string();
        record.vin_fetched = fetched;
        Ok(())
    }

    /// Consumer side: ask for a trouble-code refresh
    pub fn request_refresh(&self) -> Result<(), StoreError> {
        debug!("DTC refresh requested");
        self.locked()?.refresh_requested = true;
        Ok(())
    }

    /// Consumer side: ask for the codes to be cleared
    pub fn request_clear(&self) -> Result<(), StoreError> {
        debug!("DTC clear requested");
        self.locked()?.clear_requested = true;
        Ok(())
    }

    /// Acquisition side: read the pending command flags
    pub fn command_flags(&self) -> Result<CommandFlags, StoreError> {
        let record = self.locked()?;
        Ok(CommandFlags {
            refresh_requested: record.refresh_requested,
            clear_requested: record.clear_requested,
        })
    }

    /// Acquisition side: mark the refresh request serviced
    pub fn acknowledge_refresh(&self) -> Result<(), StoreError> {
        self.locked()?.refresh_requested = false;
        Ok(())
    }

    /// Acquisition side: mark the clear request serviced
    pub fn acknowledge_clear(&self) -> Result<(), StoreError> {
        self.locked()?.clear_requested = false;
        Ok(())
    }
}

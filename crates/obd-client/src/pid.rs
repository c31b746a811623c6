//! Engine parameter definitions and conversion formulas
//!
//! Each supported parameter carries its own command string, payload arity,
//! and conversion, so the polling rotation stays data-driven.

use crate::channel::CommandChannel;
use crate::decode;
use crate::error::LinkError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The engine parameters supported by the acquisition rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parameter {
    /// Engine RPM (mode 01 PID 0x0C)
    Rpm,
    /// Vehicle speed (mode 01 PID 0x0D)
    Speed,
    /// Engine coolant temperature (mode 01 PID 0x05)
    CoolantTemp,
    /// Throttle position (mode 01 PID 0x11)
    Throttle,
    /// Intake air temperature (mode 01 PID 0x0F)
    IntakeTemp,
    /// Control module voltage (mode 01 PID 0x42)
    BatteryVoltage,
}

impl Parameter {
    /// Fixed polling rotation, one parameter per cycle
    pub const ROTATION: [Parameter; 6] = [
        Parameter::Rpm,
        Parameter::Speed,
        Parameter::CoolantTemp,
        Parameter::Throttle,
        Parameter::IntakeTemp,
        Parameter::BatteryVoltage,
    ];

    /// The mode 01 command string for this parameter
    pub fn command(self) -> &'static str {
        match self {
            Parameter::Rpm => "010C",
            Parameter::Speed => "010D",
            Parameter::CoolantTemp => "0105",
            Parameter::Throttle => "0111",
            Parameter::IntakeTemp => "010F",
            Parameter::BatteryVoltage => "0142",
        }
    }

    /// Number of payload bytes the conversion needs
    pub fn response_bytes(self) -> usize {
        match self {
            Parameter::Rpm | Parameter::BatteryVoltage => 2,
            _ => 1,
        }
    }

    /// Store sentinel marking "no valid reading yet"
    pub fn sentinel(self) -> f64 {
        match self {
            Parameter::CoolantTemp | Parameter::IntakeTemp => -999.0,
            _ => -1.0,
        }
    }

    /// Human-readable name
    pub fn label(self) -> &'static str {
        match self {
            Parameter::Rpm => "Engine RPM",
            Parameter::Speed => "Vehicle Speed",
            Parameter::CoolantTemp => "Coolant Temperature",
            Parameter::Throttle => "Throttle Position",
            Parameter::IntakeTemp => "Intake Air Temperature",
            Parameter::BatteryVoltage => "Battery Voltage",
        }
    }

    /// Unit of the converted value
    pub fn unit(self) -> &'static str {
        match self {
            Parameter::Rpm => "rpm",
            Parameter::Speed => "km/h",
            Parameter::CoolantTemp | Parameter::IntakeTemp => "°C",
            Parameter::Throttle => "%",
            Parameter::BatteryVoltage => "V",
        }
    }

    /// Apply the conversion formula to the decoded payload bytes.
    ///
    /// `bytes` must hold `response_bytes()` entries.
    pub fn convert(self, bytes: &[u8]) -> f64 {
        let a = f64::from(bytes[0]);
        match self {
            // RPM: ((A*256)+B)/4
            Parameter::Rpm => (a * 256.0 + f64::from(bytes[1])) / 4.0,
            // Speed: A (km/h)
            Parameter::Speed => a,
            // Temperatures: A - 40 (°C)
            Parameter::CoolantTemp | Parameter::IntakeTemp => a - 40.0,
            // Throttle: A * 100 / 255 (%)
            Parameter::Throttle => a * 100.0 / 255.0,
            // Module voltage: ((A*256)+B)/1000 (V)
            Parameter::BatteryVoltage => (a * 256.0 + f64::from(bytes[1])) / 1000.0,
        }
    }
}

/// One successfully converted parameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterReading {
    pub parameter: Parameter,
    pub value: f64,
}

/// Query one parameter over the channel.
///
/// Succeeds only when every required payload byte decodes; a missing echo,
/// short payload, or adapter error reply yields `Ok(None)` rather than an
/// error, matching the transient-failure handling of the polling loop.
pub async fn query(
    channel: &mut CommandChannel,
    parameter: Parameter,
) -> Result<Option<ParameterReading>, LinkError> {
    let outcome = channel.send(parameter.command()).await?;
    let text = outcome.text();

    if decode::is_error_response(text) {
        debug!("{} query answered with an error reply", parameter.label());
        return Ok(None);
    }

    let mut bytes = [0u8; 2];
    for (index, slot) in bytes.iter_mut().take(parameter.response_bytes()).enumerate() {
        match decode::payload_byte(text, index) {
            Some(byte) => *slot = byte,
            None => return Ok(None),
        }
    }

    let value = parameter.convert(&bytes[..parameter.response_bytes()]);
    Ok(Some(ParameterReading { parameter, value }))
}

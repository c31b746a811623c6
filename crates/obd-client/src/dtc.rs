//! Diagnostic trouble code decoding and classification

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Most codes the controller will report in one query
pub const MAX_STORED_CODES: usize = 12;

/// Fallback description for codes missing from the table
const UNKNOWN_DESCRIPTION: &str = "Unknown DTC";

/// Severity of a stored trouble code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A decoded diagnostic trouble code.
///
/// Created on a successful query and replaced wholesale on the next one;
/// never mutated in place. Duplicates reported by the controller pass
/// through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dtc {
    /// Five-character code, e.g. "P0133"
    pub code: String,
    /// Human-readable description
    pub description: String,
    pub severity: Severity,
}

/// Decode a 16-bit big-endian DTC value to its textual code.
///
/// Bits [15:14] select the class prefix, bits [13:12] the first digit,
/// bits [11:0] the remaining three hex digits.
pub fn decode_code(value: u16) -> String {
    let prefix = match (value >> 14) & 0x03 {
        0 => 'P',
        1 => 'C',
        2 => 'B',
        _ => 'U',
    };
    let first_digit = (value >> 12) & 0x03;
    format!("{prefix}{first_digit}{:03X}", value & 0x0FFF)
}

/// Look up description and severity for a code and build the record.
///
/// Codes missing from the table fall back to "Unknown DTC" at info
/// severity.
pub fn classify(code: &str) -> Dtc {
    let (description, severity) = description_table()
        .get(code)
        .copied()
        .unwrap_or((UNKNOWN_DESCRIPTION, Severity::Info));
    Dtc {
        code: code.to_string(),
        description: description.to_string(),
        severity,
    }
}

/// Parse a mode 03 response into classified codes.
///
/// Locates the `43` header, skips the count byte, then decodes successive
/// 16-bit pairs until an all-zero pair, the 12-code cap, or the end of the
/// data. A response without the header yields an empty list, not an error.
pub fn parse_stored_codes(response: &str) -> Vec<Dtc> {
    let compact: String = response.split_whitespace().collect();
    let compact = compact.to_ascii_uppercase();

    let start = match compact.find("43") {
        Some(pos) => pos + 4,
        None => return Vec::new(),
    };

    let mut codes = Vec::new();
    let mut pos = start;
    while pos + 4 <= compact.len() && codes.len() < MAX_STORED_CODES {
        let hi = u8::from_str_radix(&compact[pos..pos + 2], 16);
        let lo = u8::from_str_radix(&compact[pos + 2..pos + 4], 16);
        let (Ok(hi), Ok(lo)) = (hi, lo) else {
            break;
        };
        if hi == 0 && lo == 0 {
            break;
        }
        let value = u16::from_be_bytes([hi, lo]);
        codes.push(classify(&decode_code(value)));
        pos += 4;
    }
    codes
}

/// Whether a mode 04 response acknowledges the clear request
pub fn clear_acknowledged(response: &str) -> bool {
    let compact: String = response.split_whitespace().collect();
    compact.to_ascii_uppercase().contains("44")
}

/// Sort codes in place, critical first, then warning, then info.
///
/// The sort is stable, so ties keep their decode order and re-sorting a
/// sorted list changes nothing.
pub fn sort_by_severity(codes: &mut [Dtc]) {
    codes.sort_by(|a, b| b.severity.cmp(&a.severity));
}

fn description_table() -> &'static HashMap<&'static str, (&'static str, Severity)> {
    static TABLE: OnceLock<HashMap<&'static str, (&'static str, Severity)>> = OnceLock::new();
    TABLE.get_or_init(|| DESCRIPTIONS.iter().copied().collect())
}

/// Known codes with description and severity.
///
/// Descriptions follow SAE J2012 phrasing, shortened to fit the display.
const DESCRIPTIONS: [(&str, (&str, Severity)); 44] = [
    ("P0100", ("Mass Air Flow Circuit Malfunction", Severity::Warning)),
    ("P0101", ("Mass Air Flow Circuit Range/Performance", Severity::Warning)),
    ("P0105", ("Manifold Absolute Pressure Circuit Malfunction", Severity::Warning)),
    ("P0110", ("Intake Air Temperature Circuit Malfunction", Severity::Warning)),
    ("P0113", ("Intake Air Temperature Circuit High Input", Severity::Warning)),
    ("P0115", ("Engine Coolant Temperature Circuit Malfunction", Severity::Critical)),
    ("P0117", ("Engine Coolant Temperature Circuit Low Input", Severity::Warning)),
    ("P0118", ("Engine Coolant Temperature Circuit High Input", Severity::Warning)),
    ("P0120", ("Throttle Position Sensor Circuit Malfunction", Severity::Warning)),
    ("P0128", ("Coolant Thermostat Below Regulating Temperature", Severity::Info)),
    ("P0130", ("O2 Sensor Circuit Malfunction Bank 1 Sensor 1", Severity::Warning)),
    ("P0133", ("O2 Sensor Slow Response Bank 1 Sensor 1", Severity::Info)),
    ("P0135", ("O2 Sensor Heater Circuit Bank 1 Sensor 1", Severity::Warning)),
    ("P0171", ("System Too Lean Bank 1", Severity::Warning)),
    ("P0172", ("System Too Rich Bank 1", Severity::Warning)),
    ("P0300", ("Random/Multiple Cylinder Misfire Detected", Severity::Critical)),
    ("P0301", ("Cylinder 1 Misfire Detected", Severity::Critical)),
    ("P0302", ("Cylinder 2 Misfire Detected", Severity::Critical)),
    ("P0303", ("Cylinder 3 Misfire Detected", Severity::Critical)),
    ("P0304", ("Cylinder 4 Misfire Detected", Severity::Critical)),
    ("P0325", ("Knock Sensor 1 Circuit Malfunction", Severity::Warning)),
    ("P0335", ("Crankshaft Position Sensor Circuit Malfunction", Severity::Critical)),
    ("P0340", ("Camshaft Position Sensor Circuit Malfunction", Severity::Critical)),
    ("P0400", ("Exhaust Gas Recirculation Flow Malfunction", Severity::Warning)),
    ("P0401", ("Exhaust Gas Recirculation Flow Insufficient", Severity::Warning)),
    ("P0420", ("Catalyst System Efficiency Below Threshold Bank 1", Severity::Warning)),
    ("P0440", ("Evaporative Emission Control System Malfunction", Severity::Info)),
    ("P0442", ("Evaporative Emission System Small Leak Detected", Severity::Info)),
    ("P0455", ("Evaporative Emission System Large Leak Detected", Severity::Warning)),
    ("P0500", ("Vehicle Speed Sensor Malfunction", Severity::Warning)),
    ("P0505", ("Idle Control System Malfunction", Severity::Warning)),
    ("P0560", ("System Voltage Malfunction", Severity::Warning)),
    ("P0562", ("System Voltage Low", Severity::Critical)),
    ("P0563", ("System Voltage High", Severity::Warning)),
    ("P0600", ("Serial Communication Link Malfunction", Severity::Warning)),
    ("P0605", ("Internal Control Module ROM Error", Severity::Critical)),
    ("P0700", ("Transmission Control System Malfunction", Severity::Warning)),
    ("C0035", ("Left Front Wheel Speed Sensor Circuit", Severity::Warning)),
    ("C0040", ("Right Front Wheel Speed Sensor Circuit", Severity::Warning)),
    ("B0001", ("Driver Frontal Stage 1 Deployment Control", Severity::Critical)),
    ("B1000", ("Electronic Control Unit Internal Fault", Severity::Warning)),
    ("U0100", ("Lost Communication With ECM/PCM", Severity::Critical)),
    ("U0121", ("Lost Communication With ABS Control Module", Severity::Warning)),
    ("U0155", ("Lost Communication With Instrument Cluster", Severity::Info)),
];

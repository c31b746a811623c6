//! Vehicle identification number decoding

/// A VIN is always 17 characters
pub const VIN_LENGTH: usize = 17;

/// Stored when the response decodes to the wrong character count
pub const VIN_UNAVAILABLE: &str = "VIN UNAVAILABLE";

/// Stored when the controller does not answer mode 09 02 at all
pub const VIN_UNSUPPORTED: &str = "VIN UNSUPPORTED";

/// Result of decoding a mode 09 02 response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VinOutcome {
    /// Exactly 17 printable characters recovered
    Decoded(String),
    /// Header present but the payload did not yield 17 characters
    Unavailable,
    /// No `49 02` header anywhere in the response
    Unsupported,
}

/// Decode a mode 09 02 response into a VIN.
///
/// Whitespace is stripped, then every `49 02` echo starts a segment; the
/// two-character line counter after each echo is skipped and the remaining
/// hex pairs decode to ASCII. Only printable characters (0x20..=0x7E) are
/// accepted; padding bytes are skipped. The VIN is valid only when exactly
/// 17 characters are recovered across all segments.
pub fn decode_vin(response: &str) -> VinOutcome {
    let compact: String = response.split_whitespace().collect();
    let compact = compact.to_ascii_uppercase();

    if !compact.contains("4902") {
        return VinOutcome::Unsupported;
    }

    let mut vin = String::new();
    for segment in compact.split("4902").skip(1) {
        // Skip the line counter, then walk hex pairs until non-hex data.
        let payload = segment.get(2..).unwrap_or("");
        let mut pos = 0;
        while pos + 2 <= payload.len() {
            let Ok(byte) = u8::from_str_radix(&payload[pos..pos + 2], 16) else {
                break;
            };
            if (0x20..=0x7E).contains(&byte) {
                vin.push(byte as char);
            }
            pos += 2;
        }
    }

    if vin.len() == VIN_LENGTH {
        VinOutcome::Decoded(vin)
    } else {
        VinOutcome::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a multi-line mode 09 02 response carrying `vin`
    fn vin_response(vin: &str) -> String {
        let hex: Vec<String> = vin.bytes().map(|b| format!("{b:02X}")).collect();
        let mut response = String::new();
        for (line, chunk) in hex.chunks(6).enumerate() {
            response.push_str(&format!("49 02 {:02X} {}\r", line + 1, chunk.join(" ")));
        }
        response.push('>');
        response
    }

    #[test]
    fn decodes_a_seventeen_character_vin() {
        let response = vin_response("W0L0XCF0845123456");
        assert_eq!(
            decode_vin(&response),
            VinOutcome::Decoded("W0L0XCF0845123456".to_string())
        );
    }

    #[test]
    fn padding_bytes_are_skipped() {
        // Leading zero padding before the VIN proper, as CAN controllers send.
        let response = "49 02 01 00 00 57 30 4C\r49 02 02 30 58 43 46 30 38\r49 02 03 34 35 31 32 33 34 35 36\r>";
        assert_eq!(
            decode_vin(response),
            VinOutcome::Decoded("W0L0XCF0845123456".to_string())
        );
    }

    #[test]
    fn wrong_character_count_is_unavailable() {
        let response = vin_response("TOOSHORT");
        assert_eq!(decode_vin(&response), VinOutcome::Unavailable);
    }

    #[test]
    fn missing_header_is_unsupported() {
        assert_eq!(decode_vin("NO DATA\r>"), VinOutcome::Unsupported);
        assert_eq!(decode_vin(""), VinOutcome::Unsupported);
    }

    #[test]
    fn eighteen_characters_are_rejected() {
        let response = vin_response("W0L0XCF08451234567");
        assert_eq!(decode_vin(&response), VinOutcome::Unavailable);
    }
}

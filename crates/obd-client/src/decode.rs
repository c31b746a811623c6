//! Pure response parsing, no I/O

/// Mode 01 responses echo the query as `41 <pid>` before the payload.
const MODE01_ECHO: &str = "41";

/// Characters to skip past the `41 <pid> ` echo once it is located
const ECHO_WIDTH: usize = 6;

/// Adapter replies that signal a failed query rather than data
const ERROR_KEYWORDS: [&str; 5] = ["NO DATA", "ERROR", "UNABLE", "BUS INIT", "?"];

/// Extract the `index`-th payload byte from a mode 01 response.
///
/// Locates the first `41` echo, skips the fixed-width mode/PID prefix,
/// then walks whitespace-delimited two-character hex tokens. Token spacing
/// from real adapters is inconsistent, so runs of whitespace are tolerated
/// between tokens.
///
/// Returns `None` when the echo is missing or fewer payload bytes exist
/// than requested.
pub fn payload_byte(response: &str, index: usize) -> Option<u8> {
    let start = response.find(MODE01_ECHO)?;
    let data = response.get(start + ECHO_WIDTH..).unwrap_or("");

    let bytes = data.as_bytes();
    let mut pos = 0;
    let mut current = 0;

    while pos < bytes.len() && current <= index {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if current == index {
            let token = data.get(pos..pos + 2)?;
            return u8::from_str_radix(token, 16).ok();
        }
        pos += 2;
        current += 1;
    }

    None
}

/// Whether the response carries one of the adapter's error markers
pub fn is_error_response(response: &str) -> bool {
    let upper = response.to_ascii_uppercase();
    ERROR_KEYWORDS.iter().any(|kw| upper.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_payload_bytes_in_order() {
        let response = "41 0C 1A F8 \r>";
        assert_eq!(payload_byte(response, 0), Some(0x1A));
        assert_eq!(payload_byte(response, 1), Some(0xF8));
    }

    #[test]
    fn missing_echo_yields_none_for_any_index() {
        let response = "SEARCHING...\r>";
        for index in 0..4 {
            assert_eq!(payload_byte(response, index), None);
        }
    }

    #[test]
    fn index_past_payload_yields_none() {
        assert_eq!(payload_byte("41 0D 55 \r>", 1), None);
    }

    #[test]
    fn tolerates_uneven_spacing() {
        assert_eq!(payload_byte("41 05  7B \r>", 0), Some(0x7B));
        assert_eq!(payload_byte("41 0C   1A  F8>", 1), Some(0xF8));
    }

    #[test]
    fn echo_preceded_by_noise_is_still_found() {
        assert_eq!(payload_byte("\r41 11 80 \r>", 0), Some(0x80));
    }

    #[test]
    fn prompt_in_token_position_is_not_hex() {
        assert_eq!(payload_byte("41 0D >", 0), None);
    }

    #[test]
    fn error_keywords_are_recognized() {
        assert!(is_error_response("NO DATA\r>"));
        assert!(is_error_response("unable to connect\r>"));
        assert!(is_error_response("?\r>"));
        assert!(!is_error_response("41 0C 1A F8 \r>"));
    }
}

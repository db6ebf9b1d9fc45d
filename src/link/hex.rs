//! Hex rendering for the traffic log and hex parsing for user-entered send data.
use std::fmt::Write;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexError {
    #[error("odd number of hex digits ({0})")]
    OddLength(usize),
    #[error("invalid hex pair '{pair}' at position {position}")]
    InvalidDigit { pair: String, position: usize },
}

/// Render bytes as upper-case, space-separated pairs, e.g. `02 1F 03`.
pub fn to_hex_string(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, b) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(&mut out, "{:02X}", b);
    }
    out
}

/// Like [`to_hex_string`] but capped at `max` bytes with an ellipsis, for log lines.
pub fn hex_preview(data: &[u8], max: usize) -> String {
    if data.len() <= max {
        return to_hex_string(data);
    }
    let mut out = to_hex_string(&data[..max]);
    out.push_str(" …");
    out
}

/// Parse a string of hex digits such as `"02 1F 03"` or `"021f03"`.
///
/// All whitespace is ignored; digits are case-insensitive.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, HexError> {
    let digits: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(HexError::OddLength(digits.len()));
    }
    digits
        .chunks(2)
        .enumerate()
        .map(|(i, pair)| {
            let pair: String = pair.iter().collect();
            // from_str_radix alone would accept a leading '+'
            if !pair.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(HexError::InvalidDigit {
                    pair,
                    position: i * 2,
                });
            }
            u8::from_str_radix(&pair, 16).map_err(|_| HexError::InvalidDigit {
                pair,
                position: i * 2,
            })
        })
        .collect()
}

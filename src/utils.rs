//! Address and call-data helpers.

use std::str::FromStr;

use ethers::types::Address;

/// Lower-cases an address and makes sure it carries a `0x` prefix.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if body.is_empty() {
        return String::new();
    }
    format!("0x{}", body.to_lowercase())
}

/// Returns true if the string is a well formed 20 byte hex address.
pub fn is_valid_address(address: &str) -> bool {
    let normalized = normalize_address(address);
    normalized.len() == 42 && Address::from_str(&normalized).is_ok()
}

/// Decodes `0x` prefixed call-data. Odd length input gets a leading zero.
pub fn decode_hex_input(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let body = input.trim().trim_start_matches("0x");
    if body.len() % 2 == 1 {
        return hex::decode(format!("0{}", body));
    }
    hex::decode(body)
}

/// Encodes call-data as `0x` hex.
pub fn encode_hex_input(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Makes a string safe as a file name. Keeps alphanumerics, `-`, `_` and `.`,
/// everything else becomes `_`.
pub fn sanitize_file_component(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

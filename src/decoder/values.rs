//! JSON rendering and measuring of decoded tokens.

use ethabi::Token;
use ethers::types::I256;
use serde_json::Value;

/// Renders a decoded token as JSON.
///
/// Addresses and byte strings become `0x` hex, integers become decimal strings
/// so values wider than 53 bits survive, arrays and tuples become JSON arrays.
pub fn token_to_json(token: &Token) -> Value {
    match token {
        Token::Array(ref elements) | Token::FixedArray(ref elements) | Token::Tuple(ref elements) => {
            Value::Array(elements.iter().map(token_to_json).collect())
        }
        Token::Address(address) => Value::String(format!("{:#x}", address)),
        Token::Bytes(ref bytes) | Token::FixedBytes(ref bytes) => {
            Value::String(format!("0x{}", hex::encode(bytes)))
        }
        Token::Uint(value) => Value::String(value.to_string()),
        Token::Int(value) => Value::String(I256::from_raw(*value).to_string()),
        Token::Bool(value) => Value::Bool(*value),
        Token::String(value) => Value::String(value.clone()),
    }
}

/// Length of a token: element count for arrays, byte count for bytes, character
/// count for strings. Scalars have no length.
pub fn token_len(token: &Token) -> Option<usize> {
    match token {
        Token::Array(ref elements) | Token::FixedArray(ref elements) | Token::Tuple(ref elements) => {
            Some(elements.len())
        }
        Token::Bytes(ref bytes) | Token::FixedBytes(ref bytes) => Some(bytes.len()),
        Token::String(value) => Some(value.chars().count()),
        _ => None,
    }
}

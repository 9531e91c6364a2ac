//! Selector indexed decoding of call-data against a known ABI.

use ethabi::{Contract, Function, Token};
use std::collections::HashMap;
use thiserror::Error;

pub mod values;
#[cfg(test)]
mod tests;

pub use values::{token_len, token_to_json};

/// Errors raised while building a decoder from ABI material.
#[derive(Debug, Error)]
pub enum DecoderError {
    /// The material is not a JSON ABI.
    #[error("Invalid ABI JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The material is JSON, but not an ABI array.
    #[error("Expected an ABI array, got {0}")]
    NotAnArray(String),
}

/// Result of decoding call-data against one ABI.
///
/// `types`, `names` and `inputs` always have the same length and are aligned by
/// position. A `None` method means the ABI does not recognise the call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedResult {
    /// Name of the matched function, `None` when nothing matched.
    pub method: Option<String>,
    /// Canonical ABI type of every argument.
    pub types: Vec<String>,
    /// Argument names, `arg{index}` for unnamed ones.
    pub names: Vec<String>,
    /// Decoded argument values.
    pub inputs: Vec<Token>,
}

impl DecodedResult {
    /// Result of call-data no function matched.
    pub fn unrecognized() -> Self {
        Self::default()
    }

    /// Whether a function was matched.
    pub fn is_match(&self) -> bool {
        self.method.is_some()
    }
}

/// Decodes call-data for the functions of one contract ABI.
#[derive(Debug, Clone)]
pub struct AbiDecoder {
    selectors: HashMap<[u8; 4], Function>,
}

impl AbiDecoder {
    /// Builds a decoder from a JSON ABI document.
    pub fn from_json(json: &str) -> Result<Self, DecoderError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Builds a decoder from an ABI array, or from a string holding one.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, DecoderError> {
        match value {
            serde_json::Value::String(json) => Self::from_json(json),
            serde_json::Value::Array(_) => {
                let contract: Contract = serde_json::from_value(value.clone())?;
                Ok(Self::from_contract(&contract))
            }
            other => Err(DecoderError::NotAnArray(json_kind(other).to_string())),
        }
    }

    /// Indexes every function of a parsed contract ABI.
    pub fn from_contract(contract: &Contract) -> Self {
        let selectors = contract
            .functions()
            .map(|function| (function.short_signature(), function.clone()))
            .collect();
        Self { selectors }
    }

    /// Number of distinct function selectors this decoder knows.
    pub fn function_count(&self) -> usize {
        self.selectors.len()
    }

    /// Decodes call-data: a 4 byte selector followed by the encoded arguments.
    pub fn decode(&self, input: &[u8]) -> DecodedResult {
        if input.len() < 4 {
            return DecodedResult::unrecognized();
        }
        let (selector, arguments_encoded) = input.split_at(4);
        let mut key = [0u8; 4];
        key.copy_from_slice(selector);

        let function = match self.selectors.get(&key) {
            Some(function) => function,
            None => return DecodedResult::unrecognized(),
        };

        let tokens = match function.decode_input(arguments_encoded) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::debug!(method = %function.name, error = %e, "Selector matched but arguments did not decode");
                return DecodedResult::unrecognized();
            }
        };

        let types = function.inputs.iter().map(|param| param.kind.to_string()).collect();
        let names = function
            .inputs
            .iter()
            .enumerate()
            .map(|(index, param)| {
                if param.name.is_empty() {
                    format!("arg{}", index)
                } else {
                    param.name.clone()
                }
            })
            .collect();

        DecodedResult {
            method: Some(function.name.clone()),
            types,
            names,
            inputs: tokens,
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

use super::*;
use crate::test_utils::{
    address_token_from_string, encode_call, parameterize, string_array, transfer_call, uint_array,
    ERC20_ABI, REGISTRY_ABI,
};
use ethereum_types::U256;
use serde_json::json;

#[test]
fn decodes_known_function() {
    let decoder = AbiDecoder::from_json(ERC20_ABI).unwrap();
    let decoded = decoder.decode(&transfer_call());

    assert_eq!(decoded.method.as_deref(), Some("transfer"));
    assert_eq!(decoded.types, vec!["address", "uint256"]);
    assert_eq!(decoded.names, vec!["to", "value"]);
    assert_eq!(
        decoded.inputs,
        vec![
            address_token_from_string("0x7C07F7aBe10CE8e33DC6C5aD68FE033085256A84"),
            Token::Uint(U256::from(100)),
        ]
    );
}

#[test]
fn unknown_selector_is_unrecognized() {
    let decoder = AbiDecoder::from_json(REGISTRY_ABI).unwrap();
    let decoded = decoder.decode(&transfer_call());
    assert_eq!(decoded, DecodedResult::unrecognized());
    assert!(!decoded.is_match());
}

fn assert_unrecognized(input: Vec<u8>) {
    let decoder = AbiDecoder::from_json(ERC20_ABI).unwrap();
    let decoded = decoder.decode(&input);
    assert!(decoded.method.is_none());
    assert!(decoded.types.is_empty() && decoded.names.is_empty() && decoded.inputs.is_empty());
}

parameterize!(
    assert_unrecognized,
    [
        (empty_input, vec![]),
        (short_input, vec![0xa9, 0x05]),
        (selector_without_arguments, vec![0xa9, 0x05, 0x9c, 0xbb]),
        (truncated_arguments, transfer_call()[..40].to_vec()),
    ]
);

#[test]
fn unnamed_arguments_get_positional_names() {
    let decoder = AbiDecoder::from_json(REGISTRY_ABI).unwrap();
    let input = encode_call(
        REGISTRY_ABI,
        "adjust",
        &[Token::Array(vec![]), Token::FixedBytes(vec![7u8; 32])],
    );
    let decoded = decoder.decode(&input);
    assert_eq!(decoded.names, vec!["deltas", "arg1"]);
    assert_eq!(decoded.types, vec!["int256[]", "bytes32"]);
}

#[test]
fn lists_stay_aligned_for_dynamic_arguments() {
    let decoder = AbiDecoder::from_json(REGISTRY_ABI).unwrap();
    let input = encode_call(
        REGISTRY_ABI,
        "register",
        &[
            uint_array(&[3, 1, 4]),
            string_array(&["a", "bb"]),
            Token::Bytes(vec![1, 2, 3]),
            Token::String("42".to_string()),
        ],
    );
    let decoded = decoder.decode(&input);
    assert_eq!(decoded.method.as_deref(), Some("register"));
    assert_eq!(decoded.types.len(), decoded.names.len());
    assert_eq!(decoded.names.len(), decoded.inputs.len());
    assert_eq!(decoded.types, vec!["uint256[]", "string[]", "bytes", "string"]);
}

#[test]
fn accepts_abi_embedded_in_a_string() {
    let value = serde_json::Value::String(ERC20_ABI.to_string());
    let decoder = AbiDecoder::from_value(&value).unwrap();
    assert_eq!(decoder.function_count(), 2);
}

#[test]
fn rejects_non_abi_material() {
    assert!(matches!(
        AbiDecoder::from_value(&json!({ "abi": [] })),
        Err(DecoderError::NotAnArray(_))
    ));
    assert!(matches!(
        AbiDecoder::from_json("not json"),
        Err(DecoderError::InvalidJson(_))
    ));
    assert!(matches!(
        AbiDecoder::from_value(&json!([{ "type": "function", "name": 5 }])),
        Err(DecoderError::InvalidJson(_))
    ));
}

#[test]
fn empty_abi_builds_a_decoder_that_never_matches() {
    let decoder = AbiDecoder::from_json("[]").unwrap();
    assert_eq!(decoder.function_count(), 0);
    assert!(!decoder.decode(&transfer_call()).is_match());
}

#[test]
fn renders_tokens_as_json() {
    let negative_one = Token::Int(U256::MAX);
    assert_eq!(token_to_json(&negative_one), json!("-1"));
    assert_eq!(token_to_json(&Token::Uint(U256::from(7))), json!("7"));
    assert_eq!(
        token_to_json(&address_token_from_string("0x7C07F7aBe10CE8e33DC6C5aD68FE033085256A84")),
        json!("0x7c07f7abe10ce8e33dc6c5ad68fe033085256a84")
    );
    assert_eq!(token_to_json(&Token::Bytes(vec![0xde, 0xad])), json!("0xdead"));
    assert_eq!(
        token_to_json(&Token::Tuple(vec![Token::Bool(true), string_array(&["x"])])),
        json!([true, ["x"]])
    );
}

#[test]
fn measures_token_lengths() {
    assert_eq!(token_len(&uint_array(&[1, 2, 3])), Some(3));
    assert_eq!(token_len(&Token::Bytes(vec![0; 5])), Some(5));
    assert_eq!(token_len(&Token::String("héllo".to_string())), Some(5));
    assert_eq!(token_len(&Token::Bool(true)), None);
}

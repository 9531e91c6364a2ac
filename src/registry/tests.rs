use super::*;
use crate::test_utils::{transfer_call, FakeExplorer, ERC20_ABI, REGISTRY_ABI};
use serde_json::json;

const TOKEN: &str = "0x00000000000000000000000000000000000000aa";
const VAULT: &str = "0x00000000000000000000000000000000000000bb";

fn spec(address: Option<&str>, alias: Option<&str>, abi: &str) -> AbiEntrySpec {
    AbiEntrySpec {
        address: address.map(str::to_string),
        alias: alias.map(str::to_string),
        abi: serde_json::from_str(abi).unwrap(),
    }
}

#[test]
fn bare_abi_array_is_unattached() {
    let material = AbiMaterial::from_json(ERC20_ABI).unwrap();
    let entries = material.into_entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].address.is_none());
}

#[test]
fn entry_list_keeps_addresses_and_aliases() {
    let json = json!([
        { "address": TOKEN, "alias": "Token", "abi": serde_json::from_str::<serde_json::Value>(ERC20_ABI).unwrap() },
        { "alias": "Registry", "abi": REGISTRY_ABI },
    ]);
    match AbiMaterial::from_value(json).unwrap() {
        AbiMaterial::Entries(entries) => {
            assert_eq!(entries[0].address.as_deref(), Some(TOKEN));
            assert!(entries[1].address.is_none());
            assert!(entries[1].abi.is_string());
        }
        other => panic!("Expected entries, got {:?}", other),
    }
}

#[test]
fn scalar_material_is_rejected() {
    assert!(matches!(AbiMaterial::from_value(json!(42)), Err(AbiMaterialError::Shape)));
    assert!(matches!(AbiMaterial::from_json("{"), Err(AbiMaterialError::Json(_))));
}

#[test]
fn broken_abi_keeps_entry_without_decoder() {
    let entry = AbiEntry::from_spec(spec(Some(TOKEN), None, r#"{"not": "an abi"}"#));
    assert_eq!(entry.address.as_deref(), Some(TOKEN));
    assert!(entry.decoder.is_none());
}

#[tokio::test]
async fn address_keyed_entry_wins_over_everything() {
    let explorer = Arc::new(FakeExplorer::new().with_source(TOKEN, "Fetched", ERC20_ABI));
    let registry = DecoderRegistry::build(
        vec![
            spec(None, Some("Fallback"), ERC20_ABI),
            spec(Some(TOKEN.to_uppercase().replace("0X", "0x").as_str()), Some("Token"), ERC20_ABI),
        ],
        explorer.clone(),
    );

    let resolved = registry.resolve(TOKEN, &[transfer_call()]).await.unwrap();

    assert_eq!(resolved.alias, "Token");
    assert_eq!(resolved.source, ResolutionSource::Known);
    assert_eq!(explorer.fetches(), 0);
}

#[tokio::test]
async fn unattached_entries_are_tried_in_order_and_memoized() {
    let explorer = Arc::new(FakeExplorer::new());
    let registry = DecoderRegistry::build(
        vec![
            spec(None, Some("Registry"), REGISTRY_ABI),
            spec(None, Some("ERC20"), ERC20_ABI),
            spec(None, Some("ERC20 copy"), ERC20_ABI),
        ],
        explorer.clone(),
    );

    let first = registry.resolve(VAULT, &[transfer_call()]).await.unwrap();
    assert_eq!(first.alias, "ERC20");
    assert_eq!(first.source, ResolutionSource::Fallback);
    assert_eq!(registry.known_addresses().await, 1);

    let second = registry.resolve(VAULT, &[]).await.unwrap();
    assert_eq!(second.alias, "ERC20");
    assert_eq!(second.source, ResolutionSource::Known);
    assert_eq!(explorer.fetches(), 0);
}

#[tokio::test]
async fn fetches_once_and_reuses_the_result() {
    let explorer = Arc::new(FakeExplorer::new().with_source(VAULT, "Vault", ERC20_ABI));
    let registry = DecoderRegistry::build(vec![], explorer.clone());

    let first = registry.resolve(VAULT, &[transfer_call()]).await.unwrap();
    let second = registry.resolve(VAULT, &[transfer_call()]).await.unwrap();

    assert_eq!(first.alias, "Vault");
    assert_eq!(first.source, ResolutionSource::Fetched);
    assert_eq!(second.source, ResolutionSource::Known);
    assert_eq!(explorer.fetches(), 1);
}

#[tokio::test]
async fn falls_back_to_getabi_when_source_is_unverified() {
    let mut explorer = FakeExplorer::new();
    explorer.abis.insert(VAULT.to_string(), ERC20_ABI.to_string());
    let explorer = Arc::new(explorer);
    let registry = DecoderRegistry::build(vec![], explorer.clone());

    let resolved = registry.resolve(VAULT, &[]).await.unwrap();

    assert_eq!(resolved.alias, VAULT);
    assert_eq!(explorer.source_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(explorer.abi_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unresolvable_address_carries_the_upstream_error() {
    let explorer = Arc::new(FakeExplorer::new());
    let registry = DecoderRegistry::build(vec![spec(None, None, REGISTRY_ABI)], explorer);

    let err = registry.resolve(VAULT, &[transfer_call()]).await.unwrap_err();

    match err {
        ResolveError::Fetch { address, source } => {
            assert_eq!(address, VAULT);
            assert!(matches!(source, ExplorerError::Api { .. }));
        }
        other => panic!("Expected Fetch error, got {:?}", other),
    }
}

#[tokio::test]
async fn supplied_entry_without_decoder_never_fetches() {
    let explorer = Arc::new(FakeExplorer::new().with_source(TOKEN, "Token", ERC20_ABI));
    let registry = DecoderRegistry::build(vec![spec(Some(TOKEN), None, "{}")], explorer.clone());

    let err = registry.resolve(TOKEN, &[transfer_call()]).await.unwrap_err();

    assert!(matches!(err, ResolveError::NoDecoder { .. }));
    assert_eq!(explorer.fetches(), 0);
}

#[tokio::test]
async fn resolve_all_isolates_failures() {
    let explorer = Arc::new(FakeExplorer::new().with_source(TOKEN, "Token", ERC20_ABI));
    let registry = DecoderRegistry::build(vec![], explorer.clone());

    let results = registry
        .resolve_all(
            vec![(TOKEN.to_string(), vec![transfer_call()]), (VAULT.to_string(), vec![transfer_call()])],
            2,
        )
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[TOKEN].as_ref().unwrap().alias, "Token");
    assert!(results[VAULT].is_err());
}

#[tokio::test]
async fn unattached_entry_matches_any_sample() {
    let explorer = Arc::new(FakeExplorer::new());
    let registry = DecoderRegistry::build(vec![spec(None, Some("ERC20"), ERC20_ABI)], explorer.clone());

    let samples = vec![vec![0x60, 0x80, 0x60, 0x40, 0x52], transfer_call()];
    let resolved = registry.resolve(VAULT, &samples).await.unwrap();

    assert_eq!(resolved.alias, "ERC20");
    assert_eq!(resolved.source, ResolutionSource::Fallback);
    assert_eq!(explorer.fetches(), 0);
}

#[tokio::test]
async fn concurrent_resolutions_share_one_entry() {
    let explorer = Arc::new(FakeExplorer::new().with_source(VAULT, "Vault", ERC20_ABI));
    let registry = DecoderRegistry::build(vec![], explorer.clone());
    let samples = [transfer_call()];

    let (first, second) = tokio::join!(registry.resolve(VAULT, &samples), registry.resolve(VAULT, &samples));
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(Arc::ptr_eq(&first.decoder, &second.decoder));
    assert_eq!(first.alias, second.alias);
    assert_eq!(registry.known_addresses().await, 1);
}

#[tokio::test]
async fn concurrent_resolutions_across_tasks_share_one_entry() {
    let explorer = Arc::new(FakeExplorer::new().with_source(VAULT, "Vault", ERC20_ABI));
    let registry = Arc::new(DecoderRegistry::build(vec![], explorer));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.resolve(VAULT, &[transfer_call()]).await.unwrap() })
        })
        .collect();
    let mut resolved = Vec::new();
    for task in tasks {
        resolved.push(task.await.unwrap());
    }

    assert!(resolved.iter().all(|r| Arc::ptr_eq(&r.decoder, &resolved[0].decoder)));
    assert_eq!(registry.known_addresses().await, 1);
}

//! Combines the external and internal transaction streams.

use std::collections::{HashMap, HashSet};

use crate::transaction_data::{CallType, InternalCall, Transaction};

/// Attaches internal calls to their parent transactions and resolves the
/// contract that actually received each call.
///
/// The destination is, in order of precedence: the contract created by the
/// transaction, the target of a single delegatecall, the nominal `to`. More
/// than one internal call never overrides the nominal destination.
pub fn merge(mut transactions: Vec<Transaction>, internal_calls: Vec<InternalCall>) -> Vec<Transaction> {
    let mut by_hash: HashMap<String, Vec<InternalCall>> = HashMap::new();
    for call in internal_calls {
        by_hash.entry(call.hash.clone()).or_default().push(call);
    }

    for tx in transactions.iter_mut() {
        let calls = by_hash.remove(&tx.hash).unwrap_or_default();
        tx.contract_address = if let Some(created) = &tx.created_contract {
            tx.is_contract_creation = true;
            created.clone()
        } else if let [call] = calls.as_slice() {
            if call.call_type == CallType::DelegateCall {
                call.to.clone()
            } else {
                tx.to.clone()
            }
        } else {
            tx.to.clone()
        };
        tx.internal_calls = calls;
    }

    if !by_hash.is_empty() {
        tracing::debug!(orphaned = by_hash.len(), "Internal calls without a parent transaction");
    }
    transactions
}

/// Contracts created by the attached internal calls, in first-seen order.
pub fn created_contracts(transactions: &[Transaction]) -> Vec<String> {
    let mut seen = HashSet::new();
    transactions
        .iter()
        .flat_map(|tx| tx.internal_calls.iter())
        .filter(|call| call.call_type.is_create())
        .filter_map(|call| call.contract_address.clone())
        .filter(|address| seen.insert(address.clone()))
        .collect()
}

//! Spendable outputs and input selection
//!
//! The live set comes from the latest balance snapshot and is replaced
//! wholesale. Selection prefers old, small outputs: sorted by confirmation
//! block (unconfirmed last) and then by value, dust skipped, accumulated
//! greedily until the target is covered.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backend::{BalanceUpdate, RawUtxo};
use crate::error::WalletError;
use crate::transaction::Transaction;

/// Outputs below this value are never created or spent
pub const DUST_THRESHOLD: u64 = 5340;

/// Confirmations a coinbase output needs beyond its own block
pub const COINBASE_MATURITY: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtxoState {
    Confirmed,
    Change,
    Receiving,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub transaction_hash: String,
    pub index: u32,
    pub value: u64,
    /// Full derivation path, when the backend reported one
    pub path: Option<Vec<u32>>,
    pub state: UtxoState,
}

impl Utxo {
    fn from_raw(raw: &RawUtxo, state: UtxoState, base_path: &[u32]) -> Self {
        Self {
            transaction_hash: raw.transaction_hash.clone(),
            index: raw.ix,
            value: raw.value,
            path: raw.key_path_for_address.as_ref().map(|key_path| {
                let mut path = base_path.to_vec();
                path.extend_from_slice(key_path);
                path
            }),
            state,
        }
    }
}

/// Flatten a balance snapshot into the live utxo list
pub fn utxos_from_update(update: &BalanceUpdate, base_path: &[u32]) -> Vec<Utxo> {
    [
        (UtxoState::Confirmed, &update.confirmed),
        (UtxoState::Change, &update.change),
        (UtxoState::Receiving, &update.receiving),
    ]
    .into_iter()
    .flat_map(|(state, raws)| raws.iter().map(move |raw| Utxo::from_raw(raw, state, base_path)))
    .collect()
}

/// Total value of a balance snapshot
pub fn balance_from_update(update: &BalanceUpdate) -> u64 {
    update
        .confirmed
        .iter()
        .chain(&update.change)
        .chain(&update.receiving)
        .fold(0u64, |total, raw| total.saturating_add(raw.value))
}

/// Utxo annotated with facts about its source transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendableUtxo {
    pub utxo: Utxo,
    /// Block of the source transaction; `None` while unconfirmed or unknown
    pub block: Option<u32>,
    pub coinbase: bool,
}

/// Attach source-transaction block and coinbase flag to each utxo
pub fn annotate(utxos: &[Utxo], history: &[Transaction]) -> Vec<SpendableUtxo> {
    let by_hash: HashMap<&str, &Transaction> =
        history.iter().map(|tx| (tx.hash.as_str(), tx)).collect();

    utxos
        .iter()
        .map(|utxo| {
            let source = by_hash.get(utxo.transaction_hash.as_str());
            SpendableUtxo {
                utxo: utxo.clone(),
                block: source.and_then(|tx| tx.block),
                coinbase: source.is_some_and(|tx| tx.is_coinbase()),
            }
        })
        .collect()
}

/// Drop coinbase outputs that are not yet mature at `height`
///
/// Without a known height nothing can be judged, so everything is kept.
pub fn filter_mature(utxos: Vec<SpendableUtxo>, height: Option<u32>) -> Vec<SpendableUtxo> {
    let Some(height) = height else {
        log::warn!("Current height unknown, immature coinbase inputs will be included");
        return utxos;
    };

    utxos
        .into_iter()
        .filter(|candidate| {
            if !candidate.coinbase {
                return true;
            }
            match candidate.block {
                Some(block) => height.saturating_sub(block) > COINBASE_MATURITY,
                None => false,
            }
        })
        .collect()
}

/// Greedy input selector over an annotated utxo set
#[derive(Debug, Clone)]
pub struct UtxoSelector {
    ordered: Vec<SpendableUtxo>,
}

impl UtxoSelector {
    pub fn new(utxos: Vec<SpendableUtxo>) -> Self {
        let mut ordered: Vec<_> = utxos
            .into_iter()
            .filter(|candidate| candidate.utxo.value >= DUST_THRESHOLD)
            .collect();

        ordered.sort_by_key(|candidate| {
            (
                candidate.block.is_none(),
                candidate.block,
                candidate.utxo.value,
            )
        });

        Self { ordered }
    }

    /// Sum of everything the selector may spend
    pub fn available(&self) -> u64 {
        self.ordered
            .iter()
            .fold(0u64, |total, candidate| total.saturating_add(candidate.utxo.value))
    }

    /// Select utxos from the front until their sum reaches `amount`
    pub fn select(&self, amount: u64) -> Result<Vec<Utxo>, WalletError> {
        let mut selected = Vec::new();
        let mut total: u64 = 0;

        for candidate in &self.ordered {
            if total >= amount {
                break;
            }
            selected.push(candidate.utxo.clone());
            total = total.saturating_add(candidate.utxo.value);
        }

        if total < amount {
            return Err(WalletError::insufficient_funds(amount, total));
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::UpdateStatus;

    fn spendable(hash: &str, value: u64, block: Option<u32>, coinbase: bool) -> SpendableUtxo {
        SpendableUtxo {
            utxo: Utxo {
                transaction_hash: hash.to_string(),
                index: 0,
                value,
                path: Some(vec![0, 0]),
                state: UtxoState::Confirmed,
            },
            block,
            coinbase,
        }
    }

    fn raw(hash: &str, value: u64, key_path: Option<Vec<u32>>) -> RawUtxo {
        RawUtxo {
            value,
            transaction_hash: hash.to_string(),
            ix: 1,
            key_path_for_address: key_path,
        }
    }

    #[test]
    fn test_update_is_flattened_with_states() {
        let update = BalanceUpdate {
            status: UpdateStatus::Ready,
            confirmed: vec![raw("a", 10, Some(vec![0, 1]))],
            change: vec![raw("b", 20, Some(vec![1, 0]))],
            receiving: vec![raw("c", 30, None)],
        };

        let utxos = utxos_from_update(&update, &[44, 0]);
        assert_eq!(utxos.len(), 3);
        assert_eq!(utxos[0].state, UtxoState::Confirmed);
        assert_eq!(utxos[0].path, Some(vec![44, 0, 0, 1]));
        assert_eq!(utxos[1].state, UtxoState::Change);
        assert_eq!(utxos[2].state, UtxoState::Receiving);
        assert_eq!(utxos[2].path, None);
        assert_eq!(balance_from_update(&update), 60);
    }

    #[test]
    fn test_order_prefers_old_then_small() {
        let selector = UtxoSelector::new(vec![
            spendable("pending", 6_000, None, false),
            spendable("big-old", 90_000, Some(10), false),
            spendable("small-old", 8_000, Some(10), false),
            spendable("newer", 7_000, Some(20), false),
        ]);

        let all = selector.select(selector.available()).unwrap();
        let hashes: Vec<_> = all.iter().map(|u| u.transaction_hash.as_str()).collect();
        assert_eq!(hashes, ["small-old", "big-old", "newer", "pending"]);
    }

    #[test]
    fn test_dust_is_never_selected() {
        let selector = UtxoSelector::new(vec![
            spendable("dust", DUST_THRESHOLD - 1, Some(1), false),
            spendable("ok", DUST_THRESHOLD, Some(2), false),
        ]);

        let selected = selector.select(DUST_THRESHOLD).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].transaction_hash, "ok");
        assert!(selector.select(DUST_THRESHOLD + 1).is_err());
    }

    #[test]
    fn test_exhaustion_reports_insufficient_funds() {
        let selector = UtxoSelector::new(vec![spendable("a", 10_000, Some(1), false)]);
        match selector.select(20_000) {
            Err(WalletError::InsufficientFunds {
                required,
                available,
            }) => {
                assert_eq!(required, 20_000);
                assert_eq!(available, 10_000);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_coinbase_maturity_boundary() {
        let utxos = vec![spendable("cb", 50_000, Some(1_000), true)];

        assert!(filter_mature(utxos.clone(), Some(1_100)).is_empty());
        assert_eq!(filter_mature(utxos.clone(), Some(1_101)).len(), 1);
        // Unknown height keeps everything
        assert_eq!(filter_mature(utxos, None).len(), 1);
    }

    #[test]
    fn test_oversized_backend_values_saturate() {
        let update = BalanceUpdate {
            status: UpdateStatus::Ready,
            confirmed: vec![raw("a", u64::MAX, Some(vec![0, 1]))],
            change: vec![raw("b", u64::MAX, Some(vec![1, 0]))],
            receiving: Vec::new(),
        };
        assert_eq!(balance_from_update(&update), u64::MAX);

        let selector = UtxoSelector::new(vec![
            spendable("a", u64::MAX - 10, Some(1), false),
            spendable("b", u64::MAX - 10, Some(2), false),
        ]);
        assert_eq!(selector.available(), u64::MAX);

        let selected = selector.select(u64::MAX).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_non_coinbase_is_always_mature() {
        let utxos = vec![spendable("fresh", 50_000, Some(1_000), false)];
        assert_eq!(filter_mature(utxos, Some(1_000)).len(), 1);
    }
}

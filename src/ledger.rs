//! Running balance over transaction history
//!
//! History is ordered newest first. Unconfirmed transactions (no timestamp)
//! sort as the newest; ties fall back to the type rank so that within one
//! block a spend is listed before the receive that funded it.

use std::cmp::{Ordering, Reverse};
use std::collections::HashSet;

use crate::transaction::Transaction;

fn type_rank(tx: &Transaction) -> u8 {
    tx.analysis
        .as_ref()
        .map(|analysis| analysis.tx_type.rank())
        .unwrap_or(u8::MAX)
}

fn history_order(a: &Transaction, b: &Transaction) -> Ordering {
    let timestamp = |tx: &Transaction| Reverse(tx.timestamp.unwrap_or(i64::MAX));
    timestamp(a)
        .cmp(&timestamp(b))
        .then_with(|| type_rank(a).cmp(&type_rank(b)))
}

/// Sort, drop duplicate hashes and fill in `balance` on every analysed
/// transaction.
pub fn balance_transactions(mut txs: Vec<Transaction>) -> Vec<Transaction> {
    txs.sort_by(history_order);

    // Backend occasionally returns the same transaction twice
    let mut seen = HashSet::new();
    txs.retain(|tx| seen.insert(tx.hash.clone()));

    let mut running: i64 = 0;
    for tx in txs.iter_mut().rev() {
        match tx.analysis {
            Some(analysis) => {
                running = running.saturating_add(analysis.impact.signed_value);
                tx.balance = Some(running);
            }
            None => tx.balance = None,
        }
    }

    txs
}

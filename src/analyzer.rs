//! Transaction classification relative to the wallet
//!
//! A transaction is `sent` when it spends wallet funds to at least one
//! foreign output, `self` when everything it spends comes back to the wallet,
//! and `recv` when it only pays into the wallet. The impact is the net change
//! of wallet funds.

use crate::error::AnalysisError;
use crate::script::ScriptDigest;
use crate::transaction::{Analysis, Impact, Transaction, TxType};
use crate::wallet_index::WalletIndex;

/// Classify one transaction against the index
pub fn analyze(tx: &Transaction, index: &WalletIndex) -> Result<Analysis, AnalysisError> {
    let mut spent = false;
    let mut value_in: u64 = 0;

    for input in tx.inputs.iter().filter(|input| !input.is_coinbase()) {
        let Some(outputs) = index.outputs(&input.prev_hash) else {
            continue; // spends a transaction we never saw, so not ours
        };
        let prev = outputs
            .iter()
            .find(|out| i64::from(out.index) == input.prev_index)
            .ok_or_else(|| AnalysisError::MissingOutput {
                hash: input.prev_hash.clone(),
                index: input.prev_index,
            })?;

        if index.is_owned(&prev.digest) {
            spent = true;
            value_in = value_in
                .checked_add(prev.value)
                .ok_or(AnalysisError::Overflow)?;
        }
    }

    let mut received = false;
    let mut all_to_wallet = true;
    let mut value_out: u64 = 0;

    for out in &tx.outputs {
        if index.is_owned(&ScriptDigest::of(&out.script)) {
            received = true;
            value_out = value_out
                .checked_add(out.value)
                .ok_or(AnalysisError::Overflow)?;
        } else {
            all_to_wallet = false;
        }
    }

    let tx_type = match (spent, received) {
        (true, _) if all_to_wallet => TxType::SelfTransfer,
        (true, _) => TxType::Sent,
        (false, true) => TxType::Recv,
        (false, false) => return Err(AnalysisError::Unrelated),
    };

    let value_out = i64::try_from(value_out).map_err(|_| AnalysisError::Overflow)?;
    let value_in = i64::try_from(value_in).map_err(|_| AnalysisError::Overflow)?;

    Ok(Analysis {
        tx_type,
        impact: Impact::from_net(value_out - value_in),
    })
}

/// Analyze every transaction that has no analysis yet
///
/// Failures are logged and leave `analysis` empty; the rest of the batch is
/// still processed.
pub fn analyze_all(txs: &mut [Transaction], index: &WalletIndex) {
    for tx in txs.iter_mut().filter(|tx| tx.analysis.is_none()) {
        match analyze(tx, index) {
            Ok(analysis) => tx.analysis = Some(analysis),
            Err(e) => {
                log::error!("Analysis failed for tx {}: {}", tx.hash, e);
                tx.analysis = None;
            }
        }
    }
}

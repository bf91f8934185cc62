//! Address-usage offsets per branch
//!
//! Offsets only ever grow: each owned output seen in history pushes the
//! offset of its branch past its index. Confirmed and unconfirmed usage are
//! tracked separately.

use crate::derivation::{BranchNode, CHANGE_BRANCH, EXTERNAL_BRANCH};
use crate::transaction::Transaction;

/// Record a used index on a branch
pub fn observe(node: &mut BranchNode, index: u32, confirmed: bool) {
    let next = index.saturating_add(1);
    let offset = if confirmed {
        &mut node.offset
    } else {
        &mut node.unconfirmed_offset
    };
    *offset = (*offset).max(next);
}

/// Advance external/change offsets from the owned outputs of `txs`
pub fn increment_offsets(txs: &[Transaction], external: &mut BranchNode, change: &mut BranchNode) {
    for tx in txs {
        for out in tx.owned_outputs() {
            let Some((branch, index)) = out.branch_and_index() else {
                log::warn!("Tx {} has an owned output with a short path", tx.hash);
                continue;
            };

            let node = match branch {
                EXTERNAL_BRANCH => &mut *external,
                CHANGE_BRANCH => &mut *change,
                other => {
                    log::warn!("Tx {} has an output on unknown branch {}", tx.hash, other);
                    continue;
                }
            };
            observe(node, index, tx.is_confirmed());
        }
    }
}

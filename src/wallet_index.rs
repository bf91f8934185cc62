//! Ownership index of the account
//!
//! Remembers every transaction seen so far and the script digests of all
//! outputs that carry a derivation path. The analyzer uses it to recognize
//! wallet inputs and outputs without deriving keys.

use std::collections::{HashMap, HashSet};

use crate::derivation::CHANGE_BRANCH;
use crate::script::ScriptDigest;
use crate::transaction::Transaction;

/// Output of an indexed transaction, kept so later inputs can be valued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedOutput {
    pub index: u32,
    pub value: u64,
    pub digest: ScriptDigest,
}

#[derive(Debug, Default, Clone)]
pub struct WalletIndex {
    transactions: HashMap<String, Vec<IndexedOutput>>,
    address_hashes: HashSet<ScriptDigest>,
    internal_address_hashes: HashSet<ScriptDigest>,
}

impl WalletIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a transaction; no-op when its hash is already known
    pub fn register(&mut self, tx: &Transaction) {
        if self.transactions.contains_key(&tx.hash) {
            return;
        }

        let outputs = tx
            .outputs
            .iter()
            .map(|out| IndexedOutput {
                index: out.index,
                value: out.value,
                digest: ScriptDigest::of(&out.script),
            })
            .collect();
        self.transactions.insert(tx.hash.clone(), outputs);

        for out in tx.owned_outputs() {
            let digest = ScriptDigest::of(&out.script);
            self.address_hashes.insert(digest);
            if matches!(out.branch_and_index(), Some((CHANGE_BRANCH, _))) {
                self.internal_address_hashes.insert(digest);
            }
        }
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.transactions.contains_key(hash)
    }

    pub fn is_owned(&self, digest: &ScriptDigest) -> bool {
        self.address_hashes.contains(digest)
    }

    pub fn is_internal(&self, digest: &ScriptDigest) -> bool {
        self.internal_address_hashes.contains(digest)
    }

    /// Outputs of an indexed transaction
    pub fn outputs(&self, hash: &str) -> Option<&[IndexedOutput]> {
        self.transactions.get(hash).map(Vec::as_slice)
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn owned_count(&self) -> usize {
        self.address_hashes.len()
    }
}

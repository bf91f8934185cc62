//! Hardware-wallet account
//!
//! `Account` owns both branch nodes, the live utxo set, the analysed history
//! and the ownership index. It is mutated from one place only (see
//! `service`), so none of its state is behind a lock.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bitcoin::Txid;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::analyzer::analyze_all;
use crate::backend::{Backend, BalanceUpdate, RawTransaction, UpdateStatus};
use crate::config::{CoinConfig, WalletConfig};
use crate::derivation::{
    derive_address, encode_address, Address, AccountNode, BranchNode, CHANGE_BRANCH,
    EXTERNAL_BRANCH,
};
use crate::error::{SignFailure, WalletError};
use crate::fee::negotiate;
use crate::ledger::balance_transactions;
use crate::offsets::increment_offsets;
use crate::script::{embedded_hash, ScriptType};
use crate::signer::{Signer, SignerTransaction};
use crate::transaction::{Transaction, TxType};
use crate::tx_builder::{CandidateOutput, TxBuilder, TxCandidate};
use crate::utxo::{annotate, balance_from_update, filter_mature, utxos_from_update, Utxo, UtxoSelector};
use crate::verifier::{SignedTx, TxVerifier};
use crate::wallet_index::WalletIndex;
use crate::Result;

/// Persistable description of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: u32,
    /// Coin preset name, e.g. "Bitcoin"
    pub coin: String,
    pub node: AccountNode,
}

impl AccountRecord {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Owned output of a history transaction, rendered as an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnedOutput {
    pub path: Vec<u32>,
    pub address: String,
    pub amount: u64,
    pub index: u32,
}

/// External address that has received funds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsedAddress {
    pub address: Address,
    /// Total received; `None` for derived gap fillers
    pub received: Option<u64>,
}

/// Result of a successful broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    pub bytes: Vec<u8>,
    pub txid: Txid,
}

pub struct Account {
    id: u32,
    config: WalletConfig,
    node: AccountNode,
    external: BranchNode,
    change: BranchNode,
    utxos: Option<Vec<Utxo>>,
    balance: Option<u64>,
    transactions: Option<Vec<Transaction>>,
    index: WalletIndex,
    backend: Arc<dyn Backend>,
    subscribing_is_slow: bool,
}

impl Account {
    pub fn new(
        id: u32,
        config: WalletConfig,
        node: AccountNode,
        backend: Arc<dyn Backend>,
    ) -> Result<Self> {
        let external = node.branch(EXTERNAL_BRANCH)?;
        let change = node.branch(CHANGE_BRANCH)?;

        Ok(Self {
            id,
            config,
            node,
            external,
            change,
            utxos: None,
            balance: None,
            transactions: None,
            index: WalletIndex::new(),
            backend,
            subscribing_is_slow: false,
        })
    }

    /// Restore an account from its record; the coin is resolved by name
    pub fn from_record(
        record: &AccountRecord,
        fee_per_kb: u64,
        backend: Arc<dyn Backend>,
    ) -> Result<Self> {
        let coin = CoinConfig::by_name(&record.coin)?;
        Self::new(
            record.id,
            WalletConfig::new(coin, fee_per_kb),
            record.node.clone(),
            backend,
        )
    }

    pub fn record(&self) -> AccountRecord {
        AccountRecord {
            id: self.id,
            coin: self.config.coin.name.clone(),
            node: self.node.clone(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn label(&self) -> String {
        format!("Account #{}", u64::from(self.id) + 1)
    }

    pub fn coin(&self) -> &CoinConfig {
        &self.config.coin
    }

    pub fn node(&self) -> &AccountNode {
        &self.node
    }

    pub fn external(&self) -> &BranchNode {
        &self.external
    }

    pub fn change(&self) -> &BranchNode {
        &self.change
    }

    pub fn utxos(&self) -> Option<&[Utxo]> {
        self.utxos.as_deref()
    }

    pub fn balance(&self) -> Option<u64> {
        self.balance
    }

    /// Analysed history, newest first; `None` while loading
    pub fn transactions(&self) -> Option<&[Transaction]> {
        self.transactions.as_deref()
    }

    pub fn wallet_index(&self) -> &WalletIndex {
        &self.index
    }

    /// Account xpub with the coin's version bytes
    pub fn public_key(&self) -> String {
        self.node.extended_public_key(self.config.coin.xpub_version)
    }

    pub fn is_offline(&self) -> bool {
        !self.backend.is_connected()
    }

    pub fn is_loading(&self) -> bool {
        self.balance.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.as_ref().map_or(true, |txs| txs.is_empty())
    }

    /// History disagrees with the backend balance
    pub fn is_inconsistent(&self) -> bool {
        let (Some(txs), Some(balance)) = (&self.transactions, self.balance) else {
            return false;
        };
        let Some(newest) = txs.first() else {
            return false;
        };
        newest.balance.and_then(|b| u64::try_from(b).ok()) != Some(balance)
    }

    pub fn subscribing_is_slow(&self) -> bool {
        self.subscribing_is_slow
    }

    /// Flag a subscription that has not produced a balance yet
    pub fn mark_slow_if_loading(&mut self) -> bool {
        if self.is_loading() {
            log::warn!("Subscribing {} is taking long", self.label());
            self.subscribing_is_slow = true;
        }
        self.subscribing_is_slow
    }

    // ====================================================================
    // Addresses
    // ====================================================================

    /// The `n`-th external address past every index seen in history
    pub fn address(&self, n: u32) -> Result<Address> {
        let fresh = self.external.fresh_index();
        let index = fresh
            .checked_add(n)
            .ok_or(WalletError::InvalidIndex(u32::MAX))?;
        derive_address(&self.external, index, self.config.coin.address_version)
    }

    pub fn unused_addresses(&self, n: u32) -> Result<Vec<Address>> {
        (0..n).map(|i| self.address(i)).collect()
    }

    /// Highest external index a backend should watch with the given gap
    pub fn max_live_address_index(&self, gap: u32) -> u32 {
        self.external.offset.saturating_add(gap).saturating_sub(1)
    }

    /// External addresses that received funds, indexed by position
    ///
    /// Indices in between that never received anything are derived and
    /// reported with `received: None`.
    pub fn used_addresses(&self) -> Result<Vec<UsedAddress>> {
        let Some(txs) = &self.transactions else {
            return Ok(Vec::new());
        };

        let mut used: BTreeMap<u32, UsedAddress> = BTreeMap::new();
        let received = txs
            .iter()
            .filter(|tx| tx.analysis.is_some_and(|a| a.tx_type == TxType::Recv));

        for tx in received {
            for out in self.tx_outputs(tx) {
                let &[.., branch, index] = out.path.as_slice() else {
                    continue;
                };
                if branch != EXTERNAL_BRANCH {
                    continue;
                }

                let entry = used.entry(index).or_insert_with(|| UsedAddress {
                    address: Address {
                        path: out.path.clone(),
                        address: out.address.clone(),
                        index,
                    },
                    received: Some(0),
                });
                entry.received = entry.received.map(|sum| sum.saturating_add(out.amount));
            }
        }

        let Some(&last) = used.keys().next_back() else {
            return Ok(Vec::new());
        };

        (0..=last)
            .map(|index| match used.remove(&index) {
                Some(address) => Ok(address),
                None => Ok(UsedAddress {
                    address: derive_address(
                        &self.external,
                        index,
                        self.config.coin.address_version,
                    )?,
                    received: None,
                }),
            })
            .collect()
    }

    /// Owned outputs of `tx` with their addresses
    pub fn tx_outputs(&self, tx: &Transaction) -> Vec<OwnedOutput> {
        tx.owned_outputs()
            .filter_map(|out| {
                let path = out.path.clone()?;
                let (script_type, hash) = embedded_hash(&out.script)?;
                let version = match script_type {
                    ScriptType::PayToScriptHash => self.config.coin.script_hash_version()?,
                    _ => self.config.coin.address_version,
                };

                Some(OwnedOutput {
                    path,
                    address: encode_address(version, hash),
                    amount: out.value,
                    index: out.index,
                })
            })
            .collect()
    }

    /// Path of the first owned output of `tx`
    pub fn out_path<'t>(&self, tx: &'t Transaction) -> Option<&'t [u32]> {
        tx.owned_outputs().find_map(|out| out.path.as_deref())
    }

    // ====================================================================
    // Backend updates
    // ====================================================================

    /// Connect to the backend and start receiving balance pushes
    pub async fn subscribe(&self, updates: UnboundedSender<BalanceUpdate>) -> Result<()> {
        self.backend.connect().await?;
        self.backend.subscribe(&self.node, updates).await?;
        log::info!("Subscribed {}", self.label());
        Ok(())
    }

    pub fn unsubscribe(&self) {
        self.backend.unsubscribe(&self.node);
        log::info!("Unsubscribed {}", self.label());
    }

    /// Apply a balance push
    ///
    /// Returns `true` when the history has to be reloaded. Pending pushes
    /// are ignored.
    pub fn process_balance_update(&mut self, update: &BalanceUpdate) -> bool {
        log::info!(
            "Received {:?} balance update for {}",
            update.status,
            self.label()
        );

        if update.status == UpdateStatus::Pending {
            return false;
        }

        self.utxos = Some(utxos_from_update(update, &self.node.path));
        self.balance = Some(balance_from_update(update));
        self.transactions = None;
        true
    }

    /// Rebuild the history from backend transactions
    pub fn process_transactions(&mut self, raw: &[RawTransaction]) {
        log::info!(
            "Received {} transactions for {}",
            raw.len(),
            self.label()
        );

        let mut txs: Vec<Transaction> = raw
            .iter()
            .map(|tx| Transaction::from_raw(tx, &self.node.path))
            .collect();

        for tx in &txs {
            self.index.register(tx);
        }
        analyze_all(&mut txs, &self.index);

        let txs = balance_transactions(txs);
        increment_offsets(&txs, &mut self.external, &mut self.change);
        self.transactions = Some(txs);
    }

    /// Fetch and process the full history
    pub async fn load_transactions(&mut self) -> Result<()> {
        let raw = self.backend.transactions(&self.node).await?;
        self.process_transactions(&raw);
        Ok(())
    }

    // ====================================================================
    // Sending
    // ====================================================================

    /// Select inputs and negotiate the fee for `outputs`
    pub async fn build_tx(&self, outputs: &[CandidateOutput]) -> Result<TxCandidate> {
        let utxos = self.utxos.as_deref().ok_or(WalletError::NotLoaded("utxos"))?;

        let height = match self.backend.current_height().await {
            Ok(height) => Some(height),
            Err(e) => {
                log::warn!("Failed to get current height: {}", e);
                None
            }
        };

        let history = self.transactions.as_deref().unwrap_or_default();
        let spendable = filter_mature(annotate(utxos, history), height);
        let selector = UtxoSelector::new(spendable);

        let change_path = self.change.child_path(self.change.offset);
        let builder = TxBuilder::new(&selector, outputs, change_path);
        negotiate(&builder, self.config.fee_per_kb)
    }

    /// Sign `candidate` on the device, verify the result and broadcast it
    pub async fn send_tx(&self, candidate: &TxCandidate, signer: &dyn Signer) -> Result<SentTransaction> {
        let mut seen = HashSet::new();
        let prev_hashes: Vec<&str> = candidate
            .inputs
            .iter()
            .map(|input| input.prev_hash.as_str())
            .filter(|hash| seen.insert(*hash))
            .collect();

        log::debug!("Fetching {} referenced transactions", prev_hashes.len());
        let raw = try_join_all(
            prev_hashes
                .iter()
                .map(|hash| self.backend.transaction(&self.node, hash)),
        )
        .await?;
        let referenced: Vec<SignerTransaction> = raw.iter().map(SignerTransaction::from).collect();

        let serialized = signer
            .sign_tx(candidate, &referenced, &self.config.coin)
            .await?;

        let signed = SignedTx::from_hex(&serialized).inspect_err(|e| {
            log::error!("Failed to deserialize signed tx: {}", e);
        })?;
        TxVerifier::new(&self.external, &self.change, &self.config.coin)
            .verify(candidate, &signed)
            .map_err(SignFailure::from)?;

        let txid = signed.txid();
        if let Err(e) = self.backend.send(&signed.bytes, &txid).await {
            log::error!("Broadcast of {} failed: {}", txid, e);
            return Err(WalletError::BackendSend {
                message: format!("Failed to send transaction to the backend: {}", e),
                raw_bytes: signed.bytes,
            });
        }

        log::info!("Broadcast tx {} from {}", txid, self.label());
        Ok(SentTransaction {
            bytes: signed.bytes,
            txid,
        })
    }
}

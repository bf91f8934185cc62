//! Common test utilities for account integration tests
//!
//! This module provides shared test infrastructure including:
//! - Deterministic account keys
//! - An in-memory backend with scriptable failures
//! - A mock signing device that serializes real bitcoin transactions
//! - Builders for backend transactions and balance pushes

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use bitcoin::absolute::LockTime;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::consensus::encode::serialize;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::transaction::Version;
use bitcoin::{Amount, NetworkKind, OutPoint, ScriptBuf, Sequence, TxIn, TxOut, Txid, Witness};
use chrono::{TimeZone, Utc};
use futures::future::BoxFuture;
use tokio::sync::mpsc::UnboundedSender;

use hw_account::backend::{RawInput, RawOutput, RawUtxo};
use hw_account::derivation::{decode_address, derive_address, encode_address, CHANGE_BRANCH};
use hw_account::{
    AccountNode, Backend, BackendError, BalanceUpdate, BranchNode, CandidateOutput, CoinConfig,
    OutputDestination, RawTransaction, ScriptType, Signer, SignerError, SignerTransaction,
    TxCandidate, UpdateStatus,
};

pub const HARDENED: u32 = 0x8000_0000;

pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

// ============================================================================
// Keys
// ============================================================================

#[derive(Clone)]
pub struct TestKeys {
    pub node: AccountNode,
    pub external: BranchNode,
    pub change: BranchNode,
}

/// Account m/44'/0'/0' of a fixed seed
pub fn test_keys() -> TestKeys {
    let secp = Secp256k1::new();
    let master = Xpriv::new_master(NetworkKind::Main, &[7u8; 32]).unwrap();
    let path = DerivationPath::from_str("m/44'/0'/0'").unwrap();
    let account = master.derive_priv(&secp, &path).unwrap();
    let xpub = Xpub::from_priv(&secp, &account);

    let node = AccountNode::new(vec![44 | HARDENED, HARDENED, HARDENED], xpub);
    let external = node.branch(0).unwrap();
    let change = node.branch(1).unwrap();
    TestKeys {
        node,
        external,
        change,
    }
}

impl TestKeys {
    pub fn branch(&self, branch: u32) -> &BranchNode {
        if branch == CHANGE_BRANCH {
            &self.change
        } else {
            &self.external
        }
    }

    pub fn address(&self, branch: u32, index: u32) -> String {
        derive_address(self.branch(branch), index, 0x00).unwrap().address
    }

    pub fn script(&self, branch: u32, index: u32) -> ScriptBuf {
        address_script(&self.address(branch, index))
    }

    /// Full path of a wallet address
    pub fn path(&self, branch: u32, index: u32) -> Vec<u32> {
        let mut path = self.node.path.clone();
        path.extend([branch, index]);
        path
    }
}

pub fn address_script(address: &str) -> ScriptBuf {
    let decoded = decode_address(address).unwrap();
    let script_type = if decoded.version == 0x05 {
        ScriptType::PayToScriptHash
    } else {
        ScriptType::PayToAddress
    };
    script_type.script_for_hash(decoded.hash).unwrap()
}

pub fn foreign_address(byte: u8) -> String {
    encode_address(0x00, [byte; 20])
}

// ============================================================================
// Backend data builders
// ============================================================================

/// 64 hex chars derived from one byte
pub fn tx_hash(n: u8) -> String {
    format!("{:02x}", n).repeat(32)
}

pub fn raw_tx(
    hash: &str,
    height: Option<u32>,
    inputs: Vec<RawInput>,
    outputs: Vec<RawOutput>,
) -> RawTransaction {
    RawTransaction {
        hash: hash.to_string(),
        version: 1,
        lock_time: 0,
        block_time: height.map(|h| {
            Utc.timestamp_opt(1_400_000_000 + i64::from(h) * 600, 0)
                .unwrap()
        }),
        height,
        inputs,
        outputs,
    }
}

pub fn input(source_hash: &str, ix: i64) -> RawInput {
    RawInput {
        source_hash: source_hash.to_string(),
        ix,
        script: ScriptBuf::from_bytes(vec![0x00]),
        sequence: -1,
    }
}

/// Input spending a transaction the wallet has never seen
pub fn foreign_input() -> RawInput {
    input(&tx_hash(0xee), 0)
}

pub fn coinbase_input() -> RawInput {
    RawInput {
        source_hash: "00".repeat(32),
        ix: -1,
        script: ScriptBuf::from_bytes(vec![0x51]),
        sequence: -1,
    }
}

pub fn own_output(keys: &TestKeys, ix: u32, value: u64, branch: u32, index: u32) -> RawOutput {
    RawOutput {
        value,
        ix,
        script: keys.script(branch, index),
        key_path_for_address: Some(vec![branch, index]),
    }
}

pub fn foreign_output(ix: u32, value: u64, byte: u8) -> RawOutput {
    RawOutput {
        value,
        ix,
        script: address_script(&foreign_address(byte)),
        key_path_for_address: None,
    }
}

pub fn utxo(hash: &str, ix: u32, value: u64, branch: u32, index: u32) -> RawUtxo {
    RawUtxo {
        value,
        transaction_hash: hash.to_string(),
        ix,
        key_path_for_address: Some(vec![branch, index]),
    }
}

pub fn ready_update(confirmed: Vec<RawUtxo>) -> BalanceUpdate {
    BalanceUpdate {
        status: UpdateStatus::Ready,
        confirmed,
        change: Vec::new(),
        receiving: Vec::new(),
    }
}

pub fn pending_update() -> BalanceUpdate {
    BalanceUpdate {
        status: UpdateStatus::Pending,
        confirmed: Vec::new(),
        change: Vec::new(),
        receiving: Vec::new(),
    }
}

// ============================================================================
// Mock backend
// ============================================================================

#[derive(Default)]
pub struct MockState {
    pub connected: bool,
    pub fail_connect: bool,
    pub fail_subscribe: bool,
    /// `None` makes `current_height` fail
    pub height: Option<u32>,
    pub transactions: Vec<RawTransaction>,
    pub fail_send: Option<String>,
    pub sent: Vec<(Vec<u8>, Txid)>,
    pub fetched: Vec<String>,
    pub updates: Option<UnboundedSender<BalanceUpdate>>,
    /// Pushes made before anyone subscribed
    pub queued: Vec<BalanceUpdate>,
    pub subscriptions: usize,
    pub unsubscriptions: usize,
}

#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new(transactions: Vec<RawTransaction>, height: Option<u32>) -> Arc<Self> {
        let backend = Self::default();
        {
            let mut state = backend.state();
            state.transactions = transactions;
            state.height = height;
        }
        Arc::new(backend)
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Deliver a balance push; queued until someone subscribes
    pub fn push(&self, update: BalanceUpdate) -> bool {
        let mut state = self.state();
        match &state.updates {
            Some(sender) => sender.send(update).is_ok(),
            None if state.subscriptions == 0 => {
                state.queued.push(update);
                true
            }
            None => false,
        }
    }
}

impl Backend for MockBackend {
    fn connect(&self) -> BoxFuture<'_, Result<(), BackendError>> {
        let result = {
            let mut state = self.state();
            if state.fail_connect {
                Err(BackendError::Connection("refused".to_string()))
            } else {
                state.connected = true;
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn subscribe<'a>(
        &'a self,
        _node: &'a AccountNode,
        updates: UnboundedSender<BalanceUpdate>,
    ) -> BoxFuture<'a, Result<(), BackendError>> {
        let result = {
            let mut state = self.state();
            if state.fail_subscribe {
                Err(BackendError::Unavailable("subscriptions disabled".to_string()))
            } else {
                for update in state.queued.drain(..) {
                    let _ = updates.send(update);
                }
                state.updates = Some(updates);
                state.subscriptions += 1;
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn unsubscribe(&self, _node: &AccountNode) {
        let mut state = self.state();
        state.updates = None;
        state.unsubscriptions += 1;
    }

    fn transactions<'a>(
        &'a self,
        _node: &'a AccountNode,
    ) -> BoxFuture<'a, Result<Vec<RawTransaction>, BackendError>> {
        let txs = self.state().transactions.clone();
        Box::pin(async move { Ok(txs) })
    }

    fn transaction<'a>(
        &'a self,
        _node: &'a AccountNode,
        hash: &'a str,
    ) -> BoxFuture<'a, Result<RawTransaction, BackendError>> {
        let result = {
            let mut state = self.state();
            state.fetched.push(hash.to_string());
            state
                .transactions
                .iter()
                .find(|tx| tx.hash == hash)
                .cloned()
                .ok_or_else(|| BackendError::NotFound(hash.to_string()))
        };
        Box::pin(async move { result })
    }

    fn current_height(&self) -> BoxFuture<'_, Result<u32, BackendError>> {
        let result = self
            .state()
            .height
            .ok_or_else(|| BackendError::Unavailable("no height".to_string()));
        Box::pin(async move { result })
    }

    fn send<'a>(
        &'a self,
        bytes: &'a [u8],
        txid: &'a Txid,
    ) -> BoxFuture<'a, Result<(), BackendError>> {
        let result = {
            let mut state = self.state();
            match &state.fail_send {
                Some(message) => Err(BackendError::Rejected(message.clone())),
                None => {
                    state.sent.push((bytes.to_vec(), *txid));
                    Ok(())
                }
            }
        };
        Box::pin(async move { result })
    }
}

// ============================================================================
// Mock signer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerMode {
    Honest,
    /// Shave one unit off the last output
    TamperAmount,
    /// Pay the last output to a foreign address instead
    Redirect,
    /// Return bytes that do not parse as a transaction
    Garbage,
    Cancel,
}

pub struct MockSigner {
    keys: TestKeys,
    mode: SignerMode,
    /// Hashes of the referenced transactions of every call
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl MockSigner {
    pub fn new(keys: TestKeys, mode: SignerMode) -> Arc<Self> {
        Arc::new(Self {
            keys,
            mode,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn output_script(&self, output: &CandidateOutput) -> ScriptBuf {
        match &output.destination {
            OutputDestination::Address(address) => address_script(address),
            OutputDestination::Path(path) => {
                let [.., branch, index] = path.as_slice() else {
                    panic!("short path {:?}", path);
                };
                let child = self
                    .keys
                    .branch(*branch)
                    .xpub
                    .ckd_pub(&Secp256k1::verification_only(), ChildNumber::from_normal_idx(*index).unwrap())
                    .unwrap();
                ScriptBuf::new_p2pkh(&bitcoin::PublicKey::new(child.public_key).pubkey_hash())
            }
        }
    }

    fn sign(
        &self,
        candidate: &TxCandidate,
        referenced: &[SignerTransaction],
    ) -> Result<String, SignerError> {
        self.calls
            .lock()
            .unwrap()
            .push(referenced.iter().map(|tx| tx.hash.clone()).collect());

        match self.mode {
            SignerMode::Cancel => return Err(SignerError::Cancelled),
            SignerMode::Garbage => return Ok("deadbeef".to_string()),
            _ => {}
        }

        let mut tx = bitcoin::Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: candidate
                .inputs
                .iter()
                .map(|input| TxIn {
                    previous_output: OutPoint {
                        txid: Txid::from_str(&input.prev_hash).unwrap(),
                        vout: input.prev_index,
                    },
                    script_sig: ScriptBuf::from_bytes(vec![0x00]),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                })
                .collect(),
            output: candidate
                .outputs
                .iter()
                .map(|output| TxOut {
                    value: Amount::from_sat(output.amount),
                    script_pubkey: self.output_script(output),
                })
                .collect(),
        };

        if let Some(last) = tx.output.last_mut() {
            match self.mode {
                SignerMode::TamperAmount => last.value = Amount::from_sat(last.value.to_sat() - 1),
                SignerMode::Redirect => last.script_pubkey = address_script(&foreign_address(0x66)),
                _ => {}
            }
        }

        Ok(hex::encode(serialize(&tx)))
    }
}

impl Signer for MockSigner {
    fn sign_tx<'a>(
        &'a self,
        candidate: &'a TxCandidate,
        referenced: &'a [SignerTransaction],
        _coin: &'a CoinConfig,
    ) -> BoxFuture<'a, Result<String, SignerError>> {
        let result = self.sign(candidate, referenced);
        Box::pin(async move { result })
    }
}

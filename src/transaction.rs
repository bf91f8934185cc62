//! Wallet-relative view of transaction history
//!
//! Plain records built from backend data. Outputs that belong to the account
//! carry their full derivation path; foreign outputs carry none.

use bitcoin::ScriptBuf;
use serde::{Deserialize, Serialize};

use crate::backend::{RawInput, RawOutput, RawTransaction};

const NULL_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Sent,
    #[serde(rename = "self")]
    SelfTransfer,
    Recv,
}

impl TxType {
    /// Ordering among transactions with equal timestamps
    pub fn rank(&self) -> u8 {
        match self {
            Self::Sent => 0,
            Self::SelfTransfer => 1,
            Self::Recv => 2,
        }
    }
}

/// Effect of a transaction on the wallet balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Impact {
    /// Absolute net change
    pub value: u64,
    /// -1, 0 or 1
    pub sign: i8,
    pub signed_value: i64,
}

impl Impact {
    pub fn from_net(net: i64) -> Self {
        Self {
            value: net.unsigned_abs(),
            sign: net.signum() as i8,
            signed_value: net,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub impact: Impact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prev_hash: String,
    pub prev_index: i64,
    pub script: ScriptBuf,
    pub sequence: i64,
}

impl TxInput {
    pub fn is_coinbase(&self) -> bool {
        self.prev_hash == NULL_HASH && (self.prev_index == -1 || self.prev_index == 0xffff_ffff)
    }
}

impl From<&RawInput> for TxInput {
    fn from(raw: &RawInput) -> Self {
        Self {
            prev_hash: raw.source_hash.clone(),
            prev_index: raw.ix,
            script: raw.script.clone(),
            sequence: raw.sequence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub index: u32,
    pub value: u64,
    pub script: ScriptBuf,
    /// Full derivation path when the output belongs to the account
    pub path: Option<Vec<u32>>,
}

impl TxOutput {
    fn from_raw(raw: &RawOutput, base_path: &[u32]) -> Self {
        Self {
            index: raw.ix,
            value: raw.value,
            script: raw.script.clone(),
            path: raw.key_path_for_address.as_ref().map(|key_path| {
                let mut path = base_path.to_vec();
                path.extend_from_slice(key_path);
                path
            }),
        }
    }

    /// (branch, index) taken from the last two path components
    pub fn branch_and_index(&self) -> Option<(u32, u32)> {
        match self.path.as_deref() {
            Some([.., branch, index]) => Some((*branch, *index)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub version: i32,
    pub lock_time: u32,
    /// Block time in milliseconds since the epoch
    pub timestamp: Option<i64>,
    /// Block height; `None` while unconfirmed
    pub block: Option<u32>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub analysis: Option<Analysis>,
    /// Account balance right after this transaction
    pub balance: Option<i64>,
}

impl Transaction {
    /// Build from backend data; output key paths are resolved against the
    /// account path.
    pub fn from_raw(raw: &RawTransaction, base_path: &[u32]) -> Self {
        Self {
            hash: raw.hash.clone(),
            version: raw.version,
            lock_time: raw.lock_time,
            timestamp: raw.block_time.map(|time| time.timestamp_millis()),
            block: raw.height,
            inputs: raw.inputs.iter().map(TxInput::from).collect(),
            outputs: raw
                .outputs
                .iter()
                .map(|out| TxOutput::from_raw(out, base_path))
                .collect(),
            analysis: None,
            balance: None,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.iter().any(TxInput::is_coinbase)
    }

    pub fn is_confirmed(&self) -> bool {
        self.block.is_some()
    }

    pub fn owned_outputs(&self) -> impl Iterator<Item = &TxOutput> {
        self.outputs.iter().filter(|out| out.path.is_some())
    }

    pub fn output(&self, index: i64) -> Option<&TxOutput> {
        let index = u32::try_from(index).ok()?;
        self.outputs.iter().find(|out| out.index == index)
    }
}

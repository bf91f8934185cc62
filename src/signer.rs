//! Signing device interface
//!
//! The device needs every transaction an input spends from, in its own
//! flat shape, next to the candidate itself.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::backend::RawTransaction;
use crate::config::CoinConfig;
use crate::error::SignerError;
use crate::tx_builder::TxCandidate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInput {
    pub prev_hash: String,
    pub prev_index: u32,
    pub sequence: u32,
    /// Hex encoded
    pub script_sig: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerOutput {
    pub amount: u64,
    /// Hex encoded
    pub script_pubkey: String,
}

/// Previous transaction as handed to the signing device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerTransaction {
    pub hash: String,
    pub version: i32,
    pub inputs: Vec<SignerInput>,
    pub bin_outputs: Vec<SignerOutput>,
    pub lock_time: u32,
}

impl From<&RawTransaction> for SignerTransaction {
    fn from(raw: &RawTransaction) -> Self {
        Self {
            hash: raw.hash.clone(),
            version: raw.version,
            // Backends report the coinbase index and final sequence as -1;
            // the device expects the unsigned 0xffffffff.
            inputs: raw
                .inputs
                .iter()
                .map(|input| SignerInput {
                    prev_hash: input.source_hash.clone(),
                    prev_index: input.ix as u32,
                    sequence: input.sequence as u32,
                    script_sig: hex::encode(input.script.as_bytes()),
                })
                .collect(),
            bin_outputs: raw
                .outputs
                .iter()
                .map(|output| SignerOutput {
                    amount: output.value,
                    script_pubkey: hex::encode(output.script.as_bytes()),
                })
                .collect(),
            lock_time: raw.lock_time,
        }
    }
}

pub trait Signer: Send + Sync {
    /// Sign `candidate`; returns the hex-encoded network serialization
    fn sign_tx<'a>(
        &'a self,
        candidate: &'a TxCandidate,
        referenced: &'a [SignerTransaction],
        coin: &'a CoinConfig,
    ) -> BoxFuture<'a, Result<String, SignerError>>;
}

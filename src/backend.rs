//! Indexing backend interface
//!
//! The backend watches an account node and pushes balance snapshots; the
//! account pulls transaction history and individual transactions on demand.
//! Transport is entirely the implementor's business. Records below mirror the
//! backend's JSON (camelCase); scripts travel as base64.

use bitcoin::{ScriptBuf, Txid};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::derivation::AccountNode;
use crate::error::BackendError;

/// Status of a pushed balance snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpdateStatus {
    /// Backend is still scanning; the snapshot is incomplete
    Pending,
    Ready,
}

/// Unspent output as reported in a balance snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUtxo {
    pub value: u64,
    pub transaction_hash: String,
    pub ix: u32,
    /// Path relative to the account node, e.g. `[0, 5]`
    #[serde(default)]
    pub key_path_for_address: Option<Vec<u32>>,
}

/// Balance snapshot pushed by a subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub status: UpdateStatus,
    #[serde(default)]
    pub confirmed: Vec<RawUtxo>,
    #[serde(default)]
    pub change: Vec<RawUtxo>,
    #[serde(default)]
    pub receiving: Vec<RawUtxo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInput {
    pub source_hash: String,
    /// Spent output index; `-1` for coinbase inputs
    pub ix: i64,
    #[serde(with = "base64_script")]
    pub script: ScriptBuf,
    /// Usually `-1` (final), `0` in coinbase inputs
    pub sequence: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOutput {
    pub value: u64,
    pub ix: u32,
    #[serde(with = "base64_script")]
    pub script: ScriptBuf,
    #[serde(default)]
    pub key_path_for_address: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub hash: String,
    pub version: i32,
    pub lock_time: u32,
    #[serde(default)]
    pub block_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub height: Option<u32>,
    pub inputs: Vec<RawInput>,
    pub outputs: Vec<RawOutput>,
}

/// Remote indexing service bound to one coin
///
/// Implementations are shared between accounts of the same coin, so every
/// method takes `&self`.
pub trait Backend: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<(), BackendError>>;

    fn is_connected(&self) -> bool;

    /// Start pushing balance snapshots for `node` into `updates`
    fn subscribe<'a>(
        &'a self,
        node: &'a AccountNode,
        updates: UnboundedSender<BalanceUpdate>,
    ) -> BoxFuture<'a, Result<(), BackendError>>;

    fn unsubscribe(&self, node: &AccountNode);

    /// Full transaction history of the account
    fn transactions<'a>(
        &'a self,
        node: &'a AccountNode,
    ) -> BoxFuture<'a, Result<Vec<RawTransaction>, BackendError>>;

    /// A single transaction, used to resolve inputs before signing
    fn transaction<'a>(
        &'a self,
        node: &'a AccountNode,
        hash: &'a str,
    ) -> BoxFuture<'a, Result<RawTransaction, BackendError>>;

    fn current_height(&self) -> BoxFuture<'_, Result<u32, BackendError>>;

    /// Broadcast a signed transaction
    fn send<'a>(&'a self, bytes: &'a [u8], txid: &'a Txid)
        -> BoxFuture<'a, Result<(), BackendError>>;
}

/// Serializes a script as standard base64
mod base64_script {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use bitcoin::ScriptBuf;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(script: &ScriptBuf, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(script.as_bytes()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ScriptBuf, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(&s).map_err(serde::de::Error::custom)?;
        Ok(ScriptBuf::from_bytes(bytes))
    }
}

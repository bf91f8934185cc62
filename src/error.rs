//! Error types for account operations
//!
//! `WalletError` is what the public account API returns. The narrower enums
//! (`BackendError`, `SignerError`, `VerifyError`, `AnalysisError`,
//! `OutputValidationError`) describe one collaborator or one stage each and
//! convert into `WalletError` where they are fatal to the caller.

use std::fmt;

use thiserror::Error;

/// Core error type for account operations
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Not enough funds: need {required} sats, {available} sats spendable")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Signing failed: {0}")]
    SignFailure(#[from] SignFailure),

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    /// Broadcast failed after a valid signature. The raw bytes are kept so the
    /// caller can rebroadcast out-of-band.
    #[error("{message}")]
    BackendSend { message: String, raw_bytes: Vec<u8> },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Invalid address index: {0}")]
    InvalidIndex(u32),

    #[error("Derivation error: {0}")]
    Derivation(String),

    #[error("Unknown coin: {0}")]
    UnknownCoin(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Account not loaded: {0}")]
    NotLoaded(&'static str),

    #[error("Account task is closed")]
    Closed,
}

impl WalletError {
    pub fn insufficient_funds(required: u64, available: u64) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    /// Raw transaction bytes preserved by a failed broadcast, if any
    pub fn raw_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::BackendSend { raw_bytes, .. } => Some(raw_bytes),
            _ => None,
        }
    }
}

/// The signer returned something that must not be broadcast
#[derive(Error, Debug)]
pub enum SignFailure {
    #[error("Failed to parse signed transaction: {0}")]
    Unparsable(String),

    #[error("Failed to verify signed transaction: {0}")]
    Verification(#[from] VerifyError),
}

/// Mismatch between the candidate sent to the signer and what came back
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("input count mismatch: expected {expected}, got {actual}")]
    InputCount { expected: usize, actual: usize },

    #[error("output count mismatch: expected {expected}, got {actual}")]
    OutputCount { expected: usize, actual: usize },

    #[error("output {index} amount mismatch: expected {expected}, got {actual}")]
    Amount {
        index: usize,
        expected: u64,
        actual: u64,
    },

    #[error("output {index} script mismatch")]
    Script { index: usize },

    #[error("output {index} has unsupported script type {script_type}")]
    UnknownScriptType { index: usize, script_type: String },

    #[error("output {index} destination is invalid: {reason}")]
    Destination { index: usize, reason: String },
}

/// Failure reported by the indexing backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by the signing device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("cancelled by user")]
    Cancelled,

    #[error("device failure: {0}")]
    Device(String),
}

/// Classification failure for a single transaction; never fatal to a batch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("transaction neither spends nor receives wallet funds")]
    Unrelated,

    #[error("input spends missing output {index} of {hash}")]
    MissingOutput { hash: String, index: i64 },

    #[error("value overflow")]
    Overflow,
}

/// Which field of a requested output failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputField {
    Amount,
    Address,
}

impl fmt::Display for OutputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amount => write!(f, "amount"),
            Self::Address => write!(f, "address"),
        }
    }
}

/// Per-output validation failure, shown next to the offending field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct OutputValidationError {
    pub field: OutputField,
    pub message: String,
}

impl OutputValidationError {
    pub fn amount(message: impl Into<String>) -> Self {
        Self {
            field: OutputField::Amount,
            message: message.into(),
        }
    }

    pub fn address(message: impl Into<String>) -> Self {
        Self {
            field: OutputField::Address,
            message: message.into(),
        }
    }
}

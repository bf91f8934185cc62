//! hw-account: hardware-wallet account engine
//!
//! Tracks one BIP44 account of a hardware wallet against a remote indexing
//! backend: spendable outputs, classified history with running balances and
//! address offsets. Builds unsigned spends with a negotiated fee and checks
//! whatever the signing device returns before it is broadcast.
//!
//! # Architecture
//!
//! - **Derivation**: addresses from the account xpub, never stored
//! - **History**: `WalletIndex`, analyzer, ledger and offset tracking
//! - **Spending**: utxo selection, fee negotiation, candidate building
//! - **Verification**: signed output scripts re-derived and compared
//! - **Service**: one tokio task per account, the only writer
//!
//! # Example
//!
//! ```ignore
//! use hw_account::{Account, AccountHandle, WalletConfig};
//!
//! let account = Account::new(0, WalletConfig::from_env(), node, backend)?;
//! let (handle, ready) = AccountHandle::spawn(account);
//! ready.await??;
//!
//! let candidate = handle.build_tx(outputs).await?;
//! let sent = handle.send_tx(candidate, device).await?;
//! println!("broadcast {}", sent.txid);
//! ```

pub mod account;
pub mod analyzer;
pub mod backend;
pub mod config;
pub mod derivation;
pub mod error;
pub mod fee;
pub mod ledger;
pub mod offsets;
pub mod output;
pub mod script;
pub mod service;
pub mod signer;
pub mod transaction;
pub mod tx_builder;
pub mod utxo;
pub mod verifier;
pub mod wallet_index;

// Re-exports for convenience
pub use account::{Account, AccountRecord, OwnedOutput, SentTransaction, UsedAddress};
pub use backend::{Backend, BalanceUpdate, RawTransaction, UpdateStatus};
pub use config::{CoinConfig, WalletConfig};
pub use derivation::{AccountNode, Address, BranchNode};
pub use error::{
    AnalysisError, BackendError, OutputValidationError, SignFailure, SignerError, VerifyError,
    WalletError,
};
pub use output::{prepare_outputs, validate_output, OutputRequest, PreparedOutputs};
pub use script::ScriptType;
pub use service::{AccountHandle, SyncStatus};
pub use signer::{Signer, SignerTransaction};
pub use transaction::{Analysis, Transaction, TxType};
pub use tx_builder::{CandidateInput, CandidateOutput, OutputDestination, TxCandidate};
pub use utxo::{Utxo, UtxoSelector};

/// Result type for account operations
pub type Result<T> = std::result::Result<T, WalletError>;

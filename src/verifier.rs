//! Signed transaction verification
//!
//! The signing device is trusted to sign, not to sign what we asked for.
//! Before anything is broadcast the returned serialization is parsed and
//! every output is checked against the candidate: same count, same amount,
//! and the script we derive ourselves from the address or derivation path.

use bitcoin::consensus::encode::deserialize;
use bitcoin::{ScriptBuf, Transaction as BitcoinTransaction, Txid};

use crate::config::CoinConfig;
use crate::derivation::{decode_address, derive_address, BranchNode, CHANGE_BRANCH, EXTERNAL_BRANCH};
use crate::error::{SignFailure, VerifyError};
use crate::tx_builder::{CandidateOutput, OutputDestination, TxCandidate};

/// Output of a signed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedOutput {
    pub amount: u64,
    pub script: ScriptBuf,
}

/// The parts of a signed transaction that verification looks at
#[derive(Debug, Clone)]
pub struct SignedTx {
    pub bytes: Vec<u8>,
    /// Hash of the non-witness serialization
    pub txid: Txid,
    pub input_count: usize,
    pub outputs: Vec<SignedOutput>,
}

impl SignedTx {
    /// Parse a hex-encoded network serialization
    pub fn from_hex(raw: &str) -> Result<Self, SignFailure> {
        let bytes = hex::decode(raw.trim()).map_err(|e| SignFailure::Unparsable(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SignFailure> {
        let tx: BitcoinTransaction =
            deserialize(&bytes).map_err(|e| SignFailure::Unparsable(e.to_string()))?;

        Ok(Self {
            txid: tx.compute_txid(),
            input_count: tx.input.len(),
            outputs: tx
                .output
                .into_iter()
                .map(|out| SignedOutput {
                    amount: out.value.to_sat(),
                    script: out.script_pubkey,
                })
                .collect(),
            bytes,
        })
    }

    /// `Display` renders it byte-reversed
    pub fn txid(&self) -> Txid {
        self.txid
    }
}

/// Checks signed transactions against the candidate they were built from
pub struct TxVerifier<'a> {
    external: &'a BranchNode,
    change: &'a BranchNode,
    coin: &'a CoinConfig,
}

impl<'a> TxVerifier<'a> {
    pub fn new(external: &'a BranchNode, change: &'a BranchNode, coin: &'a CoinConfig) -> Self {
        Self {
            external,
            change,
            coin,
        }
    }

    pub fn verify(&self, candidate: &TxCandidate, signed: &SignedTx) -> Result<(), VerifyError> {
        if candidate.inputs.len() != signed.input_count {
            return Err(VerifyError::InputCount {
                expected: candidate.inputs.len(),
                actual: signed.input_count,
            });
        }
        if candidate.outputs.len() != signed.outputs.len() {
            return Err(VerifyError::OutputCount {
                expected: candidate.outputs.len(),
                actual: signed.outputs.len(),
            });
        }

        for (index, (expected, actual)) in candidate.outputs.iter().zip(&signed.outputs).enumerate() {
            if expected.amount != actual.amount {
                return Err(VerifyError::Amount {
                    index,
                    expected: expected.amount,
                    actual: actual.amount,
                });
            }
        }

        for (index, (expected, actual)) in candidate.outputs.iter().zip(&signed.outputs).enumerate() {
            if self.expected_script(index, expected)? != actual.script {
                return Err(VerifyError::Script { index });
            }
        }

        log::debug!(
            "Verified signed tx: {} inputs, {} outputs",
            signed.input_count,
            signed.outputs.len()
        );
        Ok(())
    }

    fn expected_script(&self, index: usize, output: &CandidateOutput) -> Result<ScriptBuf, VerifyError> {
        let hash = self.destination_hash(index, &output.destination)?;
        output
            .script_type
            .script_for_hash(hash)
            .ok_or_else(|| VerifyError::UnknownScriptType {
                index,
                script_type: output.script_type.to_string(),
            })
    }

    fn destination_hash(&self, index: usize, destination: &OutputDestination) -> Result<[u8; 20], VerifyError> {
        let invalid = |reason: String| VerifyError::Destination { index, reason };

        let address = match destination {
            OutputDestination::Address(address) => address.clone(),
            OutputDestination::Path(path) => {
                let [.., branch, child] = path.as_slice() else {
                    return Err(invalid(format!("path too short: {:?}", path)));
                };
                let node = match *branch {
                    EXTERNAL_BRANCH => self.external,
                    CHANGE_BRANCH => self.change,
                    other => return Err(invalid(format!("unknown branch {}", other))),
                };
                derive_address(node, *child, self.coin.address_version)
                    .map_err(|e| invalid(e.to_string()))?
                    .address
            }
        };

        decode_address(&address)
            .map(|decoded| decoded.hash)
            .ok_or_else(|| invalid(format!("cannot decode address {}", address)))
    }
}

//! Unsigned transaction candidates
//!
//! A candidate is what gets handed to the signing device: requested outputs
//! plus an optional change output, the selected inputs, and the sums the fee
//! negotiation works with.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::script::ScriptType;
use crate::utxo::{Utxo, UtxoSelector, DUST_THRESHOLD};

/// Fixed part of the size estimate (version, counts, lock time)
pub const BASE_SIZE: u64 = 10;
/// Estimated size of one signed single-key input
pub const INPUT_SIZE: u64 = 149;
/// Estimated size of one output
pub const OUTPUT_SIZE: u64 = 35;

/// Where an output pays to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputDestination {
    /// Foreign address string
    Address(String),
    /// Derivation path of one of our own addresses
    Path(Vec<u32>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateOutput {
    pub script_type: ScriptType,
    pub destination: OutputDestination,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInput {
    pub prev_hash: String,
    pub prev_index: u32,
    pub path: Option<Vec<u32>>,
}

impl From<&Utxo> for CandidateInput {
    fn from(utxo: &Utxo) -> Self {
        Self {
            prev_hash: utxo.transaction_hash.clone(),
            prev_index: utxo.index,
            path: utxo.path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCandidate {
    pub fee: u64,
    pub change: u64,
    pub input_sum: u64,
    /// Sum of the requested outputs; change is not included
    pub output_sum: u64,
    pub outputs: Vec<CandidateOutput>,
    pub inputs: Vec<CandidateInput>,
}

/// Estimated serialized size in bytes
pub fn estimate_size(inputs: usize, outputs: usize) -> u64 {
    BASE_SIZE + INPUT_SIZE * inputs as u64 + OUTPUT_SIZE * outputs as u64
}

fn sum_outputs(outputs: &[CandidateOutput]) -> u64 {
    outputs
        .iter()
        .fold(0u64, |total, out| total.saturating_add(out.amount))
}

/// Build a candidate from already selected inputs
///
/// Change below the dust threshold is not worth an output and is added to
/// the fee instead. Outputs end up ordered by amount, largest first.
pub fn assemble(
    selected: &[Utxo],
    outputs: &[CandidateOutput],
    fee: u64,
    change_path: &[u32],
) -> TxCandidate {
    let input_sum = selected
        .iter()
        .fold(0u64, |total, utxo| total.saturating_add(utxo.value));
    let output_sum = sum_outputs(outputs);

    let mut fee = fee;
    let mut change = input_sum.saturating_sub(output_sum).saturating_sub(fee);
    let mut outputs = outputs.to_vec();

    if change >= DUST_THRESHOLD {
        outputs.push(CandidateOutput {
            script_type: ScriptType::PayToAddress,
            destination: OutputDestination::Path(change_path.to_vec()),
            amount: change,
        });
        log::debug!("Added change output of {}", change);
    } else {
        log::debug!(
            "Change {} is below dust limit {}, adding it to the fee",
            change,
            DUST_THRESHOLD
        );
        change = 0;
        fee = input_sum.saturating_sub(output_sum);
    }

    // Deterministic order; the device sees outputs exactly as listed here
    outputs.sort_by_key(|out| Reverse(out.amount));

    TxCandidate {
        fee,
        change,
        input_sum,
        output_sum,
        outputs,
        inputs: selected.iter().map(CandidateInput::from).collect(),
    }
}

/// Selects inputs for the requested outputs and assembles candidates
pub struct TxBuilder<'a> {
    selector: &'a UtxoSelector,
    outputs: &'a [CandidateOutput],
    change_path: Vec<u32>,
}

impl<'a> TxBuilder<'a> {
    pub fn new(
        selector: &'a UtxoSelector,
        outputs: &'a [CandidateOutput],
        change_path: Vec<u32>,
    ) -> Self {
        Self {
            selector,
            outputs,
            change_path,
        }
    }

    pub fn output_sum(&self) -> u64 {
        sum_outputs(self.outputs)
    }

    /// Select inputs covering outputs plus `fee` and assemble a candidate
    pub fn construct(&self, fee: u64) -> Result<TxCandidate, WalletError> {
        log::debug!(
            "Constructing tx with fee attempt {} for {} outputs",
            fee,
            self.outputs.len()
        );

        let output_sum = self.output_sum();
        let target = output_sum
            .checked_add(fee)
            .ok_or_else(|| WalletError::insufficient_funds(u64::MAX, self.selector.available()))?;
        let selected = self.selector.select(target)?;

        Ok(assemble(&selected, self.outputs, fee, &self.change_path))
    }
}

//! Fee negotiation
//!
//! The fee depends on the size of the transaction and the size depends on
//! which inputs the fee forces us to select. Negotiation starts from a zero
//! fee and rebuilds the candidate with the fee the previous attempt would
//! have required until that fee fits, or funds run out.

use crate::error::WalletError;
use crate::tx_builder::{estimate_size, TxBuilder, TxCandidate};

/// Fee for `size` bytes at `fee_per_kb`, charged per started kilobyte
pub fn required_fee(size: u64, fee_per_kb: u64) -> u64 {
    size.div_ceil(1000).saturating_mul(fee_per_kb)
}

/// Fee a candidate would need for its own estimated size
pub fn required_fee_for(candidate: &TxCandidate, fee_per_kb: u64) -> u64 {
    required_fee(
        estimate_size(candidate.inputs.len(), candidate.outputs.len()),
        fee_per_kb,
    )
}

#[derive(Debug)]
enum Negotiation {
    Negotiating { fee: u64 },
    Converged(TxCandidate),
    Insufficient(WalletError),
}

pub struct FeeNegotiator<'a> {
    builder: &'a TxBuilder<'a>,
    fee_per_kb: u64,
}

impl<'a> FeeNegotiator<'a> {
    pub fn new(builder: &'a TxBuilder<'a>, fee_per_kb: u64) -> Self {
        Self {
            builder,
            fee_per_kb,
        }
    }

    /// Run attempts until the fee settles
    ///
    /// Every retry asks for a strictly larger fee, so the loop ends once
    /// the selector cannot cover the outputs plus the fee.
    pub fn negotiate(&self) -> Result<TxCandidate, WalletError> {
        let mut state = Negotiation::Negotiating { fee: 0 };
        loop {
            state = match state {
                Negotiation::Negotiating { fee } => self.attempt(fee),
                Negotiation::Converged(candidate) => {
                    log::info!(
                        "Fee settled at {} with {} inputs and {} outputs",
                        candidate.fee,
                        candidate.inputs.len(),
                        candidate.outputs.len()
                    );
                    return Ok(candidate);
                }
                Negotiation::Insufficient(e) => {
                    log::warn!("Fee negotiation failed: {}", e);
                    return Err(e);
                }
            };
        }
    }

    fn attempt(&self, fee: u64) -> Negotiation {
        let candidate = match self.builder.construct(fee) {
            Ok(candidate) => candidate,
            Err(e) => return Negotiation::Insufficient(e),
        };

        let required = required_fee_for(&candidate, self.fee_per_kb);
        let space = candidate
            .input_sum
            .saturating_sub(candidate.output_sum.saturating_add(candidate.change));

        log::debug!(
            "Fee attempt {}: candidate fee {}, required {}, space {}",
            fee,
            candidate.fee,
            required,
            space
        );

        if required > space {
            return Negotiation::Negotiating { fee: required };
        }
        if required == candidate.fee {
            return Negotiation::Converged(candidate);
        }

        // Dust folding left more fee than needed. Rebuild once with the
        // required fee; the result is not checked again.
        match self.builder.construct(required) {
            Ok(rebuilt) => Negotiation::Converged(rebuilt),
            Err(e) => Negotiation::Insufficient(e),
        }
    }
}

/// Negotiate a candidate for `builder` at `fee_per_kb`
pub fn negotiate(builder: &TxBuilder<'_>, fee_per_kb: u64) -> Result<TxCandidate, WalletError> {
    FeeNegotiator::new(builder, fee_per_kb).negotiate()
}

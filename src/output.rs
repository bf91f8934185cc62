//! Validation of user-requested outputs
//!
//! Requests arrive as strings. Each one is validated on its own so that a
//! bad address in one row does not hide an error in another.

use crate::config::CoinConfig;
use crate::derivation::decode_address;
use crate::error::OutputValidationError;
use crate::tx_builder::{CandidateOutput, OutputDestination};
use crate::utxo::DUST_THRESHOLD;

/// Smallest units per coin
pub const UNITS_PER_COIN: u64 = 100_000_000;

const DECIMALS: usize = 8;

/// Parse a decimal coin amount (`"0.0015"`) into the smallest unit
pub fn parse_amount(raw: &str) -> Result<u64, OutputValidationError> {
    let invalid = || OutputValidationError::amount("Invalid amount");
    let raw = raw.trim();

    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if fraction.len() > DECIMALS {
        return Err(OutputValidationError::amount("Too many decimal places"));
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) {
        return Err(invalid());
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let fraction: u64 = if fraction.is_empty() {
        0
    } else {
        format!("{:0<width$}", fraction, width = DECIMALS)
            .parse()
            .map_err(|_| invalid())?
    };

    whole
        .checked_mul(UNITS_PER_COIN)
        .and_then(|units| units.checked_add(fraction))
        .ok_or_else(invalid)
}

/// Render an amount in coin units, trailing zeros trimmed
pub fn format_amount(amount: u64) -> String {
    let whole = amount / UNITS_PER_COIN;
    let fraction = amount % UNITS_PER_COIN;
    if fraction == 0 {
        return whole.to_string();
    }

    let fraction = format!("{:08}", fraction);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

/// Turn an address and amount into a candidate output
pub fn validate_output(
    coin: &CoinConfig,
    address: &str,
    amount: u64,
) -> Result<CandidateOutput, OutputValidationError> {
    if amount < DUST_THRESHOLD {
        return Err(OutputValidationError::amount("Amount is too low"));
    }

    let decoded =
        decode_address(address).ok_or_else(|| OutputValidationError::address("Invalid address"))?;
    let script_type = coin
        .script_type_for_version(decoded.version)
        .ok_or_else(|| OutputValidationError::address("Invalid address version"))?;

    Ok(CandidateOutput {
        script_type,
        destination: OutputDestination::Address(address.to_string()),
        amount,
    })
}

/// One row of a send form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputRequest {
    pub address: String,
    pub amount: String,
}

impl OutputRequest {
    pub fn new(address: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            amount: amount.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedOutputs {
    pub outputs: Vec<CandidateOutput>,
    /// Errors keyed by the position of the request they belong to
    pub errors: Vec<(usize, OutputValidationError)>,
}

impl PreparedOutputs {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a batch of requests; rows with an empty field are skipped
pub fn prepare_outputs(coin: &CoinConfig, requests: &[OutputRequest]) -> PreparedOutputs {
    let mut prepared = PreparedOutputs::default();

    for (i, request) in requests.iter().enumerate() {
        let address = request.address.trim();
        let amount = request.amount.trim();
        if address.is_empty() || amount.is_empty() {
            continue;
        }

        let result = parse_amount(amount).and_then(|amount| validate_output(coin, address, amount));
        match result {
            Ok(output) => prepared.outputs.push(output),
            Err(e) => prepared.errors.push((i, e)),
        }
    }

    prepared
}

/// Largest amount still payable on top of already requested outputs
pub fn suggest_amount(balance: u64, output_sum: u64) -> u64 {
    balance.saturating_sub(output_sum)
}

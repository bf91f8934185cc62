//! Coin and fee configuration
//!
//! Carries the per-coin constants the account needs (address versions,
//! script-type table, extended-public-key version bytes) and the wallet-wide
//! fee rate. Defaults to Bitcoin mainnet at 10 000 sats per kilobyte.

use std::collections::BTreeMap;
use std::env;

use crate::error::WalletError;
use crate::script::ScriptType;

/// Default fee rate in the smallest coin unit per started kilobyte
pub const DEFAULT_FEE_PER_KB: u64 = 10_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoinConfig {
    /// Coin name as the signing device knows it
    pub name: String,
    /// Version byte of pay-to-pubkey-hash addresses
    pub address_version: u8,
    /// Script types for every other accepted address version
    pub script_types: BTreeMap<u8, ScriptType>,
    /// Version bytes used when exporting the account xpub
    pub xpub_version: [u8; 4],
}

impl CoinConfig {
    pub fn bitcoin() -> Self {
        Self {
            name: "Bitcoin".to_string(),
            address_version: 0x00,
            script_types: BTreeMap::from([(0x05, ScriptType::PayToScriptHash)]),
            xpub_version: [0x04, 0x88, 0xb2, 0x1e],
        }
    }

    pub fn testnet() -> Self {
        Self {
            name: "Testnet".to_string(),
            address_version: 0x6f,
            script_types: BTreeMap::from([(0xc4, ScriptType::PayToScriptHash)]),
            xpub_version: [0x04, 0x35, 0x87, 0xcf],
        }
    }

    pub fn litecoin() -> Self {
        Self {
            name: "Litecoin".to_string(),
            address_version: 0x30,
            script_types: BTreeMap::from([
                (0x05, ScriptType::PayToScriptHash),
                (0x32, ScriptType::PayToScriptHash),
            ]),
            xpub_version: [0x01, 0x9d, 0xa4, 0x62],
        }
    }

    pub fn dogecoin() -> Self {
        Self {
            name: "Dogecoin".to_string(),
            address_version: 0x1e,
            script_types: BTreeMap::from([(0x16, ScriptType::PayToScriptHash)]),
            xpub_version: [0x02, 0xfa, 0xca, 0xfd],
        }
    }

    /// Look up a preset by name (case-insensitive)
    pub fn by_name(name: &str) -> Result<Self, WalletError> {
        match name.to_lowercase().as_str() {
            "bitcoin" => Ok(Self::bitcoin()),
            "testnet" => Ok(Self::testnet()),
            "litecoin" => Ok(Self::litecoin()),
            "dogecoin" => Ok(Self::dogecoin()),
            _ => Err(WalletError::UnknownCoin(name.to_string())),
        }
    }

    /// Version byte used to render pay-to-script-hash addresses
    pub fn script_hash_version(&self) -> Option<u8> {
        self.script_types
            .iter()
            .find(|(_, script_type)| **script_type == ScriptType::PayToScriptHash)
            .map(|(version, _)| *version)
    }

    /// Script type implied by an address version byte
    pub fn script_type_for_version(&self, version: u8) -> Option<ScriptType> {
        if version == self.address_version {
            return Some(ScriptType::PayToAddress);
        }
        self.script_types.get(&version).copied()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletConfig {
    pub coin: CoinConfig,
    pub fee_per_kb: u64,
}

impl WalletConfig {
    pub fn new(coin: CoinConfig, fee_per_kb: u64) -> Self {
        Self { coin, fee_per_kb }
    }

    /// Load configuration from environment variables
    ///
    /// - `COIN`: "bitcoin" (default), "testnet", "litecoin" or "dogecoin"
    /// - `FEE_PER_KB`: fee in the smallest unit per started kilobyte
    ///
    /// Unknown or malformed values fall back to the defaults with a warning.
    pub fn from_env() -> Self {
        let coin = match env::var("COIN") {
            Ok(name) => CoinConfig::by_name(&name).unwrap_or_else(|e| {
                log::warn!("{}, defaulting to Bitcoin", e);
                CoinConfig::bitcoin()
            }),
            Err(_) => CoinConfig::bitcoin(),
        };
        log::info!("Using coin {}", coin.name);

        let fee_per_kb = match env::var("FEE_PER_KB") {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                log::warn!(
                    "Invalid FEE_PER_KB '{}', defaulting to {}",
                    raw,
                    DEFAULT_FEE_PER_KB
                );
                DEFAULT_FEE_PER_KB
            }),
            Err(_) => DEFAULT_FEE_PER_KB,
        };
        log::info!("Fee per kB: {}", fee_per_kb);

        Self { coin, fee_per_kb }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            coin: CoinConfig::bitcoin(),
            fee_per_kb: DEFAULT_FEE_PER_KB,
        }
    }
}

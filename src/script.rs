//! Output script templates
//!
//! Only the two single-key templates are ever produced or checked here:
//!
//! - `PAYTOADDRESS`: `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
//! - `PAYTOSCRIPTHASH`: `OP_HASH160 <20 bytes> OP_EQUAL`

use std::fmt;

use bitcoin::hashes::{hash160, Hash};
use bitcoin::{PubkeyHash, Script, ScriptBuf, ScriptHash};
use serde::{Deserialize, Serialize};

/// Script type of a requested output, named as the signing device names them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptType {
    #[serde(rename = "PAYTOADDRESS")]
    PayToAddress,
    #[serde(rename = "PAYTOSCRIPTHASH")]
    PayToScriptHash,
    #[serde(rename = "PAYTOMULTISIG")]
    PayToMultisig,
    #[serde(rename = "PAYTOOPRETURN")]
    PayToOpReturn,
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PayToAddress => "PAYTOADDRESS",
            Self::PayToScriptHash => "PAYTOSCRIPTHASH",
            Self::PayToMultisig => "PAYTOMULTISIG",
            Self::PayToOpReturn => "PAYTOOPRETURN",
        };
        f.write_str(name)
    }
}

impl ScriptType {
    /// Build the scriptPubKey for a 20-byte hash, or `None` for templates
    /// that are not a plain hash commitment.
    pub fn script_for_hash(&self, hash: [u8; 20]) -> Option<ScriptBuf> {
        match self {
            Self::PayToAddress => Some(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash))),
            Self::PayToScriptHash => Some(ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash))),
            Self::PayToMultisig | Self::PayToOpReturn => None,
        }
    }
}

/// 20-byte digest identifying an output script inside the wallet index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptDigest(pub [u8; 20]);

impl ScriptDigest {
    /// Embedded hash for P2PKH / P2SH, hash160 of the whole script otherwise
    pub fn of(script: &Script) -> Self {
        match embedded_hash(script) {
            Some((_, hash)) => Self(hash),
            None => Self(hash160::Hash::hash(script.as_bytes()).to_byte_array()),
        }
    }
}

impl fmt::Display for ScriptDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Template and 20-byte hash of a standard single-key script
pub fn embedded_hash(script: &Script) -> Option<(ScriptType, [u8; 20])> {
    let bytes = script.as_bytes();
    let (script_type, range) = if script.is_p2pkh() {
        (ScriptType::PayToAddress, 3..23)
    } else if script.is_p2sh() {
        (ScriptType::PayToScriptHash, 2..22)
    } else {
        return None;
    };

    let mut hash = [0u8; 20];
    hash.copy_from_slice(&bytes[range]);
    Some((script_type, hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pay_to_address_bytes() {
        let hash = [0x11; 20];
        let script = ScriptType::PayToAddress.script_for_hash(hash).unwrap();

        let mut expected = vec![0x76, 0xa9, 0x14];
        expected.extend_from_slice(&hash);
        expected.extend_from_slice(&[0x88, 0xac]);
        assert_eq!(script.as_bytes(), expected.as_slice());
    }

    #[test]
    fn test_pay_to_script_hash_bytes() {
        let hash = [0x22; 20];
        let script = ScriptType::PayToScriptHash.script_for_hash(hash).unwrap();

        let mut expected = vec![0xa9, 0x14];
        expected.extend_from_slice(&hash);
        expected.push(0x87);
        assert_eq!(script.as_bytes(), expected.as_slice());
    }

    #[test]
    fn test_non_hash_templates_have_no_script() {
        assert!(ScriptType::PayToMultisig.script_for_hash([0; 20]).is_none());
        assert!(ScriptType::PayToOpReturn.script_for_hash([0; 20]).is_none());
    }

    #[test]
    fn test_digest_uses_embedded_hash() {
        let hash = [0x33; 20];
        let p2pkh = ScriptType::PayToAddress.script_for_hash(hash).unwrap();
        let p2sh = ScriptType::PayToScriptHash.script_for_hash(hash).unwrap();

        assert_eq!(ScriptDigest::of(&p2pkh), ScriptDigest(hash));
        assert_eq!(ScriptDigest::of(&p2sh), ScriptDigest(hash));
        assert_eq!(embedded_hash(&p2sh), Some((ScriptType::PayToScriptHash, hash)));
    }

    #[test]
    fn test_digest_of_nonstandard_script() {
        let script = ScriptBuf::from_bytes(vec![0x51]);
        let digest = ScriptDigest::of(&script);
        assert_eq!(digest.0, hash160::Hash::hash(&[0x51]).to_byte_array());
        assert!(embedded_hash(&script).is_none());
    }

    #[test]
    fn test_script_type_names() {
        assert_eq!(ScriptType::PayToAddress.to_string(), "PAYTOADDRESS");
        assert_eq!(
            serde_json::to_string(&ScriptType::PayToScriptHash).unwrap(),
            "\"PAYTOSCRIPTHASH\""
        );
    }
}

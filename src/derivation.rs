//! Deterministic key-tree derivation
//!
//! An account node (`m/44'/coin'/account'`) has two live branches: external
//! (receive, child 0) and change (child 1). Addresses are never stored; they
//! are re-derived on demand from a branch node and an index.

use bitcoin::base58;
use bitcoin::bip32::{ChildNumber, Xpub};
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::Secp256k1;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

pub const EXTERNAL_BRANCH: u32 = 0;
pub const CHANGE_BRANCH: u32 = 1;

const HARDENED_BIT: u32 = 0x8000_0000;

/// Account root: derivation path plus extended public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountNode {
    pub path: Vec<u32>,
    pub xpub: Xpub,
}

impl AccountNode {
    pub fn new(path: Vec<u32>, xpub: Xpub) -> Self {
        Self { path, xpub }
    }

    /// Derive the external (0) or change (1) branch node
    pub fn branch(&self, branch: u32) -> Result<BranchNode, WalletError> {
        let xpub = derive_child(&self.xpub, branch)?;
        let mut path = self.path.clone();
        path.push(branch);

        Ok(BranchNode {
            path,
            xpub,
            offset: 0,
            unconfirmed_offset: 0,
        })
    }

    /// Serialize the account xpub with coin-specific version bytes
    pub fn extended_public_key(&self, version: [u8; 4]) -> String {
        let mut data = self.xpub.encode();
        data[..4].copy_from_slice(&version);
        base58::encode_check(&data)
    }
}

/// One branch of the account tree together with its usage offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNode {
    pub path: Vec<u32>,
    pub xpub: Xpub,
    /// Highest index used by a confirmed transaction, plus one
    pub offset: u32,
    /// Highest index used by an unconfirmed transaction, plus one
    pub unconfirmed_offset: u32,
}

impl BranchNode {
    /// Next index not seen in any transaction, confirmed or not
    pub fn fresh_index(&self) -> u32 {
        self.offset.max(self.unconfirmed_offset)
    }

    /// Path of the child at `index`
    pub fn child_path(&self, index: u32) -> Vec<u32> {
        let mut path = self.path.clone();
        path.push(index);
        path
    }
}

/// A derived address; `index` is the position within its branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub path: Vec<u32>,
    pub address: String,
    pub index: u32,
}

/// Version byte and hash carried by a base58check address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedAddress {
    pub version: u8,
    pub hash: [u8; 20],
}

fn derive_child(xpub: &Xpub, index: u32) -> Result<Xpub, WalletError> {
    let child = ChildNumber::from_normal_idx(index).map_err(|_| WalletError::InvalidIndex(index))?;
    let secp = Secp256k1::verification_only();

    xpub.ckd_pub(&secp, child)
        .map_err(|e| WalletError::Derivation(e.to_string()))
}

/// Derive the address at `index` on a branch
pub fn derive_address(
    node: &BranchNode,
    index: u32,
    address_version: u8,
) -> Result<Address, WalletError> {
    let child = derive_child(&node.xpub, index)?;
    let hash = bitcoin::PublicKey::new(child.public_key)
        .pubkey_hash()
        .to_byte_array();
    let path = node.child_path(index);

    log::debug!("Derived address {} at {}", index, format_path(&path));

    Ok(Address {
        path,
        address: encode_address(address_version, hash),
        index,
    })
}

pub fn encode_address(version: u8, hash: [u8; 20]) -> String {
    let mut data = Vec::with_capacity(21);
    data.push(version);
    data.extend_from_slice(&hash);
    base58::encode_check(&data)
}

/// Decode a base58check address; `None` when the checksum or length is wrong
pub fn decode_address(address: &str) -> Option<DecodedAddress> {
    let data = base58::decode_check(address).ok()?;
    if data.len() != 21 {
        return None;
    }

    let mut hash = [0u8; 20];
    hash.copy_from_slice(&data[1..]);
    Some(DecodedAddress {
        version: data[0],
        hash,
    })
}

/// Render a path as `m/44'/0'/0'/0/5`
pub fn format_path(path: &[u32]) -> String {
    let mut out = String::from("m");
    for index in path {
        if index & HARDENED_BIT != 0 {
            out.push_str(&format!("/{}'", index & !HARDENED_BIT));
        } else {
            out.push_str(&format!("/{}", index));
        }
    }
    out
}

//! Address encoding
//!
//! An address is `prefix || preAddress || checksum`:
//! - prefix: `S` plus a version tag chosen by tree depth, or `F1` for
//!   depths the network does not accept
//! - preAddress: first 32 base32 characters of the root digest
//! - checksum: first 4 base32 characters of SHA256 over the checksum prefix
//!   and preAddress, to catch mistyped addresses
//!
//! Depth 18 addresses are emitted as `SC` but checksummed as `S5`. Every
//! issued depth 18 address depends on this, so it must not change.

use crate::crypto::{base32, sha256_base32_prefix};
use crate::error::{Error, Result};
use crate::types::{Address, Root};

/// Length of the encoded root inside an address
pub const PRE_ADDRESS_LEN: usize = 32;

/// Length of the trailing checksum
pub const CHECKSUM_LEN: usize = 4;

/// Length of every version prefix
pub const PREFIX_LEN: usize = 2;

/// Total address length
pub const ADDRESS_LEN: usize = PREFIX_LEN + PRE_ADDRESS_LEN + CHECKSUM_LEN;

/// Prefix for trees of a depth the network does not support
pub const FALLBACK_PREFIX: &str = "F1";

/// Depth, emitted prefix, checksum prefix
const VERSION_TABLE: [(u32, &str, &str); 5] = [
    (14, "S1", "S1"),
    (15, "S2", "S2"),
    (16, "S3", "S3"),
    (17, "S4", "S4"),
    (18, "SC", "S5"),
];

/// Version of an address, determined by the depth of its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressVersion {
    depth: Option<u32>,
    prefix: &'static str,
    checksum_prefix: &'static str,
}

impl AddressVersion {
    const FALLBACK: Self = Self {
        depth: None,
        prefix: FALLBACK_PREFIX,
        checksum_prefix: FALLBACK_PREFIX,
    };

    /// Look up the version for a tree of `num_layers`
    pub fn for_depth(num_layers: u32) -> Self {
        VERSION_TABLE
            .iter()
            .find(|(depth, _, _)| *depth == num_layers)
            .map(|&(depth, prefix, checksum_prefix)| Self {
                depth: Some(depth),
                prefix,
                checksum_prefix,
            })
            .unwrap_or(Self::FALLBACK)
    }

    /// Look up the version an address prefix names
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        if prefix == FALLBACK_PREFIX {
            return Some(Self::FALLBACK);
        }
        VERSION_TABLE
            .iter()
            .find(|(_, p, _)| *p == prefix)
            .map(|&(depth, prefix, checksum_prefix)| Self {
                depth: Some(depth),
                prefix,
                checksum_prefix,
            })
    }

    /// Prefix written at the start of the address
    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    /// Prefix fed into the checksum hash
    pub fn checksum_prefix(&self) -> &'static str {
        self.checksum_prefix
    }

    /// Tree depth for standard versions; `None` for the fallback namespace
    pub fn depth(&self) -> Option<u32> {
        self.depth
    }

    pub fn is_standard(&self) -> bool {
        self.depth.is_some()
    }

    /// Number of one-time signatures an address of this version can make
    pub fn signatures(&self) -> Option<usize> {
        self.depth.map(crate::leaf_count)
    }
}

/// Maps tree roots to addresses and validates address strings
pub struct AddressEncoder;

impl AddressEncoder {
    /// Encode the root of a `num_layers` tree. Never fails: unsupported
    /// depths produce an `F1` address.
    pub fn encode(root: &Root, num_layers: u32) -> Address {
        let version = AddressVersion::for_depth(num_layers);
        let pre_address = Self::pre_address(root);
        let checksum = Self::checksum(version, &pre_address);
        Address::from_parts(version.prefix(), &pre_address, &checksum)
    }

    /// First 32 base32 characters of the root digest
    pub fn pre_address(root: &Root) -> String {
        let mut encoded = base32(root.digest());
        encoded.truncate(PRE_ADDRESS_LEN);
        encoded
    }

    /// Checksum for `pre_address` under `version`
    pub fn checksum(version: AddressVersion, pre_address: &str) -> String {
        let input = format!("{}{}", version.checksum_prefix(), pre_address);
        sha256_base32_prefix(input.as_bytes(), CHECKSUM_LEN)
    }

    /// Parse an address string and check its checksum
    pub fn verify(address: &str) -> Result<AddressVersion> {
        if address.len() != ADDRESS_LEN || !address.is_ascii() {
            return Err(Error::InvalidAddress(format!(
                "expected {ADDRESS_LEN} ASCII characters, got {:?}",
                address
            )));
        }

        let (prefix, rest) = address.split_at(PREFIX_LEN);
        let (pre_address, checksum) = rest.split_at(PRE_ADDRESS_LEN);

        let version = AddressVersion::from_prefix(prefix)
            .ok_or_else(|| Error::InvalidAddress(format!("unknown prefix {prefix:?}")))?;

        if Self::checksum(version, pre_address) != checksum {
            return Err(Error::InvalidAddress(format!(
                "checksum mismatch in {address}"
            )));
        }

        Ok(version)
    }
}

/// Encode the root of a `num_layers` tree as an address
pub fn encode_address(root: &Root, num_layers: u32) -> Address {
    AddressEncoder::encode(root, num_layers)
}

//! Hashing and encoding primitives
//!
//! Every helper builds a fresh `Sha256` per call, so they are safe to use
//! from any number of workers at once.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use data_encoding::BASE32;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::rng::{ChaChaStream, SeededStream};

/// Hash data using SHA256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash multiple pieces of data using SHA256
pub fn sha256_multi(data: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for d in data {
        hasher.update(d);
    }
    hasher.finalize().into()
}

/// Printable form used for every node of the tree (padded base64)
pub fn encode_node(digest: &[u8; 32]) -> String {
    STANDARD.encode(digest)
}

/// Decode a printable node back to its digest
pub fn decode_node(encoded: &str) -> Result<[u8; 32]> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::Serialization(format!("invalid node hash {encoded:?}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| Error::Serialization(format!("node hash {encoded:?} is not 32 bytes")))
}

/// RFC 4648 base32 (upper case, padded)
pub fn base32(data: &[u8]) -> String {
    BASE32.encode(data)
}

/// First `len` base32 characters of SHA256(`data`)
pub fn sha256_base32_prefix(data: &[u8], len: usize) -> String {
    let mut encoded = base32(&sha256(data));
    encoded.truncate(len);
    encoded
}

const SHA256_ABC: &str = "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0=";
const SHA256_ABC_BASE32: &str = "XJ4BNP4PAHH6UQKBIDPF3LRCEOYAGYNDSYLXVHFUCD7WD4QACWWQ====";
const CHACHA20_ZERO_KEY_PREFIX: [u8; 8] = [0x76, 0xb8, 0xe0, 0xad, 0xa0, 0xf1, 0x3d, 0x90];

/// Known-answer check of the hash, the encoders and the seeded generator.
///
/// Callers should refuse to derive any address if this fails, since
/// addresses produced by a broken primitive cannot be reproduced later.
pub fn self_test() -> Result<()> {
    let digest = sha256(b"abc");

    if encode_node(&digest) != SHA256_ABC {
        return Err(Error::SelfTest("SHA-256/base64 known answer mismatch".to_string()));
    }
    if base32(&digest) != SHA256_ABC_BASE32 {
        return Err(Error::SelfTest("base32 known answer mismatch".to_string()));
    }

    let mut stream = ChaChaStream::from_key([0u8; 32]);
    let mut block = [0u8; 8];
    stream.fill(&mut block)?;
    if block != CHACHA20_ZERO_KEY_PREFIX {
        return Err(Error::SelfTest("ChaCha20 keystream mismatch".to_string()));
    }

    Ok(())
}

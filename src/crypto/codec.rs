//! Record sealing: block padding, authenticated encryption, decoys.
//!
//! Every persisted record is an XSalsa20-Poly1305 secretbox over exactly one
//! 4096-byte padded block, laid out as `nonce ‖ sealed`. The constant record
//! size is what makes payload, metadata, and decoy records indistinguishable
//! on disk, so the constants here are part of the storage format.
//!
//! Padding is ISO/IEC 7816-4 style: `0x80` then zeros. A full 4096-byte input
//! would need a second block, so callers chunk plaintext at 4095 bytes.

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::derive::{ADDRESS_LEN, Address, MasterKey};

/// Size (bytes) of a padded plaintext block.
pub const BLOCK_LEN: usize = 4096;
/// Largest plaintext that fits in one block alongside its padding marker.
pub const CHUNK_LEN: usize = BLOCK_LEN - 1;
/// Size (bytes) of a secretbox nonce.
pub const NONCE_LEN: usize = 24;
/// Size (bytes) of the Poly1305 authentication tag.
pub const TAG_LEN: usize = 16;
/// Size (bytes) of every record in the database.
pub const RECORD_LEN: usize = NONCE_LEN + BLOCK_LEN + TAG_LEN;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("plaintext does not fit in one block")]
    BlockOverflow,

    #[error("malformed block padding")]
    Malformed,

    #[error("record authentication failed")]
    AuthFailed,

    #[error("cipher failure")]
    Cipher,
}

/// Generate `N` cryptographically-secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Pad `data` to exactly [`BLOCK_LEN`] bytes.
///
/// Requires `data.len() < BLOCK_LEN`, strictly.
pub fn pad(data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CodecError> {
    if data.len() >= BLOCK_LEN {
        return Err(CodecError::BlockOverflow);
    }
    let mut block = Zeroizing::new(vec![0u8; BLOCK_LEN]);
    block[..data.len()].copy_from_slice(data);
    block[data.len()] = 0x80;
    Ok(block)
}

/// Strip the padding from a [`BLOCK_LEN`]-byte block.
pub fn unpad(block: &[u8]) -> Result<Zeroizing<Vec<u8>>, CodecError> {
    for (i, byte) in block.iter().enumerate().rev() {
        match *byte {
            0x00 => continue,
            0x80 => return Ok(Zeroizing::new(block[..i].to_vec())),
            _ => return Err(CodecError::Malformed),
        }
    }
    Err(CodecError::Malformed)
}

/// Seal one padded block under `key` with a fresh random nonce.
pub fn encrypt(block: &[u8], key: &MasterKey) -> Result<Vec<u8>, CodecError> {
    let cipher =
        XSalsa20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CodecError::Cipher)?;
    let nonce = random_bytes::<NONCE_LEN>();
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), block)
        .map_err(|_| CodecError::Cipher)?;

    let mut record = Vec::with_capacity(RECORD_LEN);
    record.extend_from_slice(&nonce);
    record.extend_from_slice(&sealed);
    Ok(record)
}

/// Open one record under `key`.
///
/// Fails with [`CodecError::AuthFailed`] on any tampering or wrong key.
pub fn decrypt(record: &[u8], key: &MasterKey) -> Result<Zeroizing<Vec<u8>>, CodecError> {
    if record.len() < NONCE_LEN + TAG_LEN {
        return Err(CodecError::Malformed);
    }
    let (nonce, sealed) = record.split_at(NONCE_LEN);
    let cipher =
        XSalsa20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CodecError::Cipher)?;
    let block = cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CodecError::AuthFailed)?;
    Ok(Zeroizing::new(block))
}

/// Generate one decoy record under unknown keys.
///
/// Real addresses are BLAKE2b output and real records are AEAD ciphertext;
/// both are uniform to an observer without the keys, so uniform random bytes
/// of the same sizes are indistinguishable from the real thing.
pub fn gen_decoy() -> (Address, Vec<u8>) {
    let address = random_bytes::<ADDRESS_LEN>();
    let mut record = vec![0u8; RECORD_LEN];
    OsRng.fill_bytes(&mut record);
    (address, record)
}

//! Key derivation and record addressing.
//!
//! Two derivations fix the on-disk format:
//!
//! - scrypt over `password ‖ identifier` with an *empty* salt yields 64 bytes,
//!   split into the 32-byte master key and the 32-byte root identifier. The
//!   identifier already acts as a per-entry salt; omitting a global salt is
//!   what lets the same credentials recover a bare database copy on any
//!   machine.
//! - Each stored record's address is BLAKE2b-256 over the 52-byte preimage
//!   `root ‖ uvarint10(file_index) ‖ svarint10(chunk_index)`. The varints are
//!   LEB128 (zig-zag for the signed form) zero-padded on the right to a fixed
//!   10-byte field. Changing either encoding breaks address compatibility.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use thiserror::Error;

use crate::secrets::{SecretBuffer, SecretsError};

/// Size (bytes) of the master key and of the root identifier.
pub const KEY_LEN: usize = 32;
/// Size (bytes) of a record address (BLAKE2b-256 output).
pub const ADDRESS_LEN: usize = 32;

const DERIVED_LEN: usize = KEY_LEN * 2;
const VARINT_FIELD_LEN: usize = 10;
const PREIMAGE_LEN: usize = ADDRESS_LEN + 2 * VARINT_FIELD_LEN;

/// The 32-byte KV key of one stored record.
pub type Address = [u8; ADDRESS_LEN];

type Blake2b256 = Blake2b<U32>;

/// Scrypt work factor triple.
///
/// The default is intentionally heavy (seconds per derivation): derivation
/// happens once per operation, never per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScryptCost {
    /// log2 of the scrypt `N` parameter.
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for ScryptCost {
    fn default() -> Self {
        Self {
            log_n: 18,
            r: 16,
            p: 1,
        }
    }
}

impl ScryptCost {
    pub fn for_tests() -> Self {
        Self {
            log_n: 10,
            r: 8,
            p: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid scrypt cost parameters")]
    InvalidCost,

    #[error("scrypt derivation failed")]
    Derivation,

    #[error(transparent)]
    Secrets(#[from] SecretsError),
}

/// The symmetric key sealing every record of one entry.
pub struct MasterKey(SecretBuffer);

impl MasterKey {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// The 32-byte prefix of every record-address preimage for one entry.
pub struct RootIdentifier(SecretBuffer);

impl RootIdentifier {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

#[cfg(test)]
impl RootIdentifier {
    pub fn from_bytes(bytes: &[u8; KEY_LEN]) -> Self {
        Self(SecretBuffer::from_slice(bytes))
    }
}

#[cfg(test)]
impl MasterKey {
    pub fn from_bytes(bytes: &[u8; KEY_LEN]) -> Self {
        Self(SecretBuffer::from_slice(bytes))
    }
}

/// Derive the master key and root identifier for `(password, identifier)`.
pub fn derive_secure_values(
    master_password: &SecretBuffer,
    identifier: &SecretBuffer,
    cost: ScryptCost,
) -> Result<(MasterKey, RootIdentifier), CryptoError> {
    let params = scrypt::Params::new(cost.log_n, cost.r, cost.p, DERIVED_LEN)
        .map_err(|_| CryptoError::InvalidCost)?;

    let concatenated = SecretBuffer::concat(master_password, identifier);
    let mut derived = SecretBuffer::zeroed(DERIVED_LEN);
    scrypt::scrypt(
        concatenated.as_slice(),
        b"",
        &params,
        derived.as_mut_slice(),
    )
    .map_err(|_| CryptoError::Derivation)?;
    drop(concatenated);

    let (master_key, root_identifier) = derived.split_at(KEY_LEN)?;
    Ok((MasterKey(master_key), RootIdentifier(root_identifier)))
}

/// Derive the address of one record of one entry.
///
/// `chunk_index = 0, 1, 2, …` address payload chunks; `−1, −2, …` address the
/// metadata sidecar. Distinct `(root, file_index, chunk_index)` triples yield
/// distinct addresses with cryptographic probability, and without `root` the
/// output is indistinguishable from uniform random bytes.
pub fn derive_record_address(
    root: &RootIdentifier,
    file_index: u64,
    chunk_index: i64,
) -> Address {
    // The preimage contains the secret root, so it gets wiped like one.
    let mut preimage = SecretBuffer::zeroed(PREIMAGE_LEN);
    {
        let buf = preimage.as_mut_slice();
        buf[..ADDRESS_LEN].copy_from_slice(root.as_bytes());
        put_uvarint(
            &mut buf[ADDRESS_LEN..ADDRESS_LEN + VARINT_FIELD_LEN],
            file_index,
        );
        put_varint(&mut buf[ADDRESS_LEN + VARINT_FIELD_LEN..], chunk_index);
    }

    let mut hasher = Blake2b256::new();
    hasher.update(preimage.as_slice());
    hasher.finalize().into()
}

/// LEB128 unsigned encoding into a zero-padded fixed field.
fn put_uvarint(buf: &mut [u8], mut value: u64) {
    let mut i = 0;
    while value >= 0x80 {
        buf[i] = value as u8 | 0x80;
        value >>= 7;
        i += 1;
    }
    buf[i] = value as u8;
}

/// Zig-zag signed encoding; negative indices must not collide with positive.
fn put_varint(buf: &mut [u8], value: i64) {
    let mut unsigned = (value as u64) << 1;
    if value < 0 {
        unsigned = !unsigned;
    }
    put_uvarint(buf, unsigned);
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use std::collections::HashSet;

    fn decode32(encoded: &str) -> [u8; 32] {
        let bytes = STANDARD.decode(encoded).expect("valid base64");
        bytes.as_slice().try_into().expect("32 bytes")
    }

    #[test]
    fn derive_secure_values_known_answer() {
        let password = SecretBuffer::from_slice(b"yellow submarine");
        let identifier = SecretBuffer::from_slice(b"yellow submarine");

        let (master_key, root_identifier) =
            derive_secure_values(&password, &identifier, ScryptCost::default()).unwrap();

        assert_eq!(
            master_key.as_bytes(),
            decode32("IQ0m0/Z7Oy/rvm67Pi0nj2Zk8N0u0Ba+t/uyhPVxTF8=")
        );
        assert_eq!(
            root_identifier.as_bytes(),
            decode32("FIRp7dJQ2RvA7jsQX1DFWxxit6t9ERMyCSloA8iRmU4=")
        );
    }

    #[test]
    fn derive_secure_values_is_deterministic() {
        let password = SecretBuffer::from_slice(b"correct horse battery staple");
        let identifier = SecretBuffer::from_slice(b"tax documents");
        let cost = ScryptCost::for_tests();

        let (key_a, root_a) = derive_secure_values(&password, &identifier, cost).unwrap();
        let (key_b, root_b) = derive_secure_values(&password, &identifier, cost).unwrap();

        assert_eq!(key_a.as_bytes(), key_b.as_bytes());
        assert_eq!(root_a.as_bytes(), root_b.as_bytes());
    }

    #[test]
    fn derive_record_address_known_answers() {
        let root = RootIdentifier::from_bytes(&decode32(
            "FIRp7dJQ2RvA7jsQX1DFWxxit6t9ERMyCSloA8iRmU4=",
        ));

        let expected = [
            "1ThoAwd+zdKmU8I/Gu3GBz8Q/dWBWR1gVbD02/u+/xs=",
            "3DwIOsXt6lVJnOPbWfLoYwavGpzEEYP2NQUDfso4IVc=",
            "LtxOgR+bjyMyPgHg9H4GCTcB0A3stmYd/abYRGEFxvM=",
            "4bki0lPfi96iRL4gsE3FX3gsOsj0RBbJI/Jv9oK3kjg=",
            "BV+woYOCEceHRjMMJhPwzeBqA5xVd6puSJr/VMHixvg=",
            "+AjyNTn4og8YR5GEn8V4MFmUsL15Mv5rrOVe3wrHvFY=",
            "9f2zXHp+rYGVVwhkWvtyti6D7tLbCBfwoTn9yfK/i58=",
            "/6kG4wK84IXKRxIgX7rvfMXYexevliK1AcJrHg8P8O4=",
            "Q2bgn06fopp40oiUKx5Bs9w90K8BwWL9EsdMXBEiS7Q=",
        ];

        let mut index = 0;
        for file_index in 0..3u64 {
            for chunk_index in [0i64, -1, -2] {
                let derived = derive_record_address(&root, file_index, chunk_index);
                assert_eq!(
                    derived,
                    decode32(expected[index]),
                    "file {file_index}, chunk {chunk_index}"
                );
                index += 1;
            }
        }
    }

    #[test]
    fn derive_record_address_is_collision_free_on_sample() {
        let root = RootIdentifier::from_bytes(&[0x42; 32]);
        let mut seen = HashSet::new();

        for file_index in 0..8u64 {
            for chunk_index in -8i64..8 {
                let address = derive_record_address(&root, file_index, chunk_index);
                assert!(seen.insert(address), "collision at ({file_index}, {chunk_index})");
            }
        }
    }

    #[test]
    fn signed_and_unsigned_encodings_differ() {
        let mut signed = [0u8; 10];
        let mut unsigned = [0u8; 10];

        put_varint(&mut signed, 1);
        put_uvarint(&mut unsigned, 1);
        assert_ne!(signed, unsigned);

        // Go's zig-zag byte patterns.
        let mut buf = [0u8; 10];
        put_varint(&mut buf, -1);
        assert_eq!(buf[0], 0x01);
        put_varint(&mut buf, 1);
        assert_eq!(buf[0], 0x02);
        put_varint(&mut buf, -2);
        assert_eq!(buf[0], 0x03);
    }
}

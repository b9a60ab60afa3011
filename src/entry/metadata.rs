//! The metadata sidecar of an entry.
//!
//! Metadata is a small JSON object persisted as ordinary records at the
//! descending chunk indices `−1, −2, …` of its entry, so on disk it is
//! indistinguishable from payload. The one required field is `length`, the
//! exact pre-padding byte count of the payload. Unknown fields are carried
//! through a parse/serialize cycle untouched.

use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::crypto::codec;
use crate::crypto::derive::{MasterKey, RootIdentifier, derive_record_address};
use crate::store::Store;

use super::EntryError;

const LENGTH_FIELD: &str = "length";

#[derive(Debug, Default)]
pub struct Metadata {
    fields: Map<String, Value>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(Self {
            fields: serde_json::from_slice(bytes)?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.fields)
    }

    pub fn length(&self) -> Option<i64> {
        self.fields.get(LENGTH_FIELD).and_then(Value::as_i64)
    }

    pub fn set_length(&mut self, length: i64) {
        self.fields.insert(LENGTH_FIELD.to_string(), Value::from(length));
    }
}

/// Read and parse the metadata sidecar.
///
/// An entry with no metadata records at all parses as an empty object; the
/// caller decides whether a missing `length` is fatal.
pub fn read_metadata<S: Store>(
    store: &S,
    file_index: u64,
    master_key: &MasterKey,
    root: &RootIdentifier,
) -> Result<Metadata, EntryError> {
    let mut data = Zeroizing::new(Vec::new());

    let mut chunk_index = -1i64;
    loop {
        let address = derive_record_address(root, file_index, chunk_index);
        let Some(record) = store.get(&address)? else {
            break;
        };
        let block = codec::decrypt(&record, master_key)?;
        let chunk = codec::unpad(&block)?;
        data.extend_from_slice(&chunk);
        chunk_index -= 1;
    }

    if data.is_empty() {
        return Ok(Metadata::new());
    }
    Ok(Metadata::from_bytes(&data)?)
}

/// Serialize and persist the metadata sidecar at indices `−1, −2, …`.
pub fn write_metadata<S: Store>(
    store: &mut S,
    metadata: &Metadata,
    file_index: u64,
    master_key: &MasterKey,
    root: &RootIdentifier,
) -> Result<(), EntryError> {
    let data = Zeroizing::new(metadata.to_bytes()?);

    for (i, chunk) in data.chunks(codec::CHUNK_LEN).enumerate() {
        let block = codec::pad(chunk)?;
        let record = codec::encrypt(&block, master_key)?;
        let address = derive_record_address(root, file_index, -1 - i as i64);
        store.put(&address, &record)?;
    }
    Ok(())
}

/// Delete metadata records until the first missing index.
pub fn remove_metadata<S: Store>(
    store: &mut S,
    file_index: u64,
    root: &RootIdentifier,
) -> Result<u64, EntryError> {
    let mut removed = 0u64;
    let mut chunk_index = -1i64;
    loop {
        let address = derive_record_address(root, file_index, chunk_index);
        if !store.exists(&address)? {
            break;
        }
        store.delete(&address)?;
        removed += 1;
        chunk_index -= 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_round_trips() {
        let mut metadata = Metadata::new();
        assert_eq!(metadata.length(), None);

        metadata.set_length(4095);
        assert_eq!(metadata.length(), Some(4095));

        let parsed = Metadata::from_bytes(&metadata.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.length(), Some(4095));
    }

    #[test]
    fn unknown_fields_survive_rewrite() {
        let mut metadata =
            Metadata::from_bytes(br#"{"length": 5, "label": "holiday photos"}"#).unwrap();
        metadata.set_length(9);

        let rewritten = metadata.to_bytes().unwrap();
        let parsed = Metadata::from_bytes(&rewritten).unwrap();
        assert_eq!(parsed.length(), Some(9));
        assert_eq!(
            parsed.fields.get("label").and_then(Value::as_str),
            Some("holiday photos")
        );
    }

    #[test]
    fn non_object_metadata_is_rejected() {
        assert!(Metadata::from_bytes(b"[1, 2, 3]").is_err());
        assert!(Metadata::from_bytes(b"not json").is_err());
    }
}

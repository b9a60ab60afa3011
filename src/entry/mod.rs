//! One logical entry: payload chunks plus the metadata sidecar.
//!
//! An entry's payload lives at the ascending chunk indices `0, 1, 2, …` of
//! its `(root, file_index)` pair and its metadata at the descending indices
//! `−1, −2, …`. Both runs are strictly contiguous; the first missing address
//! is the end-of-stream signal. A crash between puts leaves a short tail,
//! detected at read time by comparing bytes read against the recorded length.

use std::io::{self, ErrorKind, Read, Write};

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::codec::{self, CodecError};
use crate::crypto::derive::{MasterKey, RootIdentifier, derive_record_address};
use crate::store::{Store, StoreError};

mod metadata;

pub use metadata::Metadata;

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("an entry already exists at this identifier")]
    AlreadyExists,

    #[error("no length field in entry metadata; was importing interrupted?")]
    IncompleteMetadata,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed entry metadata: {0}")]
    MalformedMetadata(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// What a completed read found, for the caller's truncation check.
#[derive(Debug)]
pub struct ReadOutcome {
    pub expected_len: i64,
    pub written: u64,
}

impl ReadOutcome {
    /// False when the stored chunks no longer add up to the recorded length
    /// (interrupted import, or a hostile operator deleting tail records).
    pub fn is_complete(&self) -> bool {
        self.expected_len >= 0 && self.written == self.expected_len as u64
    }
}

/// Whether any trace of entry `file_index` is present.
///
/// Probes the first payload chunk and the first metadata chunk: a zero-byte
/// entry has no chunk 0, only its sidecar, and must still count as existing
/// so it can be exported and removed, and so a rewrite is refused.
pub fn entry_exists<S: Store>(
    store: &S,
    file_index: u64,
    root: &RootIdentifier,
) -> Result<bool, StoreError> {
    Ok(store.exists(&derive_record_address(root, file_index, 0))?
        || store.exists(&derive_record_address(root, file_index, -1))?)
}

/// Encrypt `source` into the store as entry `file_index`.
///
/// Refuses to overwrite: the caller removes first if that is what it wants.
/// Returns the total payload byte count, which is also recorded in the
/// metadata sidecar.
pub fn write_entry<S: Store, R: Read>(
    store: &mut S,
    source: &mut R,
    source_len: Option<u64>,
    file_index: u64,
    master_key: &MasterKey,
    root: &RootIdentifier,
) -> Result<u64, EntryError> {
    if entry_exists(store, file_index, root)? {
        return Err(EntryError::AlreadyExists);
    }

    let bar = bytes_bar("+ Importing", source_len);
    let mut buffer = Zeroizing::new([0u8; codec::CHUNK_LEN]);
    let mut total = 0u64;
    let mut chunk_index = 0i64;

    loop {
        let n = read_chunk(source, &mut buffer[..])?;
        if n == 0 {
            break;
        }
        let block = codec::pad(&buffer[..n])?;
        let record = codec::encrypt(&block, master_key)?;
        store.put(&derive_record_address(root, file_index, chunk_index), &record)?;

        total += n as u64;
        chunk_index += 1;
        bar.inc(n as u64);
    }
    bar.finish_and_clear();

    let mut meta = Metadata::new();
    meta.set_length(total as i64);
    metadata::write_metadata(store, &meta, file_index, master_key, root)?;
    Ok(total)
}

/// Decrypt entry `file_index` into `sink`.
///
/// Reads the metadata sidecar first; a sidecar without a `length` field means
/// the import never finished. A length mismatch is reported in the outcome
/// rather than as an error so the caller can keep whatever was recovered.
pub fn read_entry<S: Store, W: Write>(
    store: &S,
    sink: &mut W,
    file_index: u64,
    master_key: &MasterKey,
    root: &RootIdentifier,
    progress: bool,
) -> Result<ReadOutcome, EntryError> {
    let meta = metadata::read_metadata(store, file_index, master_key, root)?;
    let expected_len = meta.length().ok_or(EntryError::IncompleteMetadata)?;

    let bar = if progress {
        bytes_bar("+ Exporting", Some(expected_len.max(0) as u64))
    } else {
        ProgressBar::hidden()
    };

    let mut written = 0u64;
    let mut chunk_index = 0i64;
    loop {
        let address = derive_record_address(root, file_index, chunk_index);
        let Some(record) = store.get(&address)? else {
            break;
        };
        let block = codec::decrypt(&record, master_key)?;
        let chunk = codec::unpad(&block)?;
        sink.write_all(&chunk)?;

        written += chunk.len() as u64;
        chunk_index += 1;
        bar.inc(chunk.len() as u64);
    }
    bar.finish_and_clear();

    Ok(ReadOutcome {
        expected_len,
        written,
    })
}

/// Delete every record of entry `file_index`, metadata first.
///
/// The metadata length is read only to size the progress bar; a damaged
/// sidecar must not block removal. Returns the number of records deleted.
pub fn remove_entry<S: Store>(
    store: &mut S,
    file_index: u64,
    master_key: &MasterKey,
    root: &RootIdentifier,
) -> Result<u64, EntryError> {
    let record_estimate = metadata::read_metadata(store, file_index, master_key, root)
        .ok()
        .and_then(|meta| meta.length())
        .map(|length| (length.max(0) as u64).div_ceil(codec::BLOCK_LEN as u64));

    let bar = match record_estimate {
        Some(records) => {
            let bar = ProgressBar::new(records);
            bar.set_prefix("+ Removing");
            bar.set_style(count_bar_style());
            bar
        }
        None => ProgressBar::hidden(),
    };

    let mut removed = metadata::remove_metadata(store, file_index, root)?;

    let mut chunk_index = 0i64;
    loop {
        let address = derive_record_address(root, file_index, chunk_index);
        if !store.exists(&address)? {
            break;
        }
        store.delete(&address)?;
        removed += 1;
        chunk_index += 1;
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(removed)
}

/// Fill `buffer` from `source`, tolerating short reads; 0 means end of stream.
fn read_chunk<R: Read>(source: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match source.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn bytes_bar(prefix: &'static str, total: Option<u64>) -> ProgressBar {
    let bar = match total {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    bar.set_prefix(prefix);
    bar.set_style(
        ProgressStyle::with_template(
            "{prefix} {bytes}/{total_bytes} [{wide_bar}] {bytes_per_sec}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

fn count_bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [{wide_bar}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::codec::{CHUNK_LEN, RECORD_LEN, gen_decoy};
    use crate::crypto::derive::{ScryptCost, derive_secure_values};
    use crate::secrets::SecretBuffer;
    use crate::store::MemoryStore;

    fn keys(identifier: &str) -> (MasterKey, RootIdentifier) {
        let password = SecretBuffer::from_slice(b"correct horse battery staple");
        let identifier = SecretBuffer::from_slice(identifier.as_bytes());
        derive_secure_values(&password, &identifier, ScryptCost::for_tests()).unwrap()
    }

    fn import(store: &mut MemoryStore, payload: &[u8], identifier: &str) -> (MasterKey, RootIdentifier) {
        let (master_key, root) = keys(identifier);
        let mut source = payload;
        write_entry(store, &mut source, Some(payload.len() as u64), 0, &master_key, &root)
            .unwrap();
        (master_key, root)
    }

    #[test]
    fn entry_round_trips_various_sizes() {
        for (index, len) in [0usize, 1, CHUNK_LEN, CHUNK_LEN + 1, 10_000].iter().enumerate() {
            let payload: Vec<u8> = (0..*len).map(|i| (i % 251) as u8).collect();
            let mut store = MemoryStore::new();
            let identifier = format!("entry-{index}");
            let (master_key, root) = import(&mut store, &payload, &identifier);

            let mut sink = Vec::new();
            let outcome = read_entry(&store, &mut sink, 0, &master_key, &root, false).unwrap();

            assert_eq!(sink, payload, "length {len}");
            assert_eq!(outcome.expected_len, *len as i64);
            assert!(outcome.is_complete());
        }
    }

    #[test]
    fn chunk_counts_match_the_block_scheme() {
        // 4095 bytes fit one chunk; 4096 spill into a second.
        for (len, payload_records) in [(CHUNK_LEN, 1usize), (CHUNK_LEN + 1, 2), (0, 0)] {
            let mut store = MemoryStore::new();
            let payload = vec![0x41u8; len];
            import(&mut store, &payload, "chunk-count");

            // One metadata record for a small sidecar.
            assert_eq!(store.len(), payload_records + 1, "length {len}");
        }
    }

    #[test]
    fn every_record_has_the_same_length() {
        let mut store = MemoryStore::new();
        let payload = vec![0x41u8; 3 * CHUNK_LEN + 17];
        import(&mut store, &payload, "uniform");

        for (_, record) in store.records() {
            assert_eq!(record.len(), RECORD_LEN);
        }
    }

    #[test]
    fn write_refuses_to_overwrite() {
        let mut store = MemoryStore::new();
        let (master_key, root) = import(&mut store, b"original data", "occupied");

        let mut second: &[u8] = b"replacement";
        let err = write_entry(&mut store, &mut second, None, 0, &master_key, &root).unwrap_err();
        assert!(matches!(err, EntryError::AlreadyExists));

        // The original entry is unchanged.
        let mut sink = Vec::new();
        read_entry(&store, &mut sink, 0, &master_key, &root, false).unwrap();
        assert_eq!(sink, b"original data");
    }

    #[test]
    fn a_zero_byte_entry_still_exists_and_refuses_overwrite() {
        let mut store = MemoryStore::new();
        let (master_key, root) = import(&mut store, b"", "empty note");

        // Only the metadata sidecar is on disk, but the entry is real.
        assert!(entry_exists(&store, 0, &root).unwrap());

        let mut second: &[u8] = b"late arrival";
        let err = write_entry(&mut store, &mut second, None, 0, &master_key, &root).unwrap_err();
        assert!(matches!(err, EntryError::AlreadyExists));
    }

    #[test]
    fn remove_clears_every_record_and_unblocks_rewrite() {
        let mut store = MemoryStore::new();
        let payload = vec![0x41u8; 2 * CHUNK_LEN];
        let (master_key, root) = import(&mut store, &payload, "removable");

        let removed = remove_entry(&mut store, 0, &master_key, &root).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.len(), 0);
        assert!(!store.exists(&derive_record_address(&root, 0, 0)).unwrap());
        assert!(!store.exists(&derive_record_address(&root, 0, -1)).unwrap());

        let mut source: &[u8] = b"fresh start";
        write_entry(&mut store, &mut source, None, 0, &master_key, &root).unwrap();
    }

    #[test]
    fn corrupted_chunk_fails_authentication() {
        let mut store = MemoryStore::new();
        let (master_key, root) = import(&mut store, b"sensitive payload", "tampered");

        let address = derive_record_address(&root, 0, 0);
        let mut record = store.get(&address).unwrap().unwrap();
        record[40] ^= 0x01;
        store.put(&address, &record).unwrap();

        let mut sink = Vec::new();
        let err = read_entry(&store, &mut sink, 0, &master_key, &root, false).unwrap_err();
        assert!(matches!(err, EntryError::Codec(CodecError::AuthFailed)));
    }

    #[test]
    fn missing_metadata_reports_incomplete() {
        let mut store = MemoryStore::new();
        let (master_key, root) = import(&mut store, b"payload", "no-meta");

        store.delete(&derive_record_address(&root, 0, -1)).unwrap();

        let mut sink = Vec::new();
        let err = read_entry(&store, &mut sink, 0, &master_key, &root, false).unwrap_err();
        assert!(matches!(err, EntryError::IncompleteMetadata));
    }

    #[test]
    fn truncated_entry_is_reported_but_recoverable() {
        let mut store = MemoryStore::new();
        let payload = vec![0x41u8; 2 * CHUNK_LEN];
        let (master_key, root) = import(&mut store, &payload, "truncated");

        // A hostile operator deletes the tail chunk.
        store.delete(&derive_record_address(&root, 0, 1)).unwrap();

        let mut sink = Vec::new();
        let outcome = read_entry(&store, &mut sink, 0, &master_key, &root, false).unwrap();
        assert_eq!(sink.len(), CHUNK_LEN);
        assert!(!outcome.is_complete());
    }

    #[test]
    fn decoys_do_not_disturb_a_real_entry() {
        let mut store = MemoryStore::new();
        for _ in 0..100 {
            let (address, record) = gen_decoy();
            store.put(&address, &record).unwrap();
        }

        let payload = vec![0x5au8; CHUNK_LEN + 100];
        let (master_key, root) = import(&mut store, &payload, "among-decoys");
        assert_eq!(store.len(), 100 + 3);

        let mut sink = Vec::new();
        let outcome = read_entry(&store, &mut sink, 0, &master_key, &root, false).unwrap();
        assert_eq!(sink, payload);
        assert!(outcome.is_complete());
    }
}

//! The record store: an opaque byte-keyed map.
//!
//! The engine above this layer never iterates the store; it only probes
//! derived addresses, so nothing more than `exists/get/put/delete` is
//! required. Iteration would also learn nothing: decoys and foreign records
//! cannot be told apart from real ones.

use thiserror::Error;

use crate::crypto::derive::Address;

pub mod dir;

pub use dir::DirStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("another process holds the store lock")]
    LockHeld,

    #[error("unsupported platform for store locking")]
    UnsupportedPlatform,
}

/// Contract the engine assumes of the backend.
///
/// `put` overwrites and is durable on return. Crash recovery between `put`s
/// is handled above this layer (length verification at read time,
/// refuse-to-overwrite at write time); multi-put atomicity is not required.
pub trait Store {
    fn exists(&self, address: &Address) -> Result<bool, StoreError>;
    fn get(&self, address: &Address) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&mut self, address: &Address, record: &[u8]) -> Result<(), StoreError>;
    fn delete(&mut self, address: &Address) -> Result<(), StoreError>;
    fn close(&mut self) -> Result<(), StoreError>;
}

/// In-memory backend for unit tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    records: std::collections::HashMap<Address, Vec<u8>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> impl Iterator<Item = (&Address, &Vec<u8>)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
impl Store for MemoryStore {
    fn exists(&self, address: &Address) -> Result<bool, StoreError> {
        Ok(self.records.contains_key(address))
    }

    fn get(&self, address: &Address) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records.get(address).cloned())
    }

    fn put(&mut self, address: &Address, record: &[u8]) -> Result<(), StoreError> {
        self.records.insert(*address, record.to_vec());
        Ok(())
    }

    fn delete(&mut self, address: &Address) -> Result<(), StoreError> {
        self.records.remove(address);
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

//! File-per-record store backend.
//!
//! The goals of this module are:
//! - One file per record in the working directory (`0700`), named by the
//!   lowercase hex of its 32-byte address; record files are `0600`.
//! - Crash-safe `put` via the write-temp, fsync, atomic-rename pattern.
//! - Single-writer discipline via an exclusive advisory lock held for the
//!   store's lifetime.
//!
//! This module is format-agnostic: it reads and writes raw record bytes.
//! Addressing, encryption, and record-shape invariants live above it.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use crate::crypto::derive::{ADDRESS_LEN, Address};

use super::{Store, StoreError};

const LOCK_FILE_NAME: &str = ".lock";
const HEX: &[u8; 16] = b"0123456789abcdef";

pub struct DirStore {
    dir: PathBuf,
    #[allow(dead_code)]
    lock: File,
}

impl DirStore {
    /// Open (creating if missing) the store at `dir` and take its lock.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        set_permissions(dir, 0o700)?;

        let lock = open_lock_file(&dir.join(LOCK_FILE_NAME))?;
        lock_exclusive(&lock)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            lock,
        })
    }

    fn record_path(&self, address: &Address) -> PathBuf {
        let mut name = String::with_capacity(ADDRESS_LEN * 2);
        for byte in address {
            name.push(HEX[(byte >> 4) as usize] as char);
            name.push(HEX[(byte & 0x0f) as usize] as char);
        }
        self.dir.join(name)
    }
}

impl Store for DirStore {
    fn exists(&self, address: &Address) -> Result<bool, StoreError> {
        Ok(self.record_path(address).try_exists()?)
    }

    fn get(&self, address: &Address) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.record_path(address)) {
            Ok(record) => Ok(Some(record)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    fn put(&mut self, address: &Address, record: &[u8]) -> Result<(), StoreError> {
        let path = self.record_path(address);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;

        tmp.as_file_mut().write_all(record)?;
        tmp.as_file_mut().sync_all()?;

        #[cfg(unix)]
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))?;

        tmp.persist(&path).map_err(std::io::Error::from)?;
        fsync_dir(&self.dir)?;
        Ok(())
    }

    fn delete(&mut self, address: &Address) -> Result<(), StoreError> {
        match fs::remove_file(self.record_path(address)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    fn close(&mut self) -> Result<(), StoreError> {
        // Every put is already durable; the lock is released on drop.
        Ok(())
    }
}

fn open_lock_file(path: &Path) -> Result<File, StoreError> {
    #[cfg(unix)]
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .mode(0o600)
        .open(path)?;

    #[cfg(not(unix))]
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;

    Ok(file)
}

fn lock_exclusive(file: &File) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            return Ok(());
        }
        return Err(StoreError::LockHeld);
    }

    #[cfg(not(unix))]
    {
        let _ = file;
        Err(StoreError::UnsupportedPlatform)
    }
}

fn set_permissions(path: &Path, mode: u32) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

fn fsync_dir(dir: &Path) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        let file = File::open(dir)?;
        file.sync_all()?;
    }
    Ok(())
}

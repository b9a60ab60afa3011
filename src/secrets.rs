//! Locked, zero-on-release buffers for secret material.
//!
//! Every secret this program holds (the master password, derived keys, the
//! concatenated KDF input) lives in a [`SecretBuffer`]:
//!
//! - The backing pages are locked against swap (`mlock`) where the host
//!   permits; failure to lock is reported once and is not fatal.
//! - The contents are overwritten before the memory is returned, on every
//!   exit path, via `Drop`.
//! - A process-global registry tracks all live buffers so the interrupt trap
//!   can wipe them before the process exits mid-operation.
//!
//! Reading a buffer after `destroy` is a caller bug and aborts the process:
//! continuing with a wiped secret would silently corrupt derived values.

use std::collections::BTreeMap;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, Once};

use thiserror::Error;
use zeroize::Zeroize;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("split point {mid} out of range for buffer of {len} bytes")]
    SplitOutOfRange { mid: usize, len: usize },
}

/// A live secret memory region, tracked for the interrupt trap.
///
/// The raw pointer is only dereferenced by the owning `SecretBuffer`, or by
/// [`purge_all_and_exit`] while the registry lock is held.
struct Region {
    ptr: *mut u8,
    len: usize,
}

unsafe impl Send for Region {}

static LIVE: Mutex<BTreeMap<u64, Region>> = Mutex::new(BTreeMap::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static MLOCK_WARNING: Once = Once::new();

pub struct SecretBuffer {
    buf: Box<[u8]>,
    id: u64,
    locked: bool,
    destroyed: bool,
}

impl std::fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBuffer")
            .field("len", &self.buf.len())
            .field("locked", &self.locked)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl SecretBuffer {
    /// Allocate a zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        let mut buf = vec![0u8; len].into_boxed_slice();
        let ptr = buf.as_mut_ptr();
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        let locked = lock_region(ptr, len);
        registry().insert(id, Region { ptr, len });

        Self {
            buf,
            id,
            locked,
            destroyed: false,
        }
    }

    /// Allocate a buffer holding a copy of `bytes`.
    ///
    /// Wiping the source is the caller's responsibility.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut buffer = Self::zeroed(bytes.len());
        buffer.as_mut_slice().copy_from_slice(bytes);
        buffer
    }

    /// Allocate a buffer holding `a ‖ b`.
    pub fn concat(a: &SecretBuffer, b: &SecretBuffer) -> Self {
        let mut buffer = Self::zeroed(a.len() + b.len());
        {
            let out = buffer.as_mut_slice();
            out[..a.len()].copy_from_slice(a.as_slice());
            out[a.len()..].copy_from_slice(b.as_slice());
        }
        buffer
    }

    /// Split into two fresh buffers at `mid`, destroying `self`.
    pub fn split_at(self, mid: usize) -> Result<(SecretBuffer, SecretBuffer), SecretsError> {
        if mid > self.len() {
            return Err(SecretsError::SplitOutOfRange {
                mid,
                len: self.len(),
            });
        }
        let head = SecretBuffer::from_slice(&self.as_slice()[..mid]);
        let tail = SecretBuffer::from_slice(&self.as_slice()[mid..]);
        Ok((head, tail))
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.check_live();
        &self.buf
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.check_live();
        &mut self.buf
    }

    /// Wipe, unlock, and deregister the buffer. Idempotent; also runs on Drop.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        let mut live = registry();
        live.remove(&self.id);
        self.buf.zeroize();
        if self.locked {
            unlock_region(self.buf.as_mut_ptr(), self.buf.len());
        }
        self.destroyed = true;
    }

    fn check_live(&self) {
        if self.destroyed {
            eprintln!("fatal: secret buffer used after destruction");
            process::abort();
        }
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Install the process-wide interrupt trap.
///
/// On SIGINT/SIGTERM every registered buffer is wiped before the process
/// exits, so an interrupted scrypt run or import cannot leave key material
/// in reusable memory.
pub fn install_interrupt_trap() {
    if ctrlc::set_handler(|| purge_all_and_exit(1)).is_err() {
        eprintln!("! Unable to install interrupt handler; secrets may persist if interrupted");
    }
}

/// Wipe every live secret region, then exit with `code`.
///
/// The registry lock is held until the process exits, so no buffer can be
/// concurrently dropped or read while it is being wiped.
fn purge_all_and_exit(code: i32) -> ! {
    let live = registry();
    for region in live.values() {
        if region.len > 0 {
            unsafe {
                std::ptr::write_bytes(region.ptr, 0, region.len);
            }
        }
    }
    process::exit(code)
}

fn registry() -> std::sync::MutexGuard<'static, BTreeMap<u64, Region>> {
    LIVE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(unix)]
fn lock_region(ptr: *mut u8, len: usize) -> bool {
    if len == 0 {
        return false;
    }
    let rc = unsafe { libc::mlock(ptr as *const libc::c_void, len) };
    if rc != 0 {
        // mlock fails under tight RLIMIT_MEMLOCK or in unprivileged
        // containers. The buffer is still zeroed on release.
        MLOCK_WARNING.call_once(|| {
            eprintln!("! Unable to lock secret memory against swap (mlock failed)");
        });
        return false;
    }
    true
}

#[cfg(not(unix))]
fn lock_region(_ptr: *mut u8, _len: usize) -> bool {
    false
}

#[cfg(unix)]
fn unlock_region(ptr: *mut u8, len: usize) {
    if len == 0 {
        return;
    }
    unsafe {
        libc::munlock(ptr as *const libc::c_void, len);
    }
}

#[cfg(not(unix))]
fn unlock_region(_ptr: *mut u8, _len: usize) {}

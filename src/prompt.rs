//! Terminal prompts.
//!
//! Secret prompts (master password, secure identifiers) disable terminal echo
//! and land directly in a [`SecretBuffer`]; the intermediate line buffer is
//! wiped. Plain prompts drive the REPL and report end-of-input so the session
//! can end cleanly on a closed stdin.

use std::io::IsTerminal;
use std::io::{self, BufRead, Write};

use thiserror::Error;
use zeroize::Zeroize;

use crate::secrets::SecretBuffer;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("io error")]
    Io(#[from] io::Error),

    #[error("input cannot be empty")]
    Empty,
}

pub fn prompt_master_password() -> Result<SecretBuffer, PromptError> {
    prompt_secret("- Master password: ")
}

/// Prompt for a secret line with echo disabled.
pub fn prompt_secret(label: &str) -> Result<SecretBuffer, PromptError> {
    let mut line = read_secret_line(label)?;
    if line.is_empty() {
        return Err(PromptError::Empty);
    }
    let buffer = SecretBuffer::from_slice(line.as_bytes());
    line.zeroize();
    Ok(buffer)
}

/// Prompt for an ordinary line. `None` means stdin reached end-of-input.
pub fn prompt_line(label: &str) -> Result<Option<String>, PromptError> {
    eprint!("{label}");
    io::stderr().flush()?;

    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(trim_line_endings(&line)))
}

fn read_secret_line(prompt: &str) -> Result<String, PromptError> {
    eprint!("{prompt}");
    io::stderr().flush()?;

    if io::stdin().is_terminal() {
        #[cfg(unix)]
        {
            return read_line_no_echo_unix();
        }
    }

    read_line_plain()
}

fn read_line_plain() -> Result<String, PromptError> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let trimmed = trim_line_endings(&line);
    line.zeroize();
    Ok(trimmed)
}

#[cfg(unix)]
fn read_line_no_echo_unix() -> Result<String, PromptError> {
    use std::mem::MaybeUninit;
    use std::os::unix::io::AsRawFd;

    let stdin = io::stdin();
    let fd = stdin.as_raw_fd();

    unsafe {
        let mut original = MaybeUninit::<libc::termios>::uninit();
        if libc::tcgetattr(fd, original.as_mut_ptr()) != 0 {
            return read_line_plain();
        }
        let original = original.assume_init();

        let mut modified = original;
        modified.c_lflag &= !(libc::ECHO | libc::ECHONL);
        let _guard = TermiosGuard {
            fd,
            original,
            active: libc::tcsetattr(fd, libc::TCSANOW, &modified) == 0,
        };

        let line = read_line_plain()?;
        eprintln!();
        Ok(line)
    }
}

#[cfg(unix)]
struct TermiosGuard {
    fd: i32,
    original: libc::termios,
    active: bool,
}

#[cfg(unix)]
impl Drop for TermiosGuard {
    fn drop(&mut self) {
        if self.active {
            unsafe {
                let _ = libc::tcsetattr(self.fd, libc::TCSANOW, &self.original);
            }
        }
    }
}

fn trim_line_endings(s: &str) -> String {
    s.trim_end_matches(&['\n', '\r'][..]).to_string()
}

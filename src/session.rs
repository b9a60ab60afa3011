//! The interactive session.
//!
//! Owns the master password and the store handle for the process lifetime.
//! Each operation prompts for a secure identifier, derives the master key and
//! root identifier, and drops both when the operation ends. Operation
//! failures are printed and the session continues; only a broken stdin or an
//! unusable scrypt configuration ends the loop.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::crypto::codec::gen_decoy;
use crate::crypto::derive::{
    CryptoError, MasterKey, RootIdentifier, ScryptCost, derive_secure_values,
};
use crate::entry::{self, EntryError};
use crate::prompt::{self, PromptError};
use crate::secrets::SecretBuffer;
use crate::store::{Store, StoreError};

const HELP: &str = "import [path] - Import a new file to the database.
export [path] - Retrieve data from the database and export to a file.
peak          - Grab data from the database and print it to the screen.
remove        - Remove some previously stored data from the database.
decoys        - Add a variable amount of random decoy data.
exit          - Exit the program.";

const DECOY_HELP: &str = "
:: For deniable encryption, use this feature in conjunction with some fake data manually-added
   under a different master-password. Then if you are ever forced to hand over your keys,
   simply give up the fake data and claim that the rest of the entries in the database are decoys.

:: You do not necessarily have to make use of this feature. Rather, simply the fact that
   it exists allows you to claim that some or all of the entries in the database are decoys.
";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

pub struct Session<S: Store> {
    store: S,
    master_password: SecretBuffer,
    cost: ScryptCost,
}

impl<S: Store> Session<S> {
    pub fn new(store: S, master_password: SecretBuffer, cost: ScryptCost) -> Self {
        Self {
            store,
            master_password,
            cost,
        }
    }

    /// Run the command loop until `exit` or end-of-input.
    pub fn run(&mut self) -> Result<(), SessionError> {
        loop {
            let Some(line) = prompt::prompt_line("$ ")? else {
                return Ok(());
            };
            let mut parts = line.split_whitespace();

            match parts.next() {
                Some("import") => match parts.next() {
                    Some(path) => self.import(Path::new(path))?,
                    None => println!("! Missing argument: path"),
                },
                Some("export") => match parts.next() {
                    Some(path) => self.export(Path::new(path))?,
                    None => println!("! Missing argument: path"),
                },
                Some("peak") => self.peak()?,
                Some("remove") => self.remove()?,
                Some("decoys") => self.decoys()?,
                Some("exit") => return Ok(()),
                _ => println!("{HELP}"),
            }
        }
    }

    pub fn close(mut self) -> Result<(), StoreError> {
        self.store.close()
    }

    fn import(&mut self, path: &Path) -> Result<(), SessionError> {
        let info = match fs::metadata(path) {
            Ok(info) => info,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                println!("! {} does not exist", path.display());
                return Ok(());
            }
            Err(err) => {
                println!("! {err}");
                return Ok(());
            }
        };
        if info.is_dir() {
            println!("! Cannot import a directory; archive it first");
            return Ok(());
        }

        let mut source = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                println!("! Insufficient permissions to open {}", path.display());
                return Ok(());
            }
            Err(err) => {
                println!("! {err}");
                return Ok(());
            }
        };

        let Some((master_key, root)) = self.derive_for_operation()? else {
            return Ok(());
        };

        match entry::write_entry(
            &mut self.store,
            &mut source,
            Some(info.len()),
            0,
            &master_key,
            &root,
        ) {
            Ok(_) => {}
            Err(EntryError::AlreadyExists) => println!("! Cannot overwrite existing entry"),
            Err(err) => println!("! {err}"),
        }
        Ok(())
    }

    fn export(&mut self, path: &Path) -> Result<(), SessionError> {
        let Some((master_key, root)) = self.derive_for_operation()? else {
            return Ok(());
        };

        match self.entry_exists(&root) {
            Ok(true) => {}
            Ok(false) => {
                println!("! This entry does not exist");
                return Ok(());
            }
            Err(err) => {
                println!("! {err}");
                return Ok(());
            }
        }

        let mut sink = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                println!("! {} already exists; cannot overwrite", path.display());
                return Ok(());
            }
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                println!("! Insufficient permissions to open {}", path.display());
                return Ok(());
            }
            Err(err) => {
                println!("! {err}");
                return Ok(());
            }
        };

        match entry::read_entry(&self.store, &mut sink, 0, &master_key, &root, true) {
            Ok(outcome) => {
                println!("+ Saved to {}", path.display());
                if !outcome.is_complete() {
                    println!("! Data incomplete; database may be corrupt");
                }
            }
            Err(err) => println!("! {err}"),
        }
        Ok(())
    }

    fn peak(&mut self) -> Result<(), SessionError> {
        let Some((master_key, root)) = self.derive_for_operation()? else {
            return Ok(());
        };

        match self.entry_exists(&root) {
            Ok(true) => {}
            Ok(false) => {
                println!("! This entry does not exist");
                return Ok(());
            }
            Err(err) => {
                println!("! {err}");
                return Ok(());
            }
        }

        println!("\n-----BEGIN PLAINTEXT-----");
        let mut stdout = io::stdout();
        match entry::read_entry(&self.store, &mut stdout, 0, &master_key, &root, false) {
            Ok(outcome) => {
                let _ = stdout.flush();
                println!("-----END PLAINTEXT-----");
                if !outcome.is_complete() {
                    println!("! Data incomplete; database may be corrupt");
                }
            }
            Err(err) => println!("! {err}"),
        }
        Ok(())
    }

    fn remove(&mut self) -> Result<(), SessionError> {
        let Some((master_key, root)) = self.derive_for_operation()? else {
            return Ok(());
        };

        match self.entry_exists(&root) {
            Ok(true) => {}
            Ok(false) => {
                println!("! There is nothing here to remove");
                return Ok(());
            }
            Err(err) => {
                println!("! {err}");
                return Ok(());
            }
        }

        match entry::remove_entry(&mut self.store, 0, &master_key, &root) {
            Ok(_) => println!("+ Successfully removed data."),
            Err(err) => println!("! {err}"),
        }
        Ok(())
    }

    fn decoys(&mut self) -> Result<(), SessionError> {
        println!("{DECOY_HELP}");

        let count: u64 = loop {
            let Some(line) = prompt::prompt_line("How many decoys do you want to add? ")? else {
                return Ok(());
            };
            match line.trim().parse() {
                Ok(count) => break count,
                Err(_) => println!("! Input must be an integer"),
            }
        };

        let bar = ProgressBar::new(count);
        bar.set_prefix("+ Adding");
        bar.set_style(
            ProgressStyle::with_template("{prefix} [{wide_bar}] {pos}/{len} {per_sec}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        for _ in 0..count {
            let (address, record) = gen_decoy();
            if let Err(err) = self.store.put(&address, &record) {
                bar.finish_and_clear();
                println!("! {err}");
                return Ok(());
            }
            bar.inc(1);
        }
        bar.finish_and_clear();
        println!("+ Added {count} decoys.");
        Ok(())
    }

    /// Prompt for the identifier and derive this operation's key pair.
    ///
    /// `None` means the operation was abandoned at the prompt (empty input);
    /// the session keeps running.
    fn derive_for_operation(
        &mut self,
    ) -> Result<Option<(MasterKey, RootIdentifier)>, SessionError> {
        let identifier = match prompt::prompt_secret("- Secure identifier: ") {
            Ok(identifier) => identifier,
            Err(PromptError::Empty) => {
                println!("! Identifier cannot be empty");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        println!("+ Generating root key...");
        let values = derive_secure_values(&self.master_password, &identifier, self.cost)?;
        Ok(Some(values))
    }

    fn entry_exists(&self, root: &RootIdentifier) -> Result<bool, StoreError> {
        entry::entry_exists(&self.store, 0, root)
    }
}

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "dissident",
    author,
    version,
    about = "A deniable, password-protected secret store.",
    long_about = "A deniable, password-protected secret store. Entries are addressed by a \
secret identifier mixed into key derivation, every stored record has the same size and \
shape, and decoy records are indistinguishable from real ones."
)]
pub struct Cli {
    /// Use DIR as the record store instead of ~/dissident.
    #[arg(long, value_name = "DIR")]
    pub store: Option<PathBuf>,
}

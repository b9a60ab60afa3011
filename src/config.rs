//! Configuration: scrypt cost and store location.
//!
//! Read-only TOML at `$XDG_CONFIG_HOME/dissident/config.toml`:
//!
//! ```toml
//! store_dir = "/mnt/usb/dissident"
//!
//! [scrypt]
//! n = 18
//! r = 16
//! p = 1
//! ```
//!
//! Precedence for the store directory: `--store` flag, `DISSIDENT_STORE`,
//! config file, then `$HOME/dissident`. The cost triple comes from the config
//! file over the defaults; `DISSIDENT_TEST_KDF` switches to a cheap cost so
//! integration tests don't pay seconds of scrypt per operation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::crypto::derive::ScryptCost;

const CONFIG_ENV: &str = "DISSIDENT_CONFIG";
const STORE_ENV: &str = "DISSIDENT_STORE";
const TEST_KDF_ENV: &str = "DISSIDENT_TEST_KDF";
const APP_DIR: &str = "dissident";
const CONFIG_FILE_NAME: &str = "config.toml";
const STORE_DIR_NAME: &str = "dissident";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unable to determine home directory")]
    HomeUnavailable,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    store_dir: Option<PathBuf>,
    #[serde(default)]
    scrypt: Option<CostConfig>,
}

#[derive(Debug, Deserialize)]
struct CostConfig {
    n: Option<u8>,
    r: Option<u32>,
    p: Option<u32>,
}

#[derive(Debug)]
pub struct Config {
    pub store_dir: PathBuf,
    pub cost: ScryptCost,
}

pub fn load(store_override: Option<&Path>) -> Result<Config, ConfigError> {
    let file = load_file()?;

    let cost = if env::var_os(TEST_KDF_ENV).is_some() {
        ScryptCost::for_tests()
    } else {
        resolve_cost(file.scrypt.as_ref())
    };

    let store_dir = match store_override {
        Some(dir) => dir.to_path_buf(),
        None => match env::var_os(STORE_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => match file.store_dir {
                Some(dir) => dir,
                None => default_store_dir()?,
            },
        },
    };

    Ok(Config { store_dir, cost })
}

fn load_file() -> Result<FileConfig, ConfigError> {
    let Some(path) = config_path() else {
        return Ok(FileConfig::default());
    };
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
        Err(err) => Err(ConfigError::Io(err)),
    }
}

fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    let mut dir = dirs::config_dir()?;
    dir.push(APP_DIR);
    dir.push(CONFIG_FILE_NAME);
    Some(dir)
}

fn resolve_cost(file: Option<&CostConfig>) -> ScryptCost {
    let defaults = ScryptCost::default();
    let Some(cost) = file else {
        return defaults;
    };
    ScryptCost {
        log_n: cost.n.unwrap_or(defaults.log_n),
        r: cost.r.unwrap_or(defaults.r),
        p: cost.p.unwrap_or(defaults.p),
    }
}

fn default_store_dir() -> Result<PathBuf, ConfigError> {
    let mut dir = dirs::home_dir().ok_or(ConfigError::HomeUnavailable)?;
    dir.push(STORE_DIR_NAME);
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_merges_partial_file_values_over_defaults() {
        let partial = CostConfig {
            n: Some(14),
            r: None,
            p: None,
        };
        let cost = resolve_cost(Some(&partial));
        assert_eq!(cost.log_n, 14);
        assert_eq!(cost.r, ScryptCost::default().r);
        assert_eq!(cost.p, ScryptCost::default().p);
    }

    #[test]
    fn cost_defaults_without_a_file_section() {
        assert_eq!(resolve_cost(None), ScryptCost::default());
    }

    #[test]
    fn file_config_parses_the_documented_shape() {
        let parsed: FileConfig = toml::from_str(
            r#"
store_dir = "/mnt/usb/dissident"

[scrypt]
n = 16
r = 8
"#,
        )
        .unwrap();

        assert_eq!(
            parsed.store_dir.as_deref(),
            Some(Path::new("/mnt/usb/dissident"))
        );
        let cost = resolve_cost(parsed.scrypt.as_ref());
        assert_eq!((cost.log_n, cost.r, cost.p), (16, 8, 1));
    }
}

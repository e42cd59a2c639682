//! Runtime configuration.
//!
//! Settings come from three layers, later layers winning: an optional YAML
//! file, `INVENTORY_IMPORT_*` environment variables, then command-line flags
//! (applied by the CLI).

use std::{fs::File, io::BufReader, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    cli::parse_delimiter,
    error::{ImportError, Result},
};

pub const ENV_PREFIX: &str = "INVENTORY_IMPORT_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Input delimiter; `None` picks by file extension.
    pub delimiter: Option<String>,
    pub input_encoding: Option<String>,
    pub batch_size: usize,
    pub store_path: PathBuf,
    pub profile_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub cache_ttl_secs: i64,
    /// Replacement synonym dictionary (YAML list of field entries).
    pub dictionary: Option<PathBuf>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            delimiter: None,
            input_encoding: None,
            batch_size: default_batch_size(),
            store_path: PathBuf::from("inventory.json"),
            profile_dir: PathBuf::from("profiles"),
            upload_dir: PathBuf::from("uploads"),
            cache_ttl_secs: 300,
            dictionary: None,
        }
    }
}

fn default_batch_size() -> usize {
    25
}

impl ImportConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|err| ImportError::from_open(path, err))?;
        let config: ImportConfig = serde_yaml::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// File settings (or defaults) with environment overrides applied.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, which receives full variable names.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        if let Some(value) = var("DELIMITER") {
            self.delimiter = Some(value);
        }
        if let Some(value) = var("INPUT_ENCODING") {
            self.input_encoding = Some(value);
        }
        if let Some(value) = var("BATCH_SIZE") {
            self.batch_size = value.trim().parse().map_err(|_| ImportError::Config {
                message: format!("{ENV_PREFIX}BATCH_SIZE must be a positive integer, got '{value}'"),
            })?;
        }
        if let Some(value) = var("STORE") {
            self.store_path = PathBuf::from(value);
        }
        if let Some(value) = var("PROFILE_DIR") {
            self.profile_dir = PathBuf::from(value);
        }
        if let Some(value) = var("UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(value);
        }
        if let Some(value) = var("CACHE_TTL_SECS") {
            self.cache_ttl_secs = value.trim().parse().map_err(|_| ImportError::Config {
                message: format!("{ENV_PREFIX}CACHE_TTL_SECS must be an integer, got '{value}'"),
            })?;
        }
        if let Some(value) = var("DICTIONARY") {
            self.dictionary = Some(PathBuf::from(value));
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ImportError::Config {
                message: "batch_size must be greater than zero".to_string(),
            });
        }
        if self.cache_ttl_secs < 0 {
            return Err(ImportError::Config {
                message: "cache_ttl_secs cannot be negative".to_string(),
            });
        }
        self.delimiter_byte()?;
        Ok(())
    }

    pub fn delimiter_byte(&self) -> Result<Option<u8>> {
        self.delimiter
            .as_deref()
            .map(|value| parse_delimiter(value).map_err(|message| ImportError::Config { message }))
            .transpose()
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs)
    }
}

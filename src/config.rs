use std::path::PathBuf;

use chrono::FixedOffset;
use thiserror::Error;

use crate::time::{self, DEFAULT_UTC_OFFSET};

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
pub const WAL_FILE_NAME: &str = "petshop.wal";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Deployment settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Offset given to timestamps submitted without one.
    pub utc_offset: FixedOffset,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            utc_offset: time::default_offset(),
            metrics_port: None,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset or blank variables take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let invalid = |var: &'static str, value: String| ConfigError::Invalid { var, value };

        let data_dir = get("PETSHOP_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into());
        let offset_raw = get("PETSHOP_UTC_OFFSET").unwrap_or_else(|| DEFAULT_UTC_OFFSET.into());
        let utc_offset = time::parse_offset(offset_raw.trim())
            .ok_or_else(|| invalid("PETSHOP_UTC_OFFSET", offset_raw.clone()))?;
        let metrics_port = match get("PETSHOP_METRICS_PORT") {
            Some(v) => Some(v.trim().parse().map_err(|_| invalid("PETSHOP_METRICS_PORT", v))?),
            None => None,
        };
        let compact_threshold = match get("PETSHOP_COMPACT_THRESHOLD") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| invalid("PETSHOP_COMPACT_THRESHOLD", v))?,
            None => DEFAULT_COMPACT_THRESHOLD,
        };

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            utc_offset,
            metrics_port,
            compact_threshold,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }
}

//! Runtime configuration from the environment.
//!
//! `.env` is loaded by the binary (dotenvy) before this is read.
//!
//! | Variable            | Default            |
//! |---------------------|--------------------|
//! | `SIMS_PORT`         | `3000`             |
//! | `SIMS_TEMPLATE_DIR` | `.sims/templates`  |
//! | `SIMS_STORAGE_DIR`  | `.sims/objects`    |
//! | `SIMS_LOG_FORMAT`   | `pretty`           |

use std::path::PathBuf;

use crate::logging::LogFormat;
use crate::store::registry::DEFAULT_TEMPLATE_DIR;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_STORAGE_DIR: &str = ".sims/objects";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub template_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            log_format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank values use defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = match get("SIMS_PORT") {
            Some(v) => v.parse::<u16>().map_err(|e| format!("Invalid SIMS_PORT '{}': {}", v, e))?,
            None => defaults.port,
        };
        let log_format = match get("SIMS_LOG_FORMAT") {
            Some(v) => v.parse()?,
            None => defaults.log_format,
        };

        Ok(Self {
            port,
            template_dir: get("SIMS_TEMPLATE_DIR").map(PathBuf::from).unwrap_or(defaults.template_dir),
            storage_dir: get("SIMS_STORAGE_DIR").map(PathBuf::from).unwrap_or(defaults.storage_dir),
            log_format,
        })
    }
}

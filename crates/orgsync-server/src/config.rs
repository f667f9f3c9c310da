//! Server configuration.
//!
//! Read from the TOML file named by `ORGSYNC_CONFIG`, falling back to
//! `orgsync.toml` in the working directory. A missing file means defaults;
//! a file that does not parse is an error.

use std::path::{Path, PathBuf};

use orgsync_db::{DbConfig, DbError};
use orgsync_engine::EngineConfig;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "ORGSYNC_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "orgsync.toml";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration in {path}: {source}")]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Database(#[from] DbError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub engine: EngineConfig,
    /// JSON snapshot seeding the in-process directory.
    pub directory_snapshot: Option<PathBuf>,
    /// JSON snapshot seeding the in-process secret store.
    pub secret_snapshot: Option<PathBuf>,
}

impl ServerConfig {
    pub fn resolve_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ServerError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&text).map_err(|source| ServerError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Read a snapshot file into its typed form.
pub fn read_snapshot<T>(path: &Path, parse: impl FnOnce(&str) -> Result<T, serde_json::Error>) -> Result<T, ServerError> {
    let text = std::fs::read_to_string(path).map_err(|source| ServerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text).map_err(|source| ServerError::Snapshot {
        path: path.to_path_buf(),
        source,
    })
}

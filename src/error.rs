use std::path::PathBuf;

use thiserror::Error;

/// Reasons a session refuses to start. The host sends the user back to setup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no game config has been saved")]
    Missing,
    #[error("game config is malformed: {0}")]
    Malformed(String),
    #[error("game config has no groups")]
    NoGroups,
    #[error("timer must be positive, got {0}")]
    InvalidTimer(u32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("duplicate item id {0}")]
    DuplicateId(u32),
    #[error("item {0} has an empty name")]
    EmptyName(u32),
    #[error("catalog file could not be parsed: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize session store: {0}")]
    Serialize(#[from] serde_json::Error),
}

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{parse_config, sanitize_config};
use crate::engine::scoreboard::standings;
use crate::error::{ConfigError, StoreError};
use crate::types::{GameConfig, GroupScore, ResultsResponse};

const STORE_VERSION: u8 = 1;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct SessionStoreFile {
    version: u8,
    #[serde(rename = "gameConfig", default, skip_serializing_if = "Option::is_none")]
    game_config: Option<serde_json::Value>,
    #[serde(rename = "gameResults", default, skip_serializing_if = "Option::is_none")]
    game_results: Option<Vec<GroupScore>>,
}

/// JSON key/value document holding the setup config and the last session's results.
pub struct SessionStore {
    file_path: PathBuf,
    contents: SessionStoreFile,
}

impl SessionStore {
    pub fn new(file_path: PathBuf) -> Self {
        let contents = load_contents(&file_path);
        Self {
            file_path,
            contents,
        }
    }

    pub fn save_config(&mut self, config: GameConfig) -> Result<GameConfig, StoreError> {
        let config = sanitize_config(config);
        self.contents.game_config = Some(serde_json::to_value(&config)?);
        self.save()?;
        Ok(config)
    }

    /// A malformed entry is dropped so the next setup starts clean.
    pub fn load_config(&mut self) -> Result<GameConfig, ConfigError> {
        let Some(raw) = self.contents.game_config.clone() else {
            return Err(ConfigError::Missing);
        };
        let parsed = parse_config(raw);
        if let Err(error) = &parsed {
            warn!(path = %self.file_path.display(), %error, "discarding stored game config");
            self.contents.game_config = None;
            if let Err(error) = self.save() {
                warn!(%error, "failed to persist config removal");
            }
        }
        parsed
    }

    pub fn save_results(&mut self, results: &[GroupScore]) -> Result<(), StoreError> {
        self.contents.game_results = Some(results.to_vec());
        self.save()
    }

    pub fn results(&self) -> Option<&[GroupScore]> {
        self.contents.game_results.as_deref()
    }

    pub fn build_results_response(&self) -> Option<ResultsResponse> {
        let results = self.results()?;
        Some(build_results_response(results))
    }

    /// "Play again": forget both the config and the results.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.contents.game_config = None;
        self.contents.game_results = None;
        self.save()
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let payload = SessionStoreFile {
            version: STORE_VERSION,
            ..self.contents.clone()
        };
        let text = serde_json::to_string_pretty(&payload)?;
        fs::write(&self.file_path, text).map_err(|source| StoreError::Io {
            path: self.file_path.clone(),
            source,
        })
    }
}

pub fn build_results_response(results: &[GroupScore]) -> ResultsResponse {
    let standings = standings(results);
    let winners = standings
        .iter()
        .filter(|entry| entry.rank == 1)
        .map(|entry| entry.name.clone())
        .collect();
    ResultsResponse {
        generated_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        total_correct: results.iter().map(|row| row.correct).sum(),
        standings,
        winners,
    }
}

fn load_contents(path: &Path) -> SessionStoreFile {
    let empty = SessionStoreFile {
        version: STORE_VERSION,
        ..SessionStoreFile::default()
    };
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "failed to read session store");
            }
            return empty;
        }
    };
    match serde_json::from_str::<SessionStoreFile>(&text) {
        Ok(value) if value.version == STORE_VERSION => value,
        Ok(value) => {
            warn!(version = value.version, path = %path.display(), "unsupported session store version");
            empty
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse session store");
            empty
        }
    }
}

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - please edit it and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Missing required config field: {field}")]
    ConfigMissingField { field: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Metadata source errors
    #[error("Metadata source {source_name} unavailable: {reason}")]
    SourceUnavailable {
        source_name: String,
        reason: String,
    },

    #[error("Metadata source {source_name} does not support push notifications")]
    PushUnsupported { source_name: String },

    // Video search errors
    #[error("Video search {provider} failed: {reason}")]
    SearchFailed { provider: String, reason: String },

    // Player errors
    #[error("Player {player} failed to load video: {reason}")]
    PlayerLoadFailure { player: String, reason: String },

    #[error("Player {player} command failed: {reason}")]
    PlayerCommand { player: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

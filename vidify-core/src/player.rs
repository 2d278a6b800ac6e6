//! Video player capability trait.

use crate::error::CoreError;
use crate::search::VideoHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifies a video player backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerKind {
    /// mpv, controlled over its JSON IPC socket
    Mpv,
    /// The system's default handler for video URLs (usually a browser)
    External,
}

impl PlayerKind {
    /// Get the string identifier used in config files and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mpv => "mpv",
            Self::External => "external",
        }
    }
}

impl std::fmt::Display for PlayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlayerKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, CoreError> {
        match s.to_ascii_lowercase().as_str() {
            "mpv" => Ok(Self::Mpv),
            "external" => Ok(Self::External),
            other => Err(CoreError::ConfigInvalid {
                message: format!("unknown player '{other}' (expected 'mpv' or 'external')"),
            }),
        }
    }
}

/// Trait for video players.
///
/// Every command resolves once the player acknowledged it, which is the
/// completion (or failure) notification for the caller.
#[async_trait]
pub trait Player: Send + Sync {
    /// Get the player name
    fn name(&self) -> &'static str;

    /// Load a video and start playing it from the beginning
    async fn load(&self, video: &VideoHandle) -> Result<(), CoreError>;

    /// Seek to an absolute offset
    async fn seek(&self, offset: Duration) -> Result<(), CoreError>;

    /// Pause playback
    async fn pause(&self) -> Result<(), CoreError>;

    /// Resume playback
    async fn resume(&self) -> Result<(), CoreError>;

    /// Stop playback and unload the video
    async fn stop(&self) -> Result<(), CoreError>;
}

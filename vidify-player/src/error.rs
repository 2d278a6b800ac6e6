use thiserror::Error;
use vidify_core::CoreError;

#[derive(Debug, Error)]
pub enum MpvError {
    /// The mpv process couldn't be started.
    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The IPC socket didn't show up in time.
    #[error("mpv IPC socket {path} not ready after {secs}s")]
    SocketTimeout { path: String, secs: u64 },

    /// Reading or writing the IPC socket failed.
    #[error("mpv IPC error: {0}")]
    Io(#[from] std::io::Error),

    /// The IPC connection is gone (mpv exited).
    #[error("mpv IPC connection closed")]
    Closed,

    /// mpv rejected a command.
    #[error("mpv command {command} failed: {reason}")]
    Command { command: String, reason: String },

    /// mpv couldn't open the file.
    #[error("mpv failed to load the video: {reason}")]
    LoadFailed { reason: String },

    /// mpv didn't answer in time.
    #[error("mpv didn't respond to {command} within {secs}s")]
    Timeout { command: String, secs: u64 },
}

impl MpvError {
    /// Report the error as a failed video load
    #[must_use]
    pub fn into_load_failure(self) -> CoreError {
        CoreError::PlayerLoadFailure {
            player: crate::config::PROVIDER_NAME.to_string(),
            reason: self.to_string(),
        }
    }
}

impl From<MpvError> for CoreError {
    fn from(error: MpvError) -> Self {
        Self::PlayerCommand {
            player: crate::config::PROVIDER_NAME.to_string(),
            reason: error.to_string(),
        }
    }
}

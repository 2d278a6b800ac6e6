use thiserror::Error;
use vidify_core::CoreError;

#[derive(Debug, Error)]
pub enum YtDlpError {
    /// The yt-dlp binary couldn't be started.
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// yt-dlp exited with an error.
    #[error("yt-dlp exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// yt-dlp didn't answer in time.
    #[error("yt-dlp timed out after {secs}s")]
    Timeout { secs: u64 },

    /// yt-dlp printed something that isn't a video description.
    #[error("unexpected yt-dlp output: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<YtDlpError> for CoreError {
    fn from(error: YtDlpError) -> Self {
        Self::SearchFailed {
            provider: crate::config::PROVIDER_NAME.into(),
            reason: error.to_string(),
        }
    }
}

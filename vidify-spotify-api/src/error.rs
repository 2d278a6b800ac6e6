use thiserror::Error;
use vidify_core::CoreError;

/// Errors from the Spotify Web API source and its OAuth flow.
#[derive(Debug, Error)]
pub enum SpotifyError {
    /// Authentication failed during the OAuth flow or token exchange.
    #[error("Spotify authentication failed: {reason}")]
    AuthFailed { reason: String },

    /// Error from the Spotify API client.
    #[error("Spotify API error: {0}")]
    Api(#[from] rspotify::ClientError),

    /// Failed to bind or serve the OAuth callback server.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SpotifyError> for CoreError {
    fn from(error: SpotifyError) -> Self {
        Self::SourceUnavailable {
            source_name: crate::source::SOURCE_NAME.into(),
            reason: error.to_string(),
        }
    }
}

/// Convenience type alias for Results with `SpotifyError`.
pub type Result<T> = std::result::Result<T, SpotifyError>;

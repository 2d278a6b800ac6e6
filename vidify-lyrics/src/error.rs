use thiserror::Error;

#[derive(Debug, Error)]
pub enum LyricsError {
    /// Building the client or reading a response failed.
    #[error("lrclib HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request failed, after retries.
    #[error("lrclib request failed: {0}")]
    Request(#[from] reqwest_middleware::Error),

    /// LRCLIB answered with an unexpected status.
    #[error("lrclib returned status {status}")]
    Status { status: reqwest::StatusCode },
}

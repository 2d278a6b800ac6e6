use crate::error::CoreError;
use async_trait::async_trait;

/// A playable video found by a search backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoHandle {
    /// Page URL of the video
    pub url: String,
    /// Direct media stream URL, for players that can't resolve page URLs
    pub stream_url: Option<String>,
    /// Video title, when the backend reports one
    pub title: Option<String>,
    /// Backend-specific video ID
    pub id: Option<String>,
}

impl VideoHandle {
    /// Create a new handle for a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream_url: None,
            title: None,
            id: None,
        }
    }

    /// Set the direct stream URL
    #[must_use]
    pub fn with_stream_url(mut self, stream_url: impl Into<String>) -> Self {
        self.stream_url = Some(stream_url.into());
        self
    }

    /// Set the video title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the backend-specific ID
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Title if known, otherwise the URL
    #[must_use]
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

/// Result from a video search backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Best matching video
    Found(VideoHandle),
    /// The backend had no result for the query
    NotFound,
}

/// Trait for video search backends
#[async_trait]
pub trait VideoSearch: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &'static str;

    /// Find the best video for a query
    async fn search(&self, query: &str) -> Result<SearchOutcome, CoreError>;
}

//! YouTube search configuration.

use const_format::concatcp;
use serde::{Deserialize, Serialize};
use vidify_core::{CoreError, ProvidersConfig};

/// Provider name used in config file
pub const PROVIDER_NAME: &str = "youtube";

/// Default text appended to every search query
pub const DEFAULT_QUERY_SUFFIX: &str = "Official Video";

/// Default time limit for a single yt-dlp run, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default yt-dlp executable
pub const DEFAULT_BINARY: &str = "yt-dlp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoutubeProviderConfig {
    /// yt-dlp executable name or path
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Appended to `"<artist> <title>"` to prefer music videos
    #[serde(default = "default_query_suffix")]
    pub query_suffix: String,
    /// Largest acceptable video width
    #[serde(default)]
    pub max_width: Option<u32>,
    /// Largest acceptable video height
    #[serde(default)]
    pub max_height: Option<u32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_binary() -> String {
    DEFAULT_BINARY.into()
}

fn default_query_suffix() -> String {
    DEFAULT_QUERY_SUFFIX.into()
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for YoutubeProviderConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            query_suffix: default_query_suffix(),
            max_width: None,
            max_height: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl YoutubeProviderConfig {
    /// Extract the YouTube config, falling back to defaults when the table
    /// is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be parsed or is invalid.
    pub fn from_providers(providers: &ProvidersConfig) -> Result<Self, CoreError> {
        let config: Self = providers.get(PROVIDER_NAME)?.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] for a zero timeout or an empty binary.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.timeout_secs == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "providers.youtube.timeout_secs must be greater than zero".into(),
            });
        }
        if self.binary.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "providers.youtube.binary must not be empty".into(),
            });
        }
        Ok(())
    }

    /// The yt-dlp format selector honoring the size limits, if any.
    #[must_use]
    pub fn format_selector(&self) -> Option<String> {
        if self.max_width.is_none() && self.max_height.is_none() {
            return None;
        }
        let mut format = String::from("bestvideo");
        if let Some(width) = self.max_width {
            format.push_str(&format!("[width<={width}]"));
        }
        if let Some(height) = self.max_height {
            format.push_str(&format!("[height<={height}]"));
        }
        Some(format)
    }
}

/// Config template for the YouTube search.
pub const CONFIG_TEMPLATE: &str = concatcp!(
    r#"[providers.youtube]
# yt-dlp executable used to search YouTube
binary = ""#,
    DEFAULT_BINARY,
    r#""
# Appended to every "<artist> <title>" query
query_suffix = ""#,
    DEFAULT_QUERY_SUFFIX,
    r#""
# Optional: limit the video resolution
# max_width = 1920
# max_height = 1080
timeout_secs = "#,
    DEFAULT_TIMEOUT_SECS,
    "\n\n"
);

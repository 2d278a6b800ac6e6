//! YouTube video search backed by `yt-dlp`.

pub mod config;
pub mod error;
pub mod search;

pub use config::{YoutubeProviderConfig, CONFIG_TEMPLATE as YOUTUBE_CONFIG_TEMPLATE};
pub use error::YtDlpError;
pub use search::YtDlpSearch;

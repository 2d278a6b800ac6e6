//! Song lyrics from [LRCLIB](https://lrclib.net).
//!
//! Tracks with a known artist are looked up exactly first; everything else,
//! and exact lookups that miss, go through the free-text search. Synced
//! lyrics are flattened to plain text since they're only logged.

pub mod error;

pub use error::LyricsError;

use regex::Regex;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};
use vidify_core::TrackIdentity;

/// Provider name reported in logs
pub const PROVIDER_NAME: &str = "lrclib";

const LRCLIB_API_URL: &str = "https://lrclib.net/api";

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default number of retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

const USER_AGENT: &str = concat!(
    "Vidify/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/vidify/vidify)"
);

/// `[mm:ss.xx]` tags leading a synced lyrics line
const TIMESTAMP_PATTERN: &str = r"^(?:\[\d+:\d+(?:[.:]\d+)?\]\s?)+";

fn timestamp_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TIMESTAMP_PATTERN).ok()).as_ref()
}

/// Lyrics found for a track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lyrics {
    Plain(String),
    /// The track has no vocals
    Instrumental,
    NotFound,
}

/// Render lyrics under an `Artist - Title` heading
#[must_use]
pub fn format_lyrics(identity: &TrackIdentity, lyrics: &Lyrics) -> String {
    let body = match lyrics {
        Lyrics::Plain(text) => text.as_str(),
        Lyrics::Instrumental => "(instrumental)",
        Lyrics::NotFound => "No lyrics found",
    };
    format!("{identity}\n\n{body}")
}

/// Remove the timestamps of synced (LRC) lyrics
#[must_use]
pub fn strip_timestamps(synced: &str) -> String {
    let Some(re) = timestamp_regex() else {
        return synced.trim().to_string();
    };
    synced
        .lines()
        .map(|line| re.replace(line, ""))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// One LRCLIB record. Fields we don't use are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LrclibRecord {
    id: i64,
    #[serde(default)]
    artist_name: String,
    #[serde(default)]
    instrumental: bool,
    plain_lyrics: Option<String>,
    synced_lyrics: Option<String>,
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

impl LrclibRecord {
    fn is_usable(&self) -> bool {
        self.instrumental
            || non_blank(self.plain_lyrics.as_deref()).is_some()
            || non_blank(self.synced_lyrics.as_deref()).is_some()
    }

    fn into_lyrics(self) -> Lyrics {
        if self.instrumental {
            debug!("Track is instrumental (lrclib id: {})", self.id);
            return Lyrics::Instrumental;
        }
        if let Some(plain) = non_blank(self.plain_lyrics.as_deref()) {
            return Lyrics::Plain(plain.to_string());
        }
        if let Some(synced) = non_blank(self.synced_lyrics.as_deref()) {
            debug!("Only synced lyrics available (lrclib id: {})", self.id);
            return Lyrics::Plain(strip_timestamps(synced));
        }
        Lyrics::NotFound
    }
}

/// The first usable record, preferring ones by the track's artist
fn best_match(records: Vec<LrclibRecord>, identity: &TrackIdentity) -> Option<LrclibRecord> {
    let artist = identity.artist().map(str::to_lowercase);
    records
        .into_iter()
        .filter(LrclibRecord::is_usable)
        .min_by_key(|r| u8::from(artist.as_deref() != Some(r.artist_name.to_lowercase().as_str())))
}

/// LRCLIB lyrics client
pub struct LrclibLyrics {
    client: ClientWithMiddleware,
    base_url: String,
}

impl LrclibLyrics {
    /// Create a client for lrclib.net with a 10-second timeout and 3 retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, LyricsError> {
        Self::with_base_url(LRCLIB_API_URL)
    }

    /// Create a client for an LRCLIB-compatible API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, LyricsError> {
        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(USER_AGENT)
            .build()?;

        // Transient failures are retried with exponential backoff
        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(DEFAULT_MAX_RETRIES);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Look up the lyrics of `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if LRCLIB can't be reached or answers with an
    /// unexpected status. A track LRCLIB doesn't know is `Ok(Lyrics::NotFound)`.
    pub async fn fetch(&self, identity: &TrackIdentity) -> Result<Lyrics, LyricsError> {
        info!("Fetching lyrics from LRCLIB for {}", identity);

        if let Some(artist) = identity.artist() {
            let url = format!(
                "{}/get?artist_name={}&track_name={}",
                self.base_url,
                urlencoding::encode(artist),
                urlencoding::encode(identity.title())
            );
            debug!("LRCLIB GET (exact match): {}", url);

            let response = self.client.get(&url).send().await?;
            let status = response.status();
            if status.is_success() {
                let record: LrclibRecord = response.json().await?;
                debug!("LRCLIB exact match (id: {})", record.id);
                return Ok(record.into_lyrics());
            }
            if status != reqwest::StatusCode::NOT_FOUND {
                return Err(LyricsError::Status { status });
            }
            debug!("LRCLIB exact match not found, searching");
        }

        self.search(identity).await
    }

    async fn search(&self, identity: &TrackIdentity) -> Result<Lyrics, LyricsError> {
        let url = format!(
            "{}/search?q={}",
            self.base_url,
            urlencoding::encode(&identity.search_query())
        );
        debug!("LRCLIB GET (search): {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LyricsError::Status { status });
        }

        let records: Vec<LrclibRecord> = response.json().await?;
        debug!("LRCLIB search returned {} results", records.len());
        Ok(best_match(records, identity).map_or(Lyrics::NotFound, LrclibRecord::into_lyrics))
    }
}

use regex::Regex;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::Instant;

/// Separators accepted between an artist and a title packed into one string:
/// `"Artist - Title"`, `"Artist: Title"` and `"Artist : Title"`.
const TITLE_SPLIT_PATTERN: &str = r"^(.+?)(?:: | : | - )(.+)";

/// Placeholder artist some players report for untagged files
const UNKNOWN_ARTIST: &str = "Unknown";

fn title_split_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TITLE_SPLIT_PATTERN).ok())
        .as_ref()
}

/// Try to split an `"Artist - Title"` string into its artist and title.
///
/// Returns `None` when the string doesn't follow any of the known layouts.
#[must_use]
pub fn split_title(title: &str) -> Option<(String, String)> {
    let captures = title_split_regex()?.captures(title)?;
    let artist = captures.get(1)?.as_str().trim();
    let title = captures.get(2)?.as_str().trim();
    if artist.is_empty() || title.is_empty() {
        return None;
    }
    Some((artist.to_string(), title.to_string()))
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// The identity of a song: its title and, when known, its artist.
///
/// Two identities are equal when their trimmed, case-folded title and artist
/// match, so `"Lose Yourself"` by `"Eminem"` equals `" lose yourself "` by
/// `"EMINEM"`.
#[derive(Debug, Clone)]
pub struct TrackIdentity {
    title: String,
    artist: Option<String>,
}

impl TrackIdentity {
    /// Create a new identity. An artist that is blank after trimming is
    /// treated as absent.
    pub fn new(title: impl Into<String>, artist: Option<impl Into<String>>) -> Self {
        let title = title.into().trim().to_string();
        let artist = artist
            .map(Into::into)
            .map(|a: String| a.trim().to_string())
            .filter(|a| !a.is_empty());
        Self { title, artist }
    }

    /// Build an identity from raw player metadata.
    ///
    /// Local files often lack an artist tag (or carry `"Unknown"`), in which
    /// case the artist is recovered from titles like `"Artist - Title"`.
    #[must_use]
    pub fn from_raw(artist: Option<&str>, title: &str) -> Self {
        let artist = artist.map(str::trim).unwrap_or_default();
        if artist.is_empty() || artist == UNKNOWN_ARTIST {
            return split_title(title).map_or_else(
                || Self::new(title, None::<String>),
                |(artist, title)| Self::new(title, Some(artist)),
            );
        }
        Self::new(title, Some(artist))
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }

    /// Whether a video search query can be built from this identity.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.title.is_empty()
    }

    /// The video search query: `"<artist> <title>"`, or just the title when
    /// the artist is unknown.
    #[must_use]
    pub fn search_query(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{artist} {}", self.title),
            None => self.title.clone(),
        }
    }

    fn normalized(&self) -> (String, Option<String>) {
        (
            normalize(&self.title),
            self.artist.as_deref().map(normalize),
        )
    }
}

impl PartialEq for TrackIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for TrackIdentity {}

impl Hash for TrackIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl std::fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.artist {
            Some(artist) => write!(f, "{artist} - {}", self.title),
            None => f.write_str(&self.title),
        }
    }
}

/// One observation of the metadata source
#[derive(Debug, Clone)]
pub struct PlaybackStatus {
    /// The track being reported
    pub identity: TrackIdentity,
    /// Position since track start, when the source reports one
    pub position: Option<Duration>,
    /// Whether the track is playing (as opposed to paused)
    pub is_playing: bool,
    /// When this observation was received
    pub observed_at: Instant,
}

impl PlaybackStatus {
    /// Create a new status observed now
    #[must_use]
    pub fn new(identity: TrackIdentity, position: Option<Duration>, is_playing: bool) -> Self {
        Self {
            identity,
            position,
            is_playing,
            observed_at: Instant::now(),
        }
    }
}

/// How the playback offset of a new track is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetPolicy {
    /// Trust the position reported by the source
    Reported,
    /// Ignore reported positions and time the track locally from the moment
    /// the change was detected
    ElapsedSinceDetection,
}

impl OffsetPolicy {
    /// Resolve the policy from a per-source `offset_reliable` override.
    #[must_use]
    pub fn with_override(self, offset_reliable: Option<bool>) -> Self {
        match offset_reliable {
            Some(true) => Self::Reported,
            Some(false) => Self::ElapsedSinceDetection,
            None => self,
        }
    }
}

/// A genuine track change, emitted once by the detector
#[derive(Debug, Clone, PartialEq)]
pub struct TrackChangedEvent {
    /// The new track
    pub identity: TrackIdentity,
    /// Offset into the track at `detected_at`
    pub estimated_offset: Duration,
    /// When the change was observed
    pub detected_at: Instant,
    /// Which estimate `estimated_offset` comes from
    pub offset_source: OffsetPolicy,
}

impl TrackChangedEvent {
    /// Estimated offset into the track at `now`.
    ///
    /// The audio keeps playing while the video is searched and loaded, so the
    /// time elapsed since detection is added to the initial estimate.
    #[must_use]
    pub fn offset_at(&self, now: Instant) -> Duration {
        self.estimated_offset + now.saturating_duration_since(self.detected_at)
    }
}

/// Events produced by the track change detector
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    /// A new track started playing
    TrackChanged(TrackChangedEvent),
    /// The current track was paused
    Paused,
    /// The current track resumed within the grace period
    Resumed,
    /// The current track jumped to a new position
    Seeked(Duration),
    /// Nothing is playing anymore (long pause or source lost)
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality_is_normalized() {
        let a = TrackIdentity::new("Lose Yourself", Some("Eminem"));
        let b = TrackIdentity::new("  lose yourself ", Some("EMINEM"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_different_artist() {
        let a = TrackIdentity::new("Hurt", Some("Nine Inch Nails"));
        let b = TrackIdentity::new("Hurt", Some("Johnny Cash"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_blank_artist_is_absent() {
        let a = TrackIdentity::new("Song", Some("   "));
        assert_eq!(a.artist(), None);
        assert_eq!(a, TrackIdentity::new("Song", None::<String>));
    }

    #[test]
    fn test_identity_hash_matches_equality() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(TrackIdentity::new("Lose Yourself", Some("Eminem")));
        assert!(set.contains(&TrackIdentity::new("LOSE YOURSELF", Some("eminem"))));
    }

    #[test]
    fn test_search_query_with_artist() {
        let identity = TrackIdentity::new("Lose Yourself", Some("Eminem"));
        assert_eq!(identity.search_query(), "Eminem Lose Yourself");
    }

    #[test]
    fn test_search_query_without_artist() {
        let identity = TrackIdentity::new("Lose Yourself", None::<String>);
        assert_eq!(identity.search_query(), "Lose Yourself");
    }

    #[test]
    fn test_identity_empty_title_not_usable() {
        assert!(!TrackIdentity::new("  ", Some("Eminem")).is_usable());
        assert!(TrackIdentity::new("x", None::<String>).is_usable());
    }

    #[test]
    fn test_split_title_layouts() {
        let expected = Some((
            "Rick Astley".to_string(),
            "Never Gonna Give You Up".to_string(),
        ));
        assert_eq!(split_title("Rick Astley - Never Gonna Give You Up"), expected);
        assert_eq!(split_title("Rick Astley: Never Gonna Give You Up"), expected);
        assert_eq!(split_title("Rick Astley : Never Gonna Give You Up"), expected);
    }

    #[test]
    fn test_split_title_no_separator() {
        assert_eq!(split_title("Never Gonna Give You Up"), None);
    }

    #[test]
    fn test_from_raw_recovers_artist() {
        let identity = TrackIdentity::from_raw(Some("Unknown"), "Daft Punk - One More Time");
        assert_eq!(identity.artist(), Some("Daft Punk"));
        assert_eq!(identity.title(), "One More Time");

        let identity = TrackIdentity::from_raw(None, "Daft Punk - One More Time");
        assert_eq!(identity.artist(), Some("Daft Punk"));
    }

    #[test]
    fn test_from_raw_keeps_tagged_artist() {
        let identity = TrackIdentity::from_raw(Some("Eminem"), "Stan - Live");
        assert_eq!(identity.artist(), Some("Eminem"));
        assert_eq!(identity.title(), "Stan - Live");
    }

    #[test]
    fn test_offset_policy_override() {
        assert_eq!(
            OffsetPolicy::Reported.with_override(Some(false)),
            OffsetPolicy::ElapsedSinceDetection
        );
        assert_eq!(
            OffsetPolicy::ElapsedSinceDetection.with_override(Some(true)),
            OffsetPolicy::Reported
        );
        assert_eq!(
            OffsetPolicy::Reported.with_override(None),
            OffsetPolicy::Reported
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_offset_at_adds_elapsed_time() {
        let event = TrackChangedEvent {
            identity: TrackIdentity::new("Song", None::<String>),
            estimated_offset: Duration::from_secs(30),
            detected_at: Instant::now(),
            offset_source: OffsetPolicy::Reported,
        };

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(event.offset_at(Instant::now()), Duration::from_secs(32));
    }
}

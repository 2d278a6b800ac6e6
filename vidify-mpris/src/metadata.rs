//! Conversion of raw MPRIS properties into playback statuses.

use std::collections::HashMap;
use std::time::Duration;
use vidify_core::{PlaybackStatus, TrackIdentity};
use zbus::zvariant::{OwnedValue, Value};

/// Metadata key of the track title
pub const TITLE_KEY: &str = "xesam:title";

/// Metadata key of the track artists (a list of strings)
pub const ARTIST_KEY: &str = "xesam:artist";

fn as_str<'a>(value: &'a Value<'_>) -> Option<&'a str> {
    match value {
        Value::Str(s) => Some(s.as_str()),
        Value::Value(inner) => as_str(inner),
        _ => None,
    }
}

/// First artist of an `xesam:artist` value. Some players send a plain
/// string instead of a list.
fn first_artist<'a>(value: &'a Value<'_>) -> Option<&'a str> {
    match value {
        Value::Array(artists) => artists.iter().find_map(as_str),
        Value::Value(inner) => first_artist(inner),
        other => as_str(other),
    }
}

/// Build a track identity from the title and artist metadata values.
#[must_use]
pub fn identity_from_values(title: Option<&Value<'_>>, artist: Option<&Value<'_>>) -> TrackIdentity {
    let title = title.and_then(as_str).unwrap_or_default();
    let artist = artist.and_then(first_artist);
    TrackIdentity::from_raw(artist, title)
}

/// Build a track identity from an MPRIS `Metadata` dictionary.
#[must_use]
pub fn identity_from_metadata(metadata: &HashMap<String, OwnedValue>) -> TrackIdentity {
    identity_from_values(
        metadata.get(TITLE_KEY).map(|v| &**v),
        metadata.get(ARTIST_KEY).map(|v| &**v),
    )
}

/// Whether an MPRIS `PlaybackStatus` means the track is playing.
#[must_use]
pub fn is_playing(status: &str) -> bool {
    status.eq_ignore_ascii_case("playing")
}

/// Whether an MPRIS `PlaybackStatus` means nothing is loaded.
#[must_use]
pub fn is_stopped(status: &str) -> bool {
    status.eq_ignore_ascii_case("stopped")
}

/// Convert an MPRIS `Position` (microseconds, may be negative when unknown).
#[must_use]
pub fn position_from_micros(micros: i64) -> Option<Duration> {
    u64::try_from(micros).ok().map(Duration::from_micros)
}

/// Assemble a status from the raw property values.
///
/// Returns `None` when the player has nothing loaded.
#[must_use]
pub fn status_from_properties(
    metadata: &HashMap<String, OwnedValue>,
    playback_status: &str,
    position: Option<Duration>,
) -> Option<PlaybackStatus> {
    if is_stopped(playback_status) {
        return None;
    }
    Some(PlaybackStatus::new(
        identity_from_metadata(metadata),
        position,
        is_playing(playback_status),
    ))
}

/// Pick the player to follow: the first one playing, otherwise the first
/// one found.
#[must_use]
pub fn choose_player(candidates: &[(String, bool)]) -> Option<&str> {
    candidates
        .iter()
        .find(|(_, playing)| *playing)
        .or_else(|| candidates.first())
        .map(|(name, _)| name.as_str())
}

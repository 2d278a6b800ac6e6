//! Metadata source identification and capability trait.

use crate::error::{CoreError, Result};
use crate::playback::{OffsetPolicy, PlaybackStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Identifies a metadata source (e.g., Spotify Web API, MPRIS).
///
/// Metadata sources are the applications or services that report what is
/// currently playing. The variant names double as the `source.api` values
/// in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Spotify Web API
    SpotifyWeb,
    /// MPRIS (Media Player Remote Interfacing Specification) on Linux
    Mpris,
}

impl SourceKind {
    /// Get the string identifier used in config files and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SpotifyWeb => "spotify_web",
            Self::Mpris => "mpris",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "spotify_web" | "spotifyweb" => Ok(Self::SpotifyWeb),
            "mpris" => Ok(Self::Mpris),
            other => Err(CoreError::ConfigInvalid {
                message: format!("unknown source api '{other}' (expected 'mpris' or 'spotify_web')"),
            }),
        }
    }
}

/// How a source delivers status updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCapability {
    /// The source must be polled on an interval
    Pull,
    /// The source notifies on every change
    Push,
}

/// One update from a source: `Ok(None)` means the source is reachable but
/// nothing is loaded.
pub type SourceUpdate = Result<Option<PlaybackStatus>>;

/// Receiving end of a push subscription.
///
/// The channel closes (or yields an `Err`) when the source disconnects.
pub type StatusReceiver = mpsc::Receiver<SourceUpdate>;

/// Trait for backends that report the currently playing track.
///
/// Implementations wrap a concrete player or service. Pull sources only need
/// [`poll`](MetadataSource::poll); push sources also override
/// [`subscribe`](MetadataSource::subscribe) and report
/// [`SourceCapability::Push`]. The [`TrackChangeDetector`](crate::TrackChangeDetector)
/// drives both through the same state machine.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Returns the type of source this is.
    fn kind(&self) -> SourceKind;

    /// Returns a human-readable name for this source.
    fn name(&self) -> &'static str;

    /// Whether updates are pulled or pushed.
    fn capability(&self) -> SourceCapability {
        SourceCapability::Pull
    }

    /// How trustworthy this source's reported positions are by default.
    fn offset_policy(&self) -> OffsetPolicy {
        OffsetPolicy::Reported
    }

    /// Fetch the current playback status.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SourceUnavailable`] if the player or service can't
    /// be reached.
    async fn poll(&self) -> SourceUpdate;

    /// Subscribe to status change notifications.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PushUnsupported`] for pull-only sources, or
    /// [`CoreError::SourceUnavailable`] if the subscription can't be set up.
    async fn subscribe(&self) -> Result<StatusReceiver> {
        Err(CoreError::PushUnsupported {
            source_name: self.name().to_string(),
        })
    }

    /// Whether the source can currently be reached.
    async fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_round_trips_through_str() {
        for kind in [SourceKind::SpotifyWeb, SourceKind::Mpris] {
            assert_eq!(kind.as_str().parse::<SourceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_source_kind_unknown() {
        assert!(matches!(
            "winamp".parse::<SourceKind>(),
            Err(CoreError::ConfigInvalid { .. })
        ));
    }
}

//! Spotify Web API metadata source.

use crate::error::SpotifyError;
use crate::oauth::SpotifyOAuth;
use async_trait::async_trait;
use rspotify::model::{CurrentPlaybackContext, PlayableItem};
use rspotify::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use vidify_core::{
    MetadataSource, OffsetPolicy, PlaybackStatus, SourceKind, SourceUpdate, TrackIdentity,
};

/// Name reported by this source
pub const SOURCE_NAME: &str = "spotify_web";

/// Pull source reading the user's current playback from the Spotify Web API
pub struct SpotifyWebSource {
    oauth: Arc<SpotifyOAuth>,
}

impl SpotifyWebSource {
    /// Create a new source for an authenticated OAuth client
    #[must_use]
    pub const fn new(oauth: Arc<SpotifyOAuth>) -> Self {
        Self { oauth }
    }

    async fn fetch(&self) -> Result<Option<PlaybackStatus>, SpotifyError> {
        self.oauth.ensure_token_fresh().await?;

        let request_start = Instant::now();
        let playback = self
            .oauth
            .client()
            .current_playback(None, None::<Vec<_>>)
            .await;
        let request_latency = request_start.elapsed();

        let playback = match playback {
            Ok(playback) => playback,
            Err(e) => {
                // A rejected token is the usual cause; the next poll retries
                if let Err(refresh_err) = self.oauth.refresh_token().await {
                    debug!("Token refresh after API error failed: {}", refresh_err);
                }
                return Err(e.into());
            }
        };

        let status = playback.and_then(|context| status_from_context(&context, request_latency));
        debug!(
            "Polled Spotify: {:?}",
            status
                .as_ref()
                .map(|s| (s.identity.to_string(), s.is_playing, s.position))
        );
        Ok(status)
    }
}

/// Map the API's playback context to a status. `None` when nothing is loaded.
fn status_from_context(
    context: &CurrentPlaybackContext,
    request_latency: Duration,
) -> Option<PlaybackStatus> {
    let identity = match context.item.as_ref()? {
        PlayableItem::Track(track) => identity_from_track(
            track.artists.first().map(|a| a.name.as_str()),
            &track.name,
        ),
        // Episodes have no artist, the show stands in for it
        PlayableItem::Episode(episode) => {
            TrackIdentity::new(episode.name.as_str(), Some(episode.show.name.as_str()))
        }
    };

    let progress = context.progress.and_then(|p| p.to_std().ok());
    Some(PlaybackStatus::new(
        identity,
        compensate_latency(progress, request_latency),
        context.is_playing,
    ))
}

/// Only the first artist is used; local files without one get it recovered
/// from the title.
fn identity_from_track(first_artist: Option<&str>, name: &str) -> TrackIdentity {
    TrackIdentity::from_raw(first_artist, name)
}

/// The reported progress is assumed to be taken halfway through the request.
fn compensate_latency(progress: Option<Duration>, request_latency: Duration) -> Option<Duration> {
    progress.map(|p| p + request_latency / 2)
}

#[async_trait]
impl MetadataSource for SpotifyWebSource {
    fn kind(&self) -> SourceKind {
        SourceKind::SpotifyWeb
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn offset_policy(&self) -> OffsetPolicy {
        OffsetPolicy::Reported
    }

    async fn poll(&self) -> SourceUpdate {
        self.fetch().await.map_err(Into::into)
    }

    async fn is_available(&self) -> bool {
        match self.fetch().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Spotify Web API unavailable: {}", e);
                false
            }
        }
    }
}

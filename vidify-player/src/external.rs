//! Player handing videos to the system's default URL handler.
//!
//! A browser can't be controlled after opening, so the video is opened once
//! the start offset is known, through a `t=` timestamp on the page URL.
//! Pause, resume and stop have no effect.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;
use vidify_core::{CoreError, Player, VideoHandle};

/// Player name reported in logs and errors
pub const PLAYER_NAME: &str = "external";

/// Opens videos in the default browser
#[derive(Debug, Default)]
pub struct ExternalPlayer {
    loaded: Mutex<Option<VideoHandle>>,
}

impl ExternalPlayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Page URL starting playback at `offset`, with whole-second precision.
///
/// # Errors
///
/// Returns an error if `page_url` isn't a valid URL.
pub fn timestamped_url(page_url: &str, offset: Duration) -> Result<String, url::ParseError> {
    let mut url = Url::parse(page_url)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "t")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("t", &format!("{}s", offset.as_secs()));
    Ok(url.into())
}

async fn open_url(url: String) -> Result<(), CoreError> {
    info!("Opening {}", url);
    tokio::task::spawn_blocking(move || open::that(&url))
        .await
        .map_err(|e| load_failure(e.to_string()))?
        .map_err(|e| load_failure(e.to_string()))
}

fn load_failure(reason: String) -> CoreError {
    CoreError::PlayerLoadFailure {
        player: PLAYER_NAME.to_string(),
        reason,
    }
}

#[async_trait]
impl Player for ExternalPlayer {
    fn name(&self) -> &'static str {
        PLAYER_NAME
    }

    async fn load(&self, video: &VideoHandle) -> Result<(), CoreError> {
        Url::parse(&video.url).map_err(|e| load_failure(format!("{}: {e}", video.url)))?;
        *self.loaded.lock().await = Some(video.clone());
        Ok(())
    }

    async fn seek(&self, offset: Duration) -> Result<(), CoreError> {
        let Some(video) = self.loaded.lock().await.take() else {
            debug!("Nothing loaded, ignoring seek");
            return Ok(());
        };
        let url = timestamped_url(&video.url, offset).map_err(|e| load_failure(e.to_string()))?;
        open_url(url).await
    }

    async fn pause(&self) -> Result<(), CoreError> {
        debug!("External player can't pause");
        Ok(())
    }

    async fn resume(&self) -> Result<(), CoreError> {
        debug!("External player can't resume");
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        self.loaded.lock().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamped_url_appends_offset() {
        let url = timestamped_url(
            "https://www.youtube.com/watch?v=_Yhyp-_hX2s",
            Duration::from_millis(31_750),
        )
        .unwrap();
        assert_eq!(url, "https://www.youtube.com/watch?v=_Yhyp-_hX2s&t=31s");
    }

    #[test]
    fn test_timestamped_url_replaces_existing_offset() {
        let url = timestamped_url(
            "https://www.youtube.com/watch?v=abc&t=90s",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(url, "https://www.youtube.com/watch?v=abc&t=5s");
    }

    #[test]
    fn test_timestamped_url_invalid() {
        assert!(timestamped_url("not a url", Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_url() {
        let player = ExternalPlayer::new();
        let result = player.load(&VideoHandle::new("not a url")).await;
        assert!(matches!(result, Err(CoreError::PlayerLoadFailure { .. })));
    }

    #[tokio::test]
    async fn test_controls_without_video_are_noops() {
        let player = ExternalPlayer::new();
        player.pause().await.unwrap();
        player.resume().await.unwrap();
        player.seek(Duration::from_secs(3)).await.unwrap();
        player.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_forgets_loaded_video() {
        let player = ExternalPlayer::new();
        player
            .load(&VideoHandle::new("https://www.youtube.com/watch?v=abc"))
            .await
            .unwrap();
        player.stop().await.unwrap();

        // Nothing left to open
        player.seek(Duration::from_secs(3)).await.unwrap();
        assert!(player.loaded.lock().await.is_none());
    }
}

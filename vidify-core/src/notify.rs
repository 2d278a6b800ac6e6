use crate::playback::TrackIdentity;
use crate::search::VideoHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Capacity of the notification channel
const CHANNEL_CAPACITY: usize = 64;

/// Notifications surfaced to the owning application (logging, UI)
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The metadata source is reachable again
    SourceConnected {
        source: String,
    },
    /// The metadata source failed; it will be retried
    SourceUnavailable {
        source: String,
        reason: String,
    },
    /// A new track started playing
    TrackChanged {
        identity: TrackIdentity,
        offset: Duration,
    },
    /// The audio was paused
    PlaybackPaused,
    /// The audio resumed
    PlaybackResumed,
    /// The audio jumped to a new position
    PlaybackSeeked {
        position: Duration,
    },
    /// Nothing is playing anymore
    PlaybackStopped,
    /// A video search was started
    SearchStarted {
        query: String,
    },
    /// The search backend had no video for the query
    NoVideoFound {
        query: String,
    },
    /// The search backend failed
    SearchFailed {
        query: String,
        reason: String,
    },
    /// The player couldn't load or seek the video
    PlayerLoadFailed {
        query: String,
        reason: String,
    },
    /// The video is playing
    PlaybackStarted {
        query: String,
        video: VideoHandle,
        offset: Duration,
    },
}

/// Broadcasts [`Notification`]s to any number of subscribers
pub struct Notifier {
    event_tx: broadcast::Sender<Notification>,
}

impl Notifier {
    /// Create a new notifier
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribe to notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.event_tx.subscribe()
    }

    /// Send a notification; it's dropped when nobody is listening
    pub fn emit(&self, notification: Notification) {
        let _ = self.event_tx.send(notification);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        let (event_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { event_tx }
    }
}

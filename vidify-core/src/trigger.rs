//! Playback trigger that turns track changes into video playback.
//!
//! Every [`TrackChangedEvent`] starts a [`PlaybackSession`] driven in its own
//! task: search for a video, load it, seek to the estimated offset. Search and
//! player calls can't be cancelled, so a newer track change only marks the
//! older session as superseded and the older session drops its results when
//! they arrive.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::notify::{Notification, Notifier};
use crate::playback::{DetectorEvent, TrackChangedEvent};
use crate::player::Player;
use crate::search::{SearchOutcome, VideoHandle, VideoSearch};
use crate::time::DurationExt;

/// Immutable trigger settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerConfig {
    /// Signed milliseconds added to every seek target
    pub calibration_ms: i64,
}

/// Why a session failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFailure {
    /// The search backend had no video for the query
    NoMatchFound,
    /// The search backend returned an error
    SearchFailed,
    /// The player couldn't load or seek the video
    PlayerLoadFailure,
}

/// Lifecycle of a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Searching,
    Loading,
    Playing,
    /// A newer track change replaced this session before it played
    Superseded,
    Failed(SessionFailure),
}

impl SessionState {
    /// Whether the session can't change state anymore
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Superseded | Self::Failed(_))
    }
}

/// One attempt to play the video for a track change
#[derive(Debug)]
pub struct PlaybackSession {
    id: u64,
    query: String,
    event: TrackChangedEvent,
    target_offset: RwLock<Option<Duration>>,
    state: RwLock<SessionState>,
}

impl PlaybackSession {
    fn new(id: u64, event: TrackChangedEvent) -> Self {
        Self {
            id,
            query: event.identity.search_query(),
            event,
            target_offset: RwLock::new(None),
            state: RwLock::new(SessionState::Searching),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The video search query
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The track change that started this session
    #[must_use]
    pub const fn event(&self) -> &TrackChangedEvent {
        &self.event
    }

    /// Offset the player was asked to seek to, once known
    pub async fn target_offset(&self) -> Option<Duration> {
        *self.target_offset.read().await
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn is_superseded(&self) -> bool {
        self.state().await == SessionState::Superseded
    }

    /// Move to `next` unless the session already reached a terminal state.
    async fn advance(&self, next: SessionState) -> bool {
        let mut state = self.state.write().await;
        if state.is_terminal() {
            return false;
        }
        *state = next;
        true
    }

    /// Mark an in-flight session as superseded. Sessions that already play
    /// or failed are left alone.
    async fn supersede(&self) -> bool {
        let mut state = self.state.write().await;
        if matches!(*state, SessionState::Searching | SessionState::Loading) {
            *state = SessionState::Superseded;
            return true;
        }
        false
    }
}

/// A session together with the task driving it
pub struct SpawnedSession {
    pub session: Arc<PlaybackSession>,
    pub handle: tokio::task::JoinHandle<()>,
}

/// Consumes detector events and drives the video player
pub struct PlaybackTrigger {
    search: Arc<dyn VideoSearch>,
    player: Arc<dyn Player>,
    notifier: Arc<Notifier>,
    config: TriggerConfig,
    /// Only written by the event handlers, never by session drivers
    current: RwLock<Option<Arc<PlaybackSession>>>,
    /// Held across the supersede check and the player calls that follow it
    player_gate: Mutex<()>,
    /// Whether the audio is currently paused
    paused: AtomicBool,
    next_id: AtomicU64,
}

impl PlaybackTrigger {
    /// Create a new trigger
    pub fn new(
        search: Arc<dyn VideoSearch>,
        player: Arc<dyn Player>,
        notifier: Arc<Notifier>,
        config: TriggerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            search,
            player,
            notifier,
            config,
            current: RwLock::new(None),
            player_gate: Mutex::new(()),
            paused: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// The most recent session, if any
    pub async fn current_session(&self) -> Option<Arc<PlaybackSession>> {
        self.current.read().await.clone()
    }

    /// Start the trigger in a background task
    #[must_use]
    pub fn start(
        self: Arc<Self>,
        events_rx: mpsc::Receiver<DetectorEvent>,
        cancel_token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(events_rx, cancel_token))
    }

    /// Process detector events in arrival order until cancelled or the
    /// detector goes away
    pub async fn run(
        self: Arc<Self>,
        mut events_rx: mpsc::Receiver<DetectorEvent>,
        cancel_token: CancellationToken,
    ) {
        info!(
            "Starting playback trigger (search: {}, player: {}, calibration: {}ms)",
            self.search.name(),
            self.player.name(),
            self.config.calibration_ms
        );

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => break,
                event = events_rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }

        info!("Playback trigger shutting down");
    }

    /// Handle one detector event
    pub async fn handle_event(self: &Arc<Self>, event: DetectorEvent) {
        match event {
            DetectorEvent::TrackChanged(event) => {
                // The driver runs detached; its outcome is reported through
                // the session state and notifications
                let _ = self.on_track_changed(event).await;
            }
            DetectorEvent::Paused => self.on_paused().await,
            DetectorEvent::Resumed => self.on_resumed().await,
            DetectorEvent::Seeked(position) => self.on_seeked(position).await,
            DetectorEvent::Stopped => {
                let _ = self.on_stopped().await;
            }
        }
    }

    /// Supersede the in-flight session and start a new one for `event`
    pub async fn on_track_changed(self: &Arc<Self>, event: TrackChangedEvent) -> SpawnedSession {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(PlaybackSession::new(id, event));

        {
            let mut current = self.current.write().await;
            if let Some(previous) = current.replace(Arc::clone(&session)) {
                if previous.supersede().await {
                    debug!("Session {} ({}) superseded by session {}", previous.id, previous.query, id);
                }
            }
        }
        // A new track means the audio is playing
        self.paused.store(false, Ordering::SeqCst);

        info!("Session {}: searching video for '{}'", id, session.query);
        self.notifier.emit(Notification::SearchStarted {
            query: session.query.clone(),
        });

        let handle = tokio::spawn(Arc::clone(self).drive(Arc::clone(&session)));
        SpawnedSession { session, handle }
    }

    /// The audio was paused: pause the video if it is playing
    pub async fn on_paused(&self) {
        self.paused.store(true, Ordering::SeqCst);
        if self.current_is_playing().await {
            if let Err(e) = self.player.pause().await {
                warn!("Failed to pause {}: {}", self.player.name(), e);
            }
        }
    }

    /// The audio resumed: resume the video if it is playing
    pub async fn on_resumed(&self) {
        self.paused.store(false, Ordering::SeqCst);
        if self.current_is_playing().await {
            if let Err(e) = self.player.resume().await {
                warn!("Failed to resume {}: {}", self.player.name(), e);
            }
        }
    }

    /// The audio jumped to `position`: seek the video if it is playing
    pub async fn on_seeked(&self, position: Duration) {
        let Some(session) = self.current_session().await else {
            return;
        };
        if session.state().await != SessionState::Playing {
            debug!("Session {}: not playing yet, ignoring seek", session.id);
            return;
        }

        let offset = position.offset_by_millis(self.config.calibration_ms);
        *session.target_offset.write().await = Some(offset);
        debug!("Session {}: seeking to {:?}", session.id, offset);
        if let Err(e) = self.player.seek(offset).await {
            warn!("Failed to seek {}: {}", self.player.name(), e);
        }
    }

    /// Nothing is playing anymore: drop the current session and stop the video.
    ///
    /// The stop itself runs in the background once any in-flight load
    /// released the player. Returns `None` if there was no session to stop.
    pub async fn on_stopped(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        self.paused.store(false, Ordering::SeqCst);
        let previous = self.current.write().await.take()?;
        previous.supersede().await;

        let trigger = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _gate = trigger.player_gate.lock().await;
            // A track change after the stop already replaced the video
            if trigger.current_is_playing().await {
                debug!("Newer session already playing, skipping stop");
                return;
            }
            info!("Playback stopped, stopping {}", trigger.player.name());
            if let Err(e) = trigger.player.stop().await {
                warn!("Failed to stop {}: {}", trigger.player.name(), e);
            }
        }))
    }

    async fn current_is_playing(&self) -> bool {
        match self.current_session().await {
            Some(session) => session.state().await == SessionState::Playing,
            None => false,
        }
    }

    /// Drive one session to a terminal state
    async fn drive(self: Arc<Self>, session: Arc<PlaybackSession>) {
        let outcome = self.search.search(&session.query).await;

        if session.is_superseded().await {
            debug!("Session {}: discarding search result of superseded session", session.id);
            return;
        }

        let video = match outcome {
            Ok(SearchOutcome::Found(video)) => video,
            Ok(SearchOutcome::NotFound) => {
                info!("Session {}: no video found for '{}'", session.id, session.query);
                if self.fail(&session, SessionFailure::NoMatchFound).await {
                    self.notifier.emit(Notification::NoVideoFound {
                        query: session.query.clone(),
                    });
                }
                return;
            }
            Err(e) => {
                warn!("Session {}: search for '{}' failed: {}", session.id, session.query, e);
                if self.fail(&session, SessionFailure::SearchFailed).await {
                    self.notifier.emit(Notification::SearchFailed {
                        query: session.query.clone(),
                        reason: e.to_string(),
                    });
                }
                return;
            }
        };

        if !session.advance(SessionState::Loading).await {
            return;
        }
        debug!("Session {}: loading {}", session.id, video.url);

        match self.load_and_seek(&session, &video).await {
            Ok(Some(offset)) => {
                info!(
                    "Session {}: playing '{}' from {:?}",
                    session.id,
                    video.label(),
                    offset
                );
                self.notifier.emit(Notification::PlaybackStarted {
                    query: session.query.clone(),
                    video,
                    offset,
                });
            }
            Ok(None) => {
                debug!("Session {}: discarding player result of superseded session", session.id);
            }
            Err(e) => {
                warn!("Session {}: {} failed: {}", session.id, self.player.name(), e);
                if self.fail(&session, SessionFailure::PlayerLoadFailure).await {
                    self.notifier.emit(Notification::PlayerLoadFailed {
                        query: session.query.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Load and seek under the player gate. Returns `None` if the session was
    /// superseded along the way.
    async fn load_and_seek(
        &self,
        session: &PlaybackSession,
        video: &VideoHandle,
    ) -> Result<Option<Duration>, CoreError> {
        let _gate = self.player_gate.lock().await;

        if session.is_superseded().await {
            return Ok(None);
        }
        self.player.load(video).await?;

        if session.is_superseded().await {
            return Ok(None);
        }
        let offset = session
            .event
            .offset_at(Instant::now())
            .offset_by_millis(self.config.calibration_ms);
        *session.target_offset.write().await = Some(offset);
        self.player.seek(offset).await?;

        if !session.advance(SessionState::Playing).await {
            return Ok(None);
        }

        // The audio may have been paused while the video was loading
        if self.paused.load(Ordering::SeqCst) {
            if let Err(e) = self.player.pause().await {
                warn!("Failed to pause {}: {}", self.player.name(), e);
            }
        }

        Ok(Some(offset))
    }

    /// Fail the session. `false` if it was already superseded.
    async fn fail(&self, session: &PlaybackSession, failure: SessionFailure) -> bool {
        session.advance(SessionState::Failed(failure)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{DetectorConfig, TrackChangeDetector};
    use crate::playback::{OffsetPolicy, PlaybackStatus, TrackIdentity};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::oneshot;

    const MISSING: &str = "missing";
    const BROKEN: &str = "broken";

    fn video_url(query: &str) -> String {
        format!("https://video.test/{}", query.replace(' ', "+"))
    }

    /// Search fake: finds a video for every query except those containing
    /// `missing` (not found) or `broken` (error). Queries can be held back
    /// until the test releases them.
    #[derive(Default)]
    struct FakeSearch {
        gates: std::sync::Mutex<HashMap<String, oneshot::Receiver<()>>>,
        queries: std::sync::Mutex<Vec<String>>,
    }

    impl FakeSearch {
        fn hold(&self, query: &str) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(query.to_string(), rx);
            tx
        }
    }

    #[async_trait]
    impl VideoSearch for FakeSearch {
        fn name(&self) -> &'static str {
            "fake-search"
        }

        async fn search(&self, query: &str) -> Result<SearchOutcome, CoreError> {
            self.queries.lock().unwrap().push(query.to_string());
            let gate = self.gates.lock().unwrap().remove(query);
            if let Some(gate) = gate {
                let _ = gate.await;
            }

            if query.contains(MISSING) {
                Ok(SearchOutcome::NotFound)
            } else if query.contains(BROKEN) {
                Err(CoreError::SearchFailed {
                    provider: "fake-search".into(),
                    reason: "backend exploded".into(),
                })
            } else {
                Ok(SearchOutcome::Found(VideoHandle::new(video_url(query))))
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum PlayerCall {
        Load(String),
        Seek(Duration),
        Pause,
        Resume,
        Stop,
    }

    /// Player fake recording every call. Loads can be held back per URL, and
    /// URLs containing `broken` fail to load.
    #[derive(Default)]
    struct FakePlayer {
        load_gates: std::sync::Mutex<HashMap<String, oneshot::Receiver<()>>>,
        calls: std::sync::Mutex<Vec<PlayerCall>>,
    }

    impl FakePlayer {
        fn hold(&self, url: &str) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.load_gates.lock().unwrap().insert(url.to_string(), rx);
            tx
        }

        fn calls(&self) -> Vec<PlayerCall> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: PlayerCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl Player for FakePlayer {
        fn name(&self) -> &'static str {
            "fake-player"
        }

        async fn load(&self, video: &VideoHandle) -> Result<(), CoreError> {
            let gate = self.load_gates.lock().unwrap().remove(&video.url);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.record(PlayerCall::Load(video.url.clone()));
            if video.url.contains(BROKEN) {
                return Err(CoreError::PlayerLoadFailure {
                    player: "fake-player".into(),
                    reason: "unplayable".into(),
                });
            }
            Ok(())
        }

        async fn seek(&self, offset: Duration) -> Result<(), CoreError> {
            self.record(PlayerCall::Seek(offset));
            Ok(())
        }

        async fn pause(&self) -> Result<(), CoreError> {
            self.record(PlayerCall::Pause);
            Ok(())
        }

        async fn resume(&self) -> Result<(), CoreError> {
            self.record(PlayerCall::Resume);
            Ok(())
        }

        async fn stop(&self) -> Result<(), CoreError> {
            self.record(PlayerCall::Stop);
            Ok(())
        }
    }

    struct Harness {
        trigger: Arc<PlaybackTrigger>,
        search: Arc<FakeSearch>,
        player: Arc<FakePlayer>,
        notifications: tokio::sync::broadcast::Receiver<Notification>,
    }

    fn harness(calibration_ms: i64) -> Harness {
        let search = Arc::new(FakeSearch::default());
        let player = Arc::new(FakePlayer::default());
        let notifier = Notifier::new();
        let notifications = notifier.subscribe();
        let trigger = PlaybackTrigger::new(
            search.clone(),
            player.clone(),
            notifier,
            TriggerConfig { calibration_ms },
        );
        Harness {
            trigger,
            search,
            player,
            notifications,
        }
    }

    fn change(title: &str, artist: &str, offset: Duration) -> TrackChangedEvent {
        TrackChangedEvent {
            identity: TrackIdentity::new(title, Some(artist)),
            estimated_offset: offset,
            detected_at: Instant::now(),
            offset_source: OffsetPolicy::Reported,
        }
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            out.push(notification);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_lose_yourself_scenario() {
        let mut h = harness(0);
        let mut detector = TrackChangeDetector::new(DetectorConfig {
            offset_policy: OffsetPolicy::ElapsedSinceDetection,
            ..DetectorConfig::default()
        });

        let status = PlaybackStatus::new(
            TrackIdentity::new("Lose Yourself", Some("Eminem")),
            Some(Duration::from_secs(95)),
            true,
        );
        let events = detector.observe(&status);
        assert_eq!(events.len(), 1);
        let DetectorEvent::TrackChanged(event) = events[0].clone() else {
            panic!("expected a track change");
        };
        assert_eq!(event.estimated_offset, Duration::ZERO);

        let spawned = h.trigger.on_track_changed(event).await;
        assert_eq!(spawned.session.query(), "Eminem Lose Yourself");
        spawned.handle.await.unwrap();

        assert_eq!(
            *h.search.queries.lock().unwrap(),
            vec!["Eminem Lose Yourself".to_string()]
        );
        assert_eq!(
            h.player.calls(),
            vec![
                PlayerCall::Load(video_url("Eminem Lose Yourself")),
                PlayerCall::Seek(Duration::ZERO),
            ]
        );
        assert_eq!(spawned.session.state().await, SessionState::Playing);
        assert!(drain(&mut h.notifications)
            .iter()
            .any(|n| matches!(n, Notification::PlaybackStarted { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_target_includes_elapsed_time_and_calibration() {
        let h = harness(-250);
        let query = "Daft Punk One More Time";
        let release = h.search.hold(query);

        let spawned = h
            .trigger
            .on_track_changed(change("One More Time", "Daft Punk", Duration::from_secs(30)))
            .await;

        // The search takes two seconds while the audio keeps playing
        tokio::time::advance(Duration::from_secs(2)).await;
        release.send(()).unwrap();
        spawned.handle.await.unwrap();

        let expected = Duration::from_millis(31_750);
        assert_eq!(spawned.session.target_offset().await, Some(expected));
        assert_eq!(h.player.calls().last(), Some(&PlayerCall::Seek(expected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_clamps_at_zero() {
        let h = harness(-5_000);

        let spawned = h
            .trigger
            .on_track_changed(change("Intro", "The xx", Duration::from_secs(1)))
            .await;
        spawned.handle.await.unwrap();

        assert_eq!(h.player.calls().last(), Some(&PlayerCall::Seek(Duration::ZERO)));
    }

    #[tokio::test]
    async fn test_not_found_issues_no_player_calls() {
        let mut h = harness(0);

        let spawned = h
            .trigger
            .on_track_changed(change("Song", MISSING, Duration::ZERO))
            .await;
        spawned.handle.await.unwrap();

        assert_eq!(
            spawned.session.state().await,
            SessionState::Failed(SessionFailure::NoMatchFound)
        );
        assert!(h.player.calls().is_empty());
        assert!(drain(&mut h.notifications)
            .contains(&Notification::NoVideoFound {
                query: format!("{MISSING} Song"),
            }));

        // The next event is processed normally
        let next = h
            .trigger
            .on_track_changed(change("Song", "Band", Duration::ZERO))
            .await;
        next.handle.await.unwrap();
        assert_eq!(next.session.state().await, SessionState::Playing);
        assert_eq!(h.player.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_search_error_fails_session() {
        let mut h = harness(0);

        let spawned = h
            .trigger
            .on_track_changed(change("Song", BROKEN, Duration::ZERO))
            .await;
        spawned.handle.await.unwrap();

        assert_eq!(
            spawned.session.state().await,
            SessionState::Failed(SessionFailure::SearchFailed)
        );
        assert!(h.player.calls().is_empty());
        assert!(drain(&mut h.notifications)
            .iter()
            .any(|n| matches!(n, Notification::SearchFailed { .. })));
    }

    #[tokio::test]
    async fn test_player_failure_fails_session() {
        let mut h = harness(0);
        // Found by the search, rejected by the player
        let search = Arc::new(FixedSearch(VideoHandle::new("https://video.test/broken")));
        h.trigger = PlaybackTrigger::new(
            search,
            h.player.clone(),
            h.trigger.notifier.clone(),
            TriggerConfig::default(),
        );

        let spawned = h
            .trigger
            .on_track_changed(change("Song", "Band", Duration::ZERO))
            .await;
        spawned.handle.await.unwrap();

        assert_eq!(
            spawned.session.state().await,
            SessionState::Failed(SessionFailure::PlayerLoadFailure)
        );
        assert_eq!(
            h.player.calls(),
            vec![PlayerCall::Load("https://video.test/broken".into())]
        );
        assert!(drain(&mut h.notifications)
            .iter()
            .any(|n| matches!(n, Notification::PlayerLoadFailed { .. })));
    }

    struct FixedSearch(VideoHandle);

    #[async_trait]
    impl VideoSearch for FixedSearch {
        fn name(&self) -> &'static str {
            "fixed-search"
        }

        async fn search(&self, _query: &str) -> Result<SearchOutcome, CoreError> {
            Ok(SearchOutcome::Found(self.0.clone()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_search_result_is_discarded() {
        let h = harness(0);
        let release_first = h.search.hold("Eminem Stan");

        let first = h
            .trigger
            .on_track_changed(change("Stan", "Eminem", Duration::ZERO))
            .await;
        let second = h
            .trigger
            .on_track_changed(change("Lose Yourself", "Eminem", Duration::ZERO))
            .await;
        second.handle.await.unwrap();

        release_first.send(()).unwrap();
        first.handle.await.unwrap();

        assert_eq!(first.session.state().await, SessionState::Superseded);
        assert_eq!(second.session.state().await, SessionState::Playing);
        assert_eq!(
            h.player.calls(),
            vec![
                PlayerCall::Load(video_url("Eminem Lose Yourself")),
                PlayerCall::Seek(Duration::ZERO),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_supersede_while_loading_never_touches_player_after_newer_load() {
        let h = harness(0);
        let first_url = video_url("Eminem Stan");
        let second_url = video_url("Eminem Lose Yourself");
        let release_load = h.player.hold(&first_url);

        let first = h
            .trigger
            .on_track_changed(change("Stan", "Eminem", Duration::ZERO))
            .await;

        // Wait until the first session is stuck in its load
        while first.session.state().await != SessionState::Loading {
            tokio::task::yield_now().await;
        }

        let second = h
            .trigger
            .on_track_changed(change("Lose Yourself", "Eminem", Duration::ZERO))
            .await;
        assert_eq!(first.session.state().await, SessionState::Superseded);

        release_load.send(()).unwrap();
        first.handle.await.unwrap();
        second.handle.await.unwrap();

        let calls = h.player.calls();
        let newer_load = calls
            .iter()
            .position(|c| *c == PlayerCall::Load(second_url.clone()))
            .unwrap();
        assert!(calls[..newer_load].contains(&PlayerCall::Load(first_url.clone())));
        assert_eq!(calls[newer_load + 1..], [PlayerCall::Seek(Duration::ZERO)]);
        // The superseded session never seeks
        assert_eq!(
            calls.iter().filter(|c| matches!(c, PlayerCall::Seek(_))).count(),
            1
        );
        assert_eq!(second.session.state().await, SessionState::Playing);
    }

    #[tokio::test]
    async fn test_playing_session_is_not_superseded() {
        let h = harness(0);

        let first = h
            .trigger
            .on_track_changed(change("Stan", "Eminem", Duration::ZERO))
            .await;
        first.handle.await.unwrap();

        let second = h
            .trigger
            .on_track_changed(change("Lose Yourself", "Eminem", Duration::ZERO))
            .await;
        second.handle.await.unwrap();

        assert_eq!(first.session.state().await, SessionState::Playing);
        assert_eq!(h.trigger.current_session().await.unwrap().id(), second.session.id());
    }

    #[tokio::test]
    async fn test_pause_and_resume_follow_the_audio() {
        let h = harness(0);
        let spawned = h
            .trigger
            .on_track_changed(change("Stan", "Eminem", Duration::ZERO))
            .await;
        spawned.handle.await.unwrap();

        h.trigger.handle_event(DetectorEvent::Paused).await;
        h.trigger.handle_event(DetectorEvent::Resumed).await;

        assert_eq!(h.player.calls()[2..], [PlayerCall::Pause, PlayerCall::Resume]);
    }

    #[tokio::test]
    async fn test_session_loaded_while_paused_starts_paused() {
        let h = harness(0);
        let release = h.search.hold("Eminem Stan");

        let spawned = h
            .trigger
            .on_track_changed(change("Stan", "Eminem", Duration::ZERO))
            .await;
        h.trigger.on_paused().await;
        release.send(()).unwrap();
        spawned.handle.await.unwrap();

        assert_eq!(h.player.calls().last(), Some(&PlayerCall::Pause));
    }

    #[tokio::test]
    async fn test_stopped_supersedes_and_stops_player() {
        let h = harness(0);
        let release = h.search.hold("Eminem Stan");

        let spawned = h
            .trigger
            .on_track_changed(change("Stan", "Eminem", Duration::ZERO))
            .await;
        h.trigger.on_stopped().await.unwrap().await.unwrap();
        release.send(()).unwrap();
        spawned.handle.await.unwrap();

        assert_eq!(spawned.session.state().await, SessionState::Superseded);
        assert!(h.trigger.current_session().await.is_none());
        assert_eq!(h.player.calls(), vec![PlayerCall::Stop]);
    }

    #[tokio::test]
    async fn test_stopped_without_session_is_ignored() {
        let h = harness(0);
        assert!(h.trigger.on_stopped().await.is_none());
        assert!(h.player.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stopped_does_not_wait_for_in_flight_load() {
        let h = harness(0);
        let url = video_url("Eminem Stan");
        let release_load = h.player.hold(&url);

        let spawned = h
            .trigger
            .on_track_changed(change("Stan", "Eminem", Duration::ZERO))
            .await;
        while spawned.session.state().await != SessionState::Loading {
            tokio::task::yield_now().await;
        }

        let handled = tokio::time::timeout(
            Duration::from_millis(500),
            h.trigger.handle_event(DetectorEvent::Stopped),
        )
        .await;
        assert!(handled.is_ok(), "stop blocked on the held load");
        assert!(h.trigger.current_session().await.is_none());
        assert_eq!(spawned.session.state().await, SessionState::Superseded);

        // The stop still lands after the load it waited for
        release_load.send(()).unwrap();
        spawned.handle.await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !h.player.calls().contains(&PlayerCall::Stop) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(h.player.calls(), vec![PlayerCall::Load(url), PlayerCall::Stop]);
    }

    #[tokio::test]
    async fn test_seek_follows_the_audio() {
        let h = harness(-250);
        let spawned = h
            .trigger
            .on_track_changed(change("Stan", "Eminem", Duration::ZERO))
            .await;
        spawned.handle.await.unwrap();

        h.trigger
            .handle_event(DetectorEvent::Seeked(Duration::from_secs(120)))
            .await;

        let expected = Duration::from_millis(119_750);
        assert_eq!(h.player.calls().last(), Some(&PlayerCall::Seek(expected)));
        assert_eq!(spawned.session.target_offset().await, Some(expected));
    }

    #[tokio::test]
    async fn test_seek_before_playback_is_ignored() {
        let h = harness(0);
        let release = h.search.hold("Eminem Stan");
        let spawned = h
            .trigger
            .on_track_changed(change("Stan", "Eminem", Duration::ZERO))
            .await;

        h.trigger.on_seeked(Duration::from_secs(60)).await;
        assert!(h.player.calls().is_empty());

        release.send(()).unwrap();
        spawned.handle.await.unwrap();
        // Without a session nothing happens either
        h.trigger.on_stopped().await.unwrap().await.unwrap();
        h.trigger.on_seeked(Duration::from_secs(60)).await;
        assert_eq!(h.player.calls().last(), Some(&PlayerCall::Stop));
    }

    #[tokio::test]
    async fn test_superseded_load_failure_is_not_reported() {
        let mut h = harness(0);
        let broken_url = "https://video.test/broken";
        h.trigger = PlaybackTrigger::new(
            Arc::new(FixedSearch(VideoHandle::new(broken_url))),
            h.player.clone(),
            h.trigger.notifier.clone(),
            TriggerConfig::default(),
        );
        let release_load = h.player.hold(broken_url);

        let first = h
            .trigger
            .on_track_changed(change("Stan", "Eminem", Duration::ZERO))
            .await;
        while first.session.state().await != SessionState::Loading {
            tokio::task::yield_now().await;
        }
        let second = h
            .trigger
            .on_track_changed(change("Lose Yourself", "Eminem", Duration::ZERO))
            .await;

        release_load.send(()).unwrap();
        first.handle.await.unwrap();
        second.handle.await.unwrap();

        assert_eq!(first.session.state().await, SessionState::Superseded);
        let failures: Vec<String> = drain(&mut h.notifications)
            .into_iter()
            .filter_map(|n| match n {
                Notification::PlayerLoadFailed { query, .. } => Some(query),
                _ => None,
            })
            .collect();
        assert_eq!(failures, vec!["Eminem Lose Yourself".to_string()]);
    }

    #[tokio::test]
    async fn test_run_processes_events_in_order() {
        let mut h = harness(0);
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = h.trigger.clone().start(rx, cancel.clone());

        tx.send(DetectorEvent::TrackChanged(change("Stan", "Eminem", Duration::ZERO)))
            .await
            .unwrap();

        loop {
            match h.notifications.recv().await.unwrap() {
                Notification::PlaybackStarted { query, .. } => {
                    assert_eq!(query, "Eminem Stan");
                    break;
                }
                _ => continue,
            }
        }

        drop(tx);
        handle.await.unwrap();
        assert!(!cancel.is_cancelled());
    }
}

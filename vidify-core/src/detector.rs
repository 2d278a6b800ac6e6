//! Track change detection.
//!
//! [`TrackChangeDetector`] is a synchronous state machine that turns a noisy
//! stream of [`PlaybackStatus`] observations into clean [`DetectorEvent`]s.
//! [`DetectorRunner`] feeds it from a [`MetadataSource`], polling pull sources
//! on an interval and consuming push subscriptions, so both kinds of source
//! produce identical events.
//!
//! When a source's positions aren't trusted, the offset of a new track is
//! timed locally from the moment the change was detected. For pull sources the
//! change may have happened up to one polling interval earlier, so the polling
//! interval is an upper bound on that offset error.
//!
//! When positions are trusted, every observation of the current track is also
//! compared with the position expected from the previous one. A jump larger
//! than the seek tolerance, in either direction, is reported as a seek.

use crate::config::{DEFAULT_PAUSE_GRACE_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SEEK_TOLERANCE_MS};
use crate::error::CoreError;
use crate::notify::{Notification, Notifier};
use crate::playback::{DetectorEvent, OffsetPolicy, PlaybackStatus, TrackChangedEvent, TrackIdentity};
use crate::source::{MetadataSource, SourceUpdate, StatusReceiver};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Immutable detector settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Interval between polls of pull sources (and grace checks for push sources)
    pub poll_interval: Duration,
    /// How long a pause may last before the track is considered stopped
    pub pause_grace: Duration,
    /// Largest drift from the expected position that isn't a seek
    pub seek_tolerance: Duration,
    /// How offsets of new tracks are estimated
    pub offset_policy: OffsetPolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            pause_grace: Duration::from_millis(DEFAULT_PAUSE_GRACE_MS),
            seek_tolerance: Duration::from_millis(DEFAULT_SEEK_TOLERANCE_MS),
            offset_policy: OffsetPolicy::Reported,
        }
    }
}

/// A reported position of the current track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSample {
    pub position: Duration,
    pub observed_at: Instant,
    pub is_playing: bool,
}

impl PositionSample {
    fn of(status: &PlaybackStatus) -> Option<Self> {
        status.position.map(|position| Self {
            position,
            observed_at: status.observed_at,
            is_playing: status.is_playing,
        })
    }

    /// Where the track should be at `now` if nobody touched it
    #[must_use]
    pub fn expected_at(&self, now: Instant) -> Duration {
        if self.is_playing {
            self.position + now.saturating_duration_since(self.observed_at)
        } else {
            self.position
        }
    }
}

/// Detector state
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorState {
    /// No known current track
    Idle,
    /// A track is playing, or paused for less than the grace period
    Tracking {
        identity: TrackIdentity,
        paused_since: Option<Instant>,
        last_position: Option<PositionSample>,
    },
}

/// The position `status` jumped to, if it doesn't follow on from `last`
fn detect_seek(
    config: &DetectorConfig,
    last: Option<&PositionSample>,
    status: &PlaybackStatus,
) -> Option<Duration> {
    if config.offset_policy != OffsetPolicy::Reported {
        return None;
    }
    let position = status.position?;
    let expected = last?.expected_at(status.observed_at);
    let drift = if position > expected {
        position - expected
    } else {
        expected - position
    };
    (drift > config.seek_tolerance).then_some(position)
}

/// State machine that detects genuine track changes
#[derive(Debug)]
pub struct TrackChangeDetector {
    config: DetectorConfig,
    state: DetectorState,
}

impl TrackChangeDetector {
    /// Create a new detector in the idle state
    #[must_use]
    pub const fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: DetectorState::Idle,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> &DetectorState {
        &self.state
    }

    /// The track currently being tracked, if any
    #[must_use]
    pub const fn current(&self) -> Option<&TrackIdentity> {
        match &self.state {
            DetectorState::Idle => None,
            DetectorState::Tracking { identity, .. } => Some(identity),
        }
    }

    /// Feed one observation and return the events it causes.
    ///
    /// Observations without a usable title are dropped without changing
    /// state, since no search query could be built from them.
    pub fn observe(&mut self, status: &PlaybackStatus) -> Vec<DetectorEvent> {
        let now = status.observed_at;
        let mut events: Vec<DetectorEvent> = self.expire_pause(now).into_iter().collect();

        if !status.identity.is_usable() {
            debug!("Dropping observation with empty title (playing={})", status.is_playing);
            return events;
        }

        match &mut self.state {
            DetectorState::Idle => {
                if status.is_playing {
                    events.push(self.start_tracking(status));
                }
            }
            DetectorState::Tracking {
                identity,
                paused_since,
                last_position,
            } => {
                if *identity != status.identity {
                    if status.is_playing {
                        events.push(self.start_tracking(status));
                    } else if paused_since.is_none() {
                        // A different track is loaded but not playing yet
                        *paused_since = Some(now);
                        events.push(DetectorEvent::Paused);
                    }
                } else {
                    if status.is_playing {
                        if paused_since.take().is_some() {
                            events.push(DetectorEvent::Resumed);
                        }
                    } else if paused_since.is_none() {
                        *paused_since = Some(now);
                        events.push(DetectorEvent::Paused);
                    }

                    if let Some(position) = detect_seek(&self.config, last_position.as_ref(), status) {
                        events.push(DetectorEvent::Seeked(position));
                    }
                    *last_position = PositionSample::of(status);
                }
            }
        }

        events
    }

    /// The source is reachable but has nothing loaded: treated like a pause.
    pub fn observe_nothing(&mut self, now: Instant) -> Vec<DetectorEvent> {
        let mut events: Vec<DetectorEvent> = self.expire_pause(now).into_iter().collect();

        if let DetectorState::Tracking {
            paused_since,
            last_position,
            ..
        } = &mut self.state
        {
            // Positions after an unload don't follow on from the last one
            *last_position = None;
            if paused_since.is_none() {
                *paused_since = Some(now);
                events.push(DetectorEvent::Paused);
            }
        }

        events
    }

    /// Drop back to idle if the current pause outlasted the grace period.
    pub fn expire_pause(&mut self, now: Instant) -> Option<DetectorEvent> {
        let DetectorState::Tracking {
            identity,
            paused_since: Some(since),
            ..
        } = &self.state
        else {
            return None;
        };

        if now.saturating_duration_since(*since) > self.config.pause_grace {
            debug!("Pause of {} exceeded the grace period", identity);
            self.state = DetectorState::Idle;
            return Some(DetectorEvent::Stopped);
        }
        None
    }

    /// The source failed or disconnected.
    pub fn source_lost(&mut self) -> Option<DetectorEvent> {
        match std::mem::replace(&mut self.state, DetectorState::Idle) {
            DetectorState::Idle => None,
            DetectorState::Tracking { .. } => Some(DetectorEvent::Stopped),
        }
    }

    fn start_tracking(&mut self, status: &PlaybackStatus) -> DetectorEvent {
        let (estimated_offset, offset_source) = match (self.config.offset_policy, status.position) {
            (OffsetPolicy::Reported, Some(position)) => (position, OffsetPolicy::Reported),
            _ => (Duration::ZERO, OffsetPolicy::ElapsedSinceDetection),
        };

        self.state = DetectorState::Tracking {
            identity: status.identity.clone(),
            paused_since: None,
            last_position: PositionSample::of(status),
        };

        DetectorEvent::TrackChanged(TrackChangedEvent {
            identity: status.identity.clone(),
            estimated_offset,
            detected_at: status.observed_at,
            offset_source,
        })
    }
}

/// Drives a [`TrackChangeDetector`] from a [`MetadataSource`]
pub struct DetectorRunner {
    detector: TrackChangeDetector,
    source: Arc<dyn MetadataSource>,
    events_tx: mpsc::Sender<DetectorEvent>,
    notifier: Arc<Notifier>,
    cancel_token: CancellationToken,
    /// `None` until the first observation or failure
    source_available: Option<bool>,
}

impl DetectorRunner {
    /// Create a new runner
    ///
    /// # Arguments
    /// * `detector` - State machine to feed
    /// * `source` - Metadata source to poll or subscribe to
    /// * `events_tx` - Ordered channel to the playback trigger
    /// * `notifier` - Notifications for the owning application
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    pub fn new(
        detector: TrackChangeDetector,
        source: Arc<dyn MetadataSource>,
        events_tx: mpsc::Sender<DetectorEvent>,
        notifier: Arc<Notifier>,
        cancel_token: Option<CancellationToken>,
    ) -> Self {
        Self {
            detector,
            source,
            events_tx,
            notifier,
            cancel_token: cancel_token.unwrap_or_default(),
            source_available: None,
        }
    }

    /// Get a clone of the cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Start the runner in a background task
    #[must_use]
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until cancelled or the trigger goes away
    pub async fn run(mut self) {
        info!(
            "Starting track change detector for {} ({:?}, interval: {:?}, grace: {:?}, offsets: {:?})",
            self.source.name(),
            self.source.capability(),
            self.detector.config.poll_interval,
            self.detector.config.pause_grace,
            self.detector.config.offset_policy,
        );

        match self.source.capability() {
            crate::source::SourceCapability::Pull => self.run_pull().await,
            crate::source::SourceCapability::Push => self.run_push().await,
        }

        info!("Track change detector shutting down");
    }

    async fn run_pull(&mut self) {
        let mut interval = tokio::time::interval(self.detector.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                _ = interval.tick() => {
                    let update = tokio::select! {
                        () = self.cancel_token.cancelled() => break,
                        update = self.source.poll() => update,
                    };
                    if !self.handle_update(update).await {
                        break;
                    }
                }
            }
        }
    }

    async fn run_push(&mut self) {
        loop {
            let keep_running = match self.source.subscribe().await {
                Ok(rx) => {
                    info!("Subscribed to {}", self.source.name());
                    self.consume(rx).await
                }
                Err(e) => self.handle_source_error(&e).await,
            };
            if !keep_running {
                break;
            }

            // Retry the subscription after one interval
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                () = tokio::time::sleep(self.detector.config.poll_interval) => {}
            }
        }
    }

    /// Consume a push subscription until it ends. Returns `false` when the
    /// runner should stop.
    async fn consume(&mut self, mut rx: StatusReceiver) -> bool {
        // Push sources may stay silent during a pause, so grace expiry is
        // checked on its own ticker
        let mut grace_ticker = tokio::time::interval(self.detector.config.poll_interval);
        grace_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => return false,
                _ = grace_ticker.tick() => {
                    let events: Vec<_> = self.detector.expire_pause(Instant::now()).into_iter().collect();
                    if !self.publish(events).await {
                        return false;
                    }
                }
                update = rx.recv() => match update {
                    Some(Err(e)) => return self.handle_source_error(&e).await,
                    Some(update) => {
                        if !self.handle_update(update).await {
                            return false;
                        }
                    }
                    None => {
                        let closed = CoreError::SourceUnavailable {
                            source_name: self.source.name().to_string(),
                            reason: "subscription closed".into(),
                        };
                        return self.handle_source_error(&closed).await;
                    }
                },
            }
        }
    }

    async fn handle_update(&mut self, update: SourceUpdate) -> bool {
        match update {
            Ok(Some(status)) => {
                self.mark_available();
                let events = self.detector.observe(&status);
                self.publish(events).await
            }
            Ok(None) => {
                self.mark_available();
                let events = self.detector.observe_nothing(Instant::now());
                self.publish(events).await
            }
            Err(e) => self.handle_source_error(&e).await,
        }
    }

    fn mark_available(&mut self) {
        if self.source_available != Some(true) {
            info!("Metadata source {} connected", self.source.name());
            self.notifier.emit(Notification::SourceConnected {
                source: self.source.name().to_string(),
            });
            self.source_available = Some(true);
        }
    }

    async fn handle_source_error(&mut self, error: &CoreError) -> bool {
        if self.source_available == Some(false) {
            debug!("Metadata source still unavailable: {}", error);
        } else {
            warn!("Metadata source {} unavailable: {}", self.source.name(), error);
            self.notifier.emit(Notification::SourceUnavailable {
                source: self.source.name().to_string(),
                reason: error.to_string(),
            });
            self.source_available = Some(false);
        }

        let events: Vec<_> = self.detector.source_lost().into_iter().collect();
        self.publish(events).await
    }

    /// Forward events to the trigger and the notifier. Returns `false` once
    /// the trigger has gone away.
    async fn publish(&self, events: Vec<DetectorEvent>) -> bool {
        for event in events {
            let notification = match &event {
                DetectorEvent::TrackChanged(change) => {
                    info!(
                        "Track changed: {} (offset {:?}, {:?})",
                        change.identity, change.estimated_offset, change.offset_source
                    );
                    Notification::TrackChanged {
                        identity: change.identity.clone(),
                        offset: change.estimated_offset,
                    }
                }
                DetectorEvent::Paused => Notification::PlaybackPaused,
                DetectorEvent::Resumed => Notification::PlaybackResumed,
                DetectorEvent::Seeked(position) => {
                    debug!("Position jumped to {:?}", position);
                    Notification::PlaybackSeeked {
                        position: *position,
                    }
                }
                DetectorEvent::Stopped => Notification::PlaybackStopped,
            };
            self.notifier.emit(notification);

            if self.events_tx.send(event).await.is_err() {
                warn!("Playback trigger is gone, stopping detector");
                return false;
            }
        }
        true
    }
}

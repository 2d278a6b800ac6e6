pub mod config;
pub mod detector;
pub mod error;
pub mod notify;
pub mod paths;
pub mod playback;
pub mod player;
pub mod search;
pub mod source;
pub mod time;
pub mod trigger;

pub use config::{
    build_config_template, AudiosyncConfig, LoggingConfig, LyricsConfig, PlayerConfig,
    ProvidersConfig, SourceConfig, VidifyConfig,
};

pub use detector::{
    DetectorConfig, DetectorRunner, DetectorState, PositionSample, TrackChangeDetector,
};
pub use error::{CoreError, Result};
pub use notify::{Notification, Notifier};
pub use paths::{config_dir, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME, LOG_FILE_NAME};
pub use playback::{
    split_title, DetectorEvent, OffsetPolicy, PlaybackStatus, TrackChangedEvent, TrackIdentity,
};
pub use player::{Player, PlayerKind};
pub use search::{SearchOutcome, VideoHandle, VideoSearch};
pub use source::{MetadataSource, SourceCapability, SourceKind, SourceUpdate, StatusReceiver};
pub use time::DurationExt;
pub use trigger::{
    PlaybackSession, PlaybackTrigger, SessionFailure, SessionState, SpawnedSession, TriggerConfig,
};

use crate::detector::DetectorConfig;
use crate::error::{CoreError, Result};
use crate::player::PlayerKind;
use crate::playback::OffsetPolicy;
use crate::source::SourceKind;
use crate::trigger::TriggerConfig;
use const_format::concatcp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default polling interval for pull sources
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default tolerance for pauses before the track is considered stopped
pub const DEFAULT_PAUSE_GRACE_MS: u64 = 3000;

/// Default drift between reported and expected positions treated as a seek
pub const DEFAULT_SEEK_TOLERANCE_MS: u64 = 1000;

/// Largest accepted audiosync calibration, in either direction
pub const MAX_CALIBRATION_MS: i64 = 60_000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VidifyConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub audiosync: AudiosyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    /// Adapter-specific tables (`[providers.<name>]`), parsed by each adapter
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Which metadata source to use
    #[serde(default = "default_source_api")]
    pub api: SourceKind,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_pause_grace")]
    pub pause_grace_ms: u64,
    #[serde(default = "default_seek_tolerance")]
    pub seek_tolerance_ms: u64,
    /// Overrides whether the source's reported positions are trusted
    #[serde(default)]
    pub offset_reliable: Option<bool>,
}

const fn default_source_api() -> SourceKind {
    if cfg!(target_os = "linux") {
        SourceKind::Mpris
    } else {
        SourceKind::SpotifyWeb
    }
}

const fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

const fn default_pause_grace() -> u64 {
    DEFAULT_PAUSE_GRACE_MS
}

const fn default_seek_tolerance() -> u64 {
    DEFAULT_SEEK_TOLERANCE_MS
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api: default_source_api(),
            poll_interval_ms: default_poll_interval(),
            pause_grace_ms: default_pause_grace(),
            seek_tolerance_ms: default_seek_tolerance(),
            offset_reliable: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_kind")]
    pub kind: PlayerKind,
}

const fn default_player_kind() -> PlayerKind {
    if cfg!(unix) {
        PlayerKind::Mpv
    } else {
        PlayerKind::External
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            kind: default_player_kind(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudiosyncConfig {
    /// Manual offset added to every seek, in milliseconds (may be negative)
    #[serde(default)]
    pub calibration_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to the session log file
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// Log the lyrics of every new song
    #[serde(default)]
    pub enabled: bool,
}

/// Raw `[providers.*]` tables.
///
/// Each adapter crate owns the shape of its own table and extracts it with
/// [`ProvidersConfig::get`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvidersConfig(toml::Table);

impl ProvidersConfig {
    /// Parse the `[providers.<name>]` table, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the table doesn't match `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.0
            .get(name)
            .cloned()
            .map(T::deserialize)
            .transpose()
            .map_err(CoreError::ConfigParseError)
    }
}

impl VidifyConfig {
    /// Get the configuration directory path (~/.config/vidify/)
    #[must_use]
    pub fn config_dir() -> PathBuf {
        crate::paths::config_dir()
    }

    /// Get the config file path (~/.config/vidify/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from `path` (or the default location), creating a template
    /// on first run.
    ///
    /// `provider_templates` are appended to the base template so every
    /// adapter can document its own section.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing the template, or an
    /// error if the file cannot be read, parsed, or fails validation.
    pub fn load_or_create(path: Option<&Path>, provider_templates: Option<&[&str]>) -> Result<Self> {
        let config_path = path.map_or_else(Self::config_path, Path::to_path_buf);

        if !config_path.exists() {
            // Create config directory if it doesn't exist
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(&config_path, build_config_template(provider_templates))?;

            return Err(CoreError::ConfigNotFound { path: config_path });
        }

        let content = fs::read_to_string(&config_path)?;
        Self::parse(&content)
    }

    /// Parse and validate config from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or fails validation.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the core can't run with.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.source.poll_interval_ms == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "source.poll_interval_ms must be greater than zero".into(),
            });
        }
        if self.audiosync.calibration_ms.unsigned_abs() > MAX_CALIBRATION_MS.unsigned_abs() {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "audiosync.calibration_ms must be within ±{MAX_CALIBRATION_MS} ms"
                ),
            });
        }
        Ok(())
    }

    /// Build the detector configuration for a source whose default offset
    /// policy is `source_policy`.
    #[must_use]
    pub fn detector_config(&self, source_policy: OffsetPolicy) -> DetectorConfig {
        DetectorConfig {
            poll_interval: Duration::from_millis(self.source.poll_interval_ms),
            pause_grace: Duration::from_millis(self.source.pause_grace_ms),
            seek_tolerance: Duration::from_millis(self.source.seek_tolerance_ms),
            offset_policy: source_policy.with_override(self.source.offset_reliable),
        }
    }

    /// Build the playback trigger configuration
    #[must_use]
    pub const fn trigger_config(&self) -> TriggerConfig {
        TriggerConfig {
            calibration_ms: self.audiosync.calibration_ms,
        }
    }
}

/// Build the full config template from the base template plus any
/// adapter-provided sections.
#[must_use]
pub fn build_config_template(provider_templates: Option<&[&str]>) -> String {
    let mut template = String::from(CONFIG_TEMPLATE);
    for section in provider_templates.unwrap_or_default() {
        template.push('\n');
        template.push_str(section);
    }
    template
}

const CONFIG_TEMPLATE: &str = concatcp!(
    r#"# Vidify Configuration
# ~/.config/vidify/config.toml

[source]
# Where the current song is read from: "mpris" (Linux) or "spotify_web"
api = "mpris"
# How often pull sources are polled, in milliseconds
poll_interval_ms = "#,
    DEFAULT_POLL_INTERVAL_MS,
    r#"
# How long a pause may last before the song is considered stopped
pause_grace_ms = "#,
    DEFAULT_PAUSE_GRACE_MS,
    r#"
# Position jumps larger than this are followed as seeks, in milliseconds
seek_tolerance_ms = "#,
    DEFAULT_SEEK_TOLERANCE_MS,
    r#"
# Optional: trust (true) or ignore (false) the positions reported by the source
# offset_reliable = true

[player]
# Video player: "mpv" or "external" (opens the video in your browser)
kind = "mpv"

[audiosync]
# Manual offset added to every seek, in milliseconds (may be negative)
calibration_ms = 0

[logging]
# Also write logs to the session log file
enabled = false

[lyrics]
# Log the lyrics of every new song (fetched from lrclib.net)
enabled = false
"#
);

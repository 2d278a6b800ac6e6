mod cli;

use crate::cli::Args;
use clap::Parser;
use std::fs::File;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vidify_core::{
    CoreError, DetectorEvent, DetectorRunner, MetadataSource, Notification, Notifier,
    PlaybackTrigger, Player, PlayerKind, SourceKind, TrackChangeDetector, VideoSearch,
    VidifyConfig,
};
use vidify_lyrics::{format_lyrics, LrclibLyrics};
use vidify_player::{ExternalPlayer, MpvProviderConfig, MPV_CONFIG_TEMPLATE};
use vidify_spotify_api::{
    SpotifyOAuth, SpotifyProviderConfig, SpotifyWebSource, SPOTIFY_CONFIG_TEMPLATE,
};
use vidify_youtube::{YoutubeProviderConfig, YtDlpSearch, YOUTUBE_CONFIG_TEMPLATE};

/// Detector events waiting for the trigger
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Sections appended to the generated config file
const PROVIDER_TEMPLATES: &[&str] = &[
    SPOTIFY_CONFIG_TEMPLATE,
    YOUTUBE_CONFIG_TEMPLATE,
    MPV_CONFIG_TEMPLATE,
];

fn main() -> ExitCode {
    let args = Args::parse();
    let config_path = args.config_path();

    // Check config for logging.enabled before full config load
    init_tracing(args.debug, check_file_logging_enabled(&config_path));

    let mut config = match VidifyConfig::load_or_create(Some(&config_path), Some(PROVIDER_TEMPLATES))
    {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            info!(
                "Created a configuration file at {}. Edit it and start Vidify again.",
                path.display()
            );
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    args.apply(&mut config);
    if let Err(e) = config.validate() {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Wire source, detector, trigger and player together and run until Ctrl+C
async fn run(config: VidifyConfig) -> Result<(), CoreError> {
    // Create shared cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();
    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    let search: Arc<dyn VideoSearch> = Arc::new(YtDlpSearch::new(
        YoutubeProviderConfig::from_providers(&config.providers)?,
    ));
    let player = create_player(&config)?;
    let Some(source) = create_source(&config, &cancel_token).await? else {
        return Ok(());
    };

    let notifier = Notifier::new();
    let logger = tokio::spawn(log_notifications(notifier.subscribe()));
    let lyrics = if config.lyrics.enabled {
        start_lyrics(notifier.subscribe())
    } else {
        None
    };

    let (events_tx, events_rx) = mpsc::channel::<DetectorEvent>(EVENT_CHANNEL_CAPACITY);
    let detector = TrackChangeDetector::new(config.detector_config(source.offset_policy()));
    let runner = DetectorRunner::new(
        detector,
        source,
        events_tx,
        Arc::clone(&notifier),
        Some(cancel_token.clone()),
    );
    let trigger = PlaybackTrigger::new(
        search,
        Arc::clone(&player),
        notifier,
        config.trigger_config(),
    );

    let runner_handle = runner.start();
    let trigger_handle = trigger.start(events_rx, cancel_token.clone());
    let _ = tokio::join!(runner_handle, trigger_handle);

    if let Err(e) = player.stop().await {
        warn!("Failed to stop the player: {}", e);
    }
    logger.abort();
    if let Some(lyrics) = lyrics {
        lyrics.abort();
    }
    info!("Vidify stopped");
    Ok(())
}

/// Create the configured metadata source. `None` if shutdown was requested
/// while authenticating.
async fn create_source(
    config: &VidifyConfig,
    cancel_token: &CancellationToken,
) -> Result<Option<Arc<dyn MetadataSource>>, CoreError> {
    match config.source.api {
        SourceKind::SpotifyWeb => {
            let spotify_config = SpotifyProviderConfig::from_providers(&config.providers)?
                .ok_or_else(|| CoreError::ConfigMissingField {
                    field: "providers.spotify".into(),
                })?;
            spotify_config.validate()?;

            let oauth = Arc::new(SpotifyOAuth::new(&spotify_config));
            tokio::select! {
                result = oauth.ensure_authenticated() => result?,
                () = cancel_token.cancelled() => return Ok(None),
            }
            Ok(Some(Arc::new(SpotifyWebSource::new(oauth))))
        }
        SourceKind::Mpris => mpris_source().map(Some),
    }
}

#[cfg(target_os = "linux")]
fn mpris_source() -> Result<Arc<dyn MetadataSource>, CoreError> {
    Ok(Arc::new(vidify_mpris::MprisSource::new()))
}

#[cfg(not(target_os = "linux"))]
fn mpris_source() -> Result<Arc<dyn MetadataSource>, CoreError> {
    Err(CoreError::ConfigInvalid {
        message: "source.api = \"mpris\" is only available on Linux, use \"spotify_web\"".into(),
    })
}

fn create_player(config: &VidifyConfig) -> Result<Arc<dyn Player>, CoreError> {
    match config.player.kind {
        PlayerKind::Mpv => mpv_player(MpvProviderConfig::from_providers(&config.providers)?),
        PlayerKind::External => Ok(Arc::new(ExternalPlayer::new())),
    }
}

#[cfg(unix)]
fn mpv_player(mpv_config: MpvProviderConfig) -> Result<Arc<dyn Player>, CoreError> {
    Ok(Arc::new(vidify_player::MpvPlayer::new(mpv_config)?))
}

#[cfg(not(unix))]
fn mpv_player(_mpv_config: MpvProviderConfig) -> Result<Arc<dyn Player>, CoreError> {
    Err(CoreError::ConfigInvalid {
        message: "player.kind = \"mpv\" is not supported on this platform, use \"external\""
            .into(),
    })
}

/// Log every notification to the console
async fn log_notifications(mut rx: broadcast::Receiver<Notification>) {
    loop {
        match rx.recv().await {
            Ok(notification) => log_notification(&notification),
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                info!("Missed {} notifications", n);
            }
        }
    }
}

fn log_notification(notification: &Notification) {
    match notification {
        Notification::SourceConnected { source } => info!("Connected to {}", source),
        Notification::SourceUnavailable { source, reason } => {
            warn!("{} unavailable, retrying: {}", source, reason);
        }
        Notification::TrackChanged { identity, offset } => {
            info!("Now playing: {} (at {:?})", identity, offset);
        }
        Notification::PlaybackPaused => info!("Playback paused"),
        Notification::PlaybackResumed => info!("Playback resumed"),
        Notification::PlaybackSeeked { position } => info!("Playback jumped to {:?}", position),
        Notification::PlaybackStopped => info!("Playback stopped"),
        Notification::SearchStarted { query } => info!("Searching a video for \"{}\"", query),
        Notification::NoVideoFound { query } => warn!("No video found for \"{}\"", query),
        Notification::SearchFailed { query, reason } => {
            error!("Video search for \"{}\" failed: {}", query, reason);
        }
        Notification::PlayerLoadFailed { query, reason } => {
            error!("Couldn't play the video for \"{}\": {}", query, reason);
        }
        Notification::PlaybackStarted {
            query,
            video,
            offset,
        } => {
            info!(
                "Playing \"{}\" for \"{}\" from {:?}",
                video.label(),
                query,
                offset
            );
        }
    }
}

/// Log the lyrics of every new song. `None` if no HTTP client could be built.
fn start_lyrics(rx: broadcast::Receiver<Notification>) -> Option<tokio::task::JoinHandle<()>> {
    match LrclibLyrics::new() {
        Ok(provider) => Some(tokio::spawn(log_lyrics(Arc::new(provider), rx))),
        Err(e) => {
            warn!("Lyrics unavailable: {}", e);
            None
        }
    }
}

async fn log_lyrics(provider: Arc<LrclibLyrics>, mut rx: broadcast::Receiver<Notification>) {
    let mut pending: Option<tokio::task::JoinHandle<()>> = None;
    loop {
        match rx.recv().await {
            Ok(Notification::TrackChanged { identity, .. }) => {
                // Only the current song's lyrics are worth showing
                if let Some(previous) = pending.take() {
                    previous.abort();
                }
                let provider = Arc::clone(&provider);
                pending = Some(tokio::spawn(async move {
                    match provider.fetch(&identity).await {
                        Ok(lyrics) => info!("Lyrics:\n{}", format_lyrics(&identity, &lyrics)),
                        Err(e) => warn!("Couldn't fetch lyrics for {}: {}", identity, e),
                    }
                }));
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!("Lyrics missed {} notifications", n);
            }
        }
    }
    if let Some(pending) = pending {
        pending.abort();
    }
}

/// Check if file logging is enabled by reading the config file.
/// This is done before full config loading to set up tracing first.
/// Returns `false` if config doesn't exist or can't be parsed.
fn check_file_logging_enabled(config_path: &Path) -> bool {
    // Minimal structs to parse just the logging.enabled field
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        enabled: bool,
    }

    let Ok(content) = std::fs::read_to_string(config_path) else {
        return false;
    };

    toml::from_str::<PartialConfig>(&content)
        .map(|c| c.logging.enabled)
        .unwrap_or(false)
}

/// Default filter unless `RUST_LOG` is set
const fn default_filter(debug: bool) -> &'static str {
    if debug {
        "debug,rspotify_http=warn,zbus=warn"
    } else {
        "info,rspotify_http=warn"
    }
}

/// Initialize tracing with console output and optional file logging
fn init_tracing(debug: bool, file_logging_enabled: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    let fmt_layer = tracing_subscriber::fmt::layer();

    if file_logging_enabled {
        let log_path = vidify_core::log_file_path();

        // Create cache directory if needed
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_logging_flag() {
        let dir = std::env::temp_dir().join(format!("vidify-app-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        assert!(!check_file_logging_enabled(&path));

        std::fs::write(&path, "[logging]\nenabled = true\n").unwrap();
        assert!(check_file_logging_enabled(&path));

        std::fs::write(&path, "[logging\nenabled = true\n").unwrap();
        assert!(!check_file_logging_enabled(&path));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_default_filter() {
        assert!(default_filter(false).starts_with("info"));
        assert!(default_filter(true).starts_with("debug"));
    }

    #[test]
    fn test_external_player_selected() {
        let mut config = VidifyConfig::parse("").unwrap();
        config.player.kind = PlayerKind::External;
        assert_eq!(create_player(&config).unwrap().name(), "external");
    }

    #[tokio::test]
    async fn test_lyrics_follower_stops_with_notifier() {
        let notifier = Notifier::new();
        let provider = Arc::new(LrclibLyrics::with_base_url("http://127.0.0.1:9/api").unwrap());
        let handle = tokio::spawn(log_lyrics(provider, notifier.subscribe()));

        notifier.emit(Notification::PlaybackPaused);
        drop(notifier);

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_generated_template_parses() {
        let template = vidify_core::build_config_template(Some(PROVIDER_TEMPLATES));
        let config = VidifyConfig::parse(&template).unwrap();
        assert!(YoutubeProviderConfig::from_providers(&config.providers).is_ok());
        assert!(MpvProviderConfig::from_providers(&config.providers).is_ok());
    }
}

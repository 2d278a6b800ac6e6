use clap::Parser;
use std::path::PathBuf;
use vidify_core::{PlayerKind, SourceKind, VidifyConfig};

/// Play the music video of the song you're listening to, in sync.
#[derive(Parser, Debug, Clone)]
#[command(name = "vidify", author, version, about)]
pub struct Args {
    /// Config file to use instead of ~/.config/vidify/config.toml
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Where the current song is read from: "mpris" or "spotify_web"
    #[arg(long, value_name = "API")]
    pub api: Option<SourceKind>,

    /// Video player: "mpv" or "external"
    #[arg(long, value_name = "PLAYER")]
    pub player: Option<PlayerKind>,

    /// Milliseconds added to every seek (may be negative)
    #[arg(long, value_name = "MS", allow_negative_numbers = true)]
    pub calibration_ms: Option<i64>,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Config file path, the default location unless `--config` was given
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(VidifyConfig::config_path)
    }

    /// Command line values take precedence over the config file
    pub fn apply(&self, config: &mut VidifyConfig) {
        if let Some(api) = self.api {
            config.source.api = api;
        }
        if let Some(player) = self.player {
            config.player.kind = player;
        }
        if let Some(calibration_ms) = self.calibration_ms {
            config.audiosync.calibration_ms = calibration_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments() {
        let args = Args::try_parse_from(["vidify"]).unwrap();
        assert!(args.config.is_none());
        assert!(args.api.is_none());
        assert!(!args.debug);
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let args = Args::try_parse_from([
            "vidify",
            "--api",
            "spotify_web",
            "--player",
            "external",
            "--calibration-ms",
            "-200",
        ])
        .unwrap();
        let mut config = VidifyConfig::parse("").unwrap();

        args.apply(&mut config);

        assert_eq!(config.source.api, SourceKind::SpotifyWeb);
        assert_eq!(config.player.kind, PlayerKind::External);
        assert_eq!(config.audiosync.calibration_ms, -200);
    }

    #[test]
    fn test_absent_overrides_keep_config() {
        let args = Args::try_parse_from(["vidify", "--debug"]).unwrap();
        let mut config = VidifyConfig::parse("[audiosync]\ncalibration_ms = 150\n").unwrap();

        args.apply(&mut config);

        assert!(args.debug);
        assert_eq!(config.audiosync.calibration_ms, 150);
        assert_eq!(config.source.api, SourceKind::Mpris);
    }

    #[test]
    fn test_unknown_api_rejected() {
        assert!(Args::try_parse_from(["vidify", "--api", "winamp"]).is_err());
    }

    #[test]
    fn test_explicit_config_path() {
        let args = Args::try_parse_from(["vidify", "--config", "/tmp/vidify.toml"]).unwrap();
        assert_eq!(args.config_path(), PathBuf::from("/tmp/vidify.toml"));
    }
}

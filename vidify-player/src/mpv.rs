//! mpv player controlled over its JSON IPC socket.
//!
//! mpv is started lazily on the first load, idle and muted (the audio comes
//! from the music player), and restarted if the user closed it.

use crate::config::MpvProviderConfig;
use crate::error::MpvError;
use crate::ipc::{MpvEvent, MpvIpc};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vidify_core::{CoreError, Player, VideoHandle};

/// How long a freshly started mpv gets to create its IPC socket
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options every mpv instance is started with
const BASE_ARGS: &[&str] = &[
    "--idle=yes",
    "--force-window=yes",
    "--keep-open=always",
    "--mute=yes",
    "--no-terminal",
];

/// A running mpv process and its IPC connection
struct MpvProcess {
    child: Child,
    ipc: MpvIpc,
}

impl MpvProcess {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None)) && !self.ipc.is_closed()
    }
}

/// Video player backed by an mpv child process
pub struct MpvPlayer {
    config: MpvProviderConfig,
    extra_args: Vec<String>,
    socket_path: PathBuf,
    process: Mutex<Option<MpvProcess>>,
}

impl MpvPlayer {
    /// Create a player. mpv itself is started on the first load.
    ///
    /// # Errors
    ///
    /// Returns an error if `mpv_properties` is malformed.
    pub fn new(config: MpvProviderConfig) -> Result<Self, CoreError> {
        let extra_args = config.extra_args()?;
        let socket_path =
            std::env::temp_dir().join(format!("vidify-mpv-{}.sock", std::process::id()));
        Ok(Self {
            config,
            extra_args,
            socket_path,
            process: Mutex::new(None),
        })
    }

    /// Full mpv command line arguments
    fn spawn_args(&self) -> Vec<String> {
        BASE_ARGS
            .iter()
            .map(|arg| (*arg).to_string())
            .chain(std::iter::once(format!(
                "--input-ipc-server={}",
                self.socket_path.display()
            )))
            .chain(self.extra_args.iter().cloned())
            .collect()
    }

    async fn spawn(&self) -> Result<MpvProcess, MpvError> {
        // A stale socket from a previous instance would be mistaken for ready
        let _ = tokio::fs::remove_file(&self.socket_path).await;

        info!("Starting {}", self.config.binary);
        let mut child = Command::new(&self.config.binary)
            .args(self.spawn_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MpvError::Spawn {
                binary: self.config.binary.clone(),
                source,
            })?;

        if let Err(e) = wait_for_socket(&mut child, &self.socket_path, &self.config.binary).await {
            let _ = child.kill().await;
            return Err(e);
        }
        let ipc = MpvIpc::connect(&self.socket_path).await?;
        debug!("Connected to mpv at {}", self.socket_path.display());
        Ok(MpvProcess { child, ipc })
    }

    /// Lock the process, starting mpv if it isn't running
    async fn running(&self) -> Result<MutexGuard<'_, Option<MpvProcess>>, MpvError> {
        let mut process = self.process.lock().await;
        let alive = process.as_mut().is_some_and(MpvProcess::is_alive);
        if !alive {
            if process.is_some() {
                warn!("mpv exited, restarting it");
            }
            *process = None;
            *process = Some(self.spawn().await?);
        }
        Ok(process)
    }

    /// Send a command if mpv is running. Without a running mpv there is
    /// nothing to control, so the command is skipped.
    async fn command_if_running(&self, args: Vec<Value>) -> Result<(), MpvError> {
        let mut process = self.process.lock().await;
        let alive = process.as_mut().is_some_and(MpvProcess::is_alive);
        match process.as_mut() {
            Some(running) if alive => {
                running.ipc.command(args).await?;
            }
            _ => debug!("mpv isn't running, skipping {:?}", args.first()),
        }
        Ok(())
    }

    async fn load_url(&self, url: &str) -> Result<(), MpvError> {
        let process = self.running().await?;
        let ipc = &process.as_ref().ok_or(MpvError::Closed)?.ipc;

        let mut events = ipc.subscribe();
        ipc.command(vec![json!("loadfile"), json!(url), json!("replace")])
            .await?;

        let timeout = Duration::from_secs(self.config.load_timeout_secs);
        tokio::time::timeout(timeout, wait_for_file_loaded(&mut events))
            .await
            .map_err(|_| MpvError::Timeout {
                command: "loadfile".into(),
                secs: timeout.as_secs(),
            })?
    }
}

impl Drop for MpvPlayer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn wait_for_socket(child: &mut Child, path: &Path, binary: &str) -> Result<(), MpvError> {
    let start = Instant::now();
    while start.elapsed() < SOCKET_TIMEOUT {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }
        if let Ok(Some(status)) = child.try_wait() {
            return Err(MpvError::Spawn {
                binary: binary.to_string(),
                source: std::io::Error::other(format!("exited with {status}")),
            });
        }
        tokio::time::sleep(SOCKET_POLL_INTERVAL).await;
    }
    Err(MpvError::SocketTimeout {
        path: path.display().to_string(),
        secs: SOCKET_TIMEOUT.as_secs(),
    })
}

/// Wait until mpv reports the file as loaded or failed
async fn wait_for_file_loaded(events: &mut broadcast::Receiver<MpvEvent>) -> Result<(), MpvError> {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(result) = load_result(&event) {
                    return result;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Missed {} mpv events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return Err(MpvError::Closed),
        }
    }
}

/// Outcome of a load as signalled by an event, `None` for unrelated events.
/// Replacing a file ends the previous one with reason `stop`, which is not
/// a failure.
fn load_result(event: &MpvEvent) -> Option<Result<(), MpvError>> {
    match event.name.as_str() {
        "file-loaded" => Some(Ok(())),
        "end-file" if event.reason.as_deref() == Some("error") => {
            Some(Err(MpvError::LoadFailed {
                reason: event
                    .file_error
                    .clone()
                    .unwrap_or_else(|| "unknown error".into()),
            }))
        }
        _ => None,
    }
}

#[async_trait]
impl Player for MpvPlayer {
    fn name(&self) -> &'static str {
        crate::config::PROVIDER_NAME
    }

    async fn load(&self, video: &VideoHandle) -> Result<(), CoreError> {
        // mpv resolves page URLs itself through its ytdl hook
        let url = video.stream_url.as_deref().unwrap_or(&video.url);
        debug!("Loading {} in mpv", video.label());
        self.load_url(url)
            .await
            .map_err(MpvError::into_load_failure)
    }

    async fn seek(&self, offset: Duration) -> Result<(), CoreError> {
        self.command_if_running(vec![
            json!("seek"),
            json!(offset.as_secs_f64()),
            json!("absolute"),
        ])
        .await
        .map_err(Into::into)
    }

    async fn pause(&self) -> Result<(), CoreError> {
        self.command_if_running(vec![json!("set_property"), json!("pause"), json!(true)])
            .await
            .map_err(Into::into)
    }

    async fn resume(&self) -> Result<(), CoreError> {
        self.command_if_running(vec![json!("set_property"), json!("pause"), json!(false)])
            .await
            .map_err(Into::into)
    }

    async fn stop(&self) -> Result<(), CoreError> {
        self.command_if_running(vec![json!("stop")])
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, reason: Option<&str>, file_error: Option<&str>) -> MpvEvent {
        MpvEvent {
            name: name.into(),
            reason: reason.map(String::from),
            file_error: file_error.map(String::from),
        }
    }

    #[test]
    fn test_spawn_args() {
        let config = MpvProviderConfig {
            mpv_properties: "fs=yes;volume=50".into(),
            ..MpvProviderConfig::default()
        };
        let player = MpvPlayer::new(config).unwrap();
        let args = player.spawn_args();

        assert_eq!(args[0], "--idle=yes");
        assert!(args.contains(&"--mute=yes".to_string()));
        assert!(args
            .iter()
            .any(|arg| arg.starts_with("--input-ipc-server=") && arg.ends_with(".sock")));
        assert_eq!(&args[args.len() - 2..], ["--fs=yes", "--volume=50"]);
    }

    #[test]
    fn test_malformed_properties_rejected() {
        let config = MpvProviderConfig {
            mpv_properties: "=yes".into(),
            ..MpvProviderConfig::default()
        };
        assert!(MpvPlayer::new(config).is_err());
    }

    #[test]
    fn test_load_result_from_events() {
        assert!(matches!(load_result(&event("file-loaded", None, None)), Some(Ok(()))));
        assert!(load_result(&event("end-file", Some("stop"), None)).is_none());
        assert!(load_result(&event("playback-restart", None, None)).is_none());
        assert!(matches!(
            load_result(&event("end-file", Some("error"), Some("unrecognized file format"))),
            Some(Err(MpvError::LoadFailed { ref reason })) if reason == "unrecognized file format"
        ));
    }

    #[tokio::test]
    async fn test_wait_for_file_loaded_skips_previous_file_end() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(event("end-file", Some("stop"), None)).unwrap();
        tx.send(event("start-file", None, None)).unwrap();
        tx.send(event("file-loaded", None, None)).unwrap();

        assert!(wait_for_file_loaded(&mut rx).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_file_loaded_closed() {
        let (tx, mut rx) = broadcast::channel::<MpvEvent>(8);
        drop(tx);
        assert!(matches!(wait_for_file_loaded(&mut rx).await, Err(MpvError::Closed)));
    }

    #[tokio::test]
    async fn test_commands_without_mpv_are_skipped() {
        let player = MpvPlayer::new(MpvProviderConfig::default()).unwrap();

        player.pause().await.unwrap();
        player.resume().await.unwrap();
        player.seek(Duration::from_secs(5)).await.unwrap();
        player.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_binary_is_load_failure() {
        let player = MpvPlayer::new(MpvProviderConfig {
            binary: "vidify-test-no-such-mpv".into(),
            ..MpvProviderConfig::default()
        })
        .unwrap();

        let result = player.load(&VideoHandle::new("https://video.test/a")).await;

        assert!(matches!(result, Err(CoreError::PlayerLoadFailure { ref player, .. }) if player == "mpv"));
    }
}

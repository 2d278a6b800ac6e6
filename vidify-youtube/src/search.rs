use crate::config::YoutubeProviderConfig;
use crate::error::YtDlpError;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};
use vidify_core::{CoreError, SearchOutcome, VideoHandle, VideoSearch};

/// Video description printed by `yt-dlp --dump-json`
#[derive(Debug, Deserialize)]
struct VideoInfo {
    id: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
    /// Direct stream URL of the selected format
    url: Option<String>,
}

impl VideoInfo {
    fn into_handle(self) -> Option<VideoHandle> {
        let page_url = self.webpage_url.or_else(|| {
            self.id
                .as_ref()
                .map(|id| format!("https://www.youtube.com/watch?v={id}"))
        })?;

        let mut handle = VideoHandle::new(page_url);
        if let Some(stream_url) = self.url {
            handle = handle.with_stream_url(stream_url);
        }
        if let Some(title) = self.title {
            handle = handle.with_title(title);
        }
        if let Some(id) = self.id {
            handle = handle.with_id(id);
        }
        Some(handle)
    }
}

/// Parse the first video out of `yt-dlp --dump-json` output.
fn parse_output(stdout: &str) -> Result<SearchOutcome, YtDlpError> {
    let Some(line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(SearchOutcome::NotFound);
    };
    let info: VideoInfo = serde_json::from_str(line)?;
    Ok(info
        .into_handle()
        .map_or(SearchOutcome::NotFound, SearchOutcome::Found))
}

/// Searches YouTube by running `yt-dlp`
pub struct YtDlpSearch {
    config: YoutubeProviderConfig,
}

impl YtDlpSearch {
    #[must_use]
    pub const fn new(config: YoutubeProviderConfig) -> Self {
        Self { config }
    }

    /// The yt-dlp search expression for a query
    fn search_term(&self, query: &str) -> String {
        let suffix = self.config.query_suffix.trim();
        if suffix.is_empty() {
            format!("ytsearch1:{query}")
        } else {
            format!("ytsearch1:{query} {suffix}")
        }
    }

    fn command(&self, query: &str) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .arg("--dump-json")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--skip-download");
        if let Some(format) = self.config.format_selector() {
            command.arg("--format").arg(format);
        }
        command
            .arg(self.search_term(query))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, query: &str) -> Result<SearchOutcome, YtDlpError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut command = self.command(query);

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| YtDlpError::Timeout {
                secs: self.config.timeout_secs,
            })?
            .map_err(|source| YtDlpError::Spawn {
                binary: self.config.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(YtDlpError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl VideoSearch for YtDlpSearch {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn search(&self, query: &str) -> Result<SearchOutcome, CoreError> {
        debug!("Running {} for '{}'", self.config.binary, self.search_term(query));
        let outcome = self.run(query).await?;
        if let SearchOutcome::Found(video) = &outcome {
            info!("Found video '{}' for '{}'", video.label(), query);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"id": "_Yhyp-_hX2s", "title": "Eminem - Lose Yourself [HD]", "webpage_url": "https://www.youtube.com/watch?v=_Yhyp-_hX2s", "url": "https://rr1.googlevideo.com/videoplayback?id=1", "duration": 326}"#;

    #[test]
    fn test_parse_output_found() {
        let SearchOutcome::Found(video) = parse_output(SAMPLE).unwrap() else {
            panic!("expected a video");
        };
        assert_eq!(video.url, "https://www.youtube.com/watch?v=_Yhyp-_hX2s");
        assert_eq!(
            video.stream_url.as_deref(),
            Some("https://rr1.googlevideo.com/videoplayback?id=1")
        );
        assert_eq!(video.title.as_deref(), Some("Eminem - Lose Yourself [HD]"));
        assert_eq!(video.id.as_deref(), Some("_Yhyp-_hX2s"));
    }

    #[test]
    fn test_parse_output_empty_is_not_found() {
        assert_eq!(parse_output("").unwrap(), SearchOutcome::NotFound);
        assert_eq!(parse_output("\n  \n").unwrap(), SearchOutcome::NotFound);
    }

    #[test]
    fn test_parse_output_builds_page_url_from_id() {
        let SearchOutcome::Found(video) = parse_output(r#"{"id": "abc"}"#).unwrap() else {
            panic!("expected a video");
        };
        assert_eq!(video.url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(video.stream_url, None);
    }

    #[test]
    fn test_parse_output_without_url_or_id() {
        assert_eq!(
            parse_output(r#"{"title": "x"}"#).unwrap(),
            SearchOutcome::NotFound
        );
    }

    #[test]
    fn test_parse_output_garbage() {
        assert!(matches!(parse_output("ERROR: oops"), Err(YtDlpError::Json(_))));
    }

    #[test]
    fn test_search_term_appends_suffix() {
        let search = YtDlpSearch::new(YoutubeProviderConfig::default());
        assert_eq!(
            search.search_term("Eminem Lose Yourself"),
            "ytsearch1:Eminem Lose Yourself Official Video"
        );

        let search = YtDlpSearch::new(YoutubeProviderConfig {
            query_suffix: String::new(),
            ..YoutubeProviderConfig::default()
        });
        assert_eq!(search.search_term("Eminem Lose Yourself"), "ytsearch1:Eminem Lose Yourself");
    }

    #[tokio::test]
    async fn test_missing_binary_is_search_failure() {
        let search = YtDlpSearch::new(YoutubeProviderConfig {
            binary: "vidify-test-no-such-binary".into(),
            ..YoutubeProviderConfig::default()
        });

        let error = search.search("Eminem Lose Yourself").await.unwrap_err();

        assert!(matches!(error, CoreError::SearchFailed { ref provider, .. } if provider == "youtube"));
    }
}

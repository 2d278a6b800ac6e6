//! Path constants for configuration and log files.

use std::path::PathBuf;

/// The name of the configuration directory under ~/.config/
pub const CONFIG_DIR_NAME: &str = "vidify";

/// The name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The name of the session log file
pub const LOG_FILE_NAME: &str = "session.log";

/// Get the configuration directory path (~/.config/vidify/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.config/vidify/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the session log path (`<data dir>/vidify/session.log`)
///
/// Falls back to the config directory when the platform has no data directory.
#[must_use]
pub fn log_file_path() -> PathBuf {
    dirs::data_dir().map_or_else(
        || config_dir().join(LOG_FILE_NAME),
        |dir| dir.join(CONFIG_DIR_NAME).join(LOG_FILE_NAME),
    )
}

/// Get the path of a file inside the config directory.
#[must_use]
pub fn config_file(name: &str) -> PathBuf {
    config_dir().join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_files_live_in_config_dir() {
        assert!(config_path().ends_with(".config/vidify/config.toml"));
        assert_eq!(config_file("token.json").parent(), Some(config_dir().as_path()));
    }

    #[test]
    fn test_log_file_name() {
        let log_path = log_file_path();
        assert!(log_path.ends_with("vidify/session.log"));
    }
}

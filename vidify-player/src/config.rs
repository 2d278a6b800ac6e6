//! mpv player configuration.

use const_format::concatcp;
use serde::{Deserialize, Serialize};
use vidify_core::{CoreError, ProvidersConfig};

/// Provider name used in config file
pub const PROVIDER_NAME: &str = "mpv";

/// Default mpv executable
pub const DEFAULT_BINARY: &str = "mpv";

/// Default time limit for loading a video, in seconds
pub const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MpvProviderConfig {
    /// mpv executable name or path
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Extra mpv options as `"key=value;key2=value2"`
    #[serde(default)]
    pub mpv_properties: String,
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
}

fn default_binary() -> String {
    DEFAULT_BINARY.into()
}

const fn default_load_timeout_secs() -> u64 {
    DEFAULT_LOAD_TIMEOUT_SECS
}

impl Default for MpvProviderConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            mpv_properties: String::new(),
            load_timeout_secs: default_load_timeout_secs(),
        }
    }
}

impl MpvProviderConfig {
    /// Extract the mpv config, falling back to defaults when the table is
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be parsed or is invalid.
    pub fn from_providers(providers: &ProvidersConfig) -> Result<Self, CoreError> {
        let config: Self = providers.get(PROVIDER_NAME)?.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] for a zero timeout or a malformed
    /// property.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.load_timeout_secs == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "providers.mpv.load_timeout_secs must be greater than zero".into(),
            });
        }
        self.extra_args().map(|_| ())
    }

    /// `mpv_properties` as command line options (`--key=value`, or `--key`
    /// for bare flags).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] if a property has an empty key.
    pub fn extra_args(&self) -> Result<Vec<String>, CoreError> {
        self.mpv_properties
            .split(';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (key, value) = match entry.split_once('=') {
                    Some((key, value)) => (key.trim(), Some(value.trim())),
                    None => (entry, None),
                };
                let key = key.trim_start_matches('-');
                if key.is_empty() {
                    return Err(CoreError::ConfigInvalid {
                        message: format!("providers.mpv.mpv_properties: missing key in '{entry}'"),
                    });
                }
                Ok(value.map_or_else(|| format!("--{key}"), |value| format!("--{key}={value}")))
            })
            .collect()
    }
}

/// Config template for the mpv player.
pub const CONFIG_TEMPLATE: &str = concatcp!(
    r#"[providers.mpv]
# mpv executable used when player.kind = "mpv"
binary = ""#,
    DEFAULT_BINARY,
    r#""
# Extra mpv options, separated by semicolons, e.g. "fs=yes;volume=50"
mpv_properties = ""
load_timeout_secs = "#,
    DEFAULT_LOAD_TIMEOUT_SECS,
    "\n\n"
);

#[cfg(test)]
mod tests {
    use super::*;

    fn providers(toml_str: &str) -> ProvidersConfig {
        vidify_core::VidifyConfig::parse(toml_str).unwrap().providers
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config = MpvProviderConfig::from_providers(&providers(CONFIG_TEMPLATE)).unwrap();
        assert_eq!(config, MpvProviderConfig::default());
    }

    #[test]
    fn test_extra_args() {
        let config = MpvProviderConfig {
            mpv_properties: "fs=yes; volume = 50 ;;--ontop".into(),
            ..MpvProviderConfig::default()
        };
        assert_eq!(
            config.extra_args().unwrap(),
            vec!["--fs=yes", "--volume=50", "--ontop"]
        );
    }

    #[test]
    fn test_extra_args_missing_key() {
        let config = MpvProviderConfig {
            mpv_properties: "=yes".into(),
            ..MpvProviderConfig::default()
        };
        assert!(matches!(
            config.extra_args(),
            Err(CoreError::ConfigInvalid { .. })
        ));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = MpvProviderConfig::from_providers(&providers(
            "[providers.mpv]\nload_timeout_secs = 0\n",
        ));
        assert!(result.is_err());
    }
}

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const SERVER_URL_ENV: &str = "HUDDLE_SERVER_URL";

/// Process-wide settings, resolved once at startup.
///
/// The coordinator never reads these; they are handed to the session
/// provider (server) and to [`crate::logging::init_logging`]. Credentials are
/// not process settings: each `connect` carries its own session token.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CoordinatorConfig {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "huddle_core=debug".to_string()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            log_filter: default_log_filter(),
        }
    }
}

impl CoordinatorConfig {
    /// Strict load: a missing or malformed file is an error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Lenient load used at startup: a missing file yields defaults, a
    /// corrupt one falls back to defaults with a warning. Environment
    /// variables override file values.
    pub fn load(path: &Path) -> Self {
        let config = match Self::from_file(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!("ignoring config at {}: {e}", path.display());
                Self::default()
            }
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(SERVER_URL_ENV).filter(|v| !v.is_empty()) {
            self.server_url = Some(url);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config() {
        let c = CoordinatorConfig::default();
        assert_eq!(c.server_url, None);
        assert_eq!(c.log_filter, "huddle_core=debug");
    }

    #[test]
    fn test_from_file_reads_all_fields() {
        let dir = temp_dir();
        let path = dir.path().join("huddle.json");
        fs::write(
            &path,
            r#"{"server_url":"wss://media.example","log_filter":"info"}"#,
        )
        .unwrap();
        let c = CoordinatorConfig::from_file(&path).unwrap();
        assert_eq!(c.server_url.as_deref(), Some("wss://media.example"));
        assert_eq!(c.log_filter, "info");
    }

    #[test]
    fn test_partial_json_uses_serde_defaults() {
        let dir = temp_dir();
        let path = dir.path().join("huddle.json");
        fs::write(&path, r#"{"log_filter":"warn"}"#).unwrap();
        let c = CoordinatorConfig::from_file(&path).unwrap();
        assert_eq!(c.log_filter, "warn");
        assert_eq!(c.server_url, None);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let dir = temp_dir();
        let path = dir.path().join("huddle.json");
        fs::write(&path, r#"{"api_key":"legacy","server_url":"wss://a"}"#).unwrap();
        let c = CoordinatorConfig::from_file(&path).unwrap();
        assert_eq!(c.server_url.as_deref(), Some("wss://a"));
    }

    #[test]
    fn test_from_file_rejects_corrupt_file() {
        let dir = temp_dir();
        let path = dir.path().join("huddle.json");
        fs::write(&path, "not json!!!").unwrap();
        assert!(matches!(
            CoordinatorConfig::from_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = temp_dir();
        let path = dir.path().join("huddle.json");
        fs::write(&path, "not json!!!").unwrap();
        let c = CoordinatorConfig::load(&path);
        assert_eq!(c.log_filter, "huddle_core=debug");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = temp_dir();
        let path = dir.path().join("absent.json");
        assert!(matches!(
            CoordinatorConfig::from_file(&path),
            Err(ConfigError::Io(ref e)) if e.kind() == std::io::ErrorKind::NotFound
        ));
        let c = CoordinatorConfig::load(&path);
        let expected =
            CoordinatorConfig::default().with_env_overrides(|key| std::env::var(key).ok());
        assert_eq!(c, expected);
        assert_eq!(c.log_filter, "huddle_core=debug");
        assert_eq!(
            CoordinatorConfig::default().with_env_overrides(no_env),
            CoordinatorConfig::default()
        );
    }

    #[test]
    fn test_env_overrides_file_values() {
        let c = CoordinatorConfig {
            server_url: Some("wss://file.example".into()),
            ..Default::default()
        }
        .with_env_overrides(|key| match key {
            SERVER_URL_ENV => Some("wss://env.example".into()),
            _ => None,
        });
        assert_eq!(c.server_url.as_deref(), Some("wss://env.example"));
        assert_eq!(c.log_filter, "huddle_core=debug");
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let c = CoordinatorConfig {
            server_url: Some("wss://file.example".into()),
            ..Default::default()
        }
        .with_env_overrides(|_| Some(String::new()));
        assert_eq!(c.server_url.as_deref(), Some("wss://file.example"));
    }
}

//! Application configuration
//!
//! Defaults are embedded from `config.toml` at build time. A file with the
//! same layout at `<config dir>/scribe/config.toml` is merged over them key
//! by key, and `SCRIBE_SERVER_URL` overrides the server address.

use crate::error::{ConfigError, StorageError};
use crate::transcription::ChannelConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml");

/// Environment variable overriding `server.base_url`
pub const SERVER_URL_ENV: &str = "SCRIBE_SERVER_URL";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub channel: ChannelSettings,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
    /// Whole-request timeout for submissions; transcription can take minutes
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelSettings {
    pub reconnect_delay_ms: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExportConfig {
    /// Custom export location (None = use default)
    pub directory: Option<PathBuf>,
}

/// Location of the optional user configuration file
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("scribe").join("config.toml"))
}

/// Default export location in the user's Documents folder
pub fn default_export_dir() -> Option<PathBuf> {
    dirs::document_dir().map(|d| d.join("Scribe").join("transcripts"))
}

impl Config {
    /// Embedded defaults only
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_sources(None, None)
    }

    /// Load defaults, the user file if present, and the environment override
    pub fn load() -> Result<Self, ConfigError> {
        let user = match user_config_path() {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(&path).map_err(|e| ConfigError::Read {
                    path: path.clone(),
                    source: e,
                })?;
                info!("Loaded user configuration from {:?}", path);
                Some((path, contents))
            }
            _ => None,
        };

        let env_url = std::env::var(SERVER_URL_ENV).ok();
        Self::from_sources(
            user.as_ref().map(|(path, contents)| (path.as_path(), contents.as_str())),
            env_url,
        )
    }

    /// Build a configuration from explicit layers, lowest precedence first
    pub fn from_sources(
        user: Option<(&Path, &str)>,
        env_server_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut table = parse_table("<embedded config.toml>", DEFAULT_CONFIG_TOML)?;

        if let Some((path, contents)) = user {
            let label = path.display().to_string();
            let overlay = parse_table(&label, contents)?;
            merge_tables(&mut table, overlay);
        }

        let mut config: Config =
            toml::Value::Table(table)
                .try_into()
                .map_err(|e| ConfigError::Parse {
                    path: "<merged configuration>".to_string(),
                    source: e,
                })?;

        if let Some(url) = env_server_url.filter(|u| !u.trim().is_empty()) {
            debug!("Server URL overridden by {}", SERVER_URL_ENV);
            config.server.base_url = url.trim().to_string();
        }

        config.server_url()?;
        Ok(config)
    }

    /// Replace the server address, validating it
    pub fn set_server_url(&mut self, url: &str) -> Result<(), ConfigError> {
        let previous = std::mem::replace(&mut self.server.base_url, url.trim().to_string());
        if let Err(e) = self.server_url() {
            self.server.base_url = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Parsed server base URL
    pub fn server_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidServerUrl {
            url: self.server.base_url.clone(),
            reason,
        };
        let url = Url::parse(&self.server.base_url).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" | "ws" | "wss" => Ok(url),
            other => Err(invalid(format!("unsupported scheme {}", other))),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.server.connect_timeout_secs)
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            reconnect_delay: Duration::from_millis(self.channel.reconnect_delay_ms),
            connect_timeout: Duration::from_secs(self.channel.connect_timeout_secs),
        }
    }

    /// Directory exports are written to
    pub fn export_dir(&self) -> Result<PathBuf, StorageError> {
        resolve_export_dir(self.export.directory.clone(), default_export_dir())
    }
}

fn resolve_export_dir(
    custom: Option<PathBuf>,
    documents_default: Option<PathBuf>,
) -> Result<PathBuf, StorageError> {
    custom
        .or(documents_default)
        .ok_or(StorageError::NoDocumentsDir)
}

fn parse_table(label: &str, contents: &str) -> Result<toml::Table, ConfigError> {
    toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: label.to_string(),
        source: e,
    })
}

/// Merge `overlay` into `base`, recursing into tables present in both
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults() {
        let config = Config::embedded().unwrap();
        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.request_timeout(), Duration::from_secs(600));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.channel_config().reconnect_delay, Duration::from_millis(2000));
        assert_eq!(config.channel_config().connect_timeout, Duration::from_secs(30));
        assert!(config.export.directory.is_none());
    }

    #[test]
    fn test_user_file_overrides_single_keys() {
        let user = r#"
            [server]
            base_url = "https://transcribe.example.com"

            [export]
            directory = "/tmp/exports"
        "#;
        let config =
            Config::from_sources(Some((Path::new("user.toml"), user)), None).unwrap();
        assert_eq!(config.server.base_url, "https://transcribe.example.com");
        // Untouched keys keep their defaults
        assert_eq!(config.server.request_timeout_secs, 600);
        assert_eq!(config.channel.reconnect_delay_ms, 2000);
        assert_eq!(config.export_dir().unwrap(), PathBuf::from("/tmp/exports"));
    }

    #[test]
    fn test_env_overrides_user_file() {
        let user = "[server]\nbase_url = \"http://from-file:8000\"\n";
        let config = Config::from_sources(
            Some((Path::new("user.toml"), user)),
            Some(" http://from-env:9000 ".to_string()),
        )
        .unwrap();
        assert_eq!(config.server.base_url, "http://from-env:9000");

        let config = Config::from_sources(None, Some(String::new())).unwrap();
        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_invalid_user_file_reports_path() {
        let err = Config::from_sources(Some((Path::new("broken.toml"), "[server")), None)
            .unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        let err = Config::from_sources(None, Some("ftp://host".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServerUrl { .. }));

        let mut config = Config::embedded().unwrap();
        assert!(config.set_server_url("not a url").is_err());
        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
        config.set_server_url("wss://host/base").unwrap();
        assert_eq!(config.server_url().unwrap().scheme(), "wss");
    }

    #[test]
    fn test_export_dir_without_documents_folder() {
        assert!(matches!(
            resolve_export_dir(None, None),
            Err(StorageError::NoDocumentsDir)
        ));
        assert_eq!(
            resolve_export_dir(None, Some(PathBuf::from("/home/u/Documents/Scribe"))).unwrap(),
            PathBuf::from("/home/u/Documents/Scribe")
        );
        assert_eq!(
            resolve_export_dir(Some(PathBuf::from("/custom")), None).unwrap(),
            PathBuf::from("/custom")
        );
    }

    #[test]
    fn test_default_export_dir() {
        if let Some(dir) = default_export_dir() {
            assert!(dir.ends_with("Scribe/transcripts"));
        }
    }
}

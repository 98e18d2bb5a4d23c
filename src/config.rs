use obra_core::{ConflictPolicy, EngineOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

fn default_true() -> bool {
    true
}

/// Remote store connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL, e.g. "http://localhost:8787"
    pub url: Option<String>,
    /// API key sent as bearer token
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Push the affected table after every write (default: true)
    #[serde(default = "default_true")]
    pub auto_sync: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            auto_sync: true,
        }
    }
}

impl RemoteConfig {
    /// Returns true if both url and api_key are set
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.api_key.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub conflict_policy: ConflictPolicy,
    pub queue_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let defaults = EngineOptions::default();
        Self {
            conflict_policy: defaults.conflict_policy,
            queue_capacity: defaults.queue_capacity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    pub reconnect_delay_secs: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: EngineOptions::default().reconnect_delay.as_secs(),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub remote: RemoteConfig,
    pub sync: SyncSettings,
    pub realtime: RealtimeSettings,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    remote: Option<RemoteConfig>,
    sync: Option<SyncSettings>,
    realtime: Option<RealtimeSettings>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut database_path =
            ConfigValue::new(Self::default_data_dir().join("obra.db"), ConfigSource::Default);
        let mut config_file = None;
        let mut remote = RemoteConfig::default();
        let mut sync = SyncSettings::default();
        let mut realtime = RealtimeSettings::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Relative paths are relative to the config file
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(remote_config) = file_config.remote {
                remote = remote_config;
            }
            if let Some(sync_settings) = file_config.sync {
                sync = sync_settings;
            }
            if let Some(realtime_settings) = file_config.realtime {
                realtime = realtime_settings;
            }
        }

        if let Ok(db_path) = std::env::var("OBRA_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("OBRA_REMOTE_URL") {
            remote.url = Some(url);
        }
        if let Ok(key) = std::env::var("OBRA_API_KEY") {
            remote.api_key = Some(key);
        }

        if sync.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "sync.queue_capacity".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database_path,
            config_file,
            remote,
            sync,
            realtime,
        })
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            conflict_policy: self.sync.conflict_policy,
            queue_capacity: self.sync.queue_capacity,
            reconnect_delay: Duration::from_secs(self.realtime.reconnect_delay_secs),
        }
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/obra/
    /// - macOS: ~/Library/Application Support/obra/
    /// - Windows: %APPDATA%/obra/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("obra")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/obra/
    /// - macOS: ~/Library/Application Support/obra/
    /// - Windows: %APPDATA%/obra/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("obra")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(key, message) => {
                write!(f, "Invalid value for '{}': {}", key, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError(_, e) => Some(e),
            ConfigError::ParseError(_, e) => Some(e),
            ConfigError::InvalidValue(_, _) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_config(dir: &std::path::Path, lines: &[&str]) -> PathBuf {
        let config_path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        config_path
    }

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config
            .database_path
            .value
            .to_string_lossy()
            .contains("obra.db"));
        assert_eq!(config.database_path.source, ConfigSource::Default);
        assert!(config.config_file.is_none());
        assert!(config.remote.auto_sync);
        assert_eq!(config.sync.conflict_policy, ConflictPolicy::KeepLocal);
        assert_eq!(config.engine_options(), EngineOptions::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = write_config(
            temp_dir.path(),
            &[
                "database_path: /custom/path/obra.db",
                "remote:",
                "  url: http://localhost:8787",
                "  api_key: secret",
                "  auto_sync: false",
                "sync:",
                "  conflict_policy: prefer-remote",
                "  queue_capacity: 2",
                "realtime:",
                "  reconnect_delay_secs: 1",
            ],
        );

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(
            config.database_path.value,
            PathBuf::from("/custom/path/obra.db")
        );
        assert_eq!(config.database_path.source, ConfigSource::File);
        assert_eq!(config.config_file, Some(config_path));
        assert!(config.remote.is_configured());
        assert!(!config.remote.auto_sync);

        let options = config.engine_options();
        assert_eq!(options.conflict_policy, ConflictPolicy::PreferRemote);
        assert_eq!(options.queue_capacity, 2);
        assert_eq!(options.reconnect_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_relative_database_path_resolves_against_config_dir() {
        let temp_dir = tempdir().unwrap();
        let config_path = write_config(temp_dir.path(), &["database_path: data/obra.db"]);

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(
            config.database_path.value,
            temp_dir.path().join("data/obra.db")
        );
    }

    #[test]
    fn test_partial_remote_section_keeps_auto_sync_default() {
        let temp_dir = tempdir().unwrap();
        let config_path = write_config(temp_dir.path(), &["remote:", "  url: localhost:8787"]);

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config.remote.auto_sync);
        assert_eq!(config.remote.url.as_deref(), Some("localhost:8787"));
        assert_eq!(config.sync.queue_capacity, 8);
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let temp_dir = tempdir().unwrap();
        let config_path = write_config(temp_dir.path(), &["remote:", "  api_key: secret"]);

        let config = Config::load(Some(config_path)).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = write_config(temp_dir.path(), &["database_path: /from/file.db"]);

        std::env::set_var("OBRA_DATABASE_PATH", "/from/env.db");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.database_path.value, PathBuf::from("/from/env.db"));
        assert_eq!(config.database_path.source, ConfigSource::Environment);

        std::env::remove_var("OBRA_DATABASE_PATH");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = write_config(temp_dir.path(), &["invalid: yaml: content: ["]);

        let err = Config::load(Some(config_path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_unknown_conflict_policy_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let config_path =
            write_config(temp_dir.path(), &["sync:", "  conflict_policy: last-write-wins"]);

        assert!(matches!(
            Config::load(Some(config_path)),
            Err(ConfigError::ParseError(_, _))
        ));
    }

    #[test]
    fn test_zero_queue_capacity_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let config_path = write_config(temp_dir.path(), &["sync:", "  queue_capacity: 0"]);

        let err = Config::load(Some(config_path)).unwrap_err();
        assert!(err.to_string().contains("sync.queue_capacity"));
    }
}

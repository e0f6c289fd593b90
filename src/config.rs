use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub backend: BackendConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Base URL of the health backend (e.g. "https://api.example.com/v1")
  pub url: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for BackendConfig {
  fn default() -> Self {
    Self {
      url: None,
      timeout_secs: default_timeout_secs(),
    }
  }
}

impl BackendConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Delay before the first drain after start, to pick up work from a prior session
  #[serde(default = "default_startup_delay_secs")]
  pub startup_delay_secs: u64,
  /// Period of the background drain that picks up work no trigger caught
  #[serde(default = "default_drain_interval_secs")]
  pub drain_interval_secs: u64,
  /// How often the backend is probed for reachability
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
  /// Path appended to the backend URL for the reachability probe
  #[serde(default = "default_probe_path")]
  pub probe_path: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      startup_delay_secs: default_startup_delay_secs(),
      drain_interval_secs: default_drain_interval_secs(),
      probe_interval_secs: default_probe_interval_secs(),
      probe_path: default_probe_path(),
    }
  }
}

impl SyncConfig {
  pub fn startup_delay(&self) -> Duration {
    Duration::from_secs(self.startup_delay_secs)
  }

  pub fn drain_interval(&self) -> Duration {
    Duration::from_secs(self.drain_interval_secs.max(1))
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs.max(1))
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Database file; defaults to $XDG_DATA_HOME/vitalsync/vitalsync.db
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Default filter when RUST_LOG is not set
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Also write logs to a daily rotated file in the data directory
  #[serde(default)]
  pub file: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: false,
    }
  }
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_startup_delay_secs() -> u64 {
  3
}

fn default_drain_interval_secs() -> u64 {
  30
}

fn default_probe_interval_secs() -> u64 {
  15
}

fn default_probe_path() -> String {
  "/health".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./vitalsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/vitalsync/config.yaml
  ///
  /// Without any file the defaults are used, which is enough for offline use.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("vitalsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("vitalsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Directory for logs and the default database.
  pub fn data_dir(&self) -> Option<PathBuf> {
    match &self.storage.path {
      Some(path) => path.parent().map(Path::to_path_buf),
      None => dirs::data_dir().map(|d| d.join("vitalsync")),
    }
  }

  /// Get the backend API token from environment variables.
  ///
  /// Checks VITALSYNC_TOKEN first, then VITALSYNC_API_TOKEN. A missing token means
  /// unauthenticated requests.
  pub fn get_api_token() -> Option<String> {
    std::env::var("VITALSYNC_TOKEN")
      .or_else(|_| std::env::var("VITALSYNC_API_TOKEN"))
      .ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("").unwrap();
    assert!(config.backend.url.is_none());
    assert_eq!(config.sync.startup_delay(), Duration::from_secs(3));
    assert_eq!(config.sync.drain_interval(), Duration::from_secs(30));
    assert_eq!(config.sync.probe_path, "/health");
    assert_eq!(config.log.level, "info");
  }

  #[test]
  fn test_partial_config() {
    let config = Config::parse(
      r#"
backend:
  url: https://api.example.com/v1
sync:
  startup_delay_secs: 0
log:
  file: true
"#,
    )
    .unwrap();
    assert_eq!(config.backend.url.as_deref(), Some("https://api.example.com/v1"));
    assert_eq!(config.backend.timeout(), Duration::from_secs(10));
    assert_eq!(config.sync.startup_delay(), Duration::ZERO);
    assert_eq!(config.sync.probe_interval_secs, 15);
    assert!(config.log.file);
  }

  #[test]
  fn test_intervals_never_zero() {
    let config = Config::parse("sync:\n  probe_interval_secs: 0\n  drain_interval_secs: 0\n").unwrap();
    assert_eq!(config.sync.probe_interval(), Duration::from_secs(1));
    assert_eq!(config.sync.drain_interval(), Duration::from_secs(1));
  }

  #[test]
  fn test_missing_explicit_path_errors() {
    assert!(Config::load(Some(Path::new("/definitely/not/here.yaml"))).is_err());
  }

  #[test]
  fn test_data_dir_follows_storage_path() {
    let mut config = Config::default();
    config.storage.path = Some(PathBuf::from("/tmp/vs/db.sqlite"));
    assert_eq!(config.data_dir(), Some(PathBuf::from("/tmp/vs")));
  }
}

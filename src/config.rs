//! Configuration for hvp.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (HVP_HOME, HVP_DATABASE, HVP_LIBRARIES)
//! 2. Config file (.hvp/config.yaml)
//! 3. Defaults (~/.hvp)
//!
//! Config file discovery:
//! - Searches current directory and parents for .hvp/config.yaml
//! - Paths in config file are relative to the project root (parent of .hvp/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::hub::DEFAULT_HUB_URL;
use crate::core::DEFAULT_BATCH_SIZE;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub upgrade: Option<UpgradeConfig>,
    #[serde(default)]
    pub retention: Option<RetentionConfig>,
    #[serde(default)]
    pub backup: Option<BackupConfig>,
    #[serde(default)]
    pub hub: Option<HubConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to project root)
    pub home: Option<String>,
    /// SQLite database file
    pub database: Option<String>,
    /// Installed library folders (`<machine>-<major>.<minor>/`)
    pub libraries: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpgradeConfig {
    pub batch_size: Option<usize>,
    pub script_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    pub log_days: Option<i64>,
    pub tmpfile_hours: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    pub include_libraries: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    pub enabled: Option<bool>,
    pub url: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    pub database: PathBuf,
    pub libraries: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub upgrade: UpgradeSettings,
    pub retention: RetentionSettings,
    pub include_libraries_in_backup: bool,
    pub hub: HubSettings,
}

#[derive(Debug, Clone)]
pub struct UpgradeSettings {
    pub batch_size: usize,
    pub script_timeout_seconds: u64,
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            script_timeout_seconds: 30,
        }
    }
}

impl UpgradeSettings {
    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_seconds)
    }
}

#[derive(Debug, Clone)]
pub struct RetentionSettings {
    pub log_days: i64,
    pub tmpfile_hours: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            log_days: 30,
            tmpfile_hours: 24,
        }
    }
}

impl RetentionSettings {
    pub fn log_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.log_days)
    }

    pub fn tmpfile_max_age(&self) -> Duration {
        Duration::from_secs(self.tmpfile_hours.saturating_mul(3600))
    }
}

#[derive(Debug, Clone)]
pub struct HubSettings {
    pub enabled: bool,
    pub url: String,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: DEFAULT_HUB_URL.to_string(),
        }
    }
}

impl ResolvedConfig {
    /// Temporary upload directory cleaned by the tmpfile task
    pub fn tmp_dir(&self) -> PathBuf {
        self.home.join("tmp")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".hvp").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name).ok().map(PathBuf::from)
}

/// Merge a parsed file (if any) with env overrides and defaults
fn resolve(
    file: ConfigFile,
    config_file: Option<PathBuf>,
    default_home: PathBuf,
) -> ResolvedConfig {
    // Project root is the parent of .hvp/
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let home = env_path("HVP_HOME")
        .or_else(|| file.paths.home.as_deref().map(|p| resolve_path(&base_dir, p)))
        .unwrap_or(default_home);

    let database = env_path("HVP_DATABASE")
        .or_else(|| file.paths.database.as_deref().map(|p| resolve_path(&base_dir, p)))
        .unwrap_or_else(|| home.join("hvp.db"));

    let libraries = env_path("HVP_LIBRARIES")
        .or_else(|| file.paths.libraries.as_deref().map(|p| resolve_path(&base_dir, p)))
        .unwrap_or_else(|| home.join("libraries"));

    let defaults = UpgradeSettings::default();
    let upgrade = UpgradeSettings {
        batch_size: file
            .upgrade
            .as_ref()
            .and_then(|u| u.batch_size)
            .unwrap_or(defaults.batch_size)
            .max(1),
        script_timeout_seconds: file
            .upgrade
            .as_ref()
            .and_then(|u| u.script_timeout_seconds)
            .unwrap_or(defaults.script_timeout_seconds),
    };

    let defaults = RetentionSettings::default();
    let retention = RetentionSettings {
        log_days: file
            .retention
            .as_ref()
            .and_then(|r| r.log_days)
            .unwrap_or(defaults.log_days),
        tmpfile_hours: file
            .retention
            .as_ref()
            .and_then(|r| r.tmpfile_hours)
            .unwrap_or(defaults.tmpfile_hours),
    };

    let defaults = HubSettings::default();
    let hub = HubSettings {
        enabled: file
            .hub
            .as_ref()
            .and_then(|h| h.enabled)
            .unwrap_or(defaults.enabled),
        url: file
            .hub
            .as_ref()
            .and_then(|h| h.url.clone())
            .unwrap_or(defaults.url),
    };

    ResolvedConfig {
        home,
        database,
        libraries,
        config_file,
        upgrade,
        retention,
        include_libraries_in_backup: file
            .backup
            .as_ref()
            .and_then(|b| b.include_libraries)
            .unwrap_or(true),
        hub,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".hvp");

    let config_file = find_config_file();
    let file = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    Ok(resolve(file, config_file, default_home))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(ConfigFile::default(), None, PathBuf::from("/home/u/.hvp"));

        // Env vars may be set in the test environment
        if std::env::var("HVP_HOME").is_err() {
            assert_eq!(config.home, PathBuf::from("/home/u/.hvp"));
        }
        assert_eq!(config.upgrade.batch_size, 40);
        assert_eq!(config.upgrade.script_timeout_seconds, 30);
        assert_eq!(config.retention.log_days, 30);
        assert_eq!(config.retention.tmpfile_hours, 24);
        assert!(config.include_libraries_in_backup);
        assert!(!config.hub.enabled);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let hvp_dir = temp.path().join(".hvp");
        std::fs::create_dir_all(&hvp_dir).unwrap();

        let config_path = hvp_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  database: data/hvp.db
  libraries: libs
upgrade:
  batch_size: 10
retention:
  log_days: 7
backup:
  include_libraries: false
hub:
  enabled: true
  url: http://localhost:9000/content-types
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version.as_deref(), Some("1.0"));
        assert_eq!(parsed.paths.database.as_deref(), Some("data/hvp.db"));

        let config = resolve(parsed, Some(config_path), PathBuf::from("/unused"));
        if std::env::var("HVP_LIBRARIES").is_err() {
            assert_eq!(config.libraries, temp.path().join("libs"));
        }
        assert_eq!(config.upgrade.batch_size, 10);
        assert_eq!(config.retention.log_days, 7);
        assert_eq!(config.retention.tmpfile_hours, 24);
        assert!(!config.include_libraries_in_backup);
        assert!(config.hub.enabled);
        assert_eq!(config.hub.url, "http://localhost:9000/content-types");
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }

    #[test]
    fn test_zero_batch_size_clamped() {
        let file = ConfigFile {
            upgrade: Some(UpgradeConfig {
                batch_size: Some(0),
                script_timeout_seconds: None,
            }),
            ..Default::default()
        };
        let config = resolve(file, None, PathBuf::from("/x"));
        assert_eq!(config.upgrade.batch_size, 1);
    }

    #[test]
    fn test_huge_tmpfile_hours_saturates() {
        let retention = RetentionSettings {
            tmpfile_hours: u64::MAX,
            ..RetentionSettings::default()
        };
        assert_eq!(retention.tmpfile_max_age(), Duration::from_secs(u64::MAX));

        let retention = RetentionSettings {
            tmpfile_hours: 2,
            ..RetentionSettings::default()
        };
        assert_eq!(retention.tmpfile_max_age(), Duration::from_secs(7200));
    }
}

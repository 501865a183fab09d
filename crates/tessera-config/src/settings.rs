//! Layered settings
//!
//! Resolution order, later layers winning key by key:
//! 1. built-in defaults
//! 2. `~/.config/tessera/settings.yaml`
//! 3. `<project>/.tessera/settings.yaml`
//! 4. environment (`TESSERA_PARALLELISM`, `TESSERA_REFRESH`, `TESSERA_LOCK_TIMEOUT`)

use crate::error::{Result, SettingsError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "settings.yaml";
pub const PROJECT_SETTINGS_DIR: &str = ".tessera";

pub const ENV_PARALLELISM: &str = "TESSERA_PARALLELISM";
pub const ENV_REFRESH: &str = "TESSERA_REFRESH";
pub const ENV_LOCK_TIMEOUT: &str = "TESSERA_LOCK_TIMEOUT";

/// Effective settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Concurrent node operations per batch
    pub parallelism: usize,
    /// Refresh state from providers before planning
    pub refresh: bool,
    /// Seconds to wait for a held lock (0: fail immediately)
    pub lock_timeout_secs: u64,
    /// Lock lease, renewed while held
    pub lock_ttl_secs: u64,
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallelism: 10,
            refresh: true,
            lock_timeout_secs: 0,
            lock_ttl_secs: 300,
            retry: RetrySettings::default(),
        }
    }
}

/// Provider retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per operation (1: no retry)
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySettings {
    pub fn enabled(&self) -> bool {
        self.max_attempts > 1
    }
}

/// One settings file; absent keys leave the lower layer untouched
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsLayer {
    parallelism: Option<usize>,
    refresh: Option<bool>,
    lock_timeout_secs: Option<u64>,
    lock_ttl_secs: Option<u64>,
    #[serde(default)]
    retry: RetryLayer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetryLayer {
    max_attempts: Option<u32>,
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

impl Settings {
    fn overlay(&mut self, layer: SettingsLayer) {
        if let Some(v) = layer.parallelism {
            self.parallelism = v;
        }
        if let Some(v) = layer.refresh {
            self.refresh = v;
        }
        if let Some(v) = layer.lock_timeout_secs {
            self.lock_timeout_secs = v;
        }
        if let Some(v) = layer.lock_ttl_secs {
            self.lock_ttl_secs = v;
        }
        if let Some(v) = layer.retry.max_attempts {
            self.retry.max_attempts = v;
        }
        if let Some(v) = layer.retry.initial_delay_ms {
            self.retry.initial_delay_ms = v;
        }
        if let Some(v) = layer.retry.max_delay_ms {
            self.retry.max_delay_ms = v;
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_value(ENV_PARALLELISM, "a positive integer", |s| s.parse().ok())? {
            self.parallelism = v;
        }
        if let Some(v) = env_value(ENV_REFRESH, "true or false", parse_bool)? {
            self.refresh = v;
        }
        if let Some(v) = env_value(ENV_LOCK_TIMEOUT, "a number of seconds", |s| s.parse().ok())? {
            self.lock_timeout_secs = v;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(SettingsError::Invalid {
                key: "parallelism",
                message: "must be at least 1".to_string(),
            });
        }
        if self.lock_ttl_secs == 0 {
            return Err(SettingsError::Invalid {
                key: "lock_ttl_secs",
                message: "must be at least 1".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(SettingsError::Invalid {
                key: "retry.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn env_value<T>(
    name: &'static str,
    expected: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => parse(value.trim())
            .map(Some)
            .ok_or(SettingsError::InvalidEnv {
                name,
                value,
                expected,
            }),
        Err(_) => Ok(None),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_layer(path: &Path) -> Result<Option<SettingsLayer>> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Some(SettingsLayer::default()));
    }
    serde_yaml::from_str(&content)
        .map(Some)
        .map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Path of the user-wide settings file
pub fn global_settings_path() -> Result<PathBuf> {
    Ok(crate::get_config_dir()?.join(SETTINGS_FILE))
}

/// Path of a project's settings file
pub fn project_settings_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_SETTINGS_DIR).join(SETTINGS_FILE)
}

/// Load settings for a project (or user-wide only when `None`)
pub fn load_settings(project_root: Option<&Path>) -> Result<Settings> {
    let global = match global_settings_path() {
        Ok(path) => Some(path),
        Err(SettingsError::ConfigDirNotFound) => None,
        Err(e) => return Err(e),
    };
    let project = project_root.map(project_settings_path);
    load_settings_from(global.as_deref(), project.as_deref())
}

/// Load settings from explicit file locations, then the environment
pub fn load_settings_from(global: Option<&Path>, project: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    for path in [global, project].into_iter().flatten() {
        if let Some(layer) = read_layer(path)? {
            tracing::debug!("Loaded settings from {}", path.display());
            settings.overlay(layer);
        }
    }
    settings.apply_env()?;
    settings.validate()?;
    Ok(settings)
}

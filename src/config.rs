use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use directories::{BaseDirs, ProjectDirs};
use anyhow::Result;
use std::fs;

use crate::api::DEFAULT_ENDPOINT;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub apps: AppsConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_app_limit")]
    pub app_limit: usize,
}

fn default_debounce_ms() -> u64 { 50 }
fn default_app_limit() -> usize { 8 }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            app_limit: default_app_limit(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppsConfig {
    #[serde(default = "default_app_dirs")]
    pub directories: Vec<String>,
}

fn default_app_dirs() -> Vec<String> {
    vec![
        "/Applications".to_string(),
        "/System/Applications".to_string(),
        "/System/Applications/Utilities".to_string(),
        "~/Applications".to_string(),
    ]
}

impl Default for AppsConfig {
    fn default() -> Self {
        Self { directories: default_app_dirs() }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String { DEFAULT_ENDPOINT.to_string() }
fn default_dashboard_url() -> String { "https://dash.zeabur.com/projects".to_string() }
fn default_cache_ttl_secs() -> u64 { 300 }
fn default_timeout_secs() -> u64 { 15 }

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            dashboard_url: default_dashboard_url(),
            cache_ttl_secs: default_cache_ttl_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct StorageConfig {
    pub keywords_path: Option<String>,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "zeabur", "zeal")
}

fn data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Expands a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.general.debounce_ms)
    }

    pub fn app_dirs(&self) -> Vec<PathBuf> {
        self.apps.directories.iter().map(|d| expand_home(d)).collect()
    }

    pub fn keywords_path(&self) -> PathBuf {
        match &self.storage.keywords_path {
            Some(path) => expand_home(path),
            None => data_dir().join("keywords.json"),
        }
    }

    /// Project list shared with companion surfaces.
    pub fn snapshot_path(&self) -> PathBuf {
        data_dir().join("projects.json")
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.remote.cache_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }
}

pub fn default_config_path() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.config_dir().join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(config_path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

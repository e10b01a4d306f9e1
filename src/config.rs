//! Configuration for the teamflow client.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (TEAMFLOW_API_BASE_URL, TEAMFLOW_HOME, TEAMFLOW_DOWNLOADS)
//! 2. Config file (.teamflow/config.yaml)
//! 3. Defaults (http://127.0.0.1:8000, ~/.teamflow, current directory)
//!
//! Config file discovery:
//! - Searches current directory and parents for .teamflow/config.yaml
//! - `paths.home` is relative to the .teamflow/ directory, `paths.downloads`
//!   to the project root (the directory holding .teamflow/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::{PollSchedule, ReconnectPolicy, SessionSettings, MAX_IDEA_CHARS};
use crate::domain::DEFAULT_EVENT_LIMIT;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";

pub const ENV_API_BASE_URL: &str = "TEAMFLOW_API_BASE_URL";
pub const ENV_HOME: &str = "TEAMFLOW_HOME";
pub const ENV_DOWNLOADS: &str = "TEAMFLOW_DOWNLOADS";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Client state directory (relative to .teamflow/)
    pub home: Option<String>,
    /// Where notebooks and exports are written (relative to project root)
    pub downloads: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    pub poll_interval_ms: Option<u64>,
    pub poll_error_interval_ms: Option<u64>,
    pub reconnect_delay_ms: Option<u64>,
    pub event_limit: Option<usize>,
    pub max_idea_chars: Option<usize>,
}

impl SessionConfig {
    fn settings(&self) -> SessionSettings {
        let defaults = SessionSettings::default();
        SessionSettings {
            poll: PollSchedule {
                interval: self
                    .poll_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.poll.interval),
                error_interval: self
                    .poll_error_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.poll.error_interval),
            },
            reconnect: ReconnectPolicy {
                delay: self
                    .reconnect_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.reconnect.delay),
            },
            event_limit: self.event_limit.unwrap_or(DEFAULT_EVENT_LIMIT).max(1),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Service base URL, no trailing slash
    pub api_base_url: String,
    /// Client state directory (idea cache)
    pub home: PathBuf,
    /// Download directory
    pub downloads: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Session timing and retention
    pub session: SessionSettings,
    /// Idea length limit in characters
    pub max_idea_chars: usize,
}

impl ResolvedConfig {
    /// Path of the last-idea cache
    pub fn idea_cache(&self) -> PathBuf {
        self.home.join("last_idea.txt")
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".teamflow").join("config.yaml");
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

fn env_override(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from all sources, searching upward from `start`
fn load_config_from(start: &Path) -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".teamflow");

    let config_file = find_config_file(start);
    let file = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    // .teamflow/ and the project root around it
    let teamflow_dir = config_file.as_deref().and_then(Path::parent);
    let project_dir = teamflow_dir.and_then(Path::parent);

    let api_base_url = env_override(ENV_API_BASE_URL)
        .or_else(|| file.as_ref().and_then(|f| f.api.base_url.clone()))
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string();

    let home = if let Some(env_home) = env_override(ENV_HOME) {
        PathBuf::from(env_home)
    } else if let (Some(dir), Some(home)) = (
        teamflow_dir,
        file.as_ref().and_then(|f| f.paths.home.as_deref()),
    ) {
        resolve_path(dir, home)
    } else {
        default_home
    };

    let downloads = if let Some(env_downloads) = env_override(ENV_DOWNLOADS) {
        PathBuf::from(env_downloads)
    } else if let (Some(dir), Some(downloads)) = (
        project_dir,
        file.as_ref().and_then(|f| f.paths.downloads.as_deref()),
    ) {
        resolve_path(dir, downloads)
    } else {
        start.to_path_buf()
    };

    let session_config = file.as_ref().map(|f| f.session.clone()).unwrap_or_default();

    Ok(ResolvedConfig {
        api_base_url,
        home,
        downloads,
        config_file,
        session: session_config.settings(),
        max_idea_chars: session_config.max_idea_chars.unwrap_or(MAX_IDEA_CHARS),
    })
}

fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

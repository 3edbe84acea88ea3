use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::local_files::{self, FileSystem, DEFAULT_FILE_MODE};
use crate::paths;

/// Environment variable overriding `api_url`.
pub const API_URL_ENV: &str = "TASKPIPE_API_URL";

/// Root configuration structure for config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskpipeConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Architecture pipelines run on when `base.arch` is omitted.
    #[serde(default = "default_arch")]
    pub default_arch: String,

    /// Mode for newly written files, e.g. `"0644"`.
    #[serde(default = "default_file_mode")]
    pub default_file_mode: String,

    /// Where pipeline files live when no paths are given.
    #[serde(default = "default_pipeline_dir")]
    pub pipeline_dir: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for TaskpipeConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            default_arch: default_arch(),
            default_file_mode: default_file_mode(),
            pipeline_dir: default_pipeline_dir(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl TaskpipeConfig {
    /// Parsed `default_file_mode`.
    pub fn file_mode(&self) -> Result<u32> {
        let digits = self.default_file_mode.trim_start_matches("0o");
        u32::from_str_radix(digits, 8)
            .ok()
            .filter(|mode| *mode <= 0o7777)
            .ok_or_else(|| {
                Error::config_invalid_value(
                    "default_file_mode",
                    Some(self.default_file_mode.clone()),
                    "expected an octal permission mode such as 0644",
                )
            })
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_api_url() -> String {
    "https://cloud.taskpipe.dev".to_string()
}

fn default_arch() -> String {
    "x86_64".to_string()
}

fn default_file_mode() -> String {
    format!("{:04o}", DEFAULT_FILE_MODE)
}

fn default_pipeline_dir() -> String {
    ".taskpipe".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load config.json with environment overrides, falling back to defaults on any error.
pub fn load_config() -> TaskpipeConfig {
    let mut config = load_config_from_file().unwrap_or_default();
    apply_env(&mut config, std::env::var(API_URL_ENV).ok());
    config
}

fn apply_env(config: &mut TaskpipeConfig, api_url: Option<String>) {
    if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
        config.api_url = url.trim().trim_end_matches('/').to_string();
    }
}

/// Attempt to load config from config.json file.
fn load_config_from_file() -> Result<TaskpipeConfig> {
    let path = paths::config_json()?;

    if !path.exists() {
        return Err(Error::other("config.json not found"));
    }

    parse_config_file(&path)
}

fn parse_config_file(path: &Path) -> Result<TaskpipeConfig> {
    let content = local_files::local().read(path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))
}

/// Check if config.json file exists
pub fn config_exists() -> bool {
    paths::config_json().map(|p| p.exists()).unwrap_or(false)
}

/// Get the path to config.json (for display purposes)
pub fn config_path() -> Result<String> {
    Ok(paths::config_json()?.display().to_string())
}

/// Get built-in defaults (ignoring any file config)
pub fn builtin_defaults() -> TaskpipeConfig {
    TaskpipeConfig::default()
}

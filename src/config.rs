use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::SyncError;

pub const DEFAULT_DAILY_HOURS: f64 = 7.6;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    pub gitlab: Option<GitLabConfig>,
    pub time: Option<TimeConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct GitLabConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub project_id: Option<String>,
    pub group_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimeConfig {
    #[serde(default = "default_daily_hours")]
    pub base_daily_hours: f64,
    #[serde(default = "default_status_labels")]
    pub status_labels: Vec<String>,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            base_daily_hours: default_daily_hours(),
            status_labels: default_status_labels(),
        }
    }
}

fn default_daily_hours() -> f64 {
    DEFAULT_DAILY_HOURS
}

fn default_status_labels() -> Vec<String> {
    vec!["Doing".into(), "In Progress".into()]
}

/// Connection settings for one invocation, built once and handed to the
/// tracker client.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub url: String,
    pub token: String,
    pub project_id: String,
    pub group_id: String,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub url: Option<String>,
    pub token: Option<String>,
    pub project_id: Option<String>,
    pub group_id: Option<String>,
}

impl AppConfig {
    pub fn tracker_config(&self, overrides: &Overrides) -> Result<TrackerConfig, SyncError> {
        let file = self.gitlab.clone().unwrap_or_default();
        let pick = |cli: &Option<String>, file: Option<String>, name: &str| {
            cli.clone()
                .or(file)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| SyncError::Configuration(format!("missing gitlab {name}")))
        };
        Ok(TrackerConfig {
            url: pick(&overrides.url, file.url, "url")?
                .trim_end_matches('/')
                .to_string(),
            token: pick(&overrides.token, file.token, "token")?,
            project_id: pick(&overrides.project_id, file.project_id, "project_id")?,
            group_id: pick(&overrides.group_id, file.group_id, "group_id")?,
        })
    }

    pub fn time(&self) -> TimeConfig {
        self.time.clone().unwrap_or_default()
    }
}

fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".issue-sync")
}

pub fn load_config() -> Result<AppConfig> {
    load_config_from(config_path())
}

pub fn load_config_from(path: PathBuf) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig =
        toml::from_str(&contents).with_context(|| "Failed to parse config.toml")?;
    Ok(config)
}

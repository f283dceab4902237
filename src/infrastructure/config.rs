//! Configuration infrastructure
//!
//! Configuration is organized into two tiers:
//! 1. Worker settings (queue endpoint, pacing, poll ceiling, profile path)
//! 2. Target-site settings (entry URLs and candidate selector sets)
//!
//! Every field has a sensible default so the worker runs with no config file
//! at all; an optional JSON file and a couple of environment variables can
//! override the defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Environment variable pointing at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "REPLY_COURIER_CONFIG";
/// Environment variable overriding the queue server URL.
pub const SERVER_URL_ENV: &str = "REPLY_COURIER_SERVER_URL";

/// Name of the marker file that flips the session mode to unattended.
const FIRST_RUN_MARKER: &str = ".first_run_completed";

/// Complete worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Base URL of the hosted dashboard serving the job API.
    pub server_url: String,

    /// Seconds between polls of the pending-job endpoint.
    pub poll_interval_secs: u64,

    /// Consecutive empty polls before the process exits. Reset after any
    /// processed job.
    pub max_polls: u32,

    /// WebDriver endpoint the worker drives the browser through.
    pub webdriver_url: String,

    /// Persistent browser profile directory. Shared across job executions,
    /// never across concurrent processes.
    pub profile_dir: PathBuf,

    /// Ceiling for the interactive login wait, in seconds.
    pub login_timeout_secs: u64,

    /// Target-site surface: entry points and candidate selectors.
    pub target: TargetConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            poll_interval_secs: 10,
            max_polls: 1000,
            webdriver_url: "http://localhost:9515".to_string(),
            profile_dir: default_profile_dir(),
            login_timeout_secs: 15 * 60,
            target: TargetConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration: defaults, then the optional JSON file, then
    /// environment overrides.
    pub async fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());

        let mut config = if path.exists() {
            Self::from_file(&path).await?
        } else {
            info!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            config.server_url = url;
        }
        Ok(config)
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Marker file whose existence flips the next job into unattended mode.
    pub fn first_run_marker(&self) -> PathBuf {
        self.profile_dir.join(FIRST_RUN_MARKER)
    }
}

/// Entry surfaces and candidate selector sets for the target site.
///
/// These are data, not logic: ordered candidate lists tried first-to-last by
/// the driver, so a site markup change means editing the config rather than
/// the code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Login flow entry point.
    pub entry_url: String,
    /// Landing page of an authenticated session.
    pub home_url: String,
    /// Host fragment used by the URL-based login fallback check.
    pub host: String,
    /// Page markers that only render for a logged-in session.
    pub login_markers: Vec<String>,
    /// Candidate selectors for the reply affordance, in priority order.
    pub reply_selectors: Vec<String>,
    /// Candidate selectors for the compose text surface.
    pub compose_selectors: Vec<String>,
    /// Candidate selectors for the submit affordance.
    pub submit_selectors: Vec<String>,
    /// Markers that indicate the submission rendered. Advisory only.
    pub success_markers: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            entry_url: "https://x.com/i/flow/login".to_string(),
            home_url: "https://x.com/home".to_string(),
            host: "x.com".to_string(),
            login_markers: vec![
                "[data-testid='SideNav_AccountSwitcher_Button']".to_string(),
                "[data-testid='AppTabBar_Profile_Link']".to_string(),
                "[aria-label='Profile']".to_string(),
                "[data-testid='primaryColumn']".to_string(),
            ],
            reply_selectors: vec![
                "[data-testid='reply']".to_string(),
                "[aria-label*='Reply']".to_string(),
                "[data-testid='tweetButtonInline']".to_string(),
                "button[aria-label*='Reply']".to_string(),
            ],
            compose_selectors: vec![
                "[data-testid='tweetTextarea_0']".to_string(),
                "[contenteditable='true'][role='textbox']".to_string(),
                ".public-DraftEditor-content".to_string(),
                "[aria-label*='Post your reply']".to_string(),
                "div[contenteditable='true']".to_string(),
            ],
            submit_selectors: vec![
                "[data-testid='tweetButton']".to_string(),
                "[data-testid='tweetButtonInline']".to_string(),
                "[aria-label*='Reply']".to_string(),
                "[aria-label*='Post']".to_string(),
            ],
            success_markers: vec![
                "[data-testid='tweet']".to_string(),
                "[data-testid='cellInnerDiv']".to_string(),
            ],
        }
    }
}

fn default_profile_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".reply_courier_profile")
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reply-courier")
        .join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.max_polls, 1000);
        assert_eq!(config.login_timeout_secs, 900);
        assert!(!config.target.reply_selectors.is_empty());
        assert!(!config.target.login_markers.is_empty());
        assert!(
            config
                .first_run_marker()
                .ends_with(".first_run_completed")
        );
    }

    #[tokio::test]
    async fn partial_config_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"server_url": "https://desk.example.com"}"#).expect("write");

        let config = WorkerConfig::from_file(&path).await.expect("load");
        assert_eq!(config.server_url, "https://desk.example.com");
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.target.host, "x.com");
    }

    #[tokio::test]
    async fn invalid_config_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").expect("write");

        assert!(WorkerConfig::from_file(&path).await.is_err());
    }
}

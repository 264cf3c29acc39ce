//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use coop_timer_broadcaster::{BroadcasterConfig, Framing, TimerAction, DEFAULT_ADDRESS, DEFAULT_PORT};
use coop_timer_logwatch::DEFAULT_POLL_INTERVAL;

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "coop_timer_server.json";

/// Log file name inside the configured logs directory
pub const LOG_FILE_NAME: &str = "latest.log";

/// How a trigger recognizes its line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMatch {
    /// Phrase anywhere in the line
    Contains(String),
    /// Regex anchored at the start of the line
    Pattern(String),
}

/// A log trigger bound to a timer transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(rename = "match")]
    pub matcher: TriggerMatch,
    pub action: TimerAction,
}

impl TriggerConfig {
    fn contains(phrase: &str, action: TimerAction) -> Self {
        Self {
            matcher: TriggerMatch::Contains(phrase.to_string()),
            action,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_triggers() -> Vec<TriggerConfig> {
    vec![
        TriggerConfig::contains("Set the time to 0", TimerAction::Start),
        TriggerConfig::contains("Stopping the server", TimerAction::Reset),
    ]
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Listen address
    pub address: String,

    /// Listen port (0 picks a free port)
    pub port: u16,

    /// Shared secret for privileged client commands
    pub password: Option<String>,

    /// Directory holding `latest.log`
    pub logs: PathBuf,

    /// Message framing on client connections
    pub framing: Framing,

    /// Log polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Log triggers driving the timer
    pub triggers: Vec<TriggerConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            password: None,
            logs: PathBuf::from("logs"),
            framing: Framing::default(),
            poll_interval_ms: default_poll_interval_ms(),
            triggers: default_triggers(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from `path`, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let mut config: DaemonConfig = serde_json::from_str(contents)?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        if self.password.as_deref() == Some("") {
            tracing::warn!("Empty password disables privileged commands");
            self.password = None;
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = default_poll_interval_ms();
            tracing::warn!(
                "poll_interval_ms must be positive, using {}",
                self.poll_interval_ms
            );
        }
    }

    /// Path of the tailed log file
    pub fn log_file(&self) -> PathBuf {
        self.logs.join(LOG_FILE_NAME)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn broadcaster_config(&self) -> BroadcasterConfig {
        BroadcasterConfig {
            address: self.address.clone(),
            port: self.port,
            secret: self.password.clone(),
            framing: self.framing,
        }
    }
}

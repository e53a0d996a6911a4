use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Result;

/// A timer is either switched off or fires after a number of seconds.
///
/// ```json
/// "disabled"
/// { "after_secs": 900 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerSetting {
    #[default]
    Disabled,
    AfterSecs(u64),
}

impl TimerSetting {
    /// `None` when disabled; zero seconds counts as disabled.
    pub fn duration(self) -> Option<Duration> {
        match self {
            TimerSetting::Disabled | TimerSetting::AfterSecs(0) => None,
            TimerSetting::AfterSecs(secs) => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("roster.db"),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Forced logout after this long without user input.
    pub inactivity_timeout: TimerSetting,
    /// Period of the "is the local session token still there" check.
    pub liveness_check: TimerSetting,
    pub min_password_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: TimerSetting::Disabled,
            liveness_check: TimerSetting::Disabled,
            min_password_length: 6,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&text)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

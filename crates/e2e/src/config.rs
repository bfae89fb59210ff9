//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// Top-level harness configuration, usually read from `sail-e2e.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Application server under test
    pub server: ServerConfig,

    /// Browser driver selection
    pub drivers: DriverSettings,

    /// Remote AppMap recording
    pub recording: RecordingConfig,

    /// Retry policy for `js` examples
    pub retry: RetryConfig,

    /// State cleaner
    pub database: DatabaseConfig,

    /// Example ordering
    pub order: OrderConfig,
}

/// How to spawn the application server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Executable that boots the application
    pub command: PathBuf,

    /// Extra arguments passed to the command
    pub args: Vec<String>,

    /// Working directory for the process
    pub working_dir: Option<PathBuf>,

    /// Host the server binds to
    pub host: String,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// Name of the registered launcher to use
    pub launcher: String,

    /// Path polled until the server answers with 2xx
    pub health_path: String,

    /// Seconds to wait for the server to become healthy
    pub startup_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from("bin/rails"),
            args: vec!["server".to_string()],
            working_dir: Some(PathBuf::from("spec/dummy")),
            host: "127.0.0.1".to_string(),
            port: None,
            launcher: "sail_app".to_string(),
            health_path: "/sail".to_string(),
            startup_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Driver used for examples tagged `js`
    pub javascript_driver: String,

    /// WebDriver endpoint (chromedriver)
    pub webdriver_url: String,

    /// Upper bound for UI waits, in seconds
    pub max_wait_secs: u64,

    /// Where the chromedriver binary lives
    pub driver_dir: Option<PathBuf>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            javascript_driver: "headless_chrome".to_string(),
            webdriver_url: "http://127.0.0.1:9515".to_string(),
            max_wait_secs: 9999,
            driver_dir: None,
        }
    }
}

impl DriverSettings {
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Bracket feature examples with start/stop calls
    pub enabled: bool,

    /// Recorder route on the application server
    pub path: String,

    /// Where stop-call artifacts are written (None = discard)
    pub artifact_dir: Option<PathBuf>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/_appmap/record".to_string(),
            artifact_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts for `js` examples
    pub js_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { js_attempts: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database truncated before every example (None = no cleaning)
    pub path: Option<PathBuf>,

    /// Tables that survive truncation
    pub keep_tables: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            keep_tables: vec![
                "schema_migrations".to_string(),
                "ar_internal_metadata".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Shuffle examples before running
    pub random: bool,

    /// Fixed shuffle seed (None = pick one and log it)
    pub seed: Option<u64>,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            random: true,
            seed: None,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> E2eResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> E2eResult<String> {
        toml::to_string_pretty(self).map_err(|e| E2eError::InvalidConfig(e.to_string()))
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` to read variables
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let on_ci = lookup("ON_CI").map(|v| !v.is_empty()).unwrap_or(false);
        if on_ci {
            let home = lookup("HOME").unwrap_or_else(|| "~".to_string());
            let dir = PathBuf::from(home).join("bin").join("chromedriver");
            debug!("ON_CI set, chromedriver dir {}", dir.display());
            self.drivers.driver_dir = Some(dir);
        }
    }

    fn validate(&self) -> E2eResult<()> {
        if !self.recording.path.starts_with('/') {
            return Err(E2eError::InvalidConfig(format!(
                "recording.path must start with '/': {}",
                self.recording.path
            )));
        }
        if self.server.host.is_empty() {
            return Err(E2eError::InvalidConfig("server.host is empty".to_string()));
        }
        Ok(())
    }
}

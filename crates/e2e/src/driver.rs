//! Browser driver registration

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::{E2eError, E2eResult};

/// A named Chrome configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    pub name: String,
    pub args: Vec<String>,
}

impl DriverConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Visible Chrome window
    pub fn chrome() -> Self {
        Self::new("chrome")
    }

    /// Headless Chrome sized for the settings dashboard, sandbox disabled for CI containers
    pub fn headless_chrome() -> Self {
        Self::new("headless_chrome")
            .arg("--headless")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--window-size=1920,1180")
            .arg("--disable-gpu")
    }

    pub fn is_headless(&self) -> bool {
        self.args.iter().any(|a| a == "--headless" || a.starts_with("--headless="))
    }

    /// W3C new-session payload for this driver
    pub fn capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": self.args }
                }
            }
        })
    }
}

/// Drivers addressable by name
#[derive(Debug, Clone)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, DriverConfig>,
    javascript_driver: String,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let mut registry = Self {
            drivers: BTreeMap::new(),
            javascript_driver: "headless_chrome".to_string(),
        };
        registry.register(DriverConfig::chrome());
        registry.register(DriverConfig::headless_chrome());
        registry
    }
}

impl DriverRegistry {
    pub fn register(&mut self, driver: DriverConfig) {
        self.drivers.insert(driver.name.clone(), driver);
    }

    pub fn get(&self, name: &str) -> E2eResult<&DriverConfig> {
        self.drivers
            .get(name)
            .ok_or_else(|| E2eError::UnknownDriver(name.to_string()))
    }

    /// Select the driver used for `js` examples
    pub fn set_javascript_driver(&mut self, name: &str) -> E2eResult<()> {
        self.get(name)?;
        self.javascript_driver = name.to_string();
        Ok(())
    }

    pub fn javascript_driver(&self) -> E2eResult<&DriverConfig> {
        self.get(&self.javascript_driver)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DriverConfig> {
        self.drivers.values()
    }
}

//! Authenticated-user stubs for controller and feature examples

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The user the dashboard sees as signed in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: u64,
    pub is_admin: bool,
}

impl Identity {
    /// Admin user with id 1, used by every stubbed example
    pub fn stub() -> Self {
        Self {
            id: 1,
            is_admin: true,
        }
    }
}

/// Authentication middleware seen by controllers through the request env
pub trait Warden: Send + Sync {
    fn user(&self) -> Option<Identity>;
}

/// Warden that always answers with [`Identity::stub`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StubWarden;

impl Warden for StubWarden {
    fn user(&self) -> Option<Identity> {
        Some(Identity::stub())
    }
}

/// Per-request environment handed to controller examples
#[derive(Clone, Default)]
pub struct RequestEnv {
    vars: BTreeMap<String, String>,
    warden: Option<Arc<dyn Warden>>,
}

impl fmt::Debug for RequestEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEnv")
            .field("vars", &self.vars)
            .field("warden", &self.warden.is_some())
            .finish()
    }
}

impl RequestEnv {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set_warden(&mut self, warden: Arc<dyn Warden>) {
        self.warden = Some(warden);
    }

    pub fn warden(&self) -> Option<&dyn Warden> {
        self.warden.as_deref()
    }

    /// User resolved through the warden, if one is installed
    pub fn current_user(&self) -> Option<Identity> {
        self.warden.as_ref().and_then(|w| w.user())
    }
}

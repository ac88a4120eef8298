//! Client configuration from the process environment.

use crate::error::{FireflyError, Result};
use crate::portal::DEFAULT_GATEWAY_URL;
use crate::types::Identity;

pub const DEVICE_ID: &str = "DEVICE_ID";
pub const APP_ID: &str = "APP_ID";
pub const SCHOOL_CODE: &str = "SCHOOL_CODE";
pub const TOKEN: &str = "TOKEN";
pub const GATEWAY_URL: &str = "FIREFLY_GATEWAY_URL";

/// Inputs for [`SessionClient::connect`](crate::SessionClient::connect).
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub device_id: String,
    pub app_id: String,
    pub school_code: String,
    /// Persisted token. `None` starts the manual bootstrap flow.
    pub token: Option<String>,
    pub gateway_url: String,
}

impl ClientConfig {
    pub fn new(
        device_id: impl Into<String>,
        app_id: impl Into<String>,
        school_code: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            app_id: app_id.into(),
            school_code: school_code.into(),
            token,
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
        }
    }

    pub fn with_gateway_url(mut self, gateway_url: impl Into<String>) -> Self {
        self.gateway_url = gateway_url.into();
        self
    }

    /// Read the configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    ///
    /// `DEVICE_ID`, `APP_ID` and `SCHOOL_CODE` are required. An empty `TOKEN`
    /// counts as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(FireflyError::Config(key))
        };
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            device_id: required(DEVICE_ID)?,
            app_id: required(APP_ID)?,
            school_code: required(SCHOOL_CODE)?,
            token: optional(TOKEN),
            gateway_url: optional(GATEWAY_URL).unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
        })
    }

    pub fn identity(&self) -> Identity {
        Identity::new(&self.device_id, &self.app_id, &self.school_code)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("device_id", &self.device_id)
            .field("app_id", &self.app_id)
            .field("school_code", &self.school_code)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("gateway_url", &self.gateway_url)
            .finish()
    }
}

/// Load a `.env` file from the working directory or its parents, if present.
/// Variables already set in the environment win.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
}

/// Load a specific env file. Variables already set in the environment win.
pub fn load_dotenv_from(path: impl AsRef<std::path::Path>) -> bool {
    let path = path.as_ref();
    match dotenvy::from_path(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "loaded env file");
            true
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "env file not loaded");
            false
        }
    }
}

//! Domain types shared by the resolver, the session and the task fetcher.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who is calling: the registered device and app, and the tenant school.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub device_id: String,
    pub app_id: String,
    pub school_code: String,
}

impl Identity {
    pub fn new(device_id: impl Into<String>, app_id: impl Into<String>, school_code: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            app_id: app_id.into(),
            school_code: school_code.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Tenant base address resolved from the school directory.
///
/// Only `PortalResolver` produces one from a lookup, and only after the
/// directory confirmed the school exists and is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalAddress {
    pub scheme: Scheme,
    pub host: String,
}

impl PortalAddress {
    pub fn new(scheme: Scheme, host: impl Into<String>) -> Self {
        Self {
            scheme,
            host: host.into(),
        }
    }

    /// `scheme://host`, the prefix for every portal endpoint.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme.as_str(), self.host)
    }
}

impl fmt::Display for PortalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.host)
    }
}

/// One task record as returned by the listing endpoint.
///
/// The platform's task schema is wide and version-dependent, so the record
/// is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Task(pub serde_json::Value);

impl Task {
    pub fn id(&self) -> Option<&serde_json::Value> {
        self.0.get("id")
    }

    pub fn title(&self) -> Option<&str> {
        self.0.get("title").and_then(serde_json::Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }
}

/// Platform API version, displayed as `vX.Y.Z`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiVersion {
    pub major_version: String,
    pub minor_version: String,
    pub increment_version: String,
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{}.{}.{}",
            self.major_version, self.minor_version, self.increment_version
        )
    }
}

//! School code to tenant portal resolution.
//!
//! The directory answers with a small XML document:
//!
//! ```xml
//! <response exists="true" enabled="true">
//!     <name>Example School</name>
//!     <address ssl="true">example.fireflycloud.net</address>
//! </response>
//! ```

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{ApiError, FireflyError, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;
use crate::types::{PortalAddress, Scheme};

/// Production school directory.
pub const DEFAULT_GATEWAY_URL: &str = "https://appgateway.fireflysolutions.co.uk";

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    #[serde(rename = "@exists", default)]
    exists: Option<String>,
    #[serde(rename = "@enabled", default)]
    enabled: Option<String>,
    #[serde(default)]
    address: Option<AddressElement>,
}

#[derive(Debug, Deserialize)]
struct AddressElement {
    #[serde(rename = "@ssl", default)]
    ssl: Option<String>,
    #[serde(rename = "$text", default)]
    host: String,
}

/// Resolves school codes against the directory service.
#[derive(Debug, Clone)]
pub struct PortalResolver {
    gateway_url: String,
}

impl Default for PortalResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PortalResolver {
    pub fn new() -> Self {
        Self::with_gateway(DEFAULT_GATEWAY_URL)
    }

    /// Resolver against a non-production directory.
    pub fn with_gateway(gateway_url: &str) -> Self {
        Self {
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    pub fn build_lookup(&self, school_code: &str) -> HttpRequest {
        HttpRequest::get(format!(
            "{}/appgateway/school/{}",
            self.gateway_url,
            urlencoding::encode(school_code)
        ))
    }

    pub fn parse_lookup(&self, school_code: &str, response: HttpResponse) -> Result<PortalAddress> {
        parse_directory_entry(response).map_err(|source| FireflyError::invalid_school_code(school_code, source))
    }

    /// Look up `school_code` and return its validated portal address.
    pub fn resolve<T: Transport>(&self, transport: &T, school_code: &str) -> Result<PortalAddress> {
        if school_code.trim().is_empty() {
            return Err(FireflyError::invalid_school_code(
                school_code,
                ApiError::MissingField("school code"),
            ));
        }

        let response = transport
            .execute(self.build_lookup(school_code))
            .map_err(|source| FireflyError::invalid_school_code(school_code, source))?;

        match self.parse_lookup(school_code, response) {
            Ok(portal) => {
                info!(school_code, portal = %portal, "resolved school portal");
                Ok(portal)
            }
            Err(err) => {
                warn!(school_code, error = ?err, "school code did not resolve");
                Err(err)
            }
        }
    }
}

fn parse_directory_entry(response: HttpResponse) -> std::result::Result<PortalAddress, ApiError> {
    if !response.is_success() {
        return Err(ApiError::HttpError {
            status: response.status,
            body: response.body,
        });
    }

    let entry: DirectoryEntry =
        quick_xml::de::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))?;
    debug!(exists = ?entry.exists, enabled = ?entry.enabled, "directory entry");

    let exists = is_true(entry.exists.as_deref());
    let enabled = is_true(entry.enabled.as_deref());
    if !exists || !enabled {
        return Err(ApiError::PortalUnavailable { exists, enabled });
    }

    let address = entry.address.ok_or(ApiError::MissingField("address"))?;
    let host = address.host.trim();
    if host.is_empty() {
        return Err(ApiError::MissingField("address"));
    }

    let scheme = if address.ssl.as_deref() == Some("true") {
        Scheme::Https
    } else {
        Scheme::Http
    };
    Ok(PortalAddress::new(scheme, host))
}

fn is_true(flag: Option<&str>) -> bool {
    flag.is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
}

//! Error types for the Firefly client.
//!
//! # Design
//! `ApiError` says what went wrong on the wire: transport failure, an
//! unexpected status, a body that did not parse, or a protocol-level refusal.
//! `FireflyError` says which phase failed and is what public operations
//! return. Callers match on the phase; the cause is kept as the error source.

use thiserror::Error;

/// Low-level cause of a failed request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, connect, timeout, I/O).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body could not be deserialized into the expected shape.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The directory reported the school as missing or disabled.
    #[error("portal unavailable (exists: {exists}, enabled: {enabled})")]
    PortalUnavailable { exists: bool, enabled: bool },

    /// The token still holds the configuration template placeholder.
    #[error("token is the unfilled placeholder value")]
    PlaceholderToken,

    /// The verification endpoint answered `valid: false`.
    #[error("token was rejected by the portal")]
    TokenRejected,

    /// Verification succeeded but no session cookie came back.
    #[error("response carried no `{0}` cookie")]
    MissingCookie(&'static str),

    /// A required field or element was absent from an otherwise valid body.
    #[error("response is missing `{0}`")]
    MissingField(&'static str),
}

/// Errors returned by the public client operations.
#[derive(Debug, Error)]
pub enum FireflyError {
    /// The school code does not resolve to a live, enabled portal, or the
    /// directory lookup itself failed.
    #[error("invalid school code `{school_code}`")]
    InvalidSchoolCode {
        school_code: String,
        #[source]
        source: ApiError,
    },

    /// The token handshake could not establish a session.
    #[error("handshake failed")]
    Handshake(#[source] ApiError),

    /// The task listing request failed or returned an unexpected shape.
    #[error("task fetch failed")]
    Fetch(#[source] ApiError),

    /// The API version diagnostic failed.
    #[error("api version lookup failed")]
    Version(#[source] ApiError),

    /// A required configuration key is missing or empty.
    #[error("missing configuration value `{0}`")]
    Config(&'static str),
}

impl FireflyError {
    pub fn invalid_school_code(school_code: impl Into<String>, source: ApiError) -> Self {
        Self::InvalidSchoolCode {
            school_code: school_code.into(),
            source,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, FireflyError>;

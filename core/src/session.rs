//! Token handshake and session state.
//!
//! # Design
//! A client either holds a token or it does not. Without one, the portal has
//! to issue a token through a browser login, so the client stops in
//! `AwaitingManualToken` and hands the caller the login link as data. With
//! one, the client verifies it and keeps the `ASP.NET_SessionId` cookie the
//! portal returns. A rejected token is an error, never a state: the client
//! value is dropped rather than left half-authenticated.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, FireflyError, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::portal::PortalResolver;
use crate::tasks::TaskFetcher;
use crate::transport::Transport;
use crate::types::{ApiVersion, Identity, PortalAddress};

/// Token value shipped in the configuration template. Using it verbatim
/// means the template was never filled in.
pub const PLACEHOLDER_TOKEN: &str = "<REMOVE ME>";

/// Cookie the portal uses to carry the session.
pub const SESSION_COOKIE: &str = "ASP.NET_SessionId";

/// Where the handshake currently stands.
#[derive(Clone, PartialEq, Eq)]
pub enum SessionState {
    /// A token is held but has not been verified yet.
    Unauthenticated,
    /// No token: the user must open `bootstrap_url`, log in, and hand the
    /// issued token back through [`SessionClient::provide_token`].
    AwaitingManualToken { bootstrap_url: String },
    /// The token was verified and a session cookie obtained.
    Authenticated {
        session_id: String,
        ready_at: DateTime<Utc>,
    },
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unauthenticated => f.write_str("Unauthenticated"),
            SessionState::AwaitingManualToken { bootstrap_url } => f
                .debug_struct("AwaitingManualToken")
                .field("bootstrap_url", bootstrap_url)
                .finish(),
            SessionState::Authenticated { ready_at, .. } => f
                .debug_struct("Authenticated")
                .field("session_id", &"<redacted>")
                .field("ready_at", ready_at)
                .finish(),
        }
    }
}

/// Everything a dependent request needs to act as the authenticated user.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub portal: PortalAddress,
    pub device_id: String,
    pub app_id: String,
    token: String,
    session_id: String,
}

impl Credentials {
    pub fn new(
        portal: PortalAddress,
        device_id: impl Into<String>,
        app_id: impl Into<String>,
        token: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            portal,
            device_id: device_id.into(),
            app_id: app_id.into(),
            token: token.into(),
            session_id: session_id.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The session as a cookie mapping, `[(ASP.NET_SessionId, id)]`.
    pub fn cookies(&self) -> Vec<(&'static str, &str)> {
        vec![(SESSION_COOKIE, self.session_id.as_str())]
    }

    /// `Cookie` request header value.
    pub fn cookie_header(&self) -> String {
        format!("{SESSION_COOKIE}={}", self.session_id)
    }

    /// `ffauth_device_id` and `ffauth_secret` query parameters.
    pub fn auth_query(&self) -> String {
        auth_query(&self.device_id, &self.token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("portal", &self.portal)
            .field("device_id", &self.device_id)
            .field("app_id", &self.app_id)
            .field("token", &"<redacted>")
            .field("session_id", &"<redacted>")
            .finish()
    }
}

fn auth_query(device_id: &str, token: &str) -> String {
    format!(
        "ffauth_device_id={}&ffauth_secret={}",
        urlencoding::encode(device_id),
        urlencoding::encode(token)
    )
}

/// Verification verdict. `valid` is required but only a literal `false`
/// rejects the token.
#[derive(Deserialize)]
struct VerifyResponse {
    valid: serde_json::Value,
}

/// Client bound to one identity on one portal.
pub struct SessionClient<T> {
    identity: Identity,
    portal: PortalAddress,
    token: Option<String>,
    state: SessionState,
    transport: T,
}

impl<T: Transport> SessionClient<T> {
    /// Resolve the school's portal and run the handshake.
    ///
    /// A placeholder token fails before any request is sent.
    pub fn connect(config: &ClientConfig, transport: T) -> Result<Self> {
        reject_placeholder(config.token.as_deref())?;

        let resolver = PortalResolver::with_gateway(&config.gateway_url);
        let portal = resolver.resolve(&transport, &config.school_code)?;
        Self::initialize(config.identity(), config.token.clone(), portal, transport)
    }

    /// Run the handshake against an already resolved portal.
    ///
    /// Returns a client in `AwaitingManualToken` when `token` is absent, or
    /// an `Authenticated` one when the token verifies.
    pub fn initialize(identity: Identity, token: Option<String>, portal: PortalAddress, transport: T) -> Result<Self> {
        reject_placeholder(token.as_deref())?;
        let token = token.filter(|t| !t.is_empty());

        let mut client = Self {
            identity,
            portal,
            token,
            state: SessionState::Unauthenticated,
            transport,
        };

        if client.token.is_none() {
            let bootstrap_url = client.bootstrap_url();
            warn!(
                device_id = %client.identity.device_id,
                bootstrap_url = %bootstrap_url,
                "no token configured, user action required"
            );
            client.state = SessionState::AwaitingManualToken { bootstrap_url };
            return Ok(client);
        }

        client.verify()?;
        Ok(client)
    }

    /// Resume a client waiting for a manually obtained token.
    pub fn provide_token(mut self, token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        reject_placeholder(Some(&token))?;
        self.token = Some(token).filter(|t| !t.is_empty());
        self.state = SessionState::Unauthenticated;
        if !self.verify()? {
            self.state = SessionState::AwaitingManualToken {
                bootstrap_url: self.bootstrap_url(),
            };
        }
        Ok(self)
    }

    /// Verify the held token and establish a session.
    ///
    /// Returns `Ok(false)` when there is no token to verify. A rejected or
    /// unverifiable token is a `Handshake` error and leaves no session behind.
    pub fn verify(&mut self) -> Result<bool> {
        let Some(token) = self.token.as_deref() else {
            return Ok(false);
        };
        let request = self.build_verify(token);

        let outcome = self
            .transport
            .execute(request)
            .and_then(|response| self.parse_verify(response));

        match outcome {
            Ok(session_id) => {
                let ready_at = Utc::now();
                info!(device_id = %self.identity.device_id, %ready_at, "session established");
                self.state = SessionState::Authenticated { session_id, ready_at };
                Ok(true)
            }
            Err(source) => {
                warn!(device_id = %self.identity.device_id, error = %source, "token verification failed");
                self.state = SessionState::Unauthenticated;
                Err(FireflyError::Handshake(source))
            }
        }
    }

    /// Platform API version, a diagnostic that needs no session.
    pub fn api_version(&self) -> Result<ApiVersion> {
        let response = self
            .transport
            .execute(self.build_api_version())
            .map_err(FireflyError::Version)?;
        self.parse_api_version(response).map_err(FireflyError::Version)
    }

    /// A fetcher sharing this client's transport, or `None` before the
    /// handshake completed.
    pub fn task_fetcher(&self) -> Option<TaskFetcher<T>>
    where
        T: Clone,
    {
        self.credentials()
            .map(|credentials| TaskFetcher::new(credentials, self.transport.clone()))
    }
}

impl<T> SessionClient<T> {
    /// Login link that issues a token for this device and app.
    pub fn bootstrap_url(&self) -> String {
        let base = self.portal.base_url();
        let device_id = urlencoding::encode(&self.identity.device_id);
        let token_url = format!(
            "{base}/login/api/gettoken?ffauth_device_id={device_id}&ffauth_secret&device_id={device_id}&app_id={}",
            urlencoding::encode(&self.identity.app_id)
        );
        format!("{base}/login/login.aspx?prelogin={}", urlencoding::encode(&token_url))
    }

    pub fn build_verify(&self, token: &str) -> HttpRequest {
        HttpRequest::get(format!(
            "{}/login/api/verifytoken?{}",
            self.portal.base_url(),
            auth_query(&self.identity.device_id, token)
        ))
    }

    /// Session id from a verification response.
    pub fn parse_verify(&self, response: HttpResponse) -> std::result::Result<String, ApiError> {
        if !response.is_success() {
            return Err(ApiError::HttpError {
                status: response.status,
                body: response.body,
            });
        }
        let verdict: VerifyResponse =
            serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))?;
        if verdict.valid == serde_json::Value::Bool(false) {
            return Err(ApiError::TokenRejected);
        }
        response
            .cookie(SESSION_COOKIE)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(ApiError::MissingCookie(SESSION_COOKIE))
    }

    pub fn build_api_version(&self) -> HttpRequest {
        HttpRequest::get(format!("{}/login/api/version", self.portal.base_url()))
    }

    pub fn parse_api_version(&self, response: HttpResponse) -> std::result::Result<ApiVersion, ApiError> {
        if !response.is_success() {
            return Err(ApiError::HttpError {
                status: response.status,
                body: response.body,
            });
        }
        let version: ApiVersion =
            quick_xml::de::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))?;
        debug!(version = %version, "portal api version");
        Ok(version)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn portal(&self) -> &PortalAddress {
        &self.portal
    }

    /// Portal base URL, `scheme://host`.
    pub fn host(&self) -> String {
        self.portal.base_url()
    }

    pub fn device_id(&self) -> &str {
        &self.identity.device_id
    }

    pub fn app_id(&self) -> &str {
        &self.identity.app_id
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated { .. })
    }

    pub fn session_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated { session_id, .. } => Some(session_id),
            _ => None,
        }
    }

    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            SessionState::Authenticated { ready_at, .. } => Some(*ready_at),
            _ => None,
        }
    }

    /// Snapshot of the authenticated session for dependent fetchers.
    pub fn credentials(&self) -> Option<Credentials> {
        let (SessionState::Authenticated { session_id, .. }, Some(token)) = (&self.state, &self.token) else {
            return None;
        };
        Some(Credentials::new(
            self.portal.clone(),
            self.identity.device_id.clone(),
            self.identity.app_id.clone(),
            token.clone(),
            session_id.clone(),
        ))
    }
}

impl<T> fmt::Debug for SessionClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClient")
            .field("identity", &self.identity)
            .field("portal", &self.portal)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for SessionClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::AwaitingManualToken { .. } => "awaiting token",
            SessionState::Authenticated { .. } => "authenticated",
        };
        writeln!(f, "AppId: {}", self.identity.app_id)?;
        writeln!(f, "DeviceId: {}", self.identity.device_id)?;
        writeln!(f, "Code: {}", self.identity.school_code)?;
        writeln!(f, "Host: {}", self.portal)?;
        writeln!(f, "State: {state}")?;
        match self.ready_at() {
            Some(ready_at) => write!(f, "ReadyAt: {}", ready_at.to_rfc3339()),
            None => write!(f, "ReadyAt: -"),
        }
    }
}

fn reject_placeholder(token: Option<&str>) -> Result<()> {
    if token == Some(PLACEHOLDER_TOKEN) {
        warn!("configured token is the template placeholder");
        return Err(FireflyError::Handshake(ApiError::PlaceholderToken));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{json_response, verified_response, xml_response, ScriptedTransport};
    use crate::types::Scheme;

    fn identity() -> Identity {
        Identity::new("dev-123", "app-abc", "demo")
    }

    fn portal() -> PortalAddress {
        PortalAddress::new(Scheme::Https, "demo.fireflycloud.net")
    }

    fn connect(token: Option<&str>, transport: &ScriptedTransport) -> Result<SessionClient<ScriptedTransport>> {
        SessionClient::initialize(identity(), token.map(str::to_string), portal(), transport.clone())
    }

    #[test]
    fn placeholder_token_fails_before_any_request() {
        let transport = ScriptedTransport::new();
        let err = connect(Some(PLACEHOLDER_TOKEN), &transport).unwrap_err();
        assert!(matches!(err, FireflyError::Handshake(ApiError::PlaceholderToken)));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn placeholder_token_fails_before_portal_resolution() {
        let transport = ScriptedTransport::new();
        let config = ClientConfig::new("dev-123", "app-abc", "demo", Some(PLACEHOLDER_TOKEN.to_string()));
        let err = SessionClient::connect(&config, transport.clone()).unwrap_err();
        assert!(matches!(err, FireflyError::Handshake(ApiError::PlaceholderToken)));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn missing_token_awaits_manual_action() {
        let transport = ScriptedTransport::new();
        let client = connect(None, &transport).unwrap();

        assert_eq!(transport.request_count(), 0);
        assert!(!client.is_authenticated());
        assert!(client.session_id().is_none());
        assert!(client.ready_at().is_none());
        let SessionState::AwaitingManualToken { bootstrap_url } = client.state() else {
            panic!("expected AwaitingManualToken, got {:?}", client.state());
        };
        assert!(bootstrap_url.starts_with("https://demo.fireflycloud.net/login/login.aspx?prelogin="));
        assert!(bootstrap_url.contains("dev-123"));
        assert!(bootstrap_url.contains("app-abc"));
    }

    #[test]
    fn empty_token_is_treated_as_missing() {
        let transport = ScriptedTransport::new();
        let client = connect(Some(""), &transport).unwrap();
        assert!(matches!(client.state(), SessionState::AwaitingManualToken { .. }));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn bootstrap_url_embeds_encoded_token_request() {
        let transport = ScriptedTransport::new();
        let client = connect(None, &transport).unwrap();
        let url = client.bootstrap_url();

        let (_, prelogin) = url.split_once("prelogin=").unwrap();
        assert!(!prelogin.contains('?') && !prelogin.contains('&'), "inner url must be encoded");
        let inner = urlencoding::decode(prelogin).unwrap();
        assert_eq!(
            inner,
            "https://demo.fireflycloud.net/login/api/gettoken?ffauth_device_id=dev-123&ffauth_secret&device_id=dev-123&app_id=app-abc"
        );
    }

    #[test]
    fn valid_token_authenticates() {
        let transport = ScriptedTransport::new();
        transport.push(verified_response("sess-1"));
        let started = Utc::now();

        let client = connect(Some("tok"), &transport).unwrap();

        assert!(client.is_authenticated());
        assert_eq!(client.session_id(), Some("sess-1"));
        assert!(client.ready_at().unwrap() >= started);
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url,
            "https://demo.fireflycloud.net/login/api/verifytoken?ffauth_device_id=dev-123&ffauth_secret=tok"
        );
    }

    #[test]
    fn rejected_token_is_a_handshake_error() {
        let transport = ScriptedTransport::new();
        transport.push(json_response(200, r#"{"valid":false}"#));
        let err = connect(Some("tok"), &transport).unwrap_err();
        assert!(matches!(err, FireflyError::Handshake(ApiError::TokenRejected)));
    }

    #[test]
    fn non_success_status_is_a_handshake_error() {
        let transport = ScriptedTransport::new();
        transport.push(json_response(401, r#"{"valid":true}"#));
        let err = connect(Some("tok"), &transport).unwrap_err();
        assert!(matches!(err, FireflyError::Handshake(ApiError::HttpError { status: 401, .. })));
    }

    #[test]
    fn malformed_verification_body_is_a_handshake_error() {
        for body in ["not json", "{}", "[]"] {
            let transport = ScriptedTransport::new();
            transport.push(json_response(200, body));
            let err = connect(Some("tok"), &transport).unwrap_err();
            assert!(
                matches!(err, FireflyError::Handshake(ApiError::DeserializationError(_))),
                "{body}: {err:?}"
            );
        }
    }

    #[test]
    fn only_a_literal_false_rejects_the_token() {
        for body in [r#"{"valid":null}"#, r#"{"valid":"yes"}"#, r#"{"valid":1}"#, r#"{"valid":"false"}"#] {
            let transport = ScriptedTransport::new();
            let mut response = verified_response("s1");
            response.body = body.to_string();
            transport.push(response);

            let client = connect(Some("tok"), &transport).unwrap();

            assert!(client.is_authenticated(), "{body}");
            assert_eq!(client.session_id(), Some("s1"), "{body}");
        }
    }

    #[test]
    fn verification_without_cookie_is_a_handshake_error() {
        let transport = ScriptedTransport::new();
        transport.push(json_response(200, r#"{"valid":true}"#));
        let err = connect(Some("tok"), &transport).unwrap_err();
        assert!(matches!(err, FireflyError::Handshake(ApiError::MissingCookie(SESSION_COOKIE))));
    }

    #[test]
    fn failed_reverification_drops_the_session() {
        let transport = ScriptedTransport::new();
        transport.push(verified_response("sess-1"));
        transport.push(json_response(200, r#"{"valid":false}"#));
        let mut client = connect(Some("tok"), &transport).unwrap();

        assert!(client.verify().is_err());
        assert!(client.session_id().is_none());
        assert!(client.credentials().is_none());
    }

    #[test]
    fn provided_token_resumes_the_handshake() {
        let transport = ScriptedTransport::new();
        let client = connect(None, &transport).unwrap();
        transport.push(verified_response("sess-2"));

        let client = client.provide_token("fresh").unwrap();

        assert!(client.is_authenticated());
        assert_eq!(client.token(), Some("fresh"));
        assert_eq!(client.session_id(), Some("sess-2"));
    }

    #[test]
    fn provided_placeholder_is_rejected() {
        let transport = ScriptedTransport::new();
        let client = connect(None, &transport).unwrap();
        let err = client.provide_token(PLACEHOLDER_TOKEN).unwrap_err();
        assert!(matches!(err, FireflyError::Handshake(ApiError::PlaceholderToken)));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn credentials_expose_cookie_mapping() {
        let transport = ScriptedTransport::new();
        transport.push(verified_response("sess-1"));
        let client = connect(Some("tok"), &transport).unwrap();

        let credentials = client.credentials().unwrap();
        assert_eq!(credentials.cookies(), vec![(SESSION_COOKIE, "sess-1")]);
        assert_eq!(credentials.cookie_header(), "ASP.NET_SessionId=sess-1");
        assert_eq!(credentials.auth_query(), "ffauth_device_id=dev-123&ffauth_secret=tok");
        assert_eq!(credentials.token(), "tok");
    }

    #[test]
    fn secrets_are_redacted_from_debug_and_display() {
        let transport = ScriptedTransport::new();
        transport.push(verified_response("sess-secret"));
        let client = connect(Some("tok-secret"), &transport).unwrap();

        let rendered = format!("{client:?}\n{client}\n{:?}", client.credentials().unwrap());
        assert!(!rendered.contains("tok-secret"));
        assert!(!rendered.contains("sess-secret"));
        assert!(rendered.contains("State: authenticated"));
    }

    #[test]
    fn api_version_is_formatted() {
        let transport = ScriptedTransport::new();
        let client = connect(None, &transport).unwrap();
        transport.push(xml_response(
            200,
            "<version><majorVersion>6</majorVersion><minorVersion>12</minorVersion><incrementVersion>3</incrementVersion></version>",
        ));

        let version = client.api_version().unwrap();

        assert_eq!(version.to_string(), "v6.12.3");
        assert_eq!(transport.requests()[0].url, "https://demo.fireflycloud.net/login/api/version");
    }

    #[test]
    fn api_version_missing_element_fails() {
        let transport = ScriptedTransport::new();
        let client = connect(None, &transport).unwrap();
        transport.push(xml_response(200, "<version><majorVersion>6</majorVersion></version>"));
        let err = client.api_version().unwrap_err();
        assert!(matches!(err, FireflyError::Version(ApiError::DeserializationError(_))));
    }
}

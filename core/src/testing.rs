//! Scripted transport for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;

/// Replays queued responses in order and records every request it receives.
/// Clones share the same script and log.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Result<HttpResponse, ApiError>>>>,
    log: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, response: HttpResponse) {
        self.script.lock().unwrap().push_back(Ok(response));
    }

    pub(crate) fn push_error(&self, error: ApiError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.log.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Transport("no scripted response left".to_string())))
    }
}

pub(crate) fn xml_response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("content-type".to_string(), "application/xml".to_string())],
        body: body.to_string(),
    }
}

pub(crate) fn json_response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: body.to_string(),
    }
}

/// Successful verification carrying a session cookie.
pub(crate) fn verified_response(session_id: &str) -> HttpResponse {
    let mut response = json_response(200, r#"{"valid":true}"#);
    response.headers.push((
        "set-cookie".to_string(),
        format!("ASP.NET_SessionId={session_id}; path=/; HttpOnly"),
    ));
    response
}

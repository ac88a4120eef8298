//! Cached task listing.
//!
//! # Design
//! The fetcher owns its cache and nothing else: host and secrets come from an
//! immutable [`Credentials`] snapshot handed over by the session. The cache
//! only changes when a request fully succeeds, and only by replacement.
//!
//! The check-then-fetch-then-store sequence runs under one mutex, so
//! concurrent callers that miss the cache are serialized: the first issues
//! the request and later ones see its result.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{ApiError, FireflyError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::options::{FetchOptions, TaskFilter};
use crate::session::Credentials;
use crate::transport::Transport;
use crate::types::Task;

pub const TASK_LISTING_PATH: &str = "/api/v2/taskListing/view/student/tasks/all/filterBy";

#[derive(Deserialize)]
struct TaskListing {
    #[serde(default)]
    items: Option<Vec<Task>>,
}

#[derive(Debug)]
pub struct TaskFetcher<T> {
    credentials: Credentials,
    transport: T,
    cache: Mutex<Option<Arc<Vec<Task>>>>,
}

impl<T: Transport> TaskFetcher<T> {
    pub fn new(credentials: Credentials, transport: T) -> Self {
        Self {
            credentials,
            transport,
            cache: Mutex::new(None),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Tasks matching `options`, served from cache unless `options.force`.
    ///
    /// Pages are not followed: `page` and `page_size` go to the server as
    /// given. On failure the previous cache value is kept.
    pub fn fetch(&self, options: &FetchOptions) -> Result<Arc<Vec<Task>>> {
        let mut cache = self.lock_cache();
        if let Some(tasks) = cache.as_ref().filter(|_| !options.force) {
            debug!(count = tasks.len(), "task cache hit");
            return Ok(Arc::clone(tasks));
        }

        let filter = options.to_filter();
        debug!(force = options.force, ?filter, "fetching tasks");
        let tasks = self
            .build_fetch_tasks(&filter)
            .and_then(|request| self.transport.execute(request))
            .and_then(|response| self.parse_fetch_tasks(response))
            .map_err(|source| {
                warn!(error = %source, "task fetch failed, keeping cache");
                FireflyError::Fetch(source)
            })?;

        info!(count = tasks.len(), page = filter.page, "fetched tasks");
        let tasks = Arc::new(tasks);
        *cache = Some(Arc::clone(&tasks));
        Ok(tasks)
    }

    /// Current cache value, without touching the network.
    pub fn cached(&self) -> Option<Arc<Vec<Task>>> {
        self.lock_cache().clone()
    }

    pub fn build_fetch_tasks(&self, filter: &TaskFilter) -> std::result::Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(filter).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: format!(
                "{}{TASK_LISTING_PATH}?{}",
                self.credentials.portal.base_url(),
                self.credentials.auth_query()
            ),
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("cookie".to_string(), self.credentials.cookie_header()),
            ],
            body: Some(body),
        })
    }

    pub fn parse_fetch_tasks(&self, response: HttpResponse) -> std::result::Result<Vec<Task>, ApiError> {
        if !response.is_success() {
            return Err(ApiError::HttpError {
                status: response.status,
                body: response.body,
            });
        }
        let listing: TaskListing =
            serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))?;
        listing.items.ok_or(ApiError::MissingField("items"))
    }

    fn lock_cache(&self) -> MutexGuard<'_, Option<Arc<Vec<Task>>>> {
        // The cache is only ever replaced whole, so a poisoned value is still
        // a complete one.
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

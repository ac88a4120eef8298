//! In-memory stand-in for the Firefly directory and a single school portal.
//!
//! One server plays both roles: the directory's `address` for a live school
//! points back at the server itself, so a client resolves, verifies and
//! lists tasks against the same listener.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "ASP.NET_SessionId";
pub const TASK_LISTING_PATH: &str = "/api/v2/taskListing/view/student/tasks/all/filterBy";

/// Directory record for one school code.
#[derive(Clone, Debug)]
pub struct School {
    pub exists: bool,
    pub enabled: bool,
    pub ssl: bool,
    pub host: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u32,
    pub title: String,
    pub set_date: String,
    pub due_date: String,
    pub is_done: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortingCriterion {
    pub column: String,
    pub order: String,
}

/// Listing request body. Every field is required so a client that drops
/// one is rejected with 422.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    pub archive_status: String,
    pub completion_status: String,
    pub marking_status: String,
    pub owner_type: String,
    pub page: usize,
    pub page_size: usize,
    pub read_status: String,
    pub sorting_criteria: Vec<SortingCriterion>,
}

#[derive(Debug, Default)]
pub struct Platform {
    pub schools: HashMap<String, School>,
    /// Issued tokens by device id.
    pub tokens: HashMap<String, String>,
    /// Live sessions: session id to device id.
    pub sessions: HashMap<String, String>,
    pub tasks: Vec<Task>,
    pub version: (u32, u32, u32),
    /// Requests received by the listing endpoint, rejected ones included.
    pub task_requests: usize,
    pub last_filter: Option<TaskFilter>,
    /// Answer every listing request with 500.
    pub fail_task_listing: bool,
}

pub type Db = Arc<RwLock<Platform>>;

impl Platform {
    /// A platform whose live school `demo` is served at `portal_host`.
    ///
    /// Also registers `closed` (disabled), `gone` (no longer exists) and
    /// device `dev-123` holding token `tok`.
    pub fn demo(portal_host: &str) -> Self {
        let school = |exists, enabled| School {
            exists,
            enabled,
            ssl: false,
            host: portal_host.to_string(),
        };
        let task = |id, title: &str, set_date: &str, due_date: &str, is_done| Task {
            id,
            title: title.to_string(),
            set_date: set_date.to_string(),
            due_date: due_date.to_string(),
            is_done,
        };

        Self {
            schools: HashMap::from([
                ("demo".to_string(), school(true, true)),
                ("closed".to_string(), school(true, false)),
                ("gone".to_string(), school(false, false)),
            ]),
            tokens: HashMap::from([("dev-123".to_string(), "tok".to_string())]),
            tasks: vec![
                task(1, "Essay draft", "2024-01-08", "2024-01-15", false),
                task(2, "Lab report", "2024-01-02", "2024-01-20", true),
                task(3, "Reading log", "2024-01-10", "2024-01-12", false),
                task(4, "Map worksheet", "2024-01-05", "2024-01-30", true),
            ],
            version: (6, 12, 3),
            ..Self::default()
        }
    }
}

pub fn app(db: Db) -> Router {
    Router::new()
        .route("/appgateway/school/{code}", get(lookup_school))
        .route("/login/api/verifytoken", get(verify_token))
        .route("/login/api/version", get(api_version))
        .route(TASK_LISTING_PATH, post(list_tasks))
        .with_state(db)
}

pub async fn run(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app(db)).await
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

async fn lookup_school(State(db): State<Db>, Path(code): Path<String>) -> Response {
    let platform = db.read().await;
    let body = match platform.schools.get(&code) {
        Some(school) => format!(
            r#"<response exists="{}" enabled="{}"><name>{code}</name><address ssl="{}">{}</address></response>"#,
            school.exists, school.enabled, school.ssl, school.host
        ),
        None => r#"<response exists="false" enabled="false"/>"#.to_string(),
    };
    debug!(%code, "directory lookup");
    xml(body)
}

async fn verify_token(State(db): State<Db>, Query(params): Query<HashMap<String, String>>) -> Response {
    let device_id = params.get("ffauth_device_id").cloned().unwrap_or_default();
    let secret = params.get("ffauth_secret");

    let mut platform = db.write().await;
    if secret.is_none() || platform.tokens.get(&device_id) != secret {
        warn!(%device_id, "token rejected");
        return Json(json!({ "valid": false })).into_response();
    }

    let session_id = Uuid::new_v4().to_string();
    platform.sessions.insert(session_id.clone(), device_id.clone());
    info!(%device_id, "session issued");
    (
        [(header::SET_COOKIE, format!("{SESSION_COOKIE}={session_id}; path=/; HttpOnly"))],
        Json(json!({ "valid": true })),
    )
        .into_response()
}

async fn api_version(State(db): State<Db>) -> Response {
    let (major, minor, increment) = db.read().await.version;
    xml(format!(
        "<version><majorVersion>{major}</majorVersion><minorVersion>{minor}</minorVersion><incrementVersion>{increment}</incrementVersion></version>"
    ))
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE).then(|| value.to_string())
        })
}

async fn list_tasks(
    State(db): State<Db>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(filter): Json<TaskFilter>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let mut platform = db.write().await;
    platform.task_requests += 1;
    platform.last_filter = Some(filter.clone());

    if platform.fail_task_listing {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    let device_id = params.get("ffauth_device_id").ok_or(StatusCode::UNAUTHORIZED)?;
    if platform.tokens.get(device_id) != params.get("ffauth_secret") {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let session = session_cookie(&headers).ok_or(StatusCode::UNAUTHORIZED)?;
    if platform.sessions.get(&session) != Some(device_id) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let mut tasks: Vec<Task> = platform
        .tasks
        .iter()
        .filter(|task| match filter.completion_status.as_str() {
            "Todo" => !task.is_done,
            "DoneOrArchived" => task.is_done,
            _ => true,
        })
        .cloned()
        .collect();
    // Stable sorts applied last-criterion-first give a multi-key ordering.
    for criterion in filter.sorting_criteria.iter().rev() {
        tasks.sort_by(|a, b| {
            let ordering = match criterion.column.as_str() {
                "SetDate" => a.set_date.cmp(&b.set_date),
                "DueDate" => a.due_date.cmp(&b.due_date),
                _ => Ordering::Equal,
            };
            if criterion.order == "Descending" {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    let total = tasks.len();
    let items: Vec<Task> = tasks
        .into_iter()
        .skip(filter.page * filter.page_size)
        .take(filter.page_size)
        .collect();
    debug!(total, returned = items.len(), "task listing");
    Ok(Json(json!({ "items": items, "totalCount": total })))
}

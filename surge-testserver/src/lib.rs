use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_ROOT: &str = "/";
pub const PATH_JSON: &str = "/json";
pub const PATH_USER: &str = "/user/{id}";
pub const PATH_QUERY: &str = "/query";
pub const PATH_SLOW: &str = "/slow";

/// Request counters for test assertions.
#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    json_posts_total: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_json_posts_total(&self) {
        self.json_posts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// POST /json requests that carried a JSON content type and a parseable body.
    pub fn json_posts_total(&self) -> u64 {
        self.json_posts_total.load(Ordering::Relaxed)
    }
}

/// Local HTTP target mirroring the routes the built-in journey hits.
pub struct TestServer {
    addr: SocketAddr,
    stats: TestServerStats,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> anyhow::Result<Self> {
        let stats = TestServerStats::default();

        let app = Router::new()
            .route(PATH_ROOT, get(root))
            .route(PATH_JSON, get(json_get).post(json_post))
            .route(PATH_USER, get(user))
            .route(PATH_QUERY, get(query))
            .route(PATH_SLOW, get(slow))
            .with_state(stats.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
        });

        Ok(Self {
            addr,
            stats,
            shutdown: Some(tx),
            handle,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

async fn root(State(stats): State<TestServerStats>) -> &'static str {
    stats.inc_requests_total();
    "Hello, World!"
}

async fn json_get(State(stats): State<TestServerStats>) -> Json<Value> {
    stats.inc_requests_total();
    Json(json!({ "message": "Hello, World!", "status": "ok" }))
}

async fn json_post(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, StatusCode> {
    stats.inc_requests_total();

    let is_json = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !is_json {
        return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    let data: Value = serde_json::from_str(&body).map_err(|_| StatusCode::BAD_REQUEST)?;
    stats.inc_json_posts_total();
    Ok(Json(data))
}

async fn user(
    State(stats): State<TestServerStats>,
    Path(id): Path<String>,
) -> Json<Value> {
    stats.inc_requests_total();
    Json(json!({ "id": id, "name": format!("User {id}") }))
}

async fn query(
    State(stats): State<TestServerStats>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    stats.inc_requests_total();
    let name = params.get("name").cloned().unwrap_or_default();
    Json(json!({ "name": name }))
}

#[derive(Debug, serde::Deserialize)]
struct SlowParams {
    ms: Option<u64>,
}

async fn slow(
    State(stats): State<TestServerStats>,
    Query(params): Query<SlowParams>,
) -> &'static str {
    stats.inc_requests_total();
    sleep(Duration::from_millis(params.ms.unwrap_or(100))).await;
    "slow ok"
}

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::Client;
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls;
use tokio_rustls::rustls::pki_types::pem::PemObject;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use uuid::Uuid;

use entrance_relay::config::Config;
use entrance_relay::dispatcher::{self, Dispatcher};
use entrance_relay::models::{AttemptGradedEvent, AttemptSnapshot, QuizSnapshot, Settings};
use entrance_relay::state::{AppState, SharedState};
use entrance_relay::store::MemoryStore;

pub const ADMIN_TOKEN: &str = "test-admin-token";

// ── Mock analysis API ───────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
}

impl MockResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn confirmed() -> Self {
        Self::json(200, json!({ "success": true }))
    }
}

struct MockState {
    /// Served in order; the last entry repeats forever.
    script: Mutex<VecDeque<MockResponse>>,
    hits: AtomicUsize,
    bodies: Mutex<Vec<Value>>,
    content_types: Mutex<Vec<String>>,
}

/// A stand-in for the analysis API listening on a random local port.
pub struct MockApi {
    pub url: String,
    state: Arc<MockState>,
}

impl MockApi {
    pub async fn spawn(script: Vec<MockResponse>) -> Self {
        assert!(!script.is_empty(), "mock API needs at least one response");

        let state = Arc::new(MockState {
            script: Mutex::new(script.into()),
            hits: AtomicUsize::new(0),
            bodies: Mutex::new(Vec::new()),
            content_types: Mutex::new(Vec::new()),
        });

        let app = axum::Router::new()
            .route("/analyze-and-enroll", axum::routing::post(mock_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock API");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock API failed");
        });

        Self {
            url: format!("http://{addr}/analyze-and-enroll"),
            state,
        }
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.state.bodies.lock().unwrap().clone()
    }

    pub fn content_types(&self) -> Vec<String> {
        self.state.content_types.lock().unwrap().clone()
    }
}

async fn mock_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    if let Some(ct) = headers.get("content-type").and_then(|v| v.to_str().ok()) {
        state.content_types.lock().unwrap().push(ct.to_string());
    }
    if let Ok(value) = serde_json::from_slice::<Value>(&body) {
        state.bodies.lock().unwrap().push(value);
    }

    let next = {
        let mut script = state.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    };

    (
        StatusCode::from_u16(next.status).unwrap(),
        [("content-type", "application/json")],
        next.body,
    )
        .into_response()
}

/// A URL on which nothing listens, so every request fails to connect.
pub async fn refused_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/analyze-and-enroll")
}

/// An API endpoint that answers every POST with a redirect to a page that
/// claims success. Returns the URL and a counter of landing-page hits.
pub async fn redirecting_url(code: u16) -> (String, Arc<AtomicUsize>) {
    let landing_hits = Arc::new(AtomicUsize::new(0));
    let status = StatusCode::from_u16(code).unwrap();

    let counter = landing_hits.clone();
    let app = axum::Router::new()
        .route(
            "/analyze-and-enroll",
            axum::routing::post(move || async move { (status, [("location", "/landing")]) }),
        )
        .route(
            "/landing",
            axum::routing::any(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    axum::Json(json!({ "success": true }))
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Redirecting API failed");
    });

    (format!("http://{addr}/analyze-and-enroll"), landing_hits)
}

/// Reads one HTTP/1.1 request (headers plus a `Content-Length` body).
async fn read_request<S>(stream: &mut S) -> std::io::Result<()>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + length {
            return Ok(());
        }
    }
}

/// An endpoint that sends a 200 with a partial body and then stalls, so the
/// client's timeout fires while the body is being read.
pub struct StalledApi {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl StalledApi {
    pub async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let counter = counter.clone();
                tokio::spawn(async move {
                    if read_request(&mut stream).await.is_err() {
                        return;
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    let head = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{\"succ";
                    if stream.write_all(head.as_bytes()).await.is_err() {
                        return;
                    }
                    let _ = stream.flush().await;
                    tokio::time::sleep(Duration::from_secs(60)).await;
                });
            }
        });

        Self {
            url: format!("http://{addr}/analyze-and-enroll"),
            hits,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

const SELF_SIGNED_CERT: &[u8] = include_bytes!("../fixtures/self_signed.crt");
const SELF_SIGNED_KEY: &[u8] = include_bytes!("../fixtures/self_signed.key");

/// An HTTPS endpoint presenting a self-signed certificate. Every request that
/// completes the handshake gets `{"success": true}`.
pub async fn self_signed_url() -> String {
    let certs = CertificateDer::pem_slice_iter(SELF_SIGNED_CERT)
        .collect::<Result<Vec<_>, _>>()
        .expect("fixture certificate parses");
    let key = PrivateKeyDer::from_pem_slice(SELF_SIGNED_KEY).expect("fixture key parses");
    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::aws_lc_rs::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .expect("fixture certificate is usable");
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                // A verifying client aborts the handshake here.
                let Ok(mut stream) = acceptor.accept(tcp).await else {
                    return;
                };
                if read_request(&mut stream).await.is_err() {
                    return;
                }
                let body = json!({ "success": true }).to_string();
                let resp = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("https://127.0.0.1:{}/analyze-and-enroll", addr.port())
}

// ── Fixtures ────────────────────────────────────────────────────

pub fn settings_for(api_url: Option<&str>) -> Settings {
    Settings {
        api_url: api_url.map(str::to_string),
        entry_test_id: 2,
        timeout: 5,
        retry_attempts: 3,
        ssl_verify: false,
    }
}

pub fn finished_event(user_id: i64, quiz_id: i64, attempt_id: i64) -> AttemptGradedEvent {
    event_with_state(user_id, quiz_id, attempt_id, "finished")
}

pub fn event_with_state(
    user_id: i64,
    quiz_id: i64,
    attempt_id: i64,
    state: &str,
) -> AttemptGradedEvent {
    AttemptGradedEvent {
        attempt: Some(AttemptSnapshot {
            id: attempt_id,
            userid: user_id,
            state: state.to_string(),
        }),
        quiz: Some(QuizSnapshot { id: quiz_id }),
    }
}

pub fn event_json(user_id: i64, quiz_id: i64, attempt_id: i64, state: &str) -> Value {
    json!({
        "attempt": { "id": attempt_id, "userid": user_id, "state": state },
        "quiz": { "id": quiz_id },
    })
}

pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        admin_token: ADMIN_TOKEN.to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        log_level: "warn".to_string(),
        dispatch_interval: Duration::from_secs(3600),
        retrigger_delay: Duration::from_millis(200),
    }
}

/// Dispatcher over the given memory store with no delay between retries.
pub fn fast_dispatcher(store: &Arc<MemoryStore>) -> Dispatcher {
    Dispatcher::new(store.clone(), store.clone()).with_retry_delay(Duration::ZERO)
}

// ── Running service ─────────────────────────────────────────────

/// A running service instance backed by a memory store.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub store: Arc<MemoryStore>,
    pub state: SharedState,
    shutdown: watch::Sender<bool>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn post_event(&self, event: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/events/attempt-graded"))
            .json(event)
            .send()
            .await
            .expect("event request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn post_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn put_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("put request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Spawn the service on a random port with its drain loop running.
pub async fn spawn_app(settings: Settings) -> TestApp {
    let store = Arc::new(MemoryStore::with_settings(settings));
    let state: SharedState = Arc::new(
        AppState::new(test_config(), store.clone(), store.clone())
            .with_dispatcher(fast_dispatcher(&store)),
    );

    let app = entrance_relay::router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    let (shutdown, shutdown_rx) = watch::channel(false);
    dispatcher::spawn(state.clone(), shutdown_rx);

    TestApp {
        addr,
        client: Client::new(),
        store,
        state,
        shutdown,
    }
}

/// Poll `check` until it returns true or the deadline passes.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

// ── Postgres ────────────────────────────────────────────────────

pub struct TestDb {
    pub pool: PgPool,
    pub db_name: String,
    admin_url: String,
}

/// Create a throwaway database with migrations applied. Returns `None` when
/// `DATABASE_URL` is not set so Postgres-backed tests can be skipped.
pub async fn test_db() -> Option<TestDb> {
    let _ = dotenvy::dotenv();

    let base_url = std::env::var("DATABASE_URL").ok()?;

    let db_name = format!("entrance_test_{}", Uuid::now_v7().to_string().replace('-', ""));

    let admin_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.clone());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url)
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let test_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    Some(TestDb {
        pool,
        db_name,
        admin_url,
    })
}

/// Drop the test database.
pub async fn cleanup(db: TestDb) {
    db.pool.close().await;

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&db.admin_url)
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", db.db_name))
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;
}

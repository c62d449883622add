//! In-process stand-in for the telephony platform: OAuth token endpoint,
//! voicemail REST surface and a push-notification websocket.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Form, Json, Router};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use shared_types::Session;
use widget_core::session::PopupLauncher;
use widget_core::storage::{KeyValueStore, MemoryStore};
use widget_core::token_store::TokenStore;
use widget_core::{AuthError, Widget, WidgetConfig, WidgetDeps};

pub const ACCESS_TOKEN: &str = "token-1";
pub const HOST_ORIGIN: &str = "http://widget.test";
pub const USER_ID: &str = "user-1";
const CLOSE_SENTINEL: &str = "__close__";

#[derive(Default)]
pub struct PlatformState {
    pub addr: Mutex<Option<SocketAddr>>,
    pub records: Mutex<Vec<Value>>,
    pub search_requests: Mutex<Vec<Value>>,
    pub token_requests: Mutex<Vec<HashMap<String, String>>>,
    pub patches: Mutex<Vec<(String, Value)>>,
    pub subscriptions: Mutex<Vec<Value>>,
    pub media_requests: AtomicUsize,
    pub channel_connects: AtomicUsize,
    pub channel_requests: AtomicUsize,
    /// Every REST call answers 401.
    pub reject_all: AtomicBool,
    /// PATCH calls answer 500.
    pub fail_patches: AtomicBool,
    /// Media lookups answer 500.
    pub fail_media: AtomicBool,
    /// Channel creation answers 503.
    pub fail_channels: AtomicBool,
    /// Search responses for this page number are held back.
    pub slow_page: AtomicU32,
    pub push: Mutex<Option<broadcast::Sender<String>>>,
}

impl PlatformState {
    pub fn search_count(&self) -> usize {
        self.search_requests.lock().unwrap().len()
    }

    pub fn last_search_page(&self) -> Option<u64> {
        self.search_requests
            .lock()
            .unwrap()
            .last()
            .and_then(|body| body["pageNumber"].as_u64())
    }
}

pub struct MockPlatform {
    pub addr: SocketAddr,
    pub state: Arc<PlatformState>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for MockPlatform {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl MockPlatform {
    pub async fn start(record_count: usize) -> Self {
        let state = Arc::new(PlatformState::default());
        *state.records.lock().unwrap() = (0..record_count).map(record).collect();
        let (push_tx, _) = broadcast::channel(64);
        *state.push.lock().unwrap() = Some(push_tx);

        let app = Router::new()
            .route("/oauth/token", post(token))
            .route("/api/v2/voicemail/search", post(search))
            .route("/api/v2/voicemail/messages/{id}", patch(update_message))
            .route("/api/v2/voicemail/messages/{id}/media", get(media))
            .route("/api/v2/users/me", get(users_me))
            .route("/api/v2/notifications/channels", post(create_channel))
            .route(
                "/api/v2/notifications/channels/{id}/subscriptions",
                post(subscribe),
            )
            .route("/channel", get(channel_socket))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get addr");
        *state.addr.lock().unwrap() = Some(addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .await
                .expect("Server failed");
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn config(&self) -> WidgetConfig {
        WidgetConfig {
            client_id: "test-client".to_string(),
            login_base_url: format!("http://{}", self.addr),
            api_base_url: format!("http://{}/api/v2", self.addr),
            redirect_uri: format!("{HOST_ORIGIN}/oauth/callback"),
            host_origin: HOST_ORIGIN.to_string(),
            page_size: 2,
            settle_delay: Duration::from_millis(20),
            refresh_debounce: Duration::from_millis(80),
            reconnect_backoff: Duration::from_millis(100),
            http_timeout: Duration::from_secs(5),
            ..WidgetConfig::default()
        }
    }

    /// Send a text frame to every connected notification socket.
    pub fn push(&self, frame: Value) {
        self.send_raw(frame.to_string());
    }

    /// Ask every connected notification socket to close from the server side.
    pub fn close_sockets(&self) {
        self.send_raw(CLOSE_SENTINEL.to_string());
    }

    fn send_raw(&self, text: String) {
        if let Some(tx) = self.state.push.lock().unwrap().as_ref() {
            let _ = tx.send(text);
        }
    }
}

/// Voicemail `idx`; newer ids sort first.
pub fn record(idx: usize) -> Value {
    let id = ((b'a' + idx as u8) as char).to_string();
    let created = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
        - ChronoDuration::minutes(idx as i64);
    json!({
        "id": id,
        "callerAddress": format!("tel:+1317555000{idx}"),
        "createdDate": created.to_rfc3339(),
        "audioRecordingDurationSeconds": 30 + idx,
        "read": false,
        "note": "",
        "deleted": false,
    })
}

pub fn voicemail_frame() -> Value {
    json!({
        "topicName": format!("v2.users.{USER_ID}.voicemail.messages"),
        "eventBody": { "id": "a" },
    })
}

// ── Handlers ──────────────────────────────────────────────────────────────

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "expired" }))).into_response()
}

async fn token(
    State(state): State<Arc<PlatformState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_requests.lock().unwrap().push(form);
    Json(json!({
        "access_token": ACCESS_TOKEN,
        "expires_in": 3600,
        "token_type": "bearer",
    }))
    .into_response()
}

async fn search(State(state): State<Arc<PlatformState>>, Json(body): Json<Value>) -> Response {
    state.search_requests.lock().unwrap().push(body.clone());
    if state.reject_all.load(Ordering::SeqCst) {
        return unauthorized();
    }

    let page_number = body["pageNumber"].as_u64().unwrap_or(1) as usize;
    let page_size = body["pageSize"].as_u64().unwrap_or(10).max(1) as usize;

    if state.slow_page.load(Ordering::SeqCst) as usize == page_number {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    let live: Vec<Value> = state
        .records
        .lock()
        .unwrap()
        .iter()
        .filter(|r| !r["deleted"].as_bool().unwrap_or(false))
        .cloned()
        .collect();
    let page_count = live.len().div_ceil(page_size);
    let entities: Vec<Value> = live
        .iter()
        .skip((page_number - 1) * page_size)
        .take(page_size)
        .cloned()
        .collect();

    Json(json!({
        "entities": entities,
        "pageNumber": page_number,
        "pageCount": page_count,
        "total": live.len(),
    }))
    .into_response()
}

async fn update_message(
    State(state): State<Arc<PlatformState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    state.patches.lock().unwrap().push((id.clone(), body.clone()));
    if state.reject_all.load(Ordering::SeqCst) {
        return unauthorized();
    }
    if state.fail_patches.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }

    let mut records = state.records.lock().unwrap();
    let Some(found) = records.iter_mut().find(|r| r["id"] == id.as_str()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let (Some(target), Some(changes)) = (found.as_object_mut(), body.as_object()) {
        for (key, value) in changes {
            target.insert(key.clone(), value.clone());
        }
    }
    Json(found.clone()).into_response()
}

async fn media(State(state): State<Arc<PlatformState>>, Path(id): Path<String>) -> Response {
    state.media_requests.fetch_add(1, Ordering::SeqCst);
    if state.reject_all.load(Ordering::SeqCst) {
        return unauthorized();
    }
    if state.fail_media.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "media store down").into_response();
    }
    Json(json!({ "mediaFileUri": format!("https://media.test/{id}.mp3") })).into_response()
}

async fn users_me(State(state): State<Arc<PlatformState>>) -> Response {
    if state.reject_all.load(Ordering::SeqCst) {
        return unauthorized();
    }
    Json(json!({ "id": USER_ID })).into_response()
}

async fn create_channel(State(state): State<Arc<PlatformState>>) -> Response {
    state.channel_requests.fetch_add(1, Ordering::SeqCst);
    if state.reject_all.load(Ordering::SeqCst) {
        return unauthorized();
    }
    if state.fail_channels.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "try later").into_response();
    }
    let addr = state.addr.lock().unwrap().expect("server address recorded");
    Json(json!({
        "id": "channel-1",
        "connectUri": format!("ws://{addr}/channel"),
    }))
    .into_response()
}

async fn subscribe(
    State(state): State<Arc<PlatformState>>,
    Path(_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if state.reject_all.load(Ordering::SeqCst) {
        return unauthorized();
    }
    state.subscriptions.lock().unwrap().push(body.clone());
    Json(json!({ "entities": body })).into_response()
}

async fn channel_socket(
    State(state): State<Arc<PlatformState>>,
    ws: WebSocketUpgrade,
) -> Response {
    state.channel_connects.fetch_add(1, Ordering::SeqCst);
    let rx = state
        .push
        .lock()
        .unwrap()
        .as_ref()
        .expect("push channel")
        .subscribe();
    ws.on_upgrade(move |socket| relay_frames(socket, rx))
}

async fn relay_frames(mut socket: WebSocket, mut rx: broadcast::Receiver<String>) {
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Ok(text) if text == CLOSE_SENTINEL => {
                    let _ = socket.send(WsMessage::Close(None)).await;
                    break;
                }
                Ok(text) => {
                    if socket.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

// ── Widget side ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingLauncher {
    pub opened: Mutex<Vec<String>>,
}

impl RecordingLauncher {
    pub fn count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<String> {
        self.opened.lock().unwrap().last().cloned()
    }
}

impl PopupLauncher for RecordingLauncher {
    fn open(&self, url: &str) -> Result<(), AuthError> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub widget: Widget,
    pub launcher: Arc<RecordingLauncher>,
    pub durable: Arc<MemoryStore>,
}

impl Harness {
    pub fn tokens(&self) -> TokenStore {
        TokenStore::new(self.durable.clone() as Arc<dyn KeyValueStore>)
    }
}

/// Mount a widget against `platform`, optionally with a valid stored session.
pub async fn mount(platform: &MockPlatform, signed_in: bool) -> Harness {
    init_tracing();
    let durable = Arc::new(MemoryStore::new());
    if signed_in {
        TokenStore::new(durable.clone()).write(&Session::from_expires_in(
            ACCESS_TOKEN.to_string(),
            3600,
            Utc::now().timestamp_millis(),
        ));
    }
    let launcher = Arc::new(RecordingLauncher::default());
    let widget = Widget::mount(
        &platform.config(),
        WidgetDeps {
            durable_store: durable.clone(),
            tab_store: Arc::new(MemoryStore::new()),
            launcher: launcher.clone(),
        },
    )
    .await
    .expect("widget mounts");

    Harness {
        widget,
        launcher,
        durable,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

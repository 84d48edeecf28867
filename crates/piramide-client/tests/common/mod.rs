//! In-process stand-in for the confession wall backend.
//!
//! Serves the descriptor, the REST surface (under a configurable prefix) and
//! the `/ws` change channel on 127.0.0.1 with an ephemeral port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use tokio::sync::broadcast;

pub struct FakeOptions {
    pub api_prefix: String,
    pub votes_supported: bool,
    pub rejected_word: Option<String>,
    pub replies_override: Option<Value>,
    /// Holds every replies listing back this long.
    pub replies_delay: Option<Duration>,
}

impl Default for FakeOptions {
    fn default() -> Self {
        Self {
            api_prefix: "/api".to_string(),
            votes_supported: true,
            rejected_word: None,
            replies_override: None,
            replies_delay: None,
        }
    }
}

pub struct FakeState {
    opts: FakeOptions,
    descriptor_target: Mutex<String>,
    posts: Mutex<Vec<Value>>,
    replies: Mutex<HashMap<String, Vec<Value>>>,
    next_id: AtomicUsize,
    offline: AtomicBool,
    changes: broadcast::Sender<String>,
    pub hits: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub ws_connections: AtomicUsize,
    pub submissions: Mutex<Vec<Value>>,
    pub votes: Mutex<Vec<(String, Value)>>,
    pub reports: Mutex<Vec<(String, Value)>>,
    pub descriptor_queries: Mutex<Vec<HashMap<String, String>>>,
}

pub struct FakeBackend {
    pub addr: SocketAddr,
    pub state: Arc<FakeState>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        Self::start_with(FakeOptions::default()).await
    }

    pub async fn start_with(opts: FakeOptions) -> Self {
        let (changes, _) = broadcast::channel(64);
        let prefix = opts.api_prefix.clone();
        let state = Arc::new(FakeState {
            opts,
            descriptor_target: Mutex::new(String::new()),
            posts: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            offline: AtomicBool::new(false),
            changes,
            hits: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            ws_connections: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            votes: Mutex::new(Vec::new()),
            reports: Mutex::new(Vec::new()),
            descriptor_queries: Mutex::new(Vec::new()),
        });

        let api = Router::new()
            .route("/posts", get(list_posts).post(create_post))
            .route("/posts/{id}/replies", get(list_replies).post(create_reply))
            .route("/posts/{id}/vote", axum::routing::post(vote))
            .route("/posts/{id}/report", axum::routing::post(report))
            .route("/status", get(status));

        let api = if prefix.is_empty() {
            api
        } else {
            Router::new().nest(&prefix, api)
        };

        let app = Router::new()
            .merge(api)
            .route("/server_status.json", get(descriptor))
            .route("/broken_status.json", get(broken_descriptor))
            .route("/ws", get(ws_upgrade))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        *state.descriptor_target.lock().unwrap() = format!("http://{}", addr);
        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn descriptor_url(&self) -> String {
        format!("http://{}/server_status.json", self.addr)
    }

    pub fn broken_descriptor_url(&self) -> String {
        format!("http://{}/broken_status.json", self.addr)
    }

    /// Makes the descriptor advertise another API location.
    pub fn point_descriptor_at(&self, base_url: &str) {
        *self.state.descriptor_target.lock().unwrap() = base_url.to_string();
    }

    pub fn seed_post(&self, text: &str, class_tag: &str) -> String {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state.posts.lock().unwrap().push(make_post(id, text, class_tag));
        id.to_string()
    }

    pub fn remove_post(&self, id: &str) {
        self.state
            .posts
            .lock()
            .unwrap()
            .retain(|p| id_of(&p["id"]) != id);
    }

    /// Adjusts a tally behind the client's back.
    pub fn set_upvotes(&self, id: &str, upvotes: i64) {
        if let Some(p) = self
            .state
            .posts
            .lock()
            .unwrap()
            .iter_mut()
            .find(|p| id_of(&p["id"]) == id)
        {
            p["upvotes"] = json!(upvotes);
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.offline.store(offline, Ordering::SeqCst);
    }

    pub fn notify(&self, frame: &str) {
        let _ = self.state.changes.send(frame.to_string());
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.state.list_calls.load(Ordering::SeqCst)
    }

    pub fn ws_connections(&self) -> usize {
        self.state.ws_connections.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<Value> {
        self.state.submissions.lock().unwrap().clone()
    }

    pub fn votes(&self) -> Vec<(String, Value)> {
        self.state.votes.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<(String, Value)> {
        self.state.reports.lock().unwrap().clone()
    }
}

fn id_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn make_post(id: usize, text: &str, class_tag: &str) -> Value {
    json!({
        "id": id,
        "alias": format!("Anon{}", id),
        "texto": text,
        "classe": class_tag,
        "created_at": "2024-05-01 12:00:00",
        "replies_count": 0,
        "upvotes": 0,
        "avatar": { "emoji": "🦊" }
    })
}

fn unavailable(state: &FakeState) -> Option<Response> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if state.offline.load(Ordering::SeqCst) {
        Some(StatusCode::SERVICE_UNAVAILABLE.into_response())
    } else {
        None
    }
}

async fn list_posts(State(state): State<Arc<FakeState>>) -> Response {
    state.list_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(resp) = unavailable(&state) {
        return resp;
    }
    let posts: Vec<Value> = state.posts.lock().unwrap().iter().rev().cloned().collect();
    Json(Value::Array(posts)).into_response()
}

async fn create_post(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    if let Some(resp) = unavailable(&state) {
        return resp;
    }
    state.submissions.lock().unwrap().push(body.clone());

    let text = body["texto"].as_str().unwrap_or_default().to_string();
    if let Some(word) = &state.opts.rejected_word {
        if text.contains(word.as_str()) {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Texto proibido" })))
                .into_response();
        }
    }

    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let post = make_post(id, &text, body["classe"].as_str().unwrap_or_default());
    state.posts.lock().unwrap().push(post.clone());
    (StatusCode::CREATED, Json(post)).into_response()
}

async fn list_replies(State(state): State<Arc<FakeState>>, Path(id): Path<String>) -> Response {
    if let Some(resp) = unavailable(&state) {
        return resp;
    }
    if let Some(delay) = state.opts.replies_delay {
        tokio::time::sleep(delay).await;
    }
    if let Some(raw) = &state.opts.replies_override {
        return Json(raw.clone()).into_response();
    }
    let replies = state
        .replies
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .unwrap_or_default();
    Json(json!({ "replies": replies })).into_response()
}

async fn create_reply(
    State(state): State<Arc<FakeState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = unavailable(&state) {
        return resp;
    }
    state.submissions.lock().unwrap().push(body.clone());

    let reply_id = state.next_id.fetch_add(1, Ordering::SeqCst);
    // older deployments answer with `user`/`message` keys
    let reply = json!({
        "reply_id": reply_id,
        "user": format!("Anon{}", reply_id),
        "message": body["texto"],
        "classe": body["classe"],
    });
    state
        .replies
        .lock()
        .unwrap()
        .entry(id.clone())
        .or_default()
        .push(reply.clone());
    if let Some(p) = state
        .posts
        .lock()
        .unwrap()
        .iter_mut()
        .find(|p| id_of(&p["id"]) == id)
    {
        let n = p["replies_count"].as_u64().unwrap_or(0) + 1;
        p["replies_count"] = json!(n);
    }
    (StatusCode::CREATED, Json(reply)).into_response()
}

async fn vote(
    State(state): State<Arc<FakeState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = unavailable(&state) {
        return resp;
    }
    if !state.opts.votes_supported {
        return StatusCode::NOT_FOUND.into_response();
    }
    state.votes.lock().unwrap().push((id.clone(), body.clone()));

    let delta = body["delta"].as_i64().unwrap_or(0);
    let mut posts = state.posts.lock().unwrap();
    match posts.iter_mut().find(|p| id_of(&p["id"]) == id) {
        Some(p) => {
            let upvotes = p["upvotes"].as_i64().unwrap_or(0) + delta;
            p["upvotes"] = json!(upvotes);
            Json(json!({ "upvotes": upvotes })).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "Post não encontrado" })))
            .into_response(),
    }
}

async fn report(
    State(state): State<Arc<FakeState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = unavailable(&state) {
        return resp;
    }
    state.reports.lock().unwrap().push((id, body));
    Json(json!({})).into_response()
}

async fn status(State(state): State<Arc<FakeState>>) -> Response {
    if let Some(resp) = unavailable(&state) {
        return resp;
    }
    Json(json!({ "version": "1.2" })).into_response()
}

async fn descriptor(
    State(state): State<Arc<FakeState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.descriptor_queries.lock().unwrap().push(query);
    let target = state.descriptor_target.lock().unwrap().clone();
    Json(json!({
        "url_api_base": target,
        "status_servidor": "Online",
        "version_api": "1.2"
    }))
    .into_response()
}

async fn broken_descriptor() -> Response {
    Json(json!({ "nope": true })).into_response()
}

async fn ws_upgrade(State(state): State<Arc<FakeState>>, ws: WebSocketUpgrade) -> Response {
    let rx = state.changes.subscribe();
    state.ws_connections.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |socket| push_changes(socket, rx))
}

async fn push_changes(mut socket: WebSocket, mut rx: broadcast::Receiver<String>) {
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Ok(frame) = frame else { break };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tebak_gambar_server::catalog::Catalog;
use tebak_gambar_server::config::build_config;
use tebak_gambar_server::constants::TICK_MS;
use tebak_gambar_server::engine::{Action, Effect, GameEngine};
use tebak_gambar_server::rng::Rng;
use tebak_gambar_server::server_protocol::{parse_client_message, ParsedClientMessage};
use tebak_gambar_server::server_utils::format_timer;
use tebak_gambar_server::session_store::SessionStore;
use tebak_gambar_server::types::GameConfig;
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    store: SessionStore,
    catalog: Catalog,
    game: Option<GameEngine>,
    /// Bumped whenever `game` is replaced; reveal tasks from an older session carry a stale value.
    session_epoch: u64,
}

impl ServerState {
    fn new(store: SessionStore, catalog: Catalog) -> Self {
        Self {
            clients: HashMap::new(),
            store,
            catalog,
            game: None,
            session_epoch: 0,
        }
    }

    fn replace_game(&mut self, game: Option<GameEngine>) {
        self.session_epoch += 1;
        self.game = game;
    }
}

#[derive(Debug, Deserialize)]
struct SetupRequest {
    participants: Option<Vec<String>>,
    #[serde(rename = "timerSeconds")]
    timer_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CatalogQuery {
    category: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let store_path = std::env::var("SESSION_STORE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".data/session.json"));

    let catalog = match std::env::var("CATALOG_PATH") {
        Ok(raw) => {
            let text = std::fs::read_to_string(&raw)
                .with_context(|| format!("failed to read catalog {raw}"))?;
            Catalog::from_json(&text).with_context(|| format!("invalid catalog {raw}"))?
        }
        Err(_) => Catalog::builtin(),
    };
    info!(items = catalog.len(), "catalog loaded");

    let state = Arc::new(Mutex::new(ServerState::new(
        SessionStore::new(store_path),
        catalog,
    )));
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/config", get(config_handler))
        .route("/api/setup", post(setup_handler))
        .route("/api/results", get(results_handler))
        .route("/api/reset", post(reset_handler))
        .route("/api/catalog", get(catalog_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static file root not found, serving API only");
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(port, "listening");
    axum::serve(listener, app)
        .await
        .context("server runtime failed")?;
    Ok(())
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [PathBuf::from("dist/client"), PathBuf::from("public")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn config_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let mut guard = state.lock().await;
    match guard.store.load_config() {
        Ok(config) => (StatusCode::OK, Json(config_body(&config))),
        Err(error) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": error.to_string() })),
        ),
    }
}

async fn setup_handler(
    State(state): State<SharedState>,
    Json(request): Json<SetupRequest>,
) -> impl IntoResponse {
    let mut guard = state.lock().await;
    let participants = request.participants.unwrap_or_default();
    match save_setup(&mut guard, &participants, request.timer_seconds) {
        Ok(config) => (StatusCode::OK, Json(config_body(&config))),
        Err(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": message })),
        ),
    }
}

async fn results_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    match guard.store.build_results_response() {
        Some(response) => (StatusCode::OK, Json(json!(response))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no results yet" })),
        ),
    }
}

async fn reset_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let mut guard = state.lock().await;
    reset_session(&mut guard);
    Json(json!({ "ok": true }))
}

async fn catalog_handler(
    State(state): State<SharedState>,
    Query(query): Query<CatalogQuery>,
) -> impl IntoResponse {
    let guard = state.lock().await;
    let catalog = &guard.catalog;
    let items = match query.category.as_deref() {
        Some(category) => catalog.filter_category(category).items().to_vec(),
        None => catalog.items().to_vec(),
    };
    Json(json!({
        "size": catalog.len(),
        "categories": catalog.categories(),
        "items": items,
    }))
}

fn config_body(config: &GameConfig) -> Value {
    json!({
        "config": config,
        "timerLabel": format_timer(config.timer_seconds),
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        guard
            .clients
            .insert(client_id.clone(), ClientContext { tx: tx.clone() });
        send_welcome(&mut guard, &client_id);
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(state.clone(), &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(state.clone(), &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut guard = state.lock().await;
        guard.clients.remove(&client_id);
    }
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: SharedState, client_id: &str, raw: String) {
    let Some(message) = parse_client_message(&raw) else {
        send_error_to_client(&state, client_id, "invalid message").await;
        return;
    };

    let mut guard = state.lock().await;
    match message {
        ParsedClientMessage::Setup {
            participants,
            timer_seconds,
        } => match save_setup(&mut guard, &participants, timer_seconds) {
            Ok(config) => broadcast(
                &mut guard,
                &json!({
                    "type": "config",
                    "config": config,
                    "timerLabel": format_timer(config.timer_seconds),
                }),
                QueuePolicy::DisconnectOnFull,
            ),
            Err(message) => send_to_client(
                &mut guard,
                client_id,
                &json!({ "type": "error", "message": message }),
                QueuePolicy::DisconnectOnFull,
            ),
        },
        ParsedClientMessage::StartSession { seed } => {
            start_session(&mut guard, client_id, seed);
        }
        ParsedClientMessage::Action(action) => {
            apply_action(&mut guard, &state, action);
        }
        ParsedClientMessage::Reset => {
            reset_session(&mut guard);
        }
        ParsedClientMessage::Ping { t } => {
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "pong",
                    "t": t,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

fn save_setup(
    state: &mut ServerState,
    participants: &[String],
    timer_seconds: Option<i64>,
) -> Result<GameConfig, String> {
    let mut rng = Rng::new(rand::random::<u32>());
    let config = build_config(participants, timer_seconds, &mut rng);
    state.store.save_config(config).map_err(|error| {
        error!(%error, "failed to save game config");
        error.to_string()
    })
}

fn start_session(state: &mut ServerState, client_id: &str, seed: Option<i64>) {
    let started = state.store.load_config().and_then(|config| {
        let seed = seed.map(seed_from_i64).unwrap_or_else(rand::random::<u32>);
        GameEngine::new(config, state.catalog.clone(), seed)
    });
    match started {
        Ok(game) => {
            state.replace_game(Some(game));
            broadcast_state(state);
        }
        Err(error) => {
            warn!(%error, "cannot start session");
            send_to_client(
                state,
                client_id,
                &json!({
                    "type": "cannot_start",
                    "message": error.to_string(),
                    "navigate": "setup",
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

fn apply_action(state: &mut ServerState, shared: &SharedState, action: Action) {
    let Some(game) = state.game.as_mut() else {
        return;
    };
    match game.dispatch(action) {
        Some(Effect::ScheduleReveal {
            generation,
            delay_ms,
        }) => schedule_reveal(shared.clone(), state.session_epoch, generation, delay_ms),
        Some(Effect::SessionComplete { results }) => {
            if let Err(error) = state.store.save_results(&results) {
                error!(%error, "failed to save results");
            }
            broadcast_state(state);
            broadcast(
                state,
                &json!({
                    "type": "session_complete",
                    "results": results,
                    "navigate": "results",
                }),
                QueuePolicy::DisconnectOnFull,
            );
            return;
        }
        None => {}
    }
    broadcast_state(state);
}

fn schedule_reveal(shared: SharedState, epoch: u64, generation: u64, delay_ms: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        let mut guard = shared.lock().await;
        if apply_reveal(&mut guard, epoch, generation) {
            broadcast_state(&mut guard);
        }
    });
}

/// Returns false when the reveal belongs to a replaced session or an older guess.
fn apply_reveal(state: &mut ServerState, epoch: u64, generation: u64) -> bool {
    if state.session_epoch != epoch {
        return false;
    }
    let Some(game) = state.game.as_mut() else {
        return false;
    };
    if game.generation() != generation {
        return false;
    }
    game.dispatch(Action::Reveal { generation });
    true
}

/// Keeps the low 32 bits so any client-supplied integer maps to a seed.
fn seed_from_i64(value: i64) -> u32 {
    (value as u64 & u64::from(u32::MAX)) as u32
}

fn reset_session(state: &mut ServerState) {
    state.replace_game(None);
    if let Err(error) = state.store.clear() {
        error!(%error, "failed to clear session store");
    }
    broadcast(
        state,
        &json!({ "type": "reset", "navigate": "setup" }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn send_welcome(state: &mut ServerState, client_id: &str) {
    let snapshot = state.game.as_mut().map(|game| game.build_snapshot(false));
    let config = state.store.load_config().ok();
    send_to_client(
        state,
        client_id,
        &json!({
            "type": "welcome",
            "clientId": client_id,
            "config": config,
            "snapshot": snapshot,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_game(&mut guard);
        }
    });
}

fn tick_game(state: &mut ServerState) {
    let changed = {
        let Some(game) = state.game.as_mut() else {
            return;
        };
        if !game.phase().is_playing() {
            return;
        }
        let before = (game.phase(), game.remaining_seconds());
        game.step(TICK_MS);
        before != (game.phase(), game.remaining_seconds())
    };
    if changed {
        broadcast_state(state);
    }
}

fn broadcast_state(state: &mut ServerState) {
    let Some(game) = state.game.as_mut() else {
        return;
    };
    let snapshot = game.build_snapshot(true);
    broadcast(
        state,
        &json!({
            "type": "state",
            "snapshot": snapshot,
        }),
        QueuePolicy::DropOnFull,
    );
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        disconnect_client(state, client_id);
    }
}

fn broadcast(state: &mut ServerState, message: &Value, policy: QueuePolicy) {
    let payload = message.to_string();
    let mut failed_clients = Vec::new();
    for (client_id, client) in &state.clients {
        if client
            .tx
            .try_send(OutboundMessage::Text(payload.clone()))
            .is_err()
            && policy == QueuePolicy::DisconnectOnFull
        {
            failed_clients.push(client_id.clone());
        }
    }
    for client_id in failed_clients {
        disconnect_client(state, &client_id);
    }
}

fn disconnect_client(state: &mut ServerState, client_id: &str) {
    if let Some(client) = state.clients.remove(client_id) {
        warn!(client_id, "dropping slow client");
        let _ = client.tx.try_send(OutboundMessage::Close {
            code: 1013,
            reason: "outbound queue full".to_string(),
        });
    }
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &json!({
            "type": "error",
            "message": message,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use futures_util::{SinkExt, StreamExt};
use hug_bunny_world::config::WorldConfig;
use hug_bunny_world::constants::{PLAYER_IDLE_EXPIRY_MS, PLAYER_SWEEP_INTERVAL_MS, PLAYERS_COLLECTION};
use hug_bunny_world::engine::now_ms;
use hug_bunny_world::server_protocol::{parse_client_message, ParsedClientMessage};
use hug_bunny_world::server_utils::{normalize_world_id, parse_port, sanitize_session_key};
use hug_bunny_world::session::{self, generate_session_key, random_seed, Session, SessionCommand, SessionOptions};
use hug_bunny_world::store::{DocumentStore, MemoryStore};
use hug_bunny_world::sync::expire_inactive_players;
use hug_bunny_world::types::{PlayMode, WorldView};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const OUTBOUND_QUEUE: usize = 256;
const COMMAND_QUEUE: usize = 64;
const VIEW_QUEUE: usize = 8;

#[derive(Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

struct ServerState {
    store: Arc<MemoryStore>,
    config: WorldConfig,
    connections: AtomicUsize,
}

type SharedState = Arc<ServerState>;

/// What a connection is bound to once its `hello` has been accepted.
struct ClientSession {
    session_key: String,
    commands: mpsc::Sender<SessionCommand>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = parse_port(std::env::var("PORT").ok().as_deref(), 8080);

    let store_path = std::env::var("WORLD_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".data/world.json"));
    let config = std::env::var("WORLD_CONFIG_PATH")
        .map(|raw| WorldConfig::load(&PathBuf::from(raw)))
        .unwrap_or_default();

    let state = Arc::new(ServerState {
        store: Arc::new(MemoryStore::with_file(store_path)),
        config,
        connections: AtomicUsize::new(0),
    });
    start_sweep_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/world", get(world_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.display(), "static_root_resolved");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static file root not found; serving the API only");
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    info!(port, "listening");
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
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

async fn world_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let online_players = state
        .store
        .list(PLAYERS_COLLECTION)
        .map(|players| {
            players
                .iter()
                .filter(|doc| doc.fields.get("online").and_then(Value::as_bool) == Some(true))
                .count()
        })
        .unwrap_or(0);
    Json(json!({
        "worldId": state.config.world_id,
        "connections": state.connections.load(Ordering::Relaxed),
        "onlinePlayers": online_players,
        "documents": state.store.document_count(),
        "generatedAtIso": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE);
    state.connections.fetch_add(1, Ordering::Relaxed);
    debug!(client = %client_id, "client_connected");

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

    let mut client: Option<ClientSession> = None;
    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        let raw = match message {
            Message::Text(raw) => raw.to_string(),
            Message::Binary(raw) => match String::from_utf8(raw.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    send_error(&tx, "invalid utf8 message");
                    continue;
                }
            },
            Message::Close(_) => break,
            _ => continue,
        };
        if !handle_client_message(&state, &client_id, &tx, &mut client, &raw) {
            break;
        }
    }

    if let Some(bound) = client.take() {
        info!(client = %client_id, session = %bound.session_key, "client_disconnected");
        // closing the command channel stops the session task, which marks the player offline
        drop(bound.commands);
    }
    state.connections.fetch_sub(1, Ordering::Relaxed);
    drop(tx);
    let _ = writer.await;
}

/// Returns false when the connection should be closed.
fn handle_client_message(
    state: &SharedState,
    client_id: &str,
    tx: &mpsc::Sender<OutboundMessage>,
    client: &mut Option<ClientSession>,
    raw: &str,
) -> bool {
    let Some(message) = parse_client_message(raw) else {
        send_error(tx, "invalid message");
        return true;
    };

    match message {
        ParsedClientMessage::Hello {
            session_key,
            mode,
            world_id,
        } => {
            if client.is_some() {
                send_error(tx, "already joined");
                return true;
            }
            let Some(world_id) = normalize_world_id(world_id.as_deref(), &state.config.world_id)
            else {
                let _ = tx.try_send(OutboundMessage::Close {
                    code: 4001,
                    reason: "unknown world".to_string(),
                });
                return false;
            };
            let session_key = session_key
                .as_deref()
                .and_then(sanitize_session_key)
                .unwrap_or_else(generate_session_key);
            let mode = mode.unwrap_or(PlayMode::Coop);
            *client = Some(start_client_session(state, client_id, tx, session_key, mode, world_id));
            true
        }
        ParsedClientMessage::Ping { t } => {
            send_json(tx, &json!({ "type": "pong", "t": t, "serverTime": now_ms() }));
            true
        }
        ParsedClientMessage::Pointer { x, y } => {
            forward(tx, client.as_ref(), SessionCommand::Pointer { x, y });
            true
        }
        ParsedClientMessage::Focus { active } => {
            forward(tx, client.as_ref(), SessionCommand::Focus(active));
            true
        }
    }
}

fn start_client_session(
    state: &SharedState,
    client_id: &str,
    tx: &mpsc::Sender<OutboundMessage>,
    session_key: String,
    mode: PlayMode,
    world_id: String,
) -> ClientSession {
    let config = WorldConfig {
        world_id,
        ..state.config.clone()
    };
    let store: Arc<dyn DocumentStore> = state.store.clone();
    let session = Session::start(
        SessionOptions {
            config,
            mode,
            session_key: session_key.clone(),
            seed: random_seed(),
        },
        Some(store),
        now_ms(),
    );
    let welcome = json!({
        "type": "welcome",
        "sessionKey": session_key,
        "mode": mode,
        "username": session.engine().player().username,
        "local": session.sync().is_local(),
    });
    send_json(tx, &welcome);
    info!(client = %client_id, session = %session_key, ?mode, "client_joined");

    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
    let (view_tx, view_rx) = mpsc::channel(VIEW_QUEUE);
    tokio::spawn(session::run(session, command_rx, view_tx));
    tokio::spawn(forward_views(view_rx, tx.clone()));

    ClientSession {
        session_key,
        commands: command_tx,
    }
}

async fn forward_views(mut views: mpsc::Receiver<WorldView>, tx: mpsc::Sender<OutboundMessage>) {
    while let Some(view) = views.recv().await {
        let payload = state_message(&view);
        if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(OutboundMessage::Text(payload)) {
            break;
        }
    }
}

fn state_message(view: &WorldView) -> String {
    json!({ "type": "state", "view": view }).to_string()
}

fn forward(tx: &mpsc::Sender<OutboundMessage>, client: Option<&ClientSession>, command: SessionCommand) {
    let Some(client) = client else {
        send_error(tx, "send hello first");
        return;
    };
    if client.commands.try_send(command).is_err() {
        debug!(session = %client.session_key, "command_dropped");
    }
}

fn send_json(tx: &mpsc::Sender<OutboundMessage>, message: &Value) {
    let _ = tx.try_send(OutboundMessage::Text(message.to_string()));
}

fn send_error(tx: &mpsc::Sender<OutboundMessage>, message: &str) {
    send_json(tx, &json!({ "type": "error", "message": message }));
}

fn start_sweep_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(PLAYER_SWEEP_INTERVAL_MS));
        loop {
            interval.tick().await;
            sweep_store(&state.store, now_ms());
        }
    });
}

fn sweep_store(store: &MemoryStore, now_ms: u64) {
    if let Err(error) = expire_inactive_players(store, now_ms, PLAYER_IDLE_EXPIRY_MS) {
        warn!(error = %error, "player_sweep_failed");
    }
    if let Err(error) = store.persist() {
        error!(error = %error, "store_persist_failed");
    }
}

fn make_id(prefix: &str) -> String {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hug_bunny_world::store::DocKey;
    use serde_json::Map;

    fn test_state() -> SharedState {
        Arc::new(ServerState {
            store: Arc::new(MemoryStore::new()),
            config: WorldConfig {
                bunny_count: 3,
                tree_count: 2,
                bush_count: 2,
                item_count: 1,
                ..WorldConfig::default()
            },
            connections: AtomicUsize::new(0),
        })
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let OutboundMessage::Text(payload) = message {
                out.push(serde_json::from_str(&payload).expect("json payload"));
            }
        }
        out
    }

    #[test]
    fn make_id_is_prefixed_and_unique() {
        let first = make_id("client");
        let second = make_id("client");
        assert!(first.starts_with("client_"));
        assert_ne!(first, second);
    }

    #[test]
    fn pointer_before_hello_is_an_error() {
        let state = test_state();
        let (tx, mut rx) = mpsc::channel(8);
        let mut client = None;
        assert!(handle_client_message(
            &state,
            "client_1",
            &tx,
            &mut client,
            r#"{"type":"pointer","x":1,"y":2}"#
        ));
        let sent = drain(&mut rx);
        assert_eq!(sent[0]["type"], "error");
    }

    #[test]
    fn ping_is_answered_with_pong() {
        let state = test_state();
        let (tx, mut rx) = mpsc::channel(8);
        let mut client = None;
        handle_client_message(&state, "client_1", &tx, &mut client, r#"{"type":"ping","t":5}"#);
        let sent = drain(&mut rx);
        assert_eq!(sent[0]["type"], "pong");
        assert_eq!(sent[0]["t"], 5.0);
    }

    #[test]
    fn bad_world_id_closes_the_connection() {
        let state = test_state();
        let (tx, mut rx) = mpsc::channel(8);
        let mut client = None;
        let keep = handle_client_message(
            &state,
            "client_1",
            &tx,
            &mut client,
            r#"{"type":"hello","worldId":"../x"}"#,
        );
        assert!(!keep);
        assert!(matches!(rx.try_recv(), Ok(OutboundMessage::Close { code: 4001, .. })));
    }

    #[tokio::test]
    async fn hello_starts_a_session_and_streams_state() {
        let state = test_state();
        let (tx, mut rx) = mpsc::channel(64);
        let mut client = None;
        assert!(handle_client_message(
            &state,
            "client_1",
            &tx,
            &mut client,
            r#"{"type":"hello","sessionKey":"abc123","mode":"solo"}"#
        ));
        let bound = client.as_ref().expect("joined");
        assert_eq!(bound.session_key, "abc123");

        let welcome = match rx.recv().await {
            Some(OutboundMessage::Text(payload)) => serde_json::from_str::<Value>(&payload).expect("json"),
            other => panic!("unexpected outbound {other:?}"),
        };
        assert_eq!(welcome["type"], "welcome");
        assert_eq!(welcome["username"], "Subject_abc12");

        let first_state = match rx.recv().await {
            Some(OutboundMessage::Text(payload)) => serde_json::from_str::<Value>(&payload).expect("json"),
            other => panic!("unexpected outbound {other:?}"),
        };
        assert_eq!(first_state["type"], "state");
        assert_eq!(first_state["view"]["player"]["id"], "abc123");

        assert!(handle_client_message(
            &state,
            "client_1",
            &tx,
            &mut client,
            r#"{"type":"hello"}"#
        ));
    }

    #[test]
    fn sweep_removes_idle_players() {
        let state = test_state();
        let mut fields = Map::new();
        fields.insert("lastActive".to_string(), json!(0));
        state
            .store
            .set_merge(&DocKey::new(PLAYERS_COLLECTION, "old"), fields)
            .expect("seed player");
        sweep_store(&state.store, PLAYER_IDLE_EXPIRY_MS + 10);
        assert!(state
            .store
            .get(&DocKey::new(PLAYERS_COLLECTION, "old"))
            .expect("read")
            .is_none());
    }
}

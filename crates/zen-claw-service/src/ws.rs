//! The WebSocket surface of the Streaming Plane (spec §6): a single
//! connection can drive several sessions at once, receiving interleaved
//! `progress` notifications for whichever ones have a task in flight.

use crate::routes::{resolve_session, ChatBody, SessionInfo};
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zen_claw_core::{GatewayError, StepEvent, Task};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Chat {
        id: Option<String>,
        session_id: Option<String>,
        user_input: String,
        working_dir: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        max_steps: Option<usize>,
    },
    Cancel {
        id: Option<String>,
        session_id: String,
    },
    Ping {
        id: Option<String>,
    },
    Sessions {
        id: Option<String>,
    },
    Session {
        id: Option<String>,
        session_id: String,
        action: SessionAction,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SessionAction {
    Get,
    Delete,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Connected {
        client_id: String,
    },
    Progress {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        event: StepEvent,
    },
    Result {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        session_id: String,
        result: Option<String>,
        session_info: SessionInfo,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        message: String,
    },
    Cancelled {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        session_id: String,
    },
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Sessions {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        sessions: Vec<Value>,
    },
    Session {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        session: Option<Value>,
    },
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let client_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(64);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "failed to encode websocket message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    if out_tx.send(ServerMessage::Connected { client_id: client_id.clone() }).await.is_err() {
        let _ = send_task.await;
        return;
    }

    // Cancellation tokens for tasks this connection started, keyed by
    // session id (spec §6 `cancel`). Never shared outside this connection.
    let cancels: Arc<DashMap<String, CancellationToken>> = Arc::new(DashMap::new());

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "websocket receive error");
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        dispatch(client_msg, &state, out_tx.clone(), cancels.clone());
                    }
                    Err(e) => {
                        let _ = out_tx
                            .send(ServerMessage::Error { id: None, message: format!("invalid message: {e}") })
                            .await;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    drop(out_tx);
    let _ = send_task.await;
}

/// Handles one parsed client message. Long-running work (`chat`) is
/// spawned so the receive loop keeps accepting `cancel`/`ping` while it's
/// in flight.
fn dispatch(
    msg: ClientMessage,
    state: &AppState,
    out_tx: mpsc::Sender<ServerMessage>,
    cancels: Arc<DashMap<String, CancellationToken>>,
) {
    match msg {
        ClientMessage::Ping { id } => {
            tokio::spawn(async move {
                let _ = out_tx.send(ServerMessage::Pong { id }).await;
            });
        }
        ClientMessage::Sessions { id } => {
            let state = state.clone();
            tokio::spawn(async move {
                let sessions = state.store.list().await;
                let sessions = sessions
                    .into_iter()
                    .map(|(sid, s, updated_at)| {
                        serde_json::json!({ "id": sid, "state": s, "updated_at": updated_at })
                    })
                    .collect();
                let _ = out_tx.send(ServerMessage::Sessions { id, sessions }).await;
            });
        }
        ClientMessage::Session { id, session_id, action } => {
            let state = state.clone();
            tokio::spawn(async move {
                let outcome = match action {
                    SessionAction::Get => state.store.load(&session_id).await.map(Some),
                    SessionAction::Delete => state.store.delete(&session_id).await.map(|_| None),
                };
                match outcome {
                    Ok(session) => {
                        let session = session.and_then(|s| serde_json::to_value(s).ok());
                        let _ = out_tx.send(ServerMessage::Session { id, session }).await;
                    }
                    Err(e) => {
                        let _ = out_tx
                            .send(ServerMessage::Error { id, message: e.to_string() })
                            .await;
                    }
                }
            });
        }
        ClientMessage::Cancel { id, session_id } => {
            tokio::spawn(async move {
                if let Some((_, token)) = cancels.remove(&session_id) {
                    token.cancel();
                }
                let _ = out_tx.send(ServerMessage::Cancelled { id, session_id }).await;
            });
        }
        ClientMessage::Chat { id, session_id, user_input, working_dir, provider, model, max_steps } => {
            let state = state.clone();
            tokio::spawn(async move {
                run_chat(state, id, session_id, user_input, working_dir, provider, model, max_steps, out_tx, cancels)
                    .await;
            });
        }
    }
}

const DEFAULT_MAX_STEPS: usize = 12;

#[allow(clippy::too_many_arguments)]
async fn run_chat(
    state: AppState,
    id: Option<String>,
    session_id: Option<String>,
    user_input: String,
    working_dir: Option<PathBuf>,
    provider: Option<String>,
    model: Option<String>,
    max_steps: Option<usize>,
    out_tx: mpsc::Sender<ServerMessage>,
    cancels: Arc<DashMap<String, CancellationToken>>,
) {
    let body = ChatBody { session_id, user_input, working_dir, provider, model, max_steps };

    let mut session = match resolve_session(&state.store, &body).await {
        Ok(s) => s,
        Err(e) => {
            let _ = out_tx.send(error_message(id, e)).await;
            return;
        }
    };
    let guard = match state.store.try_begin_task(&session.id) {
        Ok(g) => g,
        Err(e) => {
            let _ = out_tx.send(error_message(id, GatewayError::from(e))).await;
            return;
        }
    };
    let task = Task::new(session.id.clone(), body.user_input.clone(), body.max_steps.unwrap_or(DEFAULT_MAX_STEPS));

    let (tx, mut rx) = mpsc::channel(64);
    let ctx = zen_claw_agent::TaskContext::new(tx);
    cancels.insert(session.id.clone(), ctx.cancel.clone());

    let clients = state.clients.clone();
    let session_id_for_broadcast = session.id.clone();
    let id_for_progress = id.clone();
    let out_tx_progress = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            clients.broadcast(&session_id_for_broadcast, &event);
            let _ = out_tx_progress
                .send(ServerMessage::Progress { id: id_for_progress.clone(), event })
                .await;
        }
    });

    let result = state.agent.run(&ctx, &mut session, &task.id, &task.user_input, task.max_steps).await;
    drop(ctx);
    let _ = forwarder.await;
    cancels.remove(&session.id);
    drop(guard);

    if let Err(e) = state.store.save(&session).await {
        let _ = out_tx.send(error_message(id, GatewayError::from(e))).await;
        return;
    }
    let session_info = SessionInfo::from_session(&session);

    match result {
        Ok(outcome) => {
            let _ = out_tx
                .send(ServerMessage::Result {
                    id,
                    session_id: session.id,
                    result: Some(outcome.final_text),
                    session_info,
                })
                .await;
        }
        Err(GatewayError::Cancelled) => {
            let _ = out_tx.send(ServerMessage::Cancelled { id, session_id: session.id }).await;
        }
        Err(e) => {
            let _ = out_tx.send(error_message(id, e)).await;
        }
    }
}

fn error_message(id: Option<String>, e: GatewayError) -> ServerMessage {
    ServerMessage::Error { id, message: e.to_string() }
}

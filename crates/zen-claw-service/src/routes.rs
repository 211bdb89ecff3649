//! HTTP surface: one task per session, SSE streaming, session management
//! (spec §6).

use crate::client_registry::ClientRegistry;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{http::StatusCode, Json};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::info;
use zen_claw_agent::SessionStore;
use zen_claw_core::{GatewayError, Session, SessionState, StepEvent, Task};

/// Detaches a streaming client from the registry whenever its SSE stream
/// is dropped, whether it ended normally (`done`) or the peer vanished
/// mid-task (spec §8 scenario 6: the task keeps running either way).
struct DetachOnDrop {
    clients: Arc<ClientRegistry>,
    session_id: String,
    client_id: String,
}

impl Drop for DetachOnDrop {
    fn drop(&mut self) {
        self.clients.detach(&self.session_id, &self.client_id);
    }
}

/// Turns a client's event mailbox into an SSE stream that ends right
/// after the terminal `done` event.
fn event_stream(
    rx: mpsc::Receiver<StepEvent>,
    guard: DetachOnDrop,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((rx, Some(guard), false), |(mut rx, guard, finished)| async move {
        if finished {
            return None;
        }
        match rx.recv().await {
            Some(event) => {
                let done = event.is_done();
                let sse = Event::default()
                    .json_data(&event)
                    .unwrap_or_else(|_| Event::default().data("encode error"));
                Some((Ok(sse), (rx, guard, done)))
            }
            None => None,
        }
    })
}

const DEFAULT_MAX_STEPS: usize = 12;

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub session_id: Option<String>,
    pub user_input: String,
    pub working_dir: Option<PathBuf>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_steps: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub result: Option<String>,
    pub session_info: SessionInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub state: SessionState,
    pub stats: zen_claw_core::SessionStats,
}

impl SessionInfo {
    pub(crate) fn from_session(session: &Session) -> Self {
        SessionInfo {
            id: session.id.clone(),
            provider: session.provider.clone(),
            model: session.model.clone(),
            state: session.state,
            stats: session.stats(),
        }
    }
}

/// Resolves the session to run `body` against: loads an existing one, or
/// creates a new one admitted per spec §4.F.
pub(crate) async fn resolve_session(
    store: &SessionStore,
    body: &ChatBody,
) -> Result<Session, GatewayError> {
    if let Some(id) = &body.session_id {
        return store.load(id).await.map_err(|_| GatewayError::UnknownSession(id.clone()));
    }
    let working_dir = body.working_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let provider = body.provider.clone().unwrap_or_else(|| "deepseek".to_string());
    let model = body.model.clone().unwrap_or_else(|| "deepseek-chat".to_string());
    let session = Session::new(uuid::Uuid::new_v4().to_string(), working_dir, provider, model);
    store.create(session.clone()).await?;
    Ok(session)
}

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": OffsetDateTime::now_utc().unix_timestamp(),
        "gateway": "zen-claw",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `POST /chat`: runs one task to completion and returns its result. Other
/// clients already attached to this session still see the live event
/// stream via the Client Registry.
pub async fn chat(State(state): State<AppState>, Json(body): Json<ChatBody>) -> Result<Response, ApiError> {
    let mut session = resolve_session(&state.store, &body).await?;
    let guard = state.store.try_begin_task(&session.id).map_err(GatewayError::from)?;
    let task = Task::new(session.id.clone(), body.user_input.clone(), body.max_steps.unwrap_or(DEFAULT_MAX_STEPS));

    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let session_id = session.id.clone();
    let clients = state.clients.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            clients.broadcast(&session_id, &event);
        }
    });

    let ctx = zen_claw_agent::TaskContext::new(tx);
    let result = state.agent.run(&ctx, &mut session, &task.id, &task.user_input, task.max_steps).await;
    drop(ctx);
    let _ = forwarder.await;
    drop(guard);

    state.store.save(&session).await.map_err(GatewayError::from)?;
    let session_info = SessionInfo::from_session(&session);

    match result {
        Ok(outcome) => Ok(Json(ChatResponse {
            session_id: session.id,
            result: Some(outcome.final_text),
            session_info,
            error: None,
        })
        .into_response()),
        Err(GatewayError::Cancelled) => Ok(Json(ChatResponse {
            session_id: session.id,
            result: None,
            session_info,
            error: Some("task cancelled".to_string()),
        })
        .into_response()),
        Err(e) => Err(ApiError(e)),
    }
}

/// `POST /chat/stream`: identical task execution, but the requester's own
/// events are delivered as SSE instead of a single JSON body.
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let mut session = resolve_session(&state.store, &body).await?;
    let guard = state.store.try_begin_task(&session.id).map_err(GatewayError::from)?;
    let task = Task::new(session.id.clone(), body.user_input.clone(), body.max_steps.unwrap_or(DEFAULT_MAX_STEPS));

    let (client_id, client_rx) = state.clients.attach(&session.id);
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let session_id = session.id.clone();
    let forwarder_session_id = session_id.clone();
    let clients = state.clients.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            clients.broadcast(&forwarder_session_id, &event);
        }
    });

    let agent = state.agent.clone();
    let store = state.store.clone();
    let session_id_for_run = session.id.clone();
    tokio::spawn(async move {
        let ctx = zen_claw_agent::TaskContext::new(tx);
        let _ = agent.run(&ctx, &mut session, &task.id, &task.user_input, task.max_steps).await;
        drop(ctx);
        let _ = forwarder.await;
        let _ = store.save(&session).await;
        drop(guard);
        info!(session_id = %session_id_for_run, "task finished");
    });

    let guard = DetachOnDrop { clients: state.clients.clone(), session_id: session_id.clone(), client_id };
    let events = event_stream(client_rx, guard);

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("ping")))
}

#[derive(Debug, Serialize)]
pub struct SessionListEntry {
    pub id: String,
    pub state: SessionState,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionListEntry>,
    pub count: usize,
    pub max_sessions: usize,
    pub active_count: usize,
}

pub async fn list_sessions(State(state): State<AppState>) -> Result<Response, ApiError> {
    let sessions: Vec<SessionListEntry> = state
        .store
        .list()
        .await
        .into_iter()
        .map(|(id, s, updated_at)| SessionListEntry { id, state: s, updated_at })
        .collect();
    let active_count = state.store.active_count().await;
    Ok(Json(SessionListResponse {
        count: sessions.len(),
        max_sessions: state.config.max_sessions,
        active_count,
        sessions,
    })
    .into_response())
}

pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let session = state.store.load(&id).await.map_err(|_| GatewayError::UnknownSession(id.clone()))?;
    Ok(Json(session).into_response())
}

pub async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    state.store.delete(&id).await.map_err(|_| GatewayError::UnknownSession(id.clone()))?;
    Ok(Json(json!({ "deleted": true, "id": id })).into_response())
}

pub async fn background_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let session = state
        .store
        .set_state(&id, SessionState::Background)
        .await
        .map_err(|_| GatewayError::UnknownSession(id.clone()))?;
    Ok(Json(session).into_response())
}

pub async fn activate_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let session = state
        .store
        .set_state(&id, SessionState::Active)
        .await
        .map_err(|_| GatewayError::UnknownSession(id.clone()))?;
    Ok(Json(session).into_response())
}

/// `GET /sessions/{id}/stream`: attaches as a new client. Reattaching a
/// session mid-task (or after it went quiet) first replays the full
/// transcript as a single snapshot event, then resumes live events.
pub async fn session_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = state.store.load(&id).await.map_err(|_| GatewayError::UnknownSession(id.clone()))?;
    let (client_id, client_rx) = state.clients.attach(&id);
    let snapshot = Event::default()
        .event("snapshot")
        .json_data(&json!({ "session": session }))
        .unwrap_or_else(|_| Event::default().data("encode error"));

    let guard = DetachOnDrop { clients: state.clients.clone(), session_id: id, client_id };
    let events = stream::once(async move { Ok(snapshot) }).chain(event_stream(client_rx, guard));

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("ping")))
}

/// `GET /preferences`: a read-only view of the router's default/fallback
/// chain and consensus defaults, for clients that want to render a
/// provider picker (spec §6).
pub async fn preferences(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "default_provider": state.config.default_provider,
        "fallback_order": state.config.fallback_order,
        "providers": state.config.providers.iter().map(|p| json!({
            "name": p.name,
            "default_model": p.default_model,
            "context_tier": p.context_tier,
            "supports_streaming": p.supports_streaming,
            "has_credential": p.has_credential(),
        })).collect::<Vec<_>>(),
    }))
}

pub fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}

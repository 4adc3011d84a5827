//! REST API — chat plus the session, branch, and summary surface.
//!
//! Endpoints:
//!
//! - `POST /api/chat`                                — Send a message, get a response
//! - `GET  /api/sessions`                            — List sessions
//! - `POST /api/sessions`                            — Create a session
//! - `GET  /api/sessions/{id}/messages`              — List messages
//! - `GET  /api/sessions/{id}/branches`              — List branches
//! - `POST /api/sessions/{id}/branches`              — Fork a branch
//! - `DELETE /api/sessions/{id}/branches/{branch_id}`— Delete a branch
//! - `GET  /api/sessions/{id}/summaries`             — List cached summaries

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
};
use braid_context::{ContextBuilder, ContextOptions, FactExtractor, Strategy, resolve_history};
use braid_core::error::{ContextError, StoreError};
use braid_core::message::{BranchId, Role, Session, SessionId};
use braid_core::provider::CompletionRequest;
use braid_core::store::MessageScope;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::SharedState;

/// Session titles derived from the first message are cut at this many chars.
const TITLE_CHAR_LIMIT: usize = 60;
/// At most this many stop sequences are forwarded to the provider.
const MAX_STOP_SEQUENCES: usize = 4;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Build the API router. Nest this under "/api" in the main router.
pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/sessions", get(list_sessions_handler))
        .route("/sessions", post(create_session_handler))
        .route("/sessions/{id}/messages", get(list_messages_handler))
        .route("/sessions/{id}/branches", get(list_branches_handler))
        .route("/sessions/{id}/branches", post(create_branch_handler))
        .route(
            "/sessions/{id}/branches/{branch_id}",
            delete(delete_branch_handler),
        )
        .route("/sessions/{id}/summaries", get(list_summaries_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatRequest {
    /// Existing session ID (omit to create new).
    #[serde(default)]
    session_id: Option<String>,
    /// Branch to continue (omit for the root timeline).
    #[serde(default)]
    branch_id: Option<String>,
    /// The user's message.
    message: String,
    /// Context strategy tag; unknown or absent falls back to summarization.
    #[serde(default)]
    strategy: Option<String>,
    /// Model override for this turn.
    #[serde(default)]
    model: Option<String>,
    /// System prompt override for this turn.
    #[serde(default)]
    system_prompt: Option<String>,
    /// Sliding-window size override for this turn.
    #[serde(default)]
    window_size: Option<usize>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    top_p: Option<f32>,
    #[serde(default)]
    stop: Option<Vec<String>>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch_id: Option<String>,
    message: ChatMessageDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<UsageDto>,
    model: String,
}

#[derive(Serialize)]
struct ChatMessageDto {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct UsageDto {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Serialize)]
struct SessionDto {
    id: String,
    title: Option<String>,
    facts: braid_core::FactMap,
    created_at: String,
}

impl From<Session> for SessionDto {
    fn from(s: Session) -> Self {
        Self {
            id: s.id.0,
            title: s.title,
            facts: s.facts,
            created_at: s.created_at.to_rfc3339(),
        }
    }
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Serialize)]
struct MessageDto {
    id: String,
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch_id: Option<String>,
    created_at: String,
}

#[derive(Deserialize)]
struct CreateBranchRequest {
    #[serde(default)]
    label: Option<String>,
    /// How many root messages the branch inherits; clamped to the current
    /// root count, which is also the default.
    #[serde(default)]
    base_count: Option<i64>,
}

#[derive(Serialize)]
struct BranchDto {
    id: String,
    session_id: String,
    label: String,
    base_count: usize,
    created_at: String,
}

#[derive(Serialize)]
struct SummaryDto {
    chunk_index: usize,
    content: String,
    created_at: String,
}

#[derive(Serialize)]
struct DeletedResponse {
    ok: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ── Error helpers ─────────────────────────────────────────────────────────

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn store_error(e: StoreError) -> ApiError {
    warn!(error = %e, "Store operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("Storage error: {e}"),
        }),
    )
}

fn context_error(e: ContextError) -> ApiError {
    match e {
        ContextError::Store(inner) => store_error(inner),
        ContextError::Summarization { chunk_index, source } => {
            warn!(chunk_index, error = %source, "Summarization failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: format!("Summarization failed for chunk {chunk_index}: {source}"),
                }),
            )
        }
    }
}

fn provider_error(e: braid_core::error::ProviderError) -> ApiError {
    warn!(error = %e, "Provider call failed");
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse {
            error: format!("Provider error: {e}"),
        }),
    )
}

// ── Validation ────────────────────────────────────────────────────────────

/// Validate and normalize the sampling parameters of a chat request.
fn validate_sampling(payload: &ChatRequest) -> Result<Vec<String>, ApiError> {
    if let Some(t) = payload.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(bad_request("temperature must be between 0 and 2"));
        }
    }

    if let Some(p) = payload.top_p {
        if !(0.0..=1.0).contains(&p) {
            return Err(bad_request("top_p must be between 0 and 1"));
        }
    }

    if payload.max_tokens == Some(0) {
        return Err(bad_request("max_tokens must be greater than 0"));
    }

    if payload.window_size == Some(0) {
        return Err(bad_request("window_size must be greater than 0"));
    }

    let stop: Vec<String> = payload
        .stop
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(MAX_STOP_SEQUENCES)
        .collect();

    Ok(stop)
}

/// Derive a session title from the first user message.
fn derive_title(message: &str) -> String {
    message.trim().chars().take(TITLE_CHAR_LIMIT).collect()
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = payload.message.trim().to_string();
    if message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let stop = validate_sampling(&payload)?;

    // Resolve or create the session.
    let session = match &payload.session_id {
        Some(raw) => {
            let id = SessionId::from(raw.as_str());
            state
                .store
                .get_session(&id)
                .await
                .map_err(store_error)?
                .ok_or_else(|| not_found(format!("Session {raw} not found")))?
        }
        None => {
            let title = derive_title(&message);
            state
                .store
                .create_session(Some(&title))
                .await
                .map_err(store_error)?
        }
    };

    // A branch must exist before messages can land on it.
    let branch_id = match &payload.branch_id {
        Some(raw) => {
            let id = BranchId::from(raw.as_str());
            state
                .store
                .get_branch(&session.id, &id)
                .await
                .map_err(store_error)?
                .ok_or_else(|| not_found(format!("Branch {raw} not found")))?;
            Some(id)
        }
        None => None,
    };

    info!(
        session = %session.id,
        branch = ?branch_id,
        strategy = ?payload.strategy,
        "Chat request"
    );

    state
        .store
        .append_message(&session.id, branch_id.as_ref(), Role::User, &message)
        .await
        .map_err(store_error)?;

    let history = resolve_history(state.store.as_ref(), &session.id, branch_id.as_ref())
        .await
        .map_err(store_error)?;

    let strategy = Strategy::from_tag(payload.strategy.as_deref());
    let opts = ContextOptions {
        window_size: payload
            .window_size
            .unwrap_or(state.config.context.window_size),
        facts: session.facts.clone(),
    };
    let system_prompt = payload
        .system_prompt
        .as_deref()
        .unwrap_or(&state.config.system_prompt);

    let builder = ContextBuilder::new(
        state.store.as_ref(),
        state.provider.as_ref(),
        &state.config.summary_model,
    );
    let context = builder
        .build(
            strategy,
            &session.id,
            &history,
            system_prompt,
            &opts,
        )
        .await
        .map_err(context_error)?;

    let model = payload
        .model
        .clone()
        .unwrap_or_else(|| state.config.default_model.clone());
    let request = CompletionRequest {
        model,
        messages: context,
        temperature: payload
            .temperature
            .or(Some(state.config.default_temperature)),
        top_p: payload.top_p,
        stop,
        max_tokens: payload.max_tokens,
    };

    let response = state
        .provider
        .complete(request)
        .await
        .map_err(provider_error)?;

    let reply = response.message.content.clone();
    state
        .store
        .append_message(&session.id, branch_id.as_ref(), Role::Assistant, &reply)
        .await
        .map_err(store_error)?;

    // Sticky facts: refresh the session's fact memory after the turn.
    // Extraction is best-effort and never fails the response.
    if strategy == Strategy::StickyFacts {
        let mut turn = history;
        turn.push(response.message.clone());
        let extractor =
            FactExtractor::new(state.provider.as_ref(), &state.config.summary_model);
        let updated = extractor.update(&turn, &session.facts).await;
        if updated != session.facts {
            if let Err(e) = state.store.set_session_facts(&session.id, &updated).await {
                debug!(session = %session.id, error = %e, "Failed to persist updated facts");
            }
        }
    }

    Ok(Json(ChatResponse {
        session_id: session.id.0,
        branch_id: branch_id.map(|b| b.0),
        message: ChatMessageDto {
            role: "assistant".into(),
            content: reply,
        },
        usage: response.usage.map(|u| UsageDto {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
        model: response.model,
    }))
}

async fn list_sessions_handler(
    State(state): State<SharedState>,
) -> Result<Json<Vec<SessionDto>>, ApiError> {
    let sessions = state.store.list_sessions().await.map_err(store_error)?;
    Ok(Json(sessions.into_iter().map(SessionDto::from).collect()))
}

async fn create_session_handler(
    State(state): State<SharedState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionDto>), ApiError> {
    let title = payload.title.as_deref().unwrap_or("New chat");
    let session = state
        .store
        .create_session(Some(title))
        .await
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

async fn list_messages_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let session_id = require_session(&state, &id).await?;

    let messages = state
        .store
        .list_messages(&session_id, MessageScope::All)
        .await
        .map_err(store_error)?;

    Ok(Json(
        messages
            .into_iter()
            .map(|m| MessageDto {
                id: m.id,
                role: m.role.as_str().into(),
                content: m.content,
                branch_id: m.branch_id.map(|b| b.0),
                created_at: m.created_at.to_rfc3339(),
            })
            .collect(),
    ))
}

async fn list_branches_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<BranchDto>>, ApiError> {
    let session_id = require_session(&state, &id).await?;

    let branches = state
        .store
        .list_branches(&session_id)
        .await
        .map_err(store_error)?;

    Ok(Json(branches.into_iter().map(branch_dto).collect()))
}

async fn create_branch_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<CreateBranchRequest>,
) -> Result<(StatusCode, Json<BranchDto>), ApiError> {
    let session_id = require_session(&state, &id).await?;

    let root_count = state
        .store
        .count_root_messages(&session_id)
        .await
        .map_err(store_error)?;

    // Negative or missing base counts fall back to "fork from the tip".
    let base_count = match payload.base_count {
        Some(n) if n >= 0 => (n as usize).min(root_count),
        _ => root_count,
    };

    let label = payload
        .label
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or("Branch");

    let branch = state
        .store
        .create_branch(&session_id, label, base_count)
        .await
        .map_err(store_error)?;

    Ok((StatusCode::CREATED, Json(branch_dto(branch))))
}

async fn delete_branch_handler(
    State(state): State<SharedState>,
    Path((id, branch_id)): Path<(String, String)>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let session_id = require_session(&state, &id).await?;

    let deleted = state
        .store
        .delete_branch(&session_id, &BranchId::from(branch_id.as_str()))
        .await
        .map_err(store_error)?;

    if !deleted {
        return Err(not_found(format!("Branch {branch_id} not found")));
    }
    Ok(Json(DeletedResponse { ok: true }))
}

async fn list_summaries_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SummaryDto>>, ApiError> {
    let session_id = require_session(&state, &id).await?;

    let summaries = state
        .store
        .list_summaries(&session_id)
        .await
        .map_err(store_error)?;

    Ok(Json(
        summaries
            .into_iter()
            .map(|s| SummaryDto {
                chunk_index: s.chunk_index,
                content: s.content,
                created_at: s.created_at.to_rfc3339(),
            })
            .collect(),
    ))
}

/// Look up a session by raw ID, mapping a miss to 404.
async fn require_session(state: &SharedState, raw: &str) -> Result<SessionId, ApiError> {
    let id = SessionId::from(raw);
    state
        .store
        .get_session(&id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found(format!("Session {raw} not found")))?;
    Ok(id)
}

fn branch_dto(b: braid_core::message::Branch) -> BranchDto {
    BranchDto {
        id: b.id.0,
        session_id: b.session_id.0,
        label: b.label,
        base_count: b.base_count,
        created_at: b.created_at.to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppState, build_router};
    use axum::body::Body;
    use axum::http::Request;
    use braid_core::store::ChatStore;
    use braid_providers::ScriptedProvider;
    use braid_store::InMemoryStore;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct TestApp {
        router: axum::Router,
        store: Arc<InMemoryStore>,
        provider: Arc<ScriptedProvider>,
    }

    fn app_with(provider: ScriptedProvider) -> TestApp {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(provider);
        let state = Arc::new(AppState {
            store: store.clone(),
            provider: provider.clone(),
            config: braid_config::AppConfig::default(),
        });
        TestApp {
            router: build_router(state),
            store,
            provider,
        }
    }

    fn app() -> TestApp {
        app_with(ScriptedProvider::new())
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn chat_creates_session_and_replies() {
        let app = app_with(ScriptedProvider::with_responses(["Hello there!"]));

        let response = app
            .router
            .oneshot(post_json(
                "/api/chat",
                serde_json::json!({"message": "Hi, how are you?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["message"]["role"], "assistant");
        assert_eq!(body["message"]["content"], "Hello there!");
        let session_id = body["session_id"].as_str().unwrap();

        // The new session is titled from the first message
        let session = app
            .store
            .get_session(&SessionId::from(session_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.title.as_deref(), Some("Hi, how are you?"));

        // Both sides of the turn are persisted on the root
        let messages = app
            .store
            .list_messages(&SessionId::from(session_id), MessageScope::Root)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn chat_empty_message_rejected() {
        let app = app();
        let response = app
            .router
            .oneshot(post_json("/api/chat", serde_json::json!({"message": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_invalid_sampling_rejected() {
        for body in [
            serde_json::json!({"message": "hi", "temperature": 3.5}),
            serde_json::json!({"message": "hi", "top_p": 1.5}),
            serde_json::json!({"message": "hi", "max_tokens": 0}),
            serde_json::json!({"message": "hi", "window_size": 0}),
        ] {
            let app = app();
            let response = app
                .router
                .oneshot(post_json("/api/chat", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn chat_window_size_and_system_prompt_overrides() {
        let app = app();
        let session = app.store.create_session(None).await.unwrap();
        for i in 0..5 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            app.store
                .append_message(&session.id, None, role, &format!("turn {i}"))
                .await
                .unwrap();
        }

        let response = app
            .router
            .oneshot(post_json(
                "/api/chat",
                serde_json::json!({
                    "session_id": session.id.0,
                    "message": "and now?",
                    "strategy": "sliding_window",
                    "window_size": 2,
                    "system_prompt": "Answer in one word.",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // 1 system message plus the last 2 of the 6 history messages
        let requests = app.provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 3);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[0].content, "Answer in one word.");
        assert_eq!(requests[0].messages[2].content, "and now?");
    }

    #[tokio::test]
    async fn chat_unknown_session_is_404() {
        let app = app();
        let response = app
            .router
            .oneshot(post_json(
                "/api/chat",
                serde_json::json!({"session_id": "ghost", "message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_unknown_branch_is_404() {
        let app = app();
        let session = app.store.create_session(None).await.unwrap();
        let response = app
            .router
            .oneshot(post_json(
                "/api/chat",
                serde_json::json!({
                    "session_id": session.id.0,
                    "branch_id": "ghost",
                    "message": "hi"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_stop_sequences_trimmed_and_capped() {
        let app = app();
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/chat",
                serde_json::json!({
                    "message": "hi",
                    "strategy": "sliding_window",
                    "stop": ["  END  ", "", "a", "b", "c", "d"]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let requests = app.provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].stop, vec!["END", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn chat_on_branch_sees_prefix_plus_tail() {
        let app = app_with(ScriptedProvider::with_responses(["branch reply"]));
        let session = app.store.create_session(None).await.unwrap();
        for content in ["root 1", "root 2", "root 3"] {
            app.store
                .append_message(&session.id, None, Role::User, content)
                .await
                .unwrap();
        }
        let branch = app.store.create_branch(&session.id, "alt", 2).await.unwrap();

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/chat",
                serde_json::json!({
                    "session_id": session.id.0,
                    "branch_id": branch.id.0,
                    "message": "branch question",
                    "strategy": "sliding_window"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["branch_id"], branch.id.0);

        // The provider saw the two inherited root messages plus the branch
        // message, never "root 3".
        let requests = app.provider.requests();
        let contents: Vec<&str> = requests[0]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert!(contents.contains(&"root 1"));
        assert!(contents.contains(&"root 2"));
        assert!(!contents.contains(&"root 3"));
        assert!(contents.contains(&"branch question"));
    }

    #[tokio::test]
    async fn chat_summarization_failure_is_502() {
        let app = app();
        let session = app.store.create_session(None).await.unwrap();
        // Enough root history to force one full chunk through the summarizer
        for i in 0..12 {
            app.store
                .append_message(&session.id, None, Role::User, &format!("m{i}"))
                .await
                .unwrap();
        }
        app.provider.fail_next("model offline");

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/chat",
                serde_json::json!({"session_id": session.id.0, "message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        // The turn was aborted after the user message landed
        let messages = app
            .store
            .list_messages(&session.id, MessageScope::Root)
            .await
            .unwrap();
        assert_eq!(messages.last().unwrap().content, "hi");
        assert_eq!(messages.last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn sticky_facts_updates_session_memory() {
        // First response answers the chat, second answers the extractor
        let app = app_with(ScriptedProvider::with_responses([
            "Noted!",
            r#"{"favorite_color": "green"}"#,
        ]));

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/chat",
                serde_json::json!({
                    "message": "My favorite color is green",
                    "strategy": "sticky_facts"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let session_id = SessionId::from(body["session_id"].as_str().unwrap());

        let session = app.store.get_session(&session_id).await.unwrap().unwrap();
        assert_eq!(session.facts.get("favorite_color"), Some("green"));
    }

    #[tokio::test]
    async fn sticky_facts_extraction_failure_is_invisible() {
        let app = app_with(ScriptedProvider::with_responses([
            "Sure.",
            "not json at all",
        ]));

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/chat",
                serde_json::json!({"message": "hello", "strategy": "sticky_facts"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let session_id = SessionId::from(body["session_id"].as_str().unwrap());
        let session = app.store.get_session(&session_id).await.unwrap().unwrap();
        assert!(session.facts.is_empty());
    }

    #[tokio::test]
    async fn session_create_and_list() {
        let app = app();
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                "/api/sessions",
                serde_json::json!({"title": "Planning"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["title"], "Planning");

        let response = app.router.oneshot(get_req("/api/sessions")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listed = json_body(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn messages_endpoint_returns_all_scopes() {
        let app = app();
        let session = app.store.create_session(None).await.unwrap();
        app.store
            .append_message(&session.id, None, Role::User, "root")
            .await
            .unwrap();
        let branch = app.store.create_branch(&session.id, "alt", 1).await.unwrap();
        app.store
            .append_message(&session.id, Some(&branch.id), Role::User, "branched")
            .await
            .unwrap();

        let response = app
            .router
            .oneshot(get_req(&format!("/api/sessions/{}/messages", session.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn messages_unknown_session_is_404() {
        let app = app();
        let response = app
            .router
            .oneshot(get_req("/api/sessions/ghost/messages"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn branch_defaults_to_fork_from_tip() {
        let app = app();
        let session = app.store.create_session(None).await.unwrap();
        for i in 0..3 {
            app.store
                .append_message(&session.id, None, Role::User, &format!("m{i}"))
                .await
                .unwrap();
        }

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                &format!("/api/sessions/{}/branches", session.id),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["base_count"], 3);
        assert_eq!(body["label"], "Branch");
    }

    #[tokio::test]
    async fn branch_base_count_clamped_to_root_count() {
        let app = app();
        let session = app.store.create_session(None).await.unwrap();
        app.store
            .append_message(&session.id, None, Role::User, "only")
            .await
            .unwrap();

        let response = app
            .router
            .clone()
            .oneshot(post_json(
                &format!("/api/sessions/{}/branches", session.id),
                serde_json::json!({"label": "far ahead", "base_count": 99}),
            ))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["base_count"], 1);

        // Negative falls back to the tip as well
        let response = app
            .router
            .clone()
            .oneshot(post_json(
                &format!("/api/sessions/{}/branches", session.id),
                serde_json::json!({"base_count": -5}),
            ))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["base_count"], 1);
    }

    #[tokio::test]
    async fn branch_delete_round_trip() {
        let app = app();
        let session = app.store.create_session(None).await.unwrap();
        let branch = app.store.create_branch(&session.id, "doomed", 0).await.unwrap();

        let uri = format!("/api/sessions/{}/branches/{}", session.id, branch.id);
        let req = Request::builder()
            .method("DELETE")
            .uri(&uri)
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["ok"], true);

        // Gone now
        let req = Request::builder()
            .method("DELETE")
            .uri(&uri)
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn summaries_endpoint_lists_cache() {
        let app = app();
        let session = app.store.create_session(None).await.unwrap();
        app.store
            .create_summary(&session.id, 0, "early recap")
            .await
            .unwrap();

        let response = app
            .router
            .oneshot(get_req(&format!("/api/sessions/{}/summaries", session.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["chunk_index"], 0);
        assert_eq!(body[0]["content"], "early recap");
    }

    #[test]
    fn title_truncated_at_char_limit() {
        let long = "x".repeat(200);
        assert_eq!(derive_title(&long).chars().count(), TITLE_CHAR_LIMIT);
        assert_eq!(derive_title("  hello  "), "hello");
    }
}

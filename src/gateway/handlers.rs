use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::sse::{build_sse_response, fatal_sse_response};
use crate::engine::Task;
use crate::persistence::FieldValue;
use crate::providers::{Capability, ChatMessage, ProviderConfig, ProviderHealthSnapshot};

/// Used when a problem arrives as a photo with no accompanying text.
const IMAGE_ONLY_PROMPT: &str = "请识别图片中的题目并分析错误。";

/// Body of `POST /api/problems/{id}/analyze`.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    /// Question text; falls back to the stored `source_text`.
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub image: Option<ImageInput>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub review_mode: bool,
}

/// Base64 image payload.
#[derive(Debug, Deserialize)]
pub struct ImageInput {
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
struct ReloadRequest {
    providers: Vec<ProviderConfig>,
}

#[derive(Debug, Serialize)]
struct ProviderStatus {
    id: String,
    kind: String,
    model: String,
    priority: u32,
    active: bool,
    capabilities: Vec<Capability>,
    health: Option<ProviderHealthSnapshot>,
}

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": { "message": message.into() } })),
    )
        .into_response()
}

/// GET /health
pub(super) async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "providers": state.engine.registry().len(),
        "store": state.store.as_ref().map(|s| s.name().to_string()),
    }))
}

/// POST /api/problems/{id}/analyze: stream an analysis as SSE
pub(super) async fn handle_analyze(
    State(state): State<AppState>,
    Path(problem_id): Path<i64>,
    Json(request): Json<AnalyzeRequest>,
) -> Response {
    let prompt = match resolve_prompt(&state, problem_id, &request).await {
        Ok(prompt) => prompt,
        Err(response) => return response,
    };

    let message = match request.image {
        Some(image) => ChatMessage::user_with_image(prompt, image.media_type, image.data),
        None => ChatMessage::user(prompt),
    };
    let mut task = Task::new(vec![message])
        .with_problem(problem_id)
        .with_review_mode(request.review_mode);
    if let Some(subject) = request.subject {
        task = task.with_subject(subject);
    }
    if let Some(category) = request.category {
        task = task.with_category(category);
    }

    match state.engine.start(task) {
        Ok(handle) => build_sse_response(handle.into_sse()),
        Err(e) => {
            tracing::warn!(problem_id, error = %e, "analysis rejected before dispatch");
            fatal_sse_response(&e)
        }
    }
}

async fn resolve_prompt(
    state: &AppState,
    problem_id: i64,
    request: &AnalyzeRequest,
) -> Result<String, Response> {
    if let Some(prompt) = request.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        return Ok(prompt.to_string());
    }

    let stored = match &state.store {
        Some(store) => store.get_by_id(problem_id).await.map_err(|e| {
            tracing::warn!(problem_id, error = %e, "problem lookup failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "problem lookup failed")
        })?,
        None => None,
    };
    let source_text = stored.and_then(|problem| match problem.fields.get("source_text") {
        Some(FieldValue::Text(text)) if !text.trim().is_empty() => Some(text.clone()),
        _ => None,
    });

    match source_text {
        Some(text) => Ok(text),
        None if request.image.is_some() => Ok(IMAGE_ONLY_PROMPT.to_string()),
        None => Err(error_json(
            StatusCode::NOT_FOUND,
            format!("problem {problem_id} has no text to analyze"),
        )),
    }
}

/// GET /api/providers/health
pub(super) async fn handle_provider_health(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.engine.health();
    let providers: Vec<ProviderStatus> = state
        .engine
        .registry()
        .snapshot()
        .iter()
        .map(|p| ProviderStatus {
            id: p.id.clone(),
            kind: p.kind.to_string(),
            model: p.model.clone(),
            priority: p.priority,
            active: p.active,
            capabilities: p.capabilities.iter().copied().collect(),
            health: health.snapshot(&p.id),
        })
        .collect();
    Json(serde_json::json!({ "providers": providers }))
}

/// POST /api/providers/reload: replace the provider list from the body,
/// or re-read the config file when the body is empty. Bodies naming
/// credentials are refused.
pub(super) async fn handle_reload(State(state): State<AppState>, body: Bytes) -> Response {
    let registry = state.engine.registry();
    let result = if body.iter().all(u8::is_ascii_whitespace) {
        registry.reload_from_path(&state.config_path)
    } else {
        let request = match serde_json::from_slice::<ReloadRequest>(&body) {
            Ok(request) => request,
            Err(e) => return error_json(StatusCode::BAD_REQUEST, format!("invalid body: {e}")),
        };
        // Keys are only read from the config file.
        if let Some(provider) = request
            .providers
            .iter()
            .find(|p| p.api_key.is_some() || p.api_key_env.is_some())
        {
            tracing::warn!(provider = provider.id.as_str(), "reload body carried credentials");
            return error_json(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!(
                    "provider {}: api_key and api_key_env are only accepted from the config file",
                    provider.id
                ),
            );
        }
        registry.reload(request.providers)
    };

    match result {
        Ok(()) => Json(serde_json::json!({ "reloaded": true, "providers": registry.len() }))
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "provider reload rejected");
            error_json(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use shared_types::HostContext;

use crate::AppState;

/// GET /api/state
pub async fn get_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.widget.snapshot().await)
}

/// POST /api/refresh
pub async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.widget.voicemails().refresh(true).await;
    Json(state.widget.snapshot().await)
}

/// POST /api/login
pub async fn login(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.widget.login().await;
    (
        StatusCode::ACCEPTED,
        Json(json!({ "authState": state.widget.auth_state().await })),
    )
}

/// POST /api/page/next
pub async fn next_page(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let moved = state.widget.voicemails().next_page().await;
    paged(&state, moved).await
}

/// POST /api/page/previous
pub async fn previous_page(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let moved = state.widget.voicemails().previous_page().await;
    paged(&state, moved).await
}

async fn paged(state: &AppState, moved: bool) -> Json<serde_json::Value> {
    Json(json!({
        "moved": moved,
        "page": state.widget.voicemails().page().await,
    }))
}

/// PUT /api/context
pub async fn set_context(
    State(state): State<Arc<AppState>>,
    Json(context): Json<HostContext>,
) -> impl IntoResponse {
    state.widget.set_host_context(context).await;
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
pub struct ReadBody {
    pub read: bool,
}

#[derive(Deserialize)]
pub struct NoteBody {
    pub note: String,
}

/// POST /api/voicemails/{id}/read
pub async fn set_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReadBody>,
) -> impl IntoResponse {
    let ok = state.widget.voicemails().set_read(&id, body.read).await;
    outcome(&state, ok).await
}

/// POST /api/voicemails/{id}/note
pub async fn set_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<NoteBody>,
) -> impl IntoResponse {
    let ok = state.widget.voicemails().set_note(&id, &body.note).await;
    outcome(&state, ok).await
}

/// DELETE /api/voicemails/{id}
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let ok = state.widget.voicemails().delete(&id).await;
    outcome(&state, ok).await
}

/// GET /api/voicemails/{id}/audio
pub async fn audio(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.widget.voicemails().load_audio(&id).await {
        Some(url) => Json(json!({ "url": url })).into_response(),
        None => {
            let error = state.widget.snapshot().await.error;
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": error }))).into_response()
        }
    }
}

/// POST /api/voicemails/{id}/expand
pub async fn toggle_expanded(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    found(state.widget.voicemails().toggle_expanded(&id).await)
}

/// POST /api/voicemails/{id}/menu
pub async fn toggle_menu(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    found(state.widget.voicemails().toggle_menu(&id).await)
}

/// POST /api/voicemails/{id}/edit
pub async fn begin_edit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    found(state.widget.voicemails().begin_edit(&id).await)
}

/// POST /api/voicemails/{id}/edit/cancel
pub async fn cancel_edit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    found(state.widget.voicemails().cancel_edit(&id).await)
}

fn found(present: bool) -> StatusCode {
    if present {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Mutations report the widget's error message on failure; the cache is
/// untouched in that case.
async fn outcome(state: &AppState, ok: bool) -> axum::response::Response {
    let snapshot = state.widget.snapshot().await;
    if ok {
        Json(snapshot).into_response()
    } else {
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": snapshot.error })),
        )
            .into_response()
    }
}

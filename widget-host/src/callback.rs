//! OAuth redirect target. Plays the part of the popup page: hands the
//! authorization code to the widget as an `AUTH_CALLBACK` window message.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use serde::Deserialize;
use shared_types::PopupMessage;
use tracing::{info, warn};
use widget_core::WindowMessage;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /oauth/callback
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    if let Some(error) = params.error {
        let detail = params.error_description.unwrap_or_default();
        warn!(%error, %detail, "authorization denied");
        return (
            StatusCode::BAD_REQUEST,
            page("Sign-in failed", &format!("{error} {detail}")),
        );
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            page("Sign-in failed", "The redirect carried no authorization code."),
        );
    };

    let data = match serde_json::to_value(PopupMessage::AuthCallback { code }) {
        Ok(data) => data,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                page("Sign-in failed", &e.to_string()),
            )
        }
    };
    let accepted = state
        .widget
        .post_message(WindowMessage {
            origin: state.host_origin.clone(),
            data,
        })
        .await;

    if accepted {
        info!("authorization code relayed");
        (
            StatusCode::OK,
            page("Signed in", "You may close this window."),
        )
    } else {
        (
            StatusCode::CONFLICT,
            page(
                "Sign-in not completed",
                "No login was waiting for this callback, or the code exchange failed.",
            ),
        )
    }
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{t}</title></head>\
         <body><h1>{t}</h1><p>{b}</p></body></html>",
        t = escape(title),
        b = escape(body.trim()),
    ))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

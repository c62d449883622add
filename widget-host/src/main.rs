mod api;
mod callback;
mod launcher;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use widget_core::config::env_parse;
use widget_core::{FileStore, MemoryStore, Widget, WidgetConfig, WidgetDeps, WidgetEvent};

pub struct AppState {
    pub widget: Widget,
    /// Origin stamped on relayed popup callbacks.
    pub host_origin: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "widget_host=debug,widget_core=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WidgetConfig::from_env()?;
    let port: u16 = env_parse("WIDGET_HOST_PORT", 8787)?;
    if config.client_id.is_empty() {
        warn!("VOICEMAIL_CLIENT_ID is not set; the platform will reject the login");
    }
    info!(port, api = %config.api_base_url, "widget host starting");

    let widget = Widget::mount(
        &config,
        WidgetDeps {
            durable_store: Arc::new(FileStore::open(&config.session_file)),
            tab_store: Arc::new(MemoryStore::new()),
            launcher: Arc::new(launcher::SystemBrowserLauncher::new()),
        },
    )
    .await?;

    tokio::spawn(log_events(widget.clone()));

    let state = Arc::new(AppState {
        widget: widget.clone(),
        host_origin: config.host_origin.clone(),
    });

    let app = Router::new()
        .route("/oauth/callback", get(callback::oauth_callback))
        .route("/api/state", get(api::get_state))
        .route("/api/refresh", post(api::refresh))
        .route("/api/login", post(api::login))
        .route("/api/context", put(api::set_context))
        .route("/api/page/next", post(api::next_page))
        .route("/api/page/previous", post(api::previous_page))
        .route("/api/voicemails/{id}", axum::routing::delete(api::delete))
        .route("/api/voicemails/{id}/read", post(api::set_read))
        .route("/api/voicemails/{id}/note", post(api::set_note))
        .route("/api/voicemails/{id}/audio", get(api::audio))
        .route("/api/voicemails/{id}/expand", post(api::toggle_expanded))
        .route("/api/voicemails/{id}/menu", post(api::toggle_menu))
        .route("/api/voicemails/{id}/edit", post(api::begin_edit))
        .route("/api/voicemails/{id}/edit/cancel", post(api::cancel_edit))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("127.0.0.1:{port}");
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    widget.unmount().await;
    Ok(())
}

/// Stands in for the badge and toast surfaces.
async fn log_events(widget: Widget) {
    let mut events = widget.subscribe();
    loop {
        match events.recv().await {
            Ok(WidgetEvent::UnreadCount(badge)) => info!(unread = badge.count, "badge"),
            Ok(WidgetEvent::Error(message)) => warn!(%message, "widget error"),
            Ok(event) => debug!(?event, "widget event"),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event log fell behind");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

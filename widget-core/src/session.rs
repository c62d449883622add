//! Popup-based PKCE login and code exchange.
//!
//! State machine:
//!
//! ```text
//! Unauthenticated ──login()──▶ AwaitingPopupCallback ──code exchanged──▶ Authenticated
//!        ▲                              │                                    │
//!        └──── popup blocked / exchange failed ◀─┘       401 or expiry ──────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shared_types::{AuthState, PendingAuthorization, PopupMessage, Session, TokenResponse};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::WidgetConfig;
use crate::error::AuthError;
use crate::events::{Command, CommandSender, EventSink, WidgetEvent};
use crate::pkce;
use crate::token_store::{PendingAuthorizationStore, TokenStore};

/// Opens the authorization page in a popup (or browser window).
pub trait PopupLauncher: Send + Sync {
    /// `Err(AuthError::PopupBlocked)` when nothing could be opened.
    fn open(&self, url: &str) -> Result<(), AuthError>;
}

/// A message delivered to the hosting window.
#[derive(Debug, Clone)]
pub struct WindowMessage {
    pub origin: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub client_id: String,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub host_origin: String,
    pub settle_delay: Duration,
}

impl From<&WidgetConfig> for AuthSettings {
    fn from(config: &WidgetConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            authorize_url: config.authorize_url(),
            token_url: config.token_url(),
            redirect_uri: config.redirect_uri.clone(),
            host_origin: config.host_origin.clone(),
            settle_delay: config.settle_delay,
        }
    }
}

pub struct SessionManager {
    settings: AuthSettings,
    http: reqwest::Client,
    tokens: TokenStore,
    pending: PendingAuthorizationStore,
    launcher: Arc<dyn PopupLauncher>,
    commands: CommandSender,
    events: EventSink,
    state: Mutex<AuthState>,
    /// One-shot: armed by `login`, consumed by the first accepted callback.
    listener_armed: AtomicBool,
    /// Set once the user has been told that an open popup is blocking
    /// automatic logins. Cleared whenever a popup is launched.
    stalled_notice: AtomicBool,
}

impl SessionManager {
    pub fn new(
        settings: AuthSettings,
        http: reqwest::Client,
        tokens: TokenStore,
        pending: PendingAuthorizationStore,
        launcher: Arc<dyn PopupLauncher>,
        commands: CommandSender,
        events: EventSink,
    ) -> Self {
        Self {
            settings,
            http,
            tokens,
            pending,
            launcher,
            commands,
            events,
            state: Mutex::new(AuthState::Unauthenticated),
            listener_armed: AtomicBool::new(false),
            stalled_notice: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> AuthState {
        *self.state.lock().await
    }

    async fn set_state(&self, next: AuthState) {
        let mut state = self.state.lock().await;
        if *state != next {
            debug!(from = ?*state, to = ?next, "auth state");
            *state = next;
            drop(state);
            self.events.emit(WidgetEvent::AuthStateChanged(next));
        }
    }

    /// Adopt a session found in the Token Store at mount time.
    pub async fn restore(&self) -> bool {
        if self.tokens.read().is_some() {
            self.set_state(AuthState::Authenticated).await;
            true
        } else {
            false
        }
    }

    /// Start a login unconditionally. A pending login is replaced.
    pub async fn login(&self) {
        self.set_state(AuthState::AwaitingPopupCallback).await;
        self.launch_popup().await;
    }

    /// Start a login unless one is already waiting for its popup. Returns
    /// whether a popup was launched.
    pub async fn login_if_idle(&self) -> bool {
        {
            let mut state = self.state.lock().await;
            if *state == AuthState::AwaitingPopupCallback {
                drop(state);
                debug!("login already in progress");
                if !self.stalled_notice.swap(true, Ordering::SeqCst) {
                    self.events.error(
                        "Sign-in is waiting on the login window; finish it there or start the login again",
                    );
                }
                return false;
            }
            *state = AuthState::AwaitingPopupCallback;
        }
        self.events
            .emit(WidgetEvent::AuthStateChanged(AuthState::AwaitingPopupCallback));
        self.launch_popup().await;
        true
    }

    async fn launch_popup(&self) {
        self.stalled_notice.store(false, Ordering::SeqCst);
        let verifier = pkce::generate_verifier();
        let challenge = pkce::derive_challenge(&verifier).await;
        self.pending.write(&PendingAuthorization {
            code_verifier: verifier,
        });

        let url = match pkce::authorization_url(
            &self.settings.authorize_url,
            &self.settings.client_id,
            &self.settings.redirect_uri,
            &challenge,
        ) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, authorize_url = %self.settings.authorize_url, "invalid authorization endpoint");
                self.set_state(AuthState::Unauthenticated).await;
                self.events
                    .error(format!("Login is misconfigured: invalid authorization URL ({e})"));
                return;
            }
        };

        self.listener_armed.store(true, Ordering::SeqCst);

        match self.launcher.open(url.as_str()) {
            Ok(()) => info!("login popup opened"),
            Err(e) => {
                warn!(error = %e, "login popup could not be opened");
                self.listener_armed.store(false, Ordering::SeqCst);
                self.set_state(AuthState::Unauthenticated).await;
                self.events.error(e.to_string());
            }
        }
    }

    /// Authorization code carried by `message`, if it is a genuine popup
    /// callback from our own origin.
    pub fn callback_code(&self, message: &WindowMessage) -> Option<String> {
        if message.origin != self.settings.host_origin {
            debug!(origin = %message.origin, "ignoring message from foreign origin");
            return None;
        }
        match serde_json::from_value::<PopupMessage>(message.data.clone()) {
            Ok(PopupMessage::AuthCallback { code }) if !code.is_empty() => Some(code),
            _ => {
                debug!("ignoring message without an auth callback payload");
                None
            }
        }
    }

    /// Feed a window message to the popup-callback listener. Returns the new
    /// access token when the message completed a login.
    pub async fn handle_message(&self, message: WindowMessage) -> Option<String> {
        let code = self.callback_code(&message)?;
        if !self.listener_armed.swap(false, Ordering::SeqCst) {
            debug!("auth callback arrived with no login in progress");
            return None;
        }
        self.exchange_code_for_token(&code).await
    }

    pub async fn exchange_code_for_token(&self, code: &str) -> Option<String> {
        let result = self.request_token(code).await;
        self.pending.clear();

        match result {
            Ok(session) => {
                let token = session.access_token.clone();
                self.tokens.write(&session);
                self.set_state(AuthState::Authenticated).await;
                info!(expires_at = session.expires_at_epoch_ms, "login complete");
                self.schedule_bootstrap();
                Some(token)
            }
            Err(e) => {
                warn!(error = %e, "code exchange failed");
                self.set_state(AuthState::Unauthenticated).await;
                self.events.error(e.to_string());
                None
            }
        }
    }

    async fn request_token(&self, code: &str) -> Result<Session, AuthError> {
        let verifier = self
            .pending
            .read()
            .ok_or(AuthError::MissingVerifier)?
            .code_verifier;

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("client_id", self.settings.client_id.as_str()),
            ("code_verifier", verifier.as_str()),
        ];

        let response = self
            .http
            .post(&self.settings.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchangeFailed(format!(
                "HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        Ok(Session::from_expires_in(
            token.access_token,
            token.expires_in,
            Utc::now().timestamp_millis(),
        ))
    }

    /// The platform lags a little behind a fresh login; wait before the
    /// first fetch and channel setup.
    fn schedule_bootstrap(&self) {
        let commands = self.commands.clone();
        let delay = self.settings.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            commands.send(Command::Bootstrap);
        });
    }

    /// Drop the session after the platform rejected it. Returns true only
    /// for the call that moved the manager out of `Authenticated`, so
    /// concurrent rejections lead to a single re-login.
    pub async fn invalidate(&self) -> bool {
        self.tokens.clear();
        let mut state = self.state.lock().await;
        if *state != AuthState::Authenticated {
            return false;
        }
        *state = AuthState::Unauthenticated;
        drop(state);
        info!("session invalidated");
        self.events
            .emit(WidgetEvent::AuthStateChanged(AuthState::Unauthenticated));
        true
    }
}

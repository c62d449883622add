//! The mounted widget: owns every component and dispatches the commands they
//! send each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use shared_types::{AuthState, ConnectionState, HostContext, WidgetSnapshot};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WidgetConfig;
use crate::error::GatewayError;
use crate::events::{Command, CommandSender, EventSink, WidgetEvent};
use crate::gateway::ApiGateway;
use crate::notifications::NotificationChannel;
use crate::session::{AuthSettings, PopupLauncher, SessionManager, WindowMessage};
use crate::storage::KeyValueStore;
use crate::sync::Synchronizer;
use crate::token_store::{PendingAuthorizationStore, TokenStore};

const EVENT_CAPACITY: usize = 256;

/// What the host provides at mount time.
pub struct WidgetDeps {
    /// Survives restarts; holds the session.
    pub durable_store: Arc<dyn KeyValueStore>,
    /// Scoped to one login attempt; holds the PKCE verifier.
    pub tab_store: Arc<dyn KeyValueStore>,
    pub launcher: Arc<dyn PopupLauncher>,
}

struct WidgetInner {
    session: SessionManager,
    channel: Arc<NotificationChannel>,
    sync: Synchronizer,
    tokens: TokenStore,
    events: EventSink,
    host_context: Mutex<HostContext>,
    mounted: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Widget {
    inner: Arc<WidgetInner>,
}

impl Widget {
    /// Build the components and start the widget. A stored, unexpired session
    /// is used right away; otherwise a login popup is opened.
    pub async fn mount(config: &WidgetConfig, deps: WidgetDeps) -> Result<Self, GatewayError> {
        let gateway = ApiGateway::new(&config.api_base_url, config.http_timeout)?;
        let tokens = TokenStore::new(deps.durable_store);
        let pending = PendingAuthorizationStore::new(deps.tab_store);
        let events = EventSink::new(EVENT_CAPACITY);
        let (commands, rx) = CommandSender::channel();

        let session = SessionManager::new(
            AuthSettings::from(config),
            gateway.client().clone(),
            tokens.clone(),
            pending,
            deps.launcher,
            commands.clone(),
            events.clone(),
        );
        let channel = Arc::new(NotificationChannel::new(
            gateway.clone(),
            tokens.clone(),
            commands.clone(),
            events.clone(),
            config.refresh_debounce,
            config.reconnect_backoff,
        ));
        let sync = Synchronizer::new(
            gateway,
            tokens.clone(),
            commands.clone(),
            events.clone(),
            config.page_size,
        );

        let inner = Arc::new(WidgetInner {
            session,
            channel,
            sync,
            tokens,
            events,
            host_context: Mutex::new(HostContext::default()),
            mounted: AtomicBool::new(true),
            dispatcher: Mutex::new(None),
        });

        let handle = tokio::spawn(run_dispatcher(Arc::downgrade(&inner), rx));
        *inner.dispatcher.lock().await = Some(handle);

        if inner.session.restore().await {
            info!("stored session found; loading voicemails");
            commands.send(Command::Bootstrap);
        } else {
            info!("no stored session; starting login");
            commands.send(Command::Login);
        }

        Ok(Self { inner })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.inner.events.subscribe()
    }

    pub async fn auth_state(&self) -> AuthState {
        self.inner.session.state().await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.channel.state().await
    }

    pub async fn snapshot(&self) -> WidgetSnapshot {
        let auth = self.auth_state().await;
        let connection = self.connection_state().await;
        self.inner.sync.snapshot(auth, connection).await
    }

    /// Voicemail list operations: paging, audio, read/note/delete, view toggles.
    pub fn voicemails(&self) -> &Synchronizer {
        &self.inner.sync
    }

    pub fn notifications(&self) -> &Arc<NotificationChannel> {
        &self.inner.channel
    }

    /// Explicit user-initiated login, e.g. a retry after a blocked popup.
    pub async fn login(&self) {
        self.inner.session.login().await;
    }

    /// Deliver a window message (the popup's `AUTH_CALLBACK`). Returns true
    /// when it completed a login.
    pub async fn post_message(&self, message: WindowMessage) -> bool {
        self.inner.session.handle_message(message).await.is_some()
    }

    pub async fn host_context(&self) -> HostContext {
        self.inner.host_context.lock().await.clone()
    }

    /// Record the host's binding; re-fetches quietly when already signed in.
    pub async fn set_host_context(&self, context: HostContext) {
        let changed = {
            let mut current = self.inner.host_context.lock().await;
            let changed = *current != context;
            *current = context;
            changed
        };
        if !changed || !self.inner.is_mounted() {
            return;
        }
        if self.auth_state().await == AuthState::Authenticated && self.inner.tokens.read().is_some() {
            debug!("host context changed; refreshing");
            self.inner.sync.refresh(false).await;
        }
    }

    /// Stop all background work. In-flight requests may still complete but
    /// nothing new is issued.
    pub async fn unmount(&self) {
        if !self.inner.mounted.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.sync.set_mounted(false);
        self.inner.channel.disconnect().await;
        if let Some(handle) = self.inner.dispatcher.lock().await.take() {
            handle.abort();
        }
        info!("widget unmounted");
    }
}

impl WidgetInner {
    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    async fn dispatch(&self, command: Command) {
        if !self.is_mounted() {
            return;
        }
        match command {
            Command::Login => {
                self.session.login_if_idle().await;
            }
            Command::Refresh { busy } => self.sync.refresh(busy).await,
            Command::Bootstrap => self.bootstrap().await,
            Command::AuthorizationLost => {
                let first = self.session.invalidate().await;
                self.channel.disconnect().await;
                if first {
                    self.session.login_if_idle().await;
                }
            }
        }
    }

    async fn bootstrap(&self) {
        self.sync.refresh(true).await;
        let Some(session) = self.tokens.read() else {
            debug!("session gone before channel setup");
            return;
        };
        if let Err(e) = self.channel.connect(&session.access_token).await {
            warn!(error = %e, "real-time updates unavailable");
        }
    }
}

async fn run_dispatcher(inner: Weak<WidgetInner>, mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        debug!(?command, "dispatching");
        tokio::spawn(async move { inner.dispatch(command).await });
    }
    debug!("command loop finished");
}

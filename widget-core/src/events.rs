//! Outward events and inward commands.
//!
//! Components never call each other in a cycle. Anything that has to cross
//! from one component to another (ask for a login, ask for a refresh) is sent
//! as a [`Command`] and dispatched by the widget.

use shared_types::{AuthState, ConnectionState, UnreadCount};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEvent {
    /// Message meant for the user.
    Error(String),
    UnreadCount(UnreadCount),
    ListChanged,
    AuthStateChanged(AuthState),
    ConnectionChanged(ConnectionState),
}

#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<WidgetEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: WidgetEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(WidgetEvent::Error(message.into()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Login,
    /// Re-fetch the current page.
    Refresh { busy: bool },
    /// First fetch after authentication, then channel setup.
    Bootstrap,
    /// A call came back 401.
    AuthorizationLost,
}

#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            debug!(?command, "widget gone, dropping command");
        }
    }
}

//! Real-time voicemail notifications over the platform's push channel.
//!
//! Setup is three REST calls (identity, channel, subscription) followed by a
//! websocket to the channel's connect URI. A dropped socket is retried after
//! a fixed backoff for as long as the session stays valid. `disconnect`
//! bumps the generation counter so that no timer or reader belonging to an
//! earlier connection can act afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::Method;
use shared_types::{ChannelResponse, ConnectionState, NotificationFrame, TopicSubscription, UserMe};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::ChannelError;
use crate::events::{Command, CommandSender, EventSink, WidgetEvent};
use crate::gateway::ApiGateway;
use crate::token_store::TokenStore;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Default)]
struct ChannelInner {
    channel_id: Option<String>,
    state: ConnectionState,
    sink: Option<SplitSink<Socket, Message>>,
    reader: Option<JoinHandle<()>>,
}

pub struct NotificationChannel {
    gateway: ApiGateway,
    tokens: TokenStore,
    commands: CommandSender,
    events: EventSink,
    refresh_debounce: Duration,
    reconnect_backoff: Duration,
    inner: Mutex<ChannelInner>,
    generation: AtomicU64,
    debounce_ticket: AtomicU64,
}

impl NotificationChannel {
    pub fn new(
        gateway: ApiGateway,
        tokens: TokenStore,
        commands: CommandSender,
        events: EventSink,
        refresh_debounce: Duration,
        reconnect_backoff: Duration,
    ) -> Self {
        Self {
            gateway,
            tokens,
            commands,
            events,
            refresh_debounce,
            reconnect_backoff,
            inner: Mutex::new(ChannelInner::default()),
            generation: AtomicU64::new(0),
            debounce_ticket: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    pub async fn channel_id(&self) -> Option<String> {
        self.inner.lock().await.channel_id.clone()
    }

    async fn set_state(&self, next: ConnectionState) {
        let mut inner = self.inner.lock().await;
        if inner.state != next {
            debug!(from = ?inner.state, to = ?next, "notification channel state");
            inner.state = next;
            drop(inner);
            self.events.emit(WidgetEvent::ConnectionChanged(next));
        }
    }

    /// Set up the channel and start listening. Failures leave the channel
    /// `Disconnected` and are only logged by callers.
    pub async fn connect(self: &Arc<Self>, access_token: &str) -> Result<(), ChannelError> {
        let generation = self.generation.load(Ordering::SeqCst);
        self.set_state(ConnectionState::Connecting).await;

        match self.open(access_token, generation).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "notification channel setup failed");
                if self.generation.load(Ordering::SeqCst) == generation {
                    self.set_state(ConnectionState::Disconnected).await;
                }
                Err(e)
            }
        }
    }

    async fn open(self: &Arc<Self>, access_token: &str, generation: u64) -> Result<(), ChannelError> {
        let me: UserMe = self
            .gateway
            .call_as("/users/me", Method::GET, None, access_token)
            .await
            .map_err(|source| ChannelError::Setup {
                step: "identity lookup",
                source,
            })?;

        let channel: ChannelResponse = self
            .gateway
            .call_as("/notifications/channels", Method::POST, None, access_token)
            .await
            .map_err(|source| ChannelError::Setup {
                step: "channel creation",
                source,
            })?;

        let user_id = require(&me.id, "user id")?;
        let channel_id = require(&channel.id, "channel id")?;
        let connect_uri = require(&channel.connect_uri, "connect uri")?;

        let topic = TopicSubscription::voicemail_messages(user_id);
        let topics = serde_json::json!([{ "id": topic.id }]);
        self.gateway
            .call(
                &format!("/notifications/channels/{channel_id}/subscriptions"),
                Method::POST,
                Some(&topics),
                access_token,
            )
            .await
            .map_err(|source| ChannelError::Setup {
                step: "topic subscription",
                source,
            })?;

        let (socket, _response) = connect_async(connect_uri).await?;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("channel torn down while connecting; dropping socket");
            return Ok(());
        }

        let (sink, stream) = socket.split();
        let this = Arc::clone(self);
        let reader = tokio::spawn(async move { this.read_loop(stream, generation).await });

        let previous = {
            let mut inner = self.inner.lock().await;
            inner.channel_id = Some(channel.id.clone());
            let old_sink = inner.sink.replace(sink);
            let old_reader = inner.reader.replace(reader);
            (old_sink, old_reader)
        };
        close_socket(previous.0, previous.1).await;

        info!(channel_id = %channel.id, topic = %topic.id, "notification channel connected");
        self.set_state(ConnectionState::Connected).await;
        Ok(())
    }

    async fn read_loop(self: Arc<Self>, mut stream: SplitStream<Socket>, generation: u64) {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => self.handle_frame(&text),
                Ok(Message::Close(frame)) => {
                    info!(?frame, "notification socket closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "notification socket error");
                    break;
                }
            }
        }
        self.on_socket_closed(generation).await;
    }

    /// Route one inbound frame. Voicemail events schedule a debounced quiet
    /// refresh; everything else is ignored.
    pub fn handle_frame(self: &Arc<Self>, text: &str) {
        let frame: NotificationFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "ignoring unparseable push frame");
                return;
            }
        };

        if !frame.is_voicemail_event() {
            debug!(topic = %frame.topic_name, "ignoring push frame");
            return;
        }

        debug!(topic = %frame.topic_name, "voicemail event received");
        self.schedule_refresh();
    }

    fn schedule_refresh(self: &Arc<Self>) {
        let ticket = self.debounce_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.load(Ordering::SeqCst);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.refresh_debounce).await;
            if this.debounce_ticket.load(Ordering::SeqCst) == ticket
                && this.generation.load(Ordering::SeqCst) == generation
            {
                this.commands.send(Command::Refresh { busy: false });
            }
        });
    }

    async fn on_socket_closed(self: &Arc<Self>, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        {
            let mut inner = self.inner.lock().await;
            inner.channel_id = None;
            inner.sink = None;
            inner.reader = None;
        }
        self.set_state(ConnectionState::Disconnected).await;
        self.schedule_reconnect(generation);
    }

    fn schedule_reconnect(self: &Arc<Self>, generation: u64) {
        let this = Arc::clone(self);
        let backoff = self.reconnect_backoff;
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            if this.generation.load(Ordering::SeqCst) != generation {
                debug!("channel torn down; skipping reconnect");
                return;
            }
            let Some(session) = this.tokens.read() else {
                info!("session no longer valid; not reconnecting");
                return;
            };
            info!("reconnecting notification channel");
            // Setup failures are logged inside connect; keep retrying until
            // the channel comes up or is torn down.
            if this.connect(&session.access_token).await.is_err()
                && this.generation.load(Ordering::SeqCst) == generation
            {
                this.schedule_reconnect(generation);
            }
        });
    }

    /// Close the socket and forget the channel. No reconnect, refresh, or
    /// in-flight setup from before this call will take effect afterwards.
    pub async fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let (sink, reader) = {
            let mut inner = self.inner.lock().await;
            inner.channel_id = None;
            (inner.sink.take(), inner.reader.take())
        };
        let had_socket = sink.is_some();
        close_socket(sink, reader).await;
        if had_socket {
            info!("notification channel disconnected");
        }
        self.set_state(ConnectionState::Disconnected).await;
    }
}

async fn close_socket(sink: Option<SplitSink<Socket, Message>>, reader: Option<JoinHandle<()>>) {
    if let Some(reader) = reader {
        reader.abort();
    }
    if let Some(mut sink) = sink {
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }
}

fn require<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ChannelError> {
    if value.trim().is_empty() {
        Err(ChannelError::MissingField(field))
    } else {
        Ok(value)
    }
}

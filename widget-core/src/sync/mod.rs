//! Paginated voicemail cache kept in step with the platform.
//!
//! Writes are confirmed-then-applied: a mutation only touches the local list
//! after the platform accepted it. Re-fetches go through [`merge_page`] so
//! view state (expanded, editing, audio URL...) survives them.

pub mod display;
pub mod merge;

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::Method;
use serde_json::json;
use shared_types::{
    AuthState, ConnectionState, MediaResponse, PageState, UnreadCount, ViewState, VoicemailItem,
    VoicemailSearchRequest, VoicemailSearchResponse, WidgetSnapshot,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::events::{Command, CommandSender, EventSink, WidgetEvent};
use crate::gateway::ApiGateway;
use crate::token_store::TokenStore;

pub use merge::{merge_page, unread_count};

struct SyncState {
    items: Vec<VoicemailItem>,
    page: PageState,
    is_loading: bool,
    last_updated: Option<DateTime<Utc>>,
    error: Option<String>,
    /// Sequence of the most recently issued fetch.
    latest_fetch: u64,
}

pub struct Synchronizer {
    gateway: ApiGateway,
    tokens: TokenStore,
    commands: CommandSender,
    events: EventSink,
    /// Voicemail id → playable media URL. Never evicted.
    audio_cache: DashMap<String, String>,
    state: Mutex<SyncState>,
    mounted: AtomicBool,
}

impl Synchronizer {
    pub fn new(
        gateway: ApiGateway,
        tokens: TokenStore,
        commands: CommandSender,
        events: EventSink,
        page_size: u32,
    ) -> Self {
        Self {
            gateway,
            tokens,
            commands,
            events,
            audio_cache: DashMap::new(),
            state: Mutex::new(SyncState {
                items: Vec::new(),
                page: PageState::new(page_size),
                is_loading: false,
                last_updated: None,
                error: None,
                latest_fetch: 0,
            }),
            mounted: AtomicBool::new(true),
        }
    }

    /// After unmount no new requests are issued; in-flight ones still land.
    pub fn set_mounted(&self, mounted: bool) {
        self.mounted.store(mounted, Ordering::SeqCst);
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    // ── Read side ────────────────────────────────────────────────────────────

    pub async fn items(&self) -> Vec<VoicemailItem> {
        self.state.lock().await.items.clone()
    }

    pub async fn page(&self) -> PageState {
        self.state.lock().await.page
    }

    pub async fn unread_count(&self) -> usize {
        unread_count(&self.state.lock().await.items)
    }

    pub fn cached_audio_url(&self, id: &str) -> Option<String> {
        self.audio_cache.get(id).map(|url| url.value().clone())
    }

    pub async fn snapshot(
        &self,
        auth_state: AuthState,
        connection_state: ConnectionState,
    ) -> WidgetSnapshot {
        let state = self.state.lock().await;
        WidgetSnapshot {
            items: state.items.clone(),
            page: state.page,
            is_loading: state.is_loading,
            last_updated: state.last_updated,
            error: state.error.clone(),
            auth_state,
            connection_state,
            unread_count: unread_count(&state.items),
        }
    }

    // ── Fetching ─────────────────────────────────────────────────────────────

    /// Current token, or a login request and `None`. Read fresh before every
    /// call; an earlier await may have invalidated it.
    fn access_token_or_login(&self) -> Option<String> {
        match self.tokens.read() {
            Some(session) => Some(session.access_token),
            None => {
                debug!("no valid session; requesting login");
                self.commands.send(Command::Login);
                None
            }
        }
    }

    pub async fn fetch(&self, page_number: u32, show_busy: bool) {
        if !self.is_mounted() {
            return;
        }
        let Some(token) = self.access_token_or_login() else {
            return;
        };

        let (seq, page_size) = {
            let mut state = self.state.lock().await;
            state.latest_fetch += 1;
            if show_busy {
                state.is_loading = true;
            }
            (state.latest_fetch, state.page.page_size)
        };

        let result = match serde_json::to_value(VoicemailSearchRequest::page(page_number, page_size))
        {
            Ok(body) => {
                self.gateway
                    .call_as::<VoicemailSearchResponse>(
                        "/voicemail/search",
                        Method::POST,
                        Some(&body),
                        &token,
                    )
                    .await
            }
            Err(e) => Err(GatewayError::from(e)),
        };

        let mut state = self.state.lock().await;
        if seq != state.latest_fetch {
            debug!(seq, latest = state.latest_fetch, "discarding superseded page response");
            return;
        }
        state.is_loading = false;

        match result {
            Ok(response) => {
                let now = Utc::now();
                let merged = merge_page(&state.items, response.results, now);
                state.items = merged;
                state.page.total_page_count = response.page_count.max(1);
                state.last_updated = Some(now);
                state.error = None;
                debug!(
                    page = page_number,
                    pages = state.page.total_page_count,
                    count = state.items.len(),
                    total = response.total,
                    "voicemail page loaded"
                );
                drop(state);
                self.publish_changes().await;
            }
            Err(e) => {
                drop(state);
                self.handle_failure(e, "load voicemails").await;
            }
        }
    }

    /// Re-fetch whatever page is showing.
    pub async fn refresh(&self, show_busy: bool) {
        let page = self.page().await.page_number;
        self.fetch(page, show_busy).await;
    }

    pub async fn next_page(&self) -> bool {
        if !self.is_mounted() {
            return false;
        }
        let target = {
            let mut state = self.state.lock().await;
            if !state.page.has_next() {
                return false;
            }
            state.page.page_number += 1;
            state.page.page_number
        };
        self.fetch(target, true).await;
        true
    }

    pub async fn previous_page(&self) -> bool {
        if !self.is_mounted() {
            return false;
        }
        let target = {
            let mut state = self.state.lock().await;
            if !state.page.has_previous() {
                return false;
            }
            state.page.page_number -= 1;
            state.page.page_number
        };
        self.fetch(target, true).await;
        true
    }

    // ── Audio ────────────────────────────────────────────────────────────────

    pub async fn load_audio(&self, id: &str) -> Option<String> {
        if let Some(url) = self.cached_audio_url(id) {
            self.update_view(id, |view| view.audio_url = Some(url.clone()))
                .await;
            return Some(url);
        }
        if !self.is_mounted() {
            return None;
        }
        let token = self.access_token_or_login()?;

        self.update_view(id, |view| view.is_loading_audio = true).await;

        let result: Result<MediaResponse, GatewayError> = self
            .gateway
            .call_as(
                &format!("/voicemail/messages/{id}/media?formatId=MP3"),
                Method::GET,
                None,
                &token,
            )
            .await;

        let url = match result {
            Ok(media) => {
                self.audio_cache
                    .insert(id.to_string(), media.media_file_uri.clone());
                Some(media.media_file_uri)
            }
            Err(e) => {
                self.handle_failure(e, "load the recording").await;
                None
            }
        };

        self.update_view(id, |view| {
            view.is_loading_audio = false;
            if let Some(url) = &url {
                view.audio_url = Some(url.clone());
            }
        })
        .await;
        url
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    async fn patch_record(&self, id: &str, body: serde_json::Value, action: &str) -> bool {
        if !self.is_mounted() {
            return false;
        }
        let Some(token) = self.access_token_or_login() else {
            return false;
        };
        match self
            .gateway
            .call(
                &format!("/voicemail/messages/{id}"),
                Method::PATCH,
                Some(&body),
                &token,
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                self.handle_failure(e, action).await;
                false
            }
        }
    }

    pub async fn set_read(&self, id: &str, read: bool) -> bool {
        let action = if read {
            "mark the voicemail as read"
        } else {
            "mark the voicemail as unread"
        };
        if !self.patch_record(id, json!({ "read": read }), action).await {
            return false;
        }
        self.update_item(id, |item| {
            item.record.read = read;
            item.view.show_menu = false;
        })
        .await;
        true
    }

    pub async fn set_note(&self, id: &str, note: &str) -> bool {
        if !self
            .patch_record(id, json!({ "note": note }), "save the note")
            .await
        {
            return false;
        }
        self.update_item(id, |item| {
            item.record.note = note.to_string();
            item.view.original_note = note.to_string();
            item.view.is_editing = false;
        })
        .await;
        true
    }

    pub async fn delete(&self, id: &str) -> bool {
        if !self
            .patch_record(id, json!({ "deleted": true }), "delete the voicemail")
            .await
        {
            return false;
        }

        let step_back_to = {
            let mut state = self.state.lock().await;
            let was_only_item = state.items.len() == 1 && state.items[0].id() == id;
            state.items.retain(|item| item.id() != id);

            let page = state.page;
            if was_only_item
                && page.total_page_count > 1
                && page.page_number == page.total_page_count
                && page.page_number > 1
            {
                state.page.page_number -= 1;
                state.page.total_page_count -= 1;
                Some(state.page.page_number)
            } else {
                None
            }
        };

        self.publish_changes().await;

        if let Some(page) = step_back_to {
            info!(page, "last voicemail on trailing page deleted; stepping back");
            self.fetch(page, true).await;
        }
        true
    }

    // ── Local view state ─────────────────────────────────────────────────────

    pub async fn toggle_expanded(&self, id: &str) -> bool {
        self.update_view(id, |view| view.is_expanded = !view.is_expanded)
            .await
    }

    pub async fn toggle_menu(&self, id: &str) -> bool {
        self.update_view(id, |view| view.show_menu = !view.show_menu)
            .await
    }

    pub async fn begin_edit(&self, id: &str) -> bool {
        self.update_item(id, |item| {
            item.view.original_note = item.record.note.clone();
            item.view.is_editing = true;
            item.view.show_menu = false;
        })
        .await
    }

    pub async fn cancel_edit(&self, id: &str) -> bool {
        self.update_view(id, |view| view.is_editing = false).await
    }

    async fn update_view(&self, id: &str, apply: impl FnOnce(&mut ViewState)) -> bool {
        self.update_item(id, |item| apply(&mut item.view)).await
    }

    /// Apply `apply` to the cached item and recompute its display fields.
    async fn update_item(&self, id: &str, apply: impl FnOnce(&mut VoicemailItem)) -> bool {
        let found = {
            let mut state = self.state.lock().await;
            match state.items.iter_mut().find(|item| item.id() == id) {
                Some(item) => {
                    apply(item);
                    item.display = display::derive(&item.record, Utc::now());
                    true
                }
                None => false,
            }
        };
        if found {
            self.publish_changes().await;
        }
        found
    }

    // ── Outcomes ─────────────────────────────────────────────────────────────

    async fn publish_changes(&self) {
        let count = self.unread_count().await;
        self.events.emit(WidgetEvent::ListChanged);
        self.events
            .emit(WidgetEvent::UnreadCount(UnreadCount { count }));
    }

    async fn handle_failure(&self, error: GatewayError, action: &str) {
        if error.is_unauthorized() {
            warn!(action, "platform rejected the session; clearing it");
            self.tokens.clear();
            self.commands.send(Command::AuthorizationLost);
            return;
        }

        let message = format!("Unable to {action}: {error}");
        warn!(action, error = %error, "voicemail request failed");
        self.state.lock().await.error = Some(message.clone());
        self.events.error(message);
    }
}

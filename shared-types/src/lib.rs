//! Shared types between the widget engine and its hosts
//!
//! These types are used by:
//! - the session/synchronization engine (`widget-core`)
//! - the native host and any rendering layer it serves
//!
//! Serializable with serde for JSON over HTTP and the push socket. Types the
//! rendering layer consumes also derive `TS` so they can be exported as
//! TypeScript bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Session
// ============================================================================

/// An access token and the instant it stops being valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub expires_at_epoch_ms: i64,
}

impl Session {
    /// Build a session from a token endpoint response received at `now_ms`.
    pub fn from_expires_in(access_token: String, expires_in_secs: i64, now_ms: i64) -> Self {
        Self {
            access_token,
            expires_at_epoch_ms: now_ms.saturating_add(expires_in_secs.saturating_mul(1000)),
        }
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at_epoch_ms <= now_ms
    }
}

/// The PKCE verifier held between opening the popup and receiving its callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingAuthorization {
    pub code_verifier: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[ts(export, export_to = "../../bindings/generated.ts")]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    #[default]
    Unauthenticated,
    AwaitingPopupCallback,
    Authenticated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[ts(export, export_to = "../../bindings/generated.ts")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

// ============================================================================
// Voicemail records
// ============================================================================

/// Server-owned voicemail fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/generated.ts")]
#[serde(rename_all = "camelCase")]
pub struct VoicemailRecord {
    pub id: String,
    #[serde(default)]
    pub caller_address: String,
    pub created_date: DateTime<Utc>,
    #[serde(default)]
    pub audio_recording_duration_seconds: u32,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub deleted: bool,
}

/// Client-only state layered over a record. Never sent to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[ts(export, export_to = "../../bindings/generated.ts")]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub audio_url: Option<String>,
    pub is_expanded: bool,
    pub is_editing: bool,
    pub original_note: String,
    pub show_menu: bool,
    pub is_loading_audio: bool,
}

/// Presentation strings derived from a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[ts(export, export_to = "../../bindings/generated.ts")]
#[serde(rename_all = "camelCase")]
pub struct DisplayFields {
    pub duration_label: String,
    pub date_label: String,
    pub relative_time: String,
    pub caller_display: String,
    pub phone_number: Option<String>,
    pub menu_label: String,
    pub css_class: String,
}

/// One cached list entry: the server record plus its view state and display fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/generated.ts")]
#[serde(rename_all = "camelCase")]
pub struct VoicemailItem {
    pub record: VoicemailRecord,
    pub view: ViewState,
    pub display: DisplayFields,
}

impl VoicemailItem {
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/generated.ts")]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    pub page_number: u32,
    pub page_size: u32,
    pub total_page_count: u32,
}

impl PageState {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_number: 1,
            page_size,
            total_page_count: 1,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page_number < self.total_page_count
    }

    pub fn has_previous(&self) -> bool {
        self.page_number > 1
    }
}

/// Payload handed to the notification badge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/generated.ts")]
pub struct UnreadCount {
    pub count: usize,
}

/// Read model a rendering layer draws from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../bindings/generated.ts")]
#[serde(rename_all = "camelCase")]
pub struct WidgetSnapshot {
    pub items: Vec<VoicemailItem>,
    pub page: PageState,
    pub is_loading: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub auth_state: AuthState,
    pub connection_state: ConnectionState,
    pub unread_count: usize,
}

/// Inputs supplied by the host's record binding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HostContext {
    pub record_id: Option<String>,
    pub external_key: Option<String>,
}

// ============================================================================
// Popup messaging
// ============================================================================

/// Marker value the redirect page puts in `type`.
pub const AUTH_CALLBACK_TYPE: &str = "AUTH_CALLBACK";

/// Structured message the redirect page posts to its opener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../bindings/generated.ts")]
#[serde(tag = "type")]
pub enum PopupMessage {
    #[serde(rename = "AUTH_CALLBACK")]
    AuthCallback { code: String },
}

// ============================================================================
// Remote platform wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchCriterion {
    #[serde(rename = "type")]
    pub kind: String,
    pub fields: Vec<String>,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoicemailSearchRequest {
    pub page_size: u32,
    pub page_number: u32,
    pub sort_by: String,
    pub sort_order: String,
    pub query: Vec<SearchCriterion>,
}

impl VoicemailSearchRequest {
    /// Newest first, soft-deleted records excluded.
    pub fn page(page_number: u32, page_size: u32) -> Self {
        Self {
            page_size,
            page_number,
            sort_by: "createdDate".to_string(),
            sort_order: "DESC".to_string(),
            query: vec![SearchCriterion {
                kind: "EXACT".to_string(),
                fields: vec!["deleted".to_string()],
                value: "false".to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoicemailSearchResponse {
    #[serde(default, alias = "entities")]
    pub results: Vec<VoicemailRecord>,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaResponse {
    pub media_file_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMe {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResponse {
    pub id: String,
    pub connect_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicSubscription {
    pub id: String,
}

impl TopicSubscription {
    pub fn voicemail_messages(user_id: &str) -> Self {
        Self {
            id: format!("v2.users.{user_id}.voicemail.messages"),
        }
    }
}

/// Inbound push frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFrame {
    pub topic_name: String,
    #[serde(default)]
    pub event_body: serde_json::Value,
}

impl NotificationFrame {
    pub fn is_voicemail_event(&self) -> bool {
        self.topic_name.ends_with(".voicemail.messages")
    }
}

// ============================================================================
// Tests
// ============================================================================

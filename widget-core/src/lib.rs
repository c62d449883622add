//! Voicemail widget engine.
//!
//! Handles the popup PKCE login, keeps a paginated voicemail list in step
//! with the telephony platform, and listens for push notifications. The
//! rendering layer talks to it through [`Widget`] and the [`WidgetEvent`]
//! stream.

pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod notifications;
pub mod pkce;
pub mod session;
pub mod storage;
pub mod sync;
pub mod token_store;
pub mod widget;

pub use config::WidgetConfig;
pub use error::{AuthError, ChannelError, GatewayError};
pub use events::{Command, WidgetEvent};
pub use session::{PopupLauncher, WindowMessage};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use widget::{Widget, WidgetDeps};

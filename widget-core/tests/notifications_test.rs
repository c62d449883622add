//! Push-channel refreshes and reconnect behaviour.

mod common;

use std::sync::atomic::Ordering;

use serde_json::json;
use shared_types::ConnectionState;

use common::{eventually, mount, settle, voicemail_frame, Harness, MockPlatform};

async fn connected(records: usize) -> (MockPlatform, Harness) {
    let platform = MockPlatform::start(records).await;
    let harness = mount(&platform, true).await;
    eventually("channel connected", || async {
        harness.widget.connection_state().await == ConnectionState::Connected
    })
    .await;
    (platform, harness)
}

#[tokio::test]
async fn test_voicemail_events_are_debounced_into_one_quiet_refresh() {
    let (platform, harness) = connected(3).await;
    let before = platform.state.search_count();
    let mut events = harness.widget.subscribe();

    for _ in 0..3 {
        platform.push(voicemail_frame());
    }

    eventually("debounced refresh", || async {
        platform.state.search_count() == before + 1
    })
    .await;
    settle(250).await;
    assert_eq!(platform.state.search_count(), before + 1);
    assert_eq!(platform.state.last_search_page(), Some(1));

    // Quiet refresh: the loading flag never flips.
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, widget_core::WidgetEvent::Error(_)));
    }
    assert!(!harness.widget.snapshot().await.is_loading);
}

#[tokio::test]
async fn test_unrelated_topics_are_ignored() {
    let (platform, _harness) = connected(3).await;
    let before = platform.state.search_count();

    platform.push(json!({
        "topicName": "channel.metadata",
        "eventBody": { "message": "WebSocket Heartbeat" },
    }));
    platform.push(json!({ "garbage": true }));

    settle(250).await;
    assert_eq!(platform.state.search_count(), before);
}

#[tokio::test]
async fn test_refresh_follows_the_current_page() {
    let (platform, harness) = connected(5).await;
    harness.widget.voicemails().next_page().await;

    platform.push(voicemail_frame());

    eventually("refresh of page 2", || async {
        platform.state.search_count() == 3
    })
    .await;
    assert_eq!(platform.state.last_search_page(), Some(2));
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let (platform, harness) = connected(1).await;
    assert_eq!(platform.state.channel_connects.load(Ordering::SeqCst), 1);

    platform.close_sockets();

    eventually("second connection", || async {
        platform.state.channel_connects.load(Ordering::SeqCst) == 2
    })
    .await;
    eventually("connected again", || async {
        harness.widget.connection_state().await == ConnectionState::Connected
    })
    .await;
    assert_eq!(
        harness.widget.notifications().channel_id().await.as_deref(),
        Some("channel-1")
    );
}

#[tokio::test]
async fn test_reconnect_keeps_retrying_after_failed_setup() {
    let (platform, harness) = connected(1).await;
    assert_eq!(platform.state.channel_requests.load(Ordering::SeqCst), 1);

    platform.state.fail_channels.store(true, Ordering::SeqCst);
    platform.close_sockets();

    // The initial channel plus two rejected reconnect attempts.
    eventually("repeated reconnect attempts", || async {
        platform.state.channel_requests.load(Ordering::SeqCst) >= 3
    })
    .await;
    assert_ne!(
        harness.widget.connection_state().await,
        ConnectionState::Connected
    );
    assert_eq!(platform.state.channel_connects.load(Ordering::SeqCst), 1);

    platform.state.fail_channels.store(false, Ordering::SeqCst);

    eventually("second connection", || async {
        platform.state.channel_connects.load(Ordering::SeqCst) == 2
    })
    .await;
    eventually("connected again", || async {
        harness.widget.connection_state().await == ConnectionState::Connected
    })
    .await;
}

#[tokio::test]
async fn test_no_reconnect_without_valid_session() {
    let (platform, harness) = connected(1).await;

    harness.tokens().clear();
    platform.close_sockets();

    eventually("disconnected", || async {
        harness.widget.connection_state().await == ConnectionState::Disconnected
    })
    .await;
    settle(400).await;
    assert_eq!(platform.state.channel_connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_reconnect_or_refresh_after_unmount() {
    let (platform, harness) = connected(1).await;
    let searches = platform.state.search_count();

    platform.push(voicemail_frame());
    harness.widget.unmount().await;
    platform.close_sockets();

    settle(400).await;
    assert_eq!(platform.state.channel_connects.load(Ordering::SeqCst), 1);
    assert_eq!(platform.state.search_count(), searches);
    assert_eq!(
        harness.widget.connection_state().await,
        ConnectionState::Disconnected
    );
}

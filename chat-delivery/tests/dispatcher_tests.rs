use std::sync::Arc;

use chat_core::config::DeliveryConfig;
use chat_core::types::{Message, MessageBody, SenderRole};
use chat_core::InMemoryStore;
use chat_core::MessageStore;
use chat_delivery::{
    DeliveryDispatcher, DeliveryOutcome, MockTransport, TransportError,
};
use chat_push::{Platform, PushTokenRegistry};
use chrono::Utc;

fn delivery_config() -> DeliveryConfig {
    DeliveryConfig {
        admin_ids: vec!["admin-1".to_string(), "admin-2".to_string()],
        max_attempts: 3,
        backoff_initial_ms: 5,
        backoff_max_ms: 20,
        apns_bundle_id: None,
        apns_key_id: None,
        apns_team_id: None,
        apns_key_path: None,
        apns_key_content: None,
        fcm_server_key: None,
    }
}

fn message(channel_id: &str, sender_id: &str, role: SenderRole, text: &str) -> Message {
    Message {
        message_id: 1,
        channel_id: channel_id.to_string(),
        sender_id: sender_id.to_string(),
        sender_role: role,
        body: MessageBody::Text(text.to_string()),
        created_at: Utc::now(),
        client_idempotency_key: "key-1".to_string(),
    }
}

#[tokio::test]
async fn user_message_fans_out_to_all_admins() {
    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(PushTokenRegistry::new());
    registry.register("admin-1", Platform::Ios, "token-ios");
    registry.register("admin-2", Platform::Android, "token-android");

    let ios = MockTransport::new();
    let android = MockTransport::new();
    let dispatcher = DeliveryDispatcher::new(store, registry, delivery_config())
        .with_transport(Platform::Ios, Arc::new(ios.clone()))
        .with_transport(Platform::Android, Arc::new(android.clone()));

    let reports = dispatcher
        .dispatch(&message("ch-1", "user-1", SenderRole::User, "hi"))
        .await;

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.outcome == DeliveryOutcome::Sent));
    assert_eq!(ios.attempted_tokens(), vec!["token-ios".to_string()]);
    assert_eq!(android.attempted_tokens(), vec!["token-android".to_string()]);
}

#[tokio::test]
async fn admin_message_goes_to_the_channel_owner() {
    let store = Arc::new(InMemoryStore::new());
    let channel = store.get_or_create_channel("user-1").await.unwrap();

    let registry = Arc::new(PushTokenRegistry::new());
    registry.register("user-1", Platform::Android, "owner-token");

    let android = MockTransport::new();
    let dispatcher = DeliveryDispatcher::new(store, registry, delivery_config())
        .with_transport(Platform::Android, Arc::new(android.clone()));

    let reports = dispatcher
        .dispatch(&message(&channel.channel_id, "admin-1", SenderRole::Admin, "hello"))
        .await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].recipient, "user-1");
    assert_eq!(reports[0].outcome, DeliveryOutcome::Sent);
    assert_eq!(android.attempted_tokens(), vec!["owner-token".to_string()]);
}

#[tokio::test]
async fn recipient_without_tokens_is_skipped_silently() {
    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(PushTokenRegistry::new());
    let android = MockTransport::new();
    let dispatcher = DeliveryDispatcher::new(store, registry, delivery_config())
        .with_transport(Platform::Android, Arc::new(android.clone()));

    let reports = dispatcher
        .dispatch(&message("ch-1", "user-1", SenderRole::User, "hi"))
        .await;

    assert!(reports.is_empty());
    assert_eq!(android.attempts(), 0);
}

#[tokio::test]
async fn transient_failures_are_retried_with_backoff() {
    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(PushTokenRegistry::new());
    registry.register("admin-1", Platform::Android, "token-a");

    let android = MockTransport::new();
    android.fail_next(TransportError::Transient("timeout".to_string()));
    android.fail_next(TransportError::Transient("timeout".to_string()));

    let mut config = delivery_config();
    config.admin_ids = vec!["admin-1".to_string()];
    let dispatcher = DeliveryDispatcher::new(store, registry.clone(), config)
        .with_transport(Platform::Android, Arc::new(android.clone()));

    let reports = dispatcher
        .dispatch(&message("ch-1", "user-1", SenderRole::User, "hi"))
        .await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, DeliveryOutcome::Sent);
    assert_eq!(android.attempts(), 3);
    // Transient failures never invalidate the token.
    assert_eq!(registry.tokens_for("admin-1").len(), 1);
}

#[tokio::test]
async fn exhausted_transient_retries_give_up_without_invalidating() {
    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(PushTokenRegistry::new());
    registry.register("admin-1", Platform::Android, "token-a");

    let android = MockTransport::new();
    for _ in 0..3 {
        android.fail_next(TransportError::Transient("timeout".to_string()));
    }

    let mut config = delivery_config();
    config.admin_ids = vec!["admin-1".to_string()];
    let dispatcher = DeliveryDispatcher::new(store, registry.clone(), config)
        .with_transport(Platform::Android, Arc::new(android.clone()));

    let reports = dispatcher
        .dispatch(&message("ch-1", "user-1", SenderRole::User, "hi"))
        .await;

    assert_eq!(reports[0].outcome, DeliveryOutcome::FailedRetryable);
    assert_eq!(android.attempts(), 3);
    assert_eq!(registry.tokens_for("admin-1").len(), 1);
}

#[tokio::test]
async fn unregistered_token_is_invalidated_once_and_skipped_afterwards() {
    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(PushTokenRegistry::new());
    registry.register("admin-1", Platform::Android, "dead-token");

    let android = MockTransport::new();
    android.fail_next(TransportError::Unregistered);

    let mut config = delivery_config();
    config.admin_ids = vec!["admin-1".to_string()];
    let dispatcher = DeliveryDispatcher::new(store, registry.clone(), config)
        .with_transport(Platform::Android, Arc::new(android.clone()));

    let first = dispatcher
        .dispatch(&message("ch-1", "user-1", SenderRole::User, "hi"))
        .await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].outcome, DeliveryOutcome::FailedPermanent);
    // No retry for a permanent failure.
    assert_eq!(android.attempts(), 1);
    let row = registry.registration("admin-1", Platform::Android).unwrap();
    assert!(!row.valid);

    // Subsequent messages make no further attempts on that token.
    let second = dispatcher
        .dispatch(&message("ch-1", "user-1", SenderRole::User, "again"))
        .await;
    assert!(second.is_empty());
    assert_eq!(android.attempts(), 1);
}

#[tokio::test]
async fn platform_without_transport_is_skipped() {
    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(PushTokenRegistry::new());
    registry.register("admin-1", Platform::Web, "web-token");

    let mut config = delivery_config();
    config.admin_ids = vec!["admin-1".to_string()];
    let dispatcher = DeliveryDispatcher::new(store, registry, config);

    let reports = dispatcher
        .dispatch(&message("ch-1", "user-1", SenderRole::User, "hi"))
        .await;
    assert!(reports.is_empty());
}

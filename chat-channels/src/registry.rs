use chat_core::types::{ChannelId, ChannelSummary};
use chat_core::{ChatContext, ChatError};

/// Maps a user identity to exactly one channel (created lazily on first
/// access) and exposes the admin-side channel list.
pub struct ChannelRegistry {
    ctx: ChatContext,
}

impl ChannelRegistry {
    pub fn new(ctx: ChatContext) -> Self {
        Self { ctx }
    }

    /// Channel owned by `user_id`, creating it if absent.
    ///
    /// The race on concurrent first access is resolved inside the store
    /// adapter (conditional insert keyed by owner, losers re-read the
    /// winner), so callers never observe a partial or duplicate channel.
    /// The only failure mode is `StoreUnavailable`.
    pub async fn resolve_user_channel(&self, user_id: &str) -> Result<ChannelId, ChatError> {
        let channel = self.ctx.store.get_or_create_channel(user_id).await?;
        tracing::debug!(user = %user_id, channel = %channel.channel_id, "resolved user channel");
        Ok(channel.channel_id)
    }

    /// All channels for the admin view, most recently active first.
    ///
    /// Channels with no messages sort by creation time. Ties break on
    /// `channel_id` so repeated polls never reshuffle unchanged rows.
    pub async fn list_channels_for_admin(&self) -> Result<Vec<ChannelSummary>, ChatError> {
        let mut channels = self.ctx.store.list_channels().await?;
        channels.sort_by(|a, b| {
            let a_key = a.last_message_at.unwrap_or(a.created_at);
            let b_key = b.last_message_at.unwrap_or(b.created_at);
            b_key
                .cmp(&a_key)
                .then_with(|| a.channel_id.cmp(&b.channel_id))
        });
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::types::{MessageBody, SenderRole};
    use chat_core::{Config, FixedIdentity, InMemoryStore};
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn context(store: Arc<InMemoryStore>) -> ChatContext {
        ChatContext::new(
            Config::from_env(),
            store,
            Arc::new(FixedIdentity::new("admin-1", SenderRole::Admin)),
        )
    }

    #[tokio::test]
    async fn resolve_is_stable_across_calls() {
        let store = Arc::new(InMemoryStore::new());
        let registry = ChannelRegistry::new(context(store));

        let first = registry.resolve_user_channel("user-1").await.unwrap();
        let second = registry.resolve_user_channel("user-1").await.unwrap();
        assert_eq!(first, second);

        let other = registry.resolve_user_channel("user-2").await.unwrap();
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn admin_list_orders_by_recency_with_created_at_fallback() {
        let store = Arc::new(InMemoryStore::new());
        let base = Utc::now();

        let c1 = store.seed_channel("user-1", base - Duration::hours(2)).await;
        let c2 = store.seed_channel("user-2", base - Duration::hours(2)).await;
        let c3 = store.seed_channel("user-3", base - Duration::hours(3)).await;

        // C1 last message 10:00, C2 last message 10:05, C3 silent.
        store
            .seed_message(
                &c1.channel_id,
                "user-1",
                SenderRole::User,
                MessageBody::Text("hi".to_string()),
                base - Duration::minutes(10),
            )
            .await;
        store
            .seed_message(
                &c2.channel_id,
                "user-2",
                SenderRole::User,
                MessageBody::Text("hi".to_string()),
                base - Duration::minutes(5),
            )
            .await;

        let registry = ChannelRegistry::new(context(store));
        let listed = registry.list_channels_for_admin().await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|c| c.channel_id.as_str()).collect();
        assert_eq!(ids, vec![
            c2.channel_id.as_str(),
            c1.channel_id.as_str(),
            c3.channel_id.as_str(),
        ]);
    }

    #[tokio::test]
    async fn equal_timestamps_keep_a_stable_order() {
        let store = Arc::new(InMemoryStore::new());
        let at = Utc::now();
        for i in 0..5 {
            store.seed_channel(&format!("user-{}", i), at).await;
        }

        let registry = ChannelRegistry::new(context(store));
        let first = registry.list_channels_for_admin().await.unwrap();
        let second = registry.list_channels_for_admin().await.unwrap();
        let first_ids: Vec<_> = first.iter().map(|c| c.channel_id.clone()).collect();
        let second_ids: Vec<_> = second.iter().map(|c| c.channel_id.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }
}

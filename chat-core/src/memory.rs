use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::ChatError;
use crate::store::MessageStore;
use crate::types::{Channel, ChannelSummary, Cursor, Message, MessageBody, NewMessage, SenderRole};

/// In-memory [`MessageStore`] carrying the reference semantics of the
/// adapter contract: monotonic server ids, idempotent inserts, race-safe
/// channel creation. Used by tests and as the default store for embedding
/// without a backend.
///
/// Supports fault injection (fail the next N inserts/queries with
/// `StoreUnavailable`) and counts calls so tests can assert that an
/// operation never reached the store.
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

struct Inner {
    channels: Vec<Channel>,
    messages: Vec<Message>,
    next_message_id: i64,
    last_created_at: Option<DateTime<Utc>>,
    fail_inserts: u32,
    fail_queries: u32,
    insert_calls: u64,
    query_calls: u64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                channels: Vec::new(),
                messages: Vec::new(),
                next_message_id: 1,
                last_created_at: None,
                fail_inserts: 0,
                fail_queries: 0,
                insert_calls: 0,
                query_calls: 0,
            }),
        }
    }

    /// Make the next `n` insert calls fail with `StoreUnavailable`.
    pub async fn fail_next_inserts(&self, n: u32) {
        self.inner.lock().await.fail_inserts = n;
    }

    /// Make the next `n` query calls fail with `StoreUnavailable`.
    pub async fn fail_next_queries(&self, n: u32) {
        self.inner.lock().await.fail_queries = n;
    }

    pub async fn insert_calls(&self) -> u64 {
        self.inner.lock().await.insert_calls
    }

    pub async fn query_calls(&self) -> u64 {
        self.inner.lock().await.query_calls
    }

    /// Insert a confirmed message with an explicit timestamp, bypassing the
    /// fault and idempotency machinery. Test seeding only.
    pub async fn seed_message(
        &self,
        channel_id: &str,
        sender_id: &str,
        sender_role: SenderRole,
        body: MessageBody,
        created_at: DateTime<Utc>,
    ) -> Message {
        let mut inner = self.inner.lock().await;
        let message = Message {
            message_id: inner.next_message_id,
            channel_id: channel_id.to_string(),
            sender_id: sender_id.to_string(),
            sender_role,
            body,
            created_at,
            client_idempotency_key: Uuid::new_v4().to_string(),
        };
        inner.next_message_id += 1;
        inner.messages.push(message.clone());
        message
    }

    /// Create a channel with an explicit creation time. Test seeding only.
    pub async fn seed_channel(&self, owner_user_id: &str, created_at: DateTime<Utc>) -> Channel {
        let mut inner = self.inner.lock().await;
        let channel = Channel {
            channel_id: Uuid::new_v4().to_string(),
            owner_user_id: owner_user_id.to_string(),
            created_at,
        };
        inner.channels.push(channel.clone());
        channel
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Server timestamps never run backwards, so `(created_at, message_id)`
    /// stays a total order even if the wall clock stalls within one tick.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_created_at {
            if now < last {
                now = last;
            }
        }
        self.last_created_at = Some(now);
        now
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn insert_message(&self, new: NewMessage) -> Result<Message, ChatError> {
        let mut inner = self.inner.lock().await;
        inner.insert_calls += 1;

        if inner.fail_inserts > 0 {
            inner.fail_inserts -= 1;
            return Err(ChatError::StoreUnavailable("injected insert failure".to_string()));
        }

        // Idempotent insert: a resubmitted key returns the winner row.
        if let Some(existing) = inner.messages.iter().find(|m| {
            m.channel_id == new.channel_id
                && m.sender_id == new.sender_id
                && m.client_idempotency_key == new.client_idempotency_key
        }) {
            tracing::debug!(
                key = %new.client_idempotency_key,
                "duplicate idempotency key, returning existing message"
            );
            return Ok(existing.clone());
        }

        let created_at = inner.next_created_at();
        let message = Message {
            message_id: inner.next_message_id,
            channel_id: new.channel_id,
            sender_id: new.sender_id,
            sender_role: new.sender_role,
            body: new.body,
            created_at,
            client_idempotency_key: new.client_idempotency_key,
        };
        inner.next_message_id += 1;
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn query_messages(
        &self,
        channel_id: &str,
        since: Option<Cursor>,
    ) -> Result<Vec<Message>, ChatError> {
        let mut inner = self.inner.lock().await;
        inner.query_calls += 1;

        if inner.fail_queries > 0 {
            inner.fail_queries -= 1;
            return Err(ChatError::StoreUnavailable("injected query failure".to_string()));
        }

        let mut rows: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .filter(|m| match since {
                Some(cursor) => m.cursor() > cursor,
                None => true,
            })
            .cloned()
            .collect();
        rows.sort_by_key(Message::cursor);
        Ok(rows)
    }

    async fn get_or_create_channel(&self, owner_user_id: &str) -> Result<Channel, ChatError> {
        let mut inner = self.inner.lock().await;

        // The whole check-then-insert runs under one lock, so concurrent
        // first access converges on a single row.
        if let Some(existing) = inner.channels.iter().find(|c| c.owner_user_id == owner_user_id) {
            return Ok(existing.clone());
        }

        let channel = Channel {
            channel_id: Uuid::new_v4().to_string(),
            owner_user_id: owner_user_id.to_string(),
            created_at: Utc::now(),
        };
        inner.channels.push(channel.clone());
        tracing::debug!(owner = %owner_user_id, channel = %channel.channel_id, "created channel");
        Ok(channel)
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, ChatError> {
        let inner = self.inner.lock().await;
        let summaries = inner
            .channels
            .iter()
            .map(|c| ChannelSummary {
                channel_id: c.channel_id.clone(),
                owner_user_id: c.owner_user_id.clone(),
                created_at: c.created_at,
                last_message_at: inner
                    .messages
                    .iter()
                    .filter(|m| m.channel_id == c.channel_id)
                    .map(|m| m.created_at)
                    .max(),
            })
            .collect();
        Ok(summaries)
    }
}

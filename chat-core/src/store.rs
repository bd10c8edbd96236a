use async_trait::async_trait;

use crate::error::ChatError;
use crate::types::{Actor, Channel, ChannelSummary, Cursor, Message, NewMessage, SenderRole};

/// Adapter over the external message store: an append-only, ordered log of
/// messages per channel plus lazy channel creation.
///
/// Contract:
/// - `insert_message` is idempotent on `client_idempotency_key`; a
///   resubmission returns the existing row and never creates a duplicate.
/// - `query_messages` returns rows strictly after `since` in
///   `(created_at, message_id)` order; `None` means the full channel.
/// - `get_or_create_channel` is race-safe: concurrent first access from
///   several clients converges on a single channel row.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, new: NewMessage) -> Result<Message, ChatError>;

    async fn query_messages(
        &self,
        channel_id: &str,
        since: Option<Cursor>,
    ) -> Result<Vec<Message>, ChatError>;

    async fn get_or_create_channel(&self, owner_user_id: &str) -> Result<Channel, ChatError>;

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, ChatError>;
}

/// Source of the current actor's stable id and role.
pub trait IdentityProvider: Send + Sync {
    fn current_actor(&self) -> Actor;
}

/// Identity provider with a fixed actor, for embedding a single signed-in
/// user and for tests.
#[derive(Debug, Clone)]
pub struct FixedIdentity {
    actor: Actor,
}

impl FixedIdentity {
    pub fn new(actor_id: impl Into<String>, role: SenderRole) -> Self {
        Self {
            actor: Actor {
                actor_id: actor_id.into(),
                role,
            },
        }
    }
}

impl IdentityProvider for FixedIdentity {
    fn current_actor(&self) -> Actor {
        self.actor.clone()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

pub type ChannelId = String;
pub type ActorId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub actor_id: ActorId,
    pub role: SenderRole,
}

/// One conversation between a user and the admin operators. Exactly one
/// channel exists per user; it is created lazily on first access and never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: ChannelId,
    pub owner_user_id: ActorId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel_id: ChannelId,
    pub owner_user_id: ActorId,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    StructuredCard,
}

/// Fixed-field payload of a `structured_card` message. Every field is
/// required; validation happens before a send leaves the queued state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationCard {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub birthday: String,
    pub language: String,
    pub gender: String,
}

impl ApplicationCard {
    pub fn validate(&self) -> Result<(), ChatError> {
        let fields = [
            ("name", &self.name),
            ("phone", &self.phone),
            ("address", &self.address),
            ("birthday", &self.birthday),
            ("language", &self.language),
            ("gender", &self.gender),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ChatError::InvalidMessageBody(format!(
                    "structured_card field '{}' is empty",
                    field
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum MessageBody {
    Text(String),
    StructuredCard(ApplicationCard),
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text(_) => MessageKind::Text,
            MessageBody::StructuredCard(_) => MessageKind::StructuredCard,
        }
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        match self {
            MessageBody::Text(text) => {
                if text.trim().is_empty() {
                    Err(ChatError::InvalidMessageBody("text body is empty".to_string()))
                } else {
                    Ok(())
                }
            }
            MessageBody::StructuredCard(card) => card.validate(),
        }
    }
}

/// Position of a message in a channel's total order. The derived `Ord`
/// compares `created_at` first and `message_id` second, which is exactly
/// the ordering the store guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub message_id: i64,
}

/// A store-confirmed message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub channel_id: ChannelId,
    pub sender_id: ActorId,
    pub sender_role: SenderRole,
    pub body: MessageBody,
    pub created_at: DateTime<Utc>,
    pub client_idempotency_key: String,
}

impl Message {
    pub fn cursor(&self) -> Cursor {
        Cursor {
            created_at: self.created_at,
            message_id: self.message_id,
        }
    }
}

/// Insert payload handed to the message store. The server assigns
/// `message_id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub channel_id: ChannelId,
    pub sender_id: ActorId,
    pub sender_role: SenderRole,
    pub body: MessageBody,
    pub client_idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Queued,
    InFlight,
    Confirmed,
    Failed,
}

/// A locally-optimistic message owned by the session that created it.
/// Promoted to (and replaced by) a confirmed [`Message`] once the store
/// acknowledges the matching `client_idempotency_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub client_idempotency_key: String,
    pub channel_id: ChannelId,
    pub sender_id: ActorId,
    pub sender_role: SenderRole,
    pub body: MessageBody,
    pub queued_at: DateTime<Utc>,
    pub state: SubmissionState,
}

/// What the UI renders: either a confirmed row from the store or a
/// still-pending local send. The two are unified only at render time so a
/// failed confirmation never corrupts an already-rendered confirmed row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DisplayMessage {
    Confirmed(Message),
    Pending(PendingMessage),
}

impl DisplayMessage {
    pub fn client_idempotency_key(&self) -> &str {
        match self {
            DisplayMessage::Confirmed(m) => &m.client_idempotency_key,
            DisplayMessage::Pending(p) => &p.client_idempotency_key,
        }
    }

    pub fn body(&self) -> &MessageBody {
        match self {
            DisplayMessage::Confirmed(m) => &m.body,
            DisplayMessage::Pending(p) => &p.body,
        }
    }
}

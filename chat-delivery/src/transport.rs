use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chat_core::types::{ChannelId, Message, MessageBody};
use serde::Serialize;
use thiserror::Error;

const PREVIEW_MAX_CHARS: usize = 120;

/// Transport-level failure, already classified for the dispatcher:
/// transient errors are retried with backoff, `Unregistered` invalidates
/// the token and is never retried.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("transient push failure: {0}")]
    Transient(String),

    #[error("device token is no longer registered")]
    Unregistered,
}

/// What actually gets pushed to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushNote {
    pub title: String,
    pub body: String,
    pub channel_id: ChannelId,
}

impl PushNote {
    pub fn from_message(message: &Message) -> Self {
        let body = match &message.body {
            MessageBody::Text(text) => {
                let mut preview: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
                if text.chars().count() > PREVIEW_MAX_CHARS {
                    preview.push('…');
                }
                preview
            }
            MessageBody::StructuredCard(card) => {
                format!("Application card from {}", card.name)
            }
        };
        PushNote {
            title: "New Message".to_string(),
            body,
            channel_id: message.channel_id.clone(),
        }
    }
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, device_token: &str, note: &PushNote) -> Result<(), TransportError>;
}

/// Recording transport double for tests: every attempt is captured, and a
/// script of failures can be queued ahead of the calls.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    attempts: Vec<(String, PushNote)>,
    script: VecDeque<TransportError>,
}

fn lock(m: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next send; later sends succeed unless more
    /// failures are queued.
    pub fn fail_next(&self, error: TransportError) {
        lock(&self.inner).script.push_back(error);
    }

    pub fn attempts(&self) -> usize {
        lock(&self.inner).attempts.len()
    }

    pub fn attempted_tokens(&self) -> Vec<String> {
        lock(&self.inner)
            .attempts
            .iter()
            .map(|(token, _)| token.clone())
            .collect()
    }

    pub fn last_note(&self) -> Option<PushNote> {
        lock(&self.inner).attempts.last().map(|(_, note)| note.clone())
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn send(&self, device_token: &str, note: &PushNote) -> Result<(), TransportError> {
        let mut state = lock(&self.inner);
        state.attempts.push((device_token.to_string(), note.clone()));
        match state.script.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

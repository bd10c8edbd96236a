use thiserror::Error;

/// Error taxonomy for the synchronization core.
///
/// Storage errors are retried by the component that owns the operation;
/// only retry exhaustion (`SendFailed`) surfaces to callers. Push delivery
/// failures never appear here at all: they are contained inside the
/// delivery dispatcher and reported as outcomes, not errors.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message store unavailable: {0}")]
    StoreUnavailable(String),

    /// Idempotency-key collision on insert. Treated as success by the send
    /// pipeline: the message already exists, it must not exist twice.
    #[error("message with this idempotency key already exists")]
    Conflict,

    #[error("invalid message body: {0}")]
    InvalidMessageBody(String),

    #[error("send failed after {attempts} attempts")]
    SendFailed { attempts: u32 },

    #[error("channel session is closed")]
    SessionClosed,
}

impl ChatError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ChatError::StoreUnavailable(_))
    }
}

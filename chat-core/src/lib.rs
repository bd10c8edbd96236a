pub mod config;
pub mod context;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use config::Config;
pub use context::ChatContext;
pub use error::ChatError;
pub use memory::InMemoryStore;
pub use store::{FixedIdentity, IdentityProvider, MessageStore};
pub use types::{
    Actor, ApplicationCard, Channel, ChannelSummary, Cursor, DisplayMessage, Message, MessageBody,
    MessageKind, NewMessage, PendingMessage, SenderRole, SubmissionState,
};

use std::sync::Arc;

use crate::config::Config;
use crate::store::{IdentityProvider, MessageStore};

/// Shared handle threaded through the components: configuration, the
/// message store adapter and the identity provider. Cloning is cheap; all
/// sessions share the same underlying store.
#[derive(Clone)]
pub struct ChatContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn MessageStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl ChatContext {
    pub fn new(
        config: Config,
        store: Arc<dyn MessageStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        ChatContext {
            config: Arc::new(config),
            store,
            identity,
        }
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chat_core::config::DeliveryConfig;
use chat_core::types::{ActorId, Message, SenderRole};
use chat_core::MessageStore;
use chat_push::{Platform, PushTokenRegistry};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::transport::{PushNote, PushTransport, TransportError};

/// Final state of one delivery attempt chain for a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// Transient failures exhausted the attempt ceiling; the token stays
    /// valid and the next message will try again.
    FailedRetryable,
    /// The transport reported the token dead; it has been invalidated.
    FailedPermanent,
}

#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub recipient: ActorId,
    pub platform: Platform,
    pub outcome: DeliveryOutcome,
}

/// Resolves recipients for newly confirmed messages and pushes to their
/// registered devices. Runs beside the send pipeline, never in it: no
/// outcome here can fail or delay a send.
pub struct DeliveryDispatcher {
    store: Arc<dyn MessageStore>,
    registry: Arc<PushTokenRegistry>,
    transports: HashMap<Platform, Arc<dyn PushTransport>>,
    config: DeliveryConfig,
}

/// Queue handle for feeding confirmed messages to a spawned dispatcher.
pub struct DeliveryHandle {
    tx: UnboundedSender<Message>,
    task: JoinHandle<()>,
}

impl DeliveryHandle {
    /// Sender to hand to channel sessions.
    pub fn sender(&self) -> UnboundedSender<Message> {
        self.tx.clone()
    }

    pub fn notify(&self, message: Message) {
        let _ = self.tx.send(message);
    }

    /// Drop the queue and wait for in-flight deliveries to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}

impl DeliveryDispatcher {
    pub fn new(
        store: Arc<dyn MessageStore>,
        registry: Arc<PushTokenRegistry>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            store,
            registry,
            transports: HashMap::new(),
            config,
        }
    }

    pub fn with_transport(mut self, platform: Platform, transport: Arc<dyn PushTransport>) -> Self {
        self.transports.insert(platform, transport);
        self
    }

    /// Spawn the dispatcher as a background worker consuming its queue.
    /// The worker stops when every queue sender is dropped.
    pub fn spawn(self) -> DeliveryHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        DeliveryHandle { tx, task }
    }

    async fn run(self, mut rx: UnboundedReceiver<Message>) {
        tracing::info!("Starting delivery dispatcher");
        while let Some(message) = rx.recv().await {
            let reports = self.dispatch(&message).await;
            tracing::debug!(
                message_id = message.message_id,
                deliveries = reports.len(),
                "processed delivery job"
            );
        }
        tracing::info!("Delivery dispatcher stopped");
    }

    /// Deliver one confirmed message to the other party's devices.
    ///
    /// Recipients with no registered tokens are skipped silently: never
    /// having registered a device is not an error.
    pub async fn dispatch(&self, message: &Message) -> Vec<DeliveryReport> {
        let note = PushNote::from_message(message);
        let mut reports = Vec::new();

        for recipient in self.recipients_for(message).await {
            let tokens = self.registry.tokens_for(&recipient);
            if tokens.is_empty() {
                tracing::debug!(recipient = %recipient, "no registered devices, skipping");
                continue;
            }

            for (platform, token) in tokens {
                let transport = match self.transports.get(&platform) {
                    Some(t) => t.clone(),
                    None => {
                        tracing::debug!(%platform, "no transport for platform, skipping");
                        continue;
                    }
                };

                let outcome = self.deliver(transport.as_ref(), &token, &note).await;
                match outcome {
                    DeliveryOutcome::Sent => {
                        self.registry.mark_delivered(&recipient, platform);
                    }
                    DeliveryOutcome::FailedPermanent => {
                        tracing::info!(
                            recipient = %recipient,
                            %platform,
                            "token reported unregistered, invalidating"
                        );
                        self.registry.invalidate(&recipient, platform);
                    }
                    DeliveryOutcome::FailedRetryable => {}
                }
                reports.push(DeliveryReport {
                    recipient: recipient.clone(),
                    platform,
                    outcome,
                });
            }
        }
        reports
    }

    /// The channel's other party: the owner user when an admin sent, every
    /// admin operator when the user sent.
    async fn recipients_for(&self, message: &Message) -> Vec<ActorId> {
        match message.sender_role {
            SenderRole::User => self
                .config
                .admin_ids
                .iter()
                .filter(|id| **id != message.sender_id)
                .cloned()
                .collect(),
            SenderRole::Admin => match self.store.list_channels().await {
                Ok(channels) => channels
                    .into_iter()
                    .find(|c| c.channel_id == message.channel_id)
                    .map(|c| vec![c.owner_user_id])
                    .unwrap_or_else(|| {
                        tracing::warn!(
                            channel = %message.channel_id,
                            "channel not found, no delivery recipient"
                        );
                        Vec::new()
                    }),
                Err(e) => {
                    tracing::warn!(error = %e, "channel lookup failed, skipping delivery");
                    Vec::new()
                }
            },
        }
    }

    async fn deliver(
        &self,
        transport: &dyn PushTransport,
        token: &str,
        note: &PushNote,
    ) -> DeliveryOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let ceiling = Duration::from_millis(self.config.backoff_max_ms);
        let mut delay = Duration::from_millis(self.config.backoff_initial_ms);

        for attempt in 1..=max_attempts {
            match transport.send(token, note).await {
                Ok(()) => return DeliveryOutcome::Sent,
                Err(TransportError::Unregistered) => return DeliveryOutcome::FailedPermanent,
                Err(TransportError::Transient(reason)) if attempt < max_attempts => {
                    tracing::warn!(attempt, %reason, "push attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2).min(ceiling);
                }
                Err(TransportError::Transient(reason)) => {
                    tracing::warn!(attempts = attempt, %reason, "push delivery gave up");
                }
            }
        }
        DeliveryOutcome::FailedRetryable
    }
}

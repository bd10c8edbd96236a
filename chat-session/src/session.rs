use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chat_core::types::{
    ChannelId, Cursor, DisplayMessage, Message, MessageBody, NewMessage, PendingMessage,
    SubmissionState,
};
use chat_core::{ChatContext, ChatError};
use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// The unit UI code interacts with: one conversation, one polling loop,
/// one send queue. Sessions share nothing mutable with each other; the
/// store and the delivery queue are the only shared resources.
pub struct ChannelSession {
    channel_id: ChannelId,
    ctx: ChatContext,
    state: Arc<Mutex<SessionState>>,
    nudge: Arc<Notify>,
    closed: Arc<AtomicBool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    delivery_tx: Option<UnboundedSender<Message>>,
}

/// Consecutive failed polls after which the session reports itself
/// degraded to the UI.
const DEGRADED_AFTER_FAILURES: u32 = 3;

#[derive(Default)]
struct SessionState {
    confirmed: Vec<Message>,
    cursor: Option<Cursor>,
    pending: Vec<PendingMessage>,
    consecutive_poll_failures: u32,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Open a session on `channel_id` and start its polling loop. Confirmed
/// sends are pushed into `delivery_tx` (the delivery dispatcher's queue)
/// when one is attached; delivery stays fully decoupled from the send
/// pipeline either way.
pub fn open_session(
    ctx: ChatContext,
    channel_id: ChannelId,
    delivery_tx: Option<UnboundedSender<Message>>,
) -> ChannelSession {
    let state = Arc::new(Mutex::new(SessionState::default()));
    let nudge = Arc::new(Notify::new());

    let task = tokio::spawn(poll_loop(
        ctx.clone(),
        channel_id.clone(),
        state.clone(),
        nudge.clone(),
    ));
    tracing::debug!(channel = %channel_id, "session opened");

    ChannelSession {
        channel_id,
        ctx,
        state,
        nudge,
        closed: Arc::new(AtomicBool::new(false)),
        poll_task: Mutex::new(Some(task)),
        delivery_tx,
    }
}

impl ChannelSession {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Optimistic send: validates the body, enqueues a `PendingMessage`
    /// and returns it immediately for rendering. Submission to the store
    /// runs asynchronously with bounded retries; the entry ends up
    /// `Confirmed` or `Failed`, never silently dropped or duplicated.
    pub fn send(&self, body: MessageBody) -> Result<PendingMessage, ChatError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChatError::SessionClosed);
        }
        // Invalid bodies fail here, before any store call is made.
        body.validate()?;

        let actor = self.ctx.identity.current_actor();
        let pending = PendingMessage {
            client_idempotency_key: Uuid::new_v4().to_string(),
            channel_id: self.channel_id.clone(),
            sender_id: actor.actor_id,
            sender_role: actor.role,
            body,
            queued_at: Utc::now(),
            state: SubmissionState::Queued,
        };
        lock(&self.state).pending.push(pending.clone());
        self.spawn_submit(&pending);
        Ok(pending)
    }

    /// Re-queue a send that exhausted its retries. Returns whether a
    /// failed entry with this key existed.
    pub fn retry(&self, client_idempotency_key: &str) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let requeued = {
            let mut st = lock(&self.state);
            match st.pending.iter_mut().find(|p| {
                p.client_idempotency_key == client_idempotency_key
                    && p.state == SubmissionState::Failed
            }) {
                Some(entry) => {
                    entry.state = SubmissionState::Queued;
                    Some(entry.clone())
                }
                None => None,
            }
        };
        match requeued {
            Some(pending) => {
                tracing::debug!(key = %client_idempotency_key, "retrying failed send");
                self.spawn_submit(&pending);
                true
            }
            None => false,
        }
    }

    /// The merged, deduplicated sequence to render right now.
    pub fn current_view(&self) -> Vec<DisplayMessage> {
        let st = lock(&self.state);
        crate::reconcile::merge(&st.confirmed, &st.pending)
    }

    pub fn submission_state(&self, client_idempotency_key: &str) -> Option<SubmissionState> {
        let st = lock(&self.state);
        // A promoted send is discarded from the pending set; its confirmed
        // row is the answer.
        if st
            .confirmed
            .iter()
            .any(|m| m.client_idempotency_key == client_idempotency_key)
        {
            return Some(SubmissionState::Confirmed);
        }
        st.pending
            .iter()
            .find(|p| p.client_idempotency_key == client_idempotency_key)
            .map(|p| p.state)
    }

    /// Sends still owned by this session: queued, in flight or failed.
    /// Confirmed sends are promoted to store rows and leave this set.
    pub fn pending_messages(&self) -> Vec<PendingMessage> {
        lock(&self.state).pending.clone()
    }

    pub fn consecutive_poll_failures(&self) -> u32 {
        lock(&self.state).consecutive_poll_failures
    }

    /// Whether the store has been unreachable long enough that the UI
    /// should say so. Single poll failures stay invisible; only a
    /// persistent outage surfaces.
    pub fn is_degraded(&self) -> bool {
        self.consecutive_poll_failures() >= DEGRADED_AFTER_FAILURES
    }

    /// Request an out-of-cycle poll. Live-update signals hook in here;
    /// they accelerate the loop but are never its only path to
    /// consistency.
    pub fn trigger_poll(&self) {
        self.nudge.notify_one();
    }

    /// Stop the polling loop. In-flight sends are left to complete so a
    /// submitted message is never lost; their results are simply no
    /// longer rendered by anyone.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = lock(&self.poll_task).take() {
            task.abort();
        }
        tracing::debug!(channel = %self.channel_id, "session closed");
    }

    fn spawn_submit(&self, pending: &PendingMessage) {
        let new = NewMessage {
            channel_id: pending.channel_id.clone(),
            sender_id: pending.sender_id.clone(),
            sender_role: pending.sender_role,
            body: pending.body.clone(),
            client_idempotency_key: pending.client_idempotency_key.clone(),
        };
        tokio::spawn(submit(
            self.ctx.clone(),
            self.state.clone(),
            self.nudge.clone(),
            self.delivery_tx.clone(),
            new,
        ));
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn poll_loop(
    ctx: ChatContext,
    channel_id: ChannelId,
    state: Arc<Mutex<SessionState>>,
    nudge: Arc<Notify>,
) {
    let base = Duration::from_millis(ctx.config.session.poll_interval_ms.max(1));
    let ceiling = Duration::from_millis(ctx.config.session.poll_backoff_max_ms).max(base);
    let mut delay = base;
    let mut consecutive_failures = 0u32;

    loop {
        match poll_once(&ctx, &channel_id, &state).await {
            Ok(fetched) => {
                if consecutive_failures > 0 {
                    tracing::debug!(channel = %channel_id, "store reachable again");
                }
                consecutive_failures = 0;
                lock(&state).consecutive_poll_failures = 0;
                delay = base;
                if fetched > 0 {
                    tracing::debug!(channel = %channel_id, fetched, "poll applied new messages");
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                lock(&state).consecutive_poll_failures = consecutive_failures;
                delay = (delay * 2).min(ceiling);
                tracing::warn!(
                    channel = %channel_id,
                    consecutive_failures,
                    error = %e,
                    "poll failed, backing off"
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = nudge.notified() => {}
        }
    }
}

async fn poll_once(
    ctx: &ChatContext,
    channel_id: &str,
    state: &Arc<Mutex<SessionState>>,
) -> Result<usize, ChatError> {
    let since = lock(state).cursor;
    let batch = ctx.store.query_messages(channel_id, since).await?;

    let mut st = lock(state);
    st.cursor = crate::reconcile::advance_cursor(st.cursor, &batch);
    let mut added = 0;
    for message in batch {
        // A confirmed send may already sit in the list; ids never repeat.
        if !st.confirmed.iter().any(|m| m.message_id == message.message_id) {
            st.confirmed.push(message);
            added += 1;
        }
    }
    // Discard pending entries whose key now has a confirmed row, e.g. a
    // send whose acknowledgement was lost but whose row arrived by poll.
    let SessionState {
        confirmed, pending, ..
    } = &mut *st;
    pending.retain(|p| {
        !confirmed
            .iter()
            .any(|m| m.client_idempotency_key == p.client_idempotency_key)
    });
    Ok(added)
}

async fn submit(
    ctx: ChatContext,
    state: Arc<Mutex<SessionState>>,
    nudge: Arc<Notify>,
    delivery_tx: Option<UnboundedSender<Message>>,
    new: NewMessage,
) {
    let key = new.client_idempotency_key.clone();
    set_state(&state, &key, SubmissionState::InFlight);

    let cfg = &ctx.config.session;
    let max_attempts = cfg.send_max_attempts.max(1);
    let mut delay = Duration::from_millis(cfg.send_backoff_initial_ms);

    for attempt in 1..=max_attempts {
        match ctx.store.insert_message(new.clone()).await {
            Ok(message) => {
                {
                    // Promote: the confirmed row replaces the pending
                    // entry, which is discarded.
                    let mut st = lock(&state);
                    if !st.confirmed.iter().any(|m| m.message_id == message.message_id) {
                        st.confirmed.push(message.clone());
                    }
                    st.pending.retain(|p| p.client_idempotency_key != key);
                }
                // Push delivery is best effort and fully decoupled: a
                // missing or stopped dispatcher never fails the send.
                if let Some(tx) = &delivery_tx {
                    let _ = tx.send(message);
                }
                nudge.notify_one();
                return;
            }
            // The key already made it to the store on an earlier attempt
            // whose acknowledgement was lost. The row exists; done.
            Err(ChatError::Conflict) => {
                set_state(&state, &key, SubmissionState::Confirmed);
                nudge.notify_one();
                return;
            }
            Err(e) if attempt < max_attempts => {
                tracing::warn!(key = %key, attempt, error = %e, "send attempt failed, retrying");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => {
                tracing::warn!(key = %key, attempts = attempt, error = %e, "send failed");
                set_state(&state, &key, SubmissionState::Failed);
                return;
            }
        }
    }
}

fn set_state(state: &Arc<Mutex<SessionState>>, key: &str, value: SubmissionState) {
    let mut st = lock(state);
    if let Some(entry) = st
        .pending
        .iter_mut()
        .find(|p| p.client_idempotency_key == key)
    {
        entry.state = value;
    }
}

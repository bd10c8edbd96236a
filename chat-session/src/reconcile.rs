use std::collections::HashSet;

use chat_core::types::{Cursor, DisplayMessage, Message, PendingMessage};

/// Merge store-confirmed messages with the session's locally-pending sends
/// into the single sequence the UI renders.
///
/// Confirmed messages come first, ordered by `(created_at, message_id)`.
/// A pending entry whose idempotency key already appears among the
/// confirmed rows has been promoted and is dropped. Surviving pending
/// entries render after all confirmed rows, ordered by local creation
/// time: the client cannot know the server timestamp before confirmation,
/// so no interleaving is guessed.
pub fn merge(confirmed: &[Message], pending: &[PendingMessage]) -> Vec<DisplayMessage> {
    let mut rows: Vec<Message> = confirmed.to_vec();
    rows.sort_by_key(Message::cursor);

    let promoted: HashSet<&str> = rows
        .iter()
        .map(|m| m.client_idempotency_key.as_str())
        .collect();

    let mut tail: Vec<PendingMessage> = pending
        .iter()
        .filter(|p| !promoted.contains(p.client_idempotency_key.as_str()))
        .cloned()
        .collect();
    tail.sort_by(|a, b| {
        a.queued_at
            .cmp(&b.queued_at)
            .then_with(|| a.client_idempotency_key.cmp(&b.client_idempotency_key))
    });

    rows.into_iter()
        .map(DisplayMessage::Confirmed)
        .chain(tail.into_iter().map(DisplayMessage::Pending))
        .collect()
}

/// New cursor after applying a poll batch: the key of the last returned
/// message, or the unchanged cursor when nothing new arrived.
pub fn advance_cursor(cursor: Option<Cursor>, batch: &[Message]) -> Option<Cursor> {
    batch
        .iter()
        .map(Message::cursor)
        .chain(cursor)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::types::{MessageBody, SenderRole, SubmissionState};
    use chrono::{Duration, Utc};

    fn confirmed(id: i64, key: &str, offset_secs: i64) -> Message {
        Message {
            message_id: id,
            channel_id: "ch".to_string(),
            sender_id: "user-1".to_string(),
            sender_role: SenderRole::User,
            body: MessageBody::Text(format!("m{}", id)),
            created_at: Utc::now() + Duration::seconds(offset_secs),
            client_idempotency_key: key.to_string(),
        }
    }

    fn pending(key: &str, offset_secs: i64) -> PendingMessage {
        PendingMessage {
            client_idempotency_key: key.to_string(),
            channel_id: "ch".to_string(),
            sender_id: "user-1".to_string(),
            sender_role: SenderRole::User,
            body: MessageBody::Text(key.to_string()),
            queued_at: Utc::now() + Duration::seconds(offset_secs),
            state: SubmissionState::Queued,
        }
    }

    #[test]
    fn promoted_pending_entries_are_dropped() {
        let rows = vec![confirmed(1, "k1", 0), confirmed(2, "k2", 1)];
        let local = vec![pending("k2", 5), pending("k3", 6)];

        let view = merge(&rows, &local);
        let keys: Vec<&str> = view.iter().map(|d| d.client_idempotency_key()).collect();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);
        assert!(matches!(view[1], DisplayMessage::Confirmed(_)));
        assert!(matches!(view[2], DisplayMessage::Pending(_)));
    }

    #[test]
    fn one_entry_per_key_even_with_resubmission() {
        let rows = vec![confirmed(1, "k1", 0)];
        // The same key queued twice locally, e.g. after a resubmitted send.
        let local = vec![pending("k1", 1), pending("k1", 2)];
        let view = merge(&rows, &local);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].client_idempotency_key(), "k1");
    }

    #[test]
    fn pending_always_renders_after_confirmed() {
        // Pending entry queued before the confirmed rows' server times:
        // it still renders last, no wall-clock interleaving.
        let rows = vec![confirmed(1, "k1", 10), confirmed(2, "k2", 20)];
        let local = vec![pending("k3", -100)];
        let view = merge(&rows, &local);
        assert_eq!(view[2].client_idempotency_key(), "k3");
    }

    #[test]
    fn pending_entries_keep_local_send_order() {
        let local = vec![pending("later", 2), pending("earlier", 1)];
        let view = merge(&[], &local);
        let keys: Vec<&str> = view.iter().map(|d| d.client_idempotency_key()).collect();
        assert_eq!(keys, vec!["earlier", "later"]);
    }

    #[test]
    fn confirmed_rows_sort_by_time_then_id() {
        let mut a = confirmed(2, "k2", 0);
        let b = confirmed(1, "k1", 0);
        a.created_at = b.created_at;
        let view = merge(&[a, b], &[]);
        let keys: Vec<&str> = view.iter().map(|d| d.client_idempotency_key()).collect();
        assert_eq!(keys, vec!["k1", "k2"]);
    }

    #[test]
    fn cursor_advances_to_last_batch_key_or_stays() {
        let rows = vec![confirmed(1, "k1", 0), confirmed(2, "k2", 1)];
        let advanced = advance_cursor(None, &rows).unwrap();
        assert_eq!(advanced, rows[1].cursor());

        let unchanged = advance_cursor(Some(advanced), &[]);
        assert_eq!(unchanged, Some(advanced));
    }
}

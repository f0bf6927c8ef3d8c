//! Append-only, deduplicated message sequence backing the rendered timeline.
//!
//! Display order is arrival order: the history batch (oldest-first) seeds the
//! sequence and every live frame is appended at the end. Timestamps never
//! reorder messages; they only feed the visual grouping policy.

use std::collections::VecDeque;

use chrono::Duration;

use crate::types::ChatMessage;

/// Two same-sender messages further apart than this start separate groups.
pub const GROUP_GAP_MS: i64 = 60_000;

/// Size of the seen-id tail window used for defensive deduplication.
///
/// Session exclusivity is the primary guard against duplicate delivery; the
/// window covers teardown races under rapid reconnect.
const SEEN_WINDOW: usize = 128;

/// Whether `current` starts a new visual group after `prev`.
///
/// Pure over the adjacent pair: first message, sender change, or a timestamp
/// gap strictly greater than [`GROUP_GAP_MS`].
pub fn starts_new_group(prev: Option<&ChatMessage>, current: &ChatMessage) -> bool {
    match prev {
        None => true,
        Some(prev) => {
            prev.sender_id != current.sender_id
                || current.created_at - prev.created_at > Duration::milliseconds(GROUP_GAP_MS)
        }
    }
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    messages: Vec<ChatMessage>,
    seen_tail: VecDeque<uuid::Uuid>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from the history fetch. The batch must already be
    /// oldest-first (the API client reverses the wire order).
    pub fn from_history(messages: Vec<ChatMessage>) -> Self {
        let mut store = Self::new();
        for message in messages {
            store.append(message);
        }
        store
    }

    /// Append a live-received message. Returns `false` when the id was seen
    /// within the tail window and the message was dropped.
    pub fn append(&mut self, message: ChatMessage) -> bool {
        if self.seen_tail.contains(&message.id) {
            tracing::debug!(
                target: "flowchat::conversation::store",
                message_id = %message.id,
                "Dropping duplicate message delivery"
            );
            return false;
        }
        if self.seen_tail.len() == SEEN_WINDOW {
            self.seen_tail.pop_front();
        }
        self.seen_tail.push_back(message.id);
        self.messages.push(message);
        true
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Per-message first-in-group flags, recomputed on demand.
    pub fn group_flags(&self) -> Vec<bool> {
        let mut prev: Option<&ChatMessage> = None;
        self.messages
            .iter()
            .map(|message| {
                let flag = starts_new_group(prev, message);
                prev = Some(message);
                flag
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn sender(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn message(id: u128, sender_id: Uuid, at_ms: i64) -> ChatMessage {
        ChatMessage {
            id: Uuid::from_u128(id),
            conversation_id: Uuid::from_u128(0xC1),
            sender_id,
            sender_name: "Sender".into(),
            sender_picture: None,
            content: "hi".into(),
            attachment_url: None,
            attachment_type: None,
            attachment_name: None,
            created_at: Utc.timestamp_millis_opt(at_ms).unwrap(),
        }
    }

    #[test]
    fn first_message_starts_a_group() {
        let m = message(1, sender(1), 0);
        assert!(starts_new_group(None, &m));
    }

    #[test]
    fn sender_change_always_starts_a_group() {
        let a = message(1, sender(1), 0);
        let b = message(2, sender(2), 1);
        assert!(starts_new_group(Some(&a), &b));
    }

    #[test]
    fn gap_threshold_is_strictly_greater_than_60s() {
        let a = message(1, sender(1), 0);
        assert!(!starts_new_group(Some(&a), &message(2, sender(1), 59_999)));
        assert!(!starts_new_group(Some(&a), &message(3, sender(1), 60_000)));
        assert!(starts_new_group(Some(&a), &message(4, sender(1), 60_001)));
    }

    #[test]
    fn grouping_is_pure_over_the_sequence() {
        let store = ConversationStore::from_history(vec![
            message(1, sender(1), 0),
            message(2, sender(1), 30_000),
            message(3, sender(2), 31_000),
            message(4, sender(2), 200_000),
        ]);
        let first = store.group_flags();
        let second = store.group_flags();
        assert_eq!(first, second);
        assert_eq!(first, vec![true, false, true, true]);
    }

    #[test]
    fn display_order_is_arrival_order_not_timestamp_order() {
        let mut store = ConversationStore::from_history(vec![
            message(1, sender(1), 10_000),
            message(2, sender(1), 40_000),
        ]);
        // A live frame with an older embedded timestamp still lands last.
        store.append(message(3, sender(2), 5_000));

        let ids: Vec<Uuid> = store.messages().iter().map(|m| m.id).collect();
        assert_eq!(
            ids,
            vec![Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3)]
        );
        assert_eq!(store.group_flags(), vec![true, false, true]);
    }

    #[test]
    fn duplicate_ids_within_window_are_dropped() {
        let mut store = ConversationStore::new();
        assert!(store.append(message(1, sender(1), 0)));
        assert!(!store.append(message(1, sender(1), 0)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn seen_window_is_bounded() {
        let mut store = ConversationStore::new();
        for i in 0..=(SEEN_WINDOW as u128) {
            assert!(store.append(message(i + 1, sender(1), i as i64)));
        }
        // The first id has been evicted from the window; a replay of it is no
        // longer caught. Bounded memory is the point of the window.
        assert!(store.append(message(1, sender(1), 0)));
    }

    #[test]
    fn history_seeding_dedups_too() {
        let store = ConversationStore::from_history(vec![
            message(1, sender(1), 0),
            message(1, sender(1), 0),
            message(2, sender(1), 1_000),
        ]);
        assert_eq!(store.len(), 2);
    }
}

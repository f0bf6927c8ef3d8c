//! Aggregates typing events from the presence topic into a "who is typing"
//! set, with per-user expiry so a peer that vanishes mid-keystroke cannot
//! leave a stuck indicator.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::types::TypingEvent;

/// A typing entry not refreshed within this window is dropped.
pub const PRESENCE_TTL: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct PresenceAggregator {
    local_user_id: Uuid,
    ttl: Duration,
    /// userId -> expiry deadline. Swept lazily on read.
    deadlines: HashMap<Uuid, Instant>,
}

impl PresenceAggregator {
    pub fn new(local_user_id: Uuid) -> Self {
        Self::with_ttl(local_user_id, PRESENCE_TTL)
    }

    pub fn with_ttl(local_user_id: Uuid, ttl: Duration) -> Self {
        Self {
            local_user_id,
            ttl,
            deadlines: HashMap::new(),
        }
    }

    /// Apply a decoded event from the presence topic.
    ///
    /// The local user's own events are ignored (the server echoes them back),
    /// as are payloads whose `type` is not the typing kind.
    pub fn apply(&mut self, event: &TypingEvent) {
        if !event.is_typing_kind() || event.user_id == self.local_user_id {
            return;
        }
        if event.is_typing {
            self.deadlines.insert(event.user_id, Instant::now() + self.ttl);
        } else {
            self.deadlines.remove(&event.user_id);
        }
    }

    /// Whether any remote participant is currently typing.
    ///
    /// `local_typing` gates the indicator off while the local user is typing
    /// themselves, matching the rendered behavior.
    pub fn someone_else_typing(&mut self, local_typing: bool) -> bool {
        self.sweep();
        !self.deadlines.is_empty() && !local_typing
    }

    /// Ids of remote users currently typing, post-sweep.
    pub fn typing_user_ids(&mut self) -> Vec<Uuid> {
        self.sweep();
        self.deadlines.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    fn sweep(&mut self) {
        let now = Instant::now();
        self.deadlines.retain(|_, deadline| *deadline > now);
    }
}

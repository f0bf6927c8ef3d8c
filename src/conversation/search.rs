//! Server-delegated conversation search and match navigation.
//!
//! The matching itself runs on the backend; this controller owns the
//! client-side lifecycle: the active query, the ordered match-id set, the
//! navigation cursor, and the context messages returned alongside the matches.
//! It holds no transport handle; the room runs the request and feeds the
//! response in, so result-set state never sits behind an in-flight call.

use uuid::Uuid;

use crate::api::SearchResponse;
use crate::types::ChatMessage;

/// Read-only view of the current search state for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSnapshot {
    pub query: String,
    pub matched_ids: Vec<Uuid>,
    pub matches_count: usize,
    /// Cursor into `matched_ids`; `None` when there are no matches.
    pub current_index: Option<usize>,
}

impl SearchSnapshot {
    pub fn current_match_id(&self) -> Option<Uuid> {
        self.current_index.map(|i| self.matched_ids[i])
    }
}

#[derive(Debug, Clone)]
struct ActiveSearch {
    query: String,
    matched_ids: Vec<Uuid>,
    matches_count: usize,
    context_messages: Vec<ChatMessage>,
    current_index: Option<usize>,
}

#[derive(Debug, Default)]
pub struct SearchController {
    active: Option<ActiveSearch>,
}

impl SearchController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a fresh server response into the search state.
    ///
    /// When the new match-id set is identical to the previous one (a re-run
    /// of the same query, or new results that happen not to change the
    /// matches) the cursor position survives; any change to the set resets it
    /// to the first match. A failed request simply never reaches this method,
    /// so the previous result set stays intact.
    pub fn apply_response(&mut self, query: &str, response: SearchResponse) {
        let current_index = if response.matched_ids.is_empty() {
            None
        } else {
            match self.active.take() {
                Some(prev) if prev.matched_ids == response.matched_ids => {
                    prev.current_index.or(Some(0))
                }
                _ => Some(0),
            }
        };
        self.active = Some(ActiveSearch {
            query: query.to_string(),
            matched_ids: response.matched_ids,
            matches_count: response.matches_count,
            context_messages: response.messages,
            current_index,
        });
    }

    /// Move the cursor by `delta` matches, wrapping at both ends.
    /// No-op when there is no active search or no matches.
    pub fn advance(&mut self, delta: i64) {
        if let Some(active) = &mut self.active
            && let Some(index) = active.current_index
            && !active.matched_ids.is_empty()
        {
            let len = active.matched_ids.len() as i64;
            active.current_index = Some((index as i64 + delta).rem_euclid(len) as usize);
        }
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Context messages the server returned around the matches.
    pub fn context_messages(&self) -> &[ChatMessage] {
        self.active
            .as_ref()
            .map(|a| a.context_messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn snapshot(&self) -> Option<SearchSnapshot> {
        self.active.as_ref().map(|active| SearchSnapshot {
            query: active.query.clone(),
            matched_ids: active.matched_ids.clone(),
            matches_count: active.matches_count,
            current_index: active.current_index,
        })
    }
}

//! Per-conversation state consumed by the rendering layer: the ordered message
//! store, the typing-presence set, and the search match-set lifecycle.

pub mod presence;
pub mod search;
pub mod store;

pub use presence::PresenceAggregator;
pub use search::{SearchController, SearchSnapshot};
pub use store::{ConversationStore, starts_new_group};

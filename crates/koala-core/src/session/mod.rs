//! Chat session tracking
//!
//! Each orchestration run is mirrored as a chat session on a display surface:
//! `createChat` when it opens, one `addMessage` per transcript entry and a
//! single `finishChat` when it closes.

mod tracker;
mod types;

pub use tracker::{ChatEventReceiver, ChatSession, ChatTracker, chat_event_channel};
pub use types::{ChatEvent, ChatId, ChatOutcome, ChatState, Initiator};

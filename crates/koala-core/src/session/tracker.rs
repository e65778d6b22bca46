use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{ChatEvent, ChatId, ChatOutcome, ChatState, Initiator};
use crate::message::ChatMessage;

pub type ChatEventReceiver = mpsc::UnboundedReceiver<ChatEvent>;

/// Create a tracker and the receiver the display surface reads from
pub fn chat_event_channel() -> (ChatTracker, ChatEventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChatTracker { tx }, rx)
}

/// Opens chat sessions and forwards their events to the display surface.
///
/// Delivery is fire-and-forget: once the surface is gone events are dropped.
#[derive(Debug, Clone)]
pub struct ChatTracker {
    tx: mpsc::UnboundedSender<ChatEvent>,
}

impl ChatTracker {
    pub fn create_session(&self, initiator: Initiator, summary: impl Into<String>) -> ChatSession {
        let session = ChatSession {
            id: Uuid::new_v4(),
            initiator,
            summary: summary.into(),
            state: ChatState::Open,
            transcript: Vec::new(),
            created_at: Utc::now(),
            tracker: self.clone(),
        };

        info!(chat_id = %session.id, ?initiator, summary = %session.summary, "Chat opened");
        self.emit(ChatEvent::CreateChat {
            chat_id: session.id,
            initiator,
            summary: session.summary.clone(),
        });

        session
    }

    fn emit(&self, event: ChatEvent) {
        if self.tx.send(event).is_err() {
            debug!("Display surface closed, dropping chat event");
        }
    }
}

/// One open chat. Closing consumes the handle, so a chat finishes once.
#[derive(Debug)]
pub struct ChatSession {
    id: ChatId,
    initiator: Initiator,
    summary: String,
    state: ChatState,
    transcript: Vec<ChatMessage>,
    created_at: DateTime<Utc>,
    tracker: ChatTracker,
}

impl ChatSession {
    pub fn id(&self) -> ChatId {
        self.id
    }

    pub fn initiator(&self) -> Initiator {
        self.initiator
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn append_message(&mut self, message: ChatMessage) {
        debug!(chat_id = %self.id, role = ?message.role, "Chat message");
        self.tracker.emit(ChatEvent::AddMessage {
            chat_id: self.id,
            message: message.clone(),
        });
        self.transcript.push(message);
    }

    pub fn close(mut self, outcome: ChatOutcome) {
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: ChatOutcome) {
        if self.state != ChatState::Open {
            return;
        }
        self.state = outcome.into();

        let elapsed_ms = (Utc::now() - self.created_at).num_milliseconds();
        info!(chat_id = %self.id, ?outcome, messages = self.transcript.len(), elapsed_ms, "Chat finished");
        self.tracker.emit(ChatEvent::FinishChat {
            chat_id: self.id,
            state: outcome,
        });
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if self.state == ChatState::Open {
            warn!(chat_id = %self.id, "Chat dropped while open, closing with error");
            self.finish(ChatOutcome::Error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut ChatEventReceiver) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_session_lifecycle_events() {
        let (tracker, mut rx) = chat_event_channel();

        let mut session = tracker.create_session(Initiator::User, "Use prompt template \"daily\"");
        let chat_id = session.id();
        session.append_message(ChatMessage::user("hello"));
        session.append_message(ChatMessage::assistant("hi"));
        assert_eq!(session.transcript().len(), 2);
        session.close(ChatOutcome::Success);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.chat_id() == chat_id));
        assert!(matches!(events[0], ChatEvent::CreateChat { initiator: Initiator::User, .. }));
        assert_eq!(
            events[1],
            ChatEvent::AddMessage {
                chat_id,
                message: ChatMessage::user("hello")
            }
        );
        assert_eq!(
            events[3],
            ChatEvent::FinishChat {
                chat_id,
                state: ChatOutcome::Success
            }
        );
    }

    #[test]
    fn test_dropped_session_closes_with_error_once() {
        let (tracker, mut rx) = chat_event_channel();

        {
            let _session = tracker.create_session(Initiator::Background, "Data sampling");
        }

        let events = drain(&mut rx);
        let finishes: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ChatEvent::FinishChat { .. }))
            .collect();
        assert_eq!(finishes.len(), 1);
        assert!(matches!(finishes[0], ChatEvent::FinishChat { state: ChatOutcome::Error, .. }));
    }

    #[test]
    fn test_closed_surface_is_not_an_error() {
        let (tracker, rx) = chat_event_channel();
        drop(rx);

        let mut session = tracker.create_session(Initiator::User, "orphan");
        session.append_message(ChatMessage::user("still recorded"));
        assert_eq!(session.state(), ChatState::Open);
        session.close(ChatOutcome::Success);
    }
}

//! Session types shared with the display surface

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::ChatMessage;

/// Unique identifier for a chat session
pub type ChatId = Uuid;

/// Who started a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initiator {
    /// A prompt run requested by the operator
    User,
    /// A request pushed by a tool provider (sampling)
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatState {
    Open,
    Success,
    Error,
}

/// Terminal state of a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatOutcome {
    Success,
    Error,
}

impl From<ChatOutcome> for ChatState {
    fn from(outcome: ChatOutcome) -> Self {
        match outcome {
            ChatOutcome::Success => ChatState::Success,
            ChatOutcome::Error => ChatState::Error,
        }
    }
}

/// Events sent to the display surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatEvent {
    #[serde(rename_all = "camelCase")]
    CreateChat {
        chat_id: ChatId,
        initiator: Initiator,
        summary: String,
    },
    #[serde(rename_all = "camelCase")]
    AddMessage { chat_id: ChatId, message: ChatMessage },
    #[serde(rename_all = "camelCase")]
    FinishChat { chat_id: ChatId, state: ChatOutcome },
}

impl ChatEvent {
    pub fn chat_id(&self) -> ChatId {
        match self {
            ChatEvent::CreateChat { chat_id, .. }
            | ChatEvent::AddMessage { chat_id, .. }
            | ChatEvent::FinishChat { chat_id, .. } => *chat_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_form() {
        let chat_id = Uuid::nil();

        assert_eq!(
            serde_json::to_value(ChatEvent::CreateChat {
                chat_id,
                initiator: Initiator::Background,
                summary: "Data sampling".into(),
            })
            .unwrap(),
            json!({
                "type": "createChat",
                "chatId": "00000000-0000-0000-0000-000000000000",
                "initiator": "background",
                "summary": "Data sampling"
            })
        );

        let finish = serde_json::to_value(ChatEvent::FinishChat {
            chat_id,
            state: ChatOutcome::Error,
        })
        .unwrap();
        assert_eq!(finish["type"], "finishChat");
        assert_eq!(finish["state"], "error");
    }
}

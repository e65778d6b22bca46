//! Chat messages in the shape the model client consumes
//!
//! Prompt and sampling messages from a tool provider carry one typed content
//! block each. [`transform_messages`] turns them into chat messages whose
//! content is a list of `{type, text}` parts.

use koala_mcp::{PromptMessage, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl From<Role> for ChatRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ChatRole::User,
            Role::Assistant => ChatRole::Assistant,
        }
    }
}

/// One part of a multi-part message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as produced by the model
    #[serde(default)]
    pub arguments: String,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn with_text(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(text.into())),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_text(ChatRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_text(ChatRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_text(ChatRole::Assistant, text)
    }

    /// Assistant turn requesting tool calls
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: None,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Answer to the tool call `tool_call_id`
    pub fn tool(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_text(ChatRole::Tool, text)
        }
    }

    /// Text of the message, with parts joined by newlines
    pub fn text(&self) -> Option<String> {
        match self.content.as_ref()? {
            MessageContent::Text(text) => Some(text.clone()),
            MessageContent::Parts(parts) => {
                let texts: Vec<&str> = parts.iter().filter_map(|p| p.text.as_deref()).collect();
                if texts.is_empty() {
                    None
                } else {
                    Some(texts.join("\n"))
                }
            }
        }
    }
}

/// Normalize provider messages for the model client.
///
/// Role and order are kept. Each content block becomes a single part with the
/// block's type; a block without text (an image, say) keeps its type and an
/// absent text rather than being rejected.
pub fn transform_messages(messages: &[PromptMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|message| ChatMessage {
            role: message.role.into(),
            content: Some(MessageContent::Parts(vec![ContentPart {
                part_type: message.content.content_type.clone(),
                text: message.content.text.clone(),
            }])),
            tool_calls: Vec::new(),
            tool_call_id: None,
        })
        .collect()
}

/// The plain-string system message a sampling request's system prompt becomes
pub fn system_message(text: impl Into<String>) -> ChatMessage {
    ChatMessage::system(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use koala_mcp::ContentItem;
    use serde_json::json;

    fn prompt(role: Role, content: ContentItem) -> PromptMessage {
        PromptMessage { role, content }
    }

    #[test]
    fn test_transform_wraps_text_into_parts() {
        let input = vec![
            prompt(Role::User, ContentItem::text("What happened today?")),
            prompt(Role::Assistant, ContentItem::text("Let me check.")),
        ];

        let output = transform_messages(&input);

        assert_eq!(output.len(), 2);
        assert_eq!(output[0].role, ChatRole::User);
        assert_eq!(output[1].role, ChatRole::Assistant);
        assert_eq!(
            serde_json::to_value(&output[0]).unwrap(),
            json!({"role": "user", "content": [{"type": "text", "text": "What happened today?"}]})
        );
    }

    #[test]
    fn test_transform_passes_non_text_through() {
        let image: ContentItem =
            serde_json::from_value(json!({"type": "image", "data": "aGk=", "mimeType": "image/png"})).unwrap();

        let output = transform_messages(&[prompt(Role::User, image)]);

        assert_eq!(
            output[0].content,
            Some(MessageContent::Parts(vec![ContentPart {
                part_type: "image".to_string(),
                text: None,
            }]))
        );
        assert_eq!(
            serde_json::to_value(&output[0]).unwrap()["content"],
            json!([{"type": "image"}])
        );
    }

    #[test]
    fn test_transform_is_pure() {
        let input = vec![prompt(Role::User, ContentItem::text("hello"))];

        assert_eq!(transform_messages(&input), transform_messages(&input));
        assert!(transform_messages(&[]).is_empty());
    }

    #[test]
    fn test_tool_message_wire_form() {
        let message = ChatMessage::tool("call_1", "[]");

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"role": "tool", "content": "[]", "tool_call_id": "call_1"})
        );
    }

    #[test]
    fn test_assistant_tool_calls_from_wire() {
        let message: ChatMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "fetch_news", "arguments": "{\"topic\":\"tech\"}"}
            }]
        }))
        .unwrap();

        assert!(message.content.is_none());
        assert_eq!(message.tool_calls, vec![ToolCall::new("call_1", "fetch_news", "{\"topic\":\"tech\"}")]);
        assert!(message.text().is_none());
    }

    #[test]
    fn test_text_joins_parts() {
        let message = ChatMessage {
            role: ChatRole::User,
            content: Some(MessageContent::Parts(vec![
                ContentPart { part_type: "text".into(), text: Some("a".into()) },
                ContentPart { part_type: "image".into(), text: None },
                ContentPart { part_type: "text".into(), text: Some("b".into()) },
            ])),
            tool_calls: Vec::new(),
            tool_call_id: None,
        };

        assert_eq!(message.text().as_deref(), Some("a\nb"));
    }
}

//! Koala Core - tool-use orchestration with human confirmation
//!
//! A [`Brain`] drives a language model through tool calls served by an MCP
//! tool provider. Every tool call and every tool result passes a
//! [`ConfirmationGate`] first, and each run is recorded as a chat session
//! whose events stream to a display surface.

pub mod config;
pub mod confirmation;
pub mod error;
pub mod message;
pub mod model;
pub mod orchestration;
pub mod provider;
pub mod session;
pub mod tools;

pub use config::{CompletionPolicy, Config, OrchestratorConfig, ProviderConfig, RejectionPolicy};
pub use confirmation::{
    ConfirmationDecision, ConfirmationGate, ConfirmationReceiver, ConfirmationRequest,
    PendingConfirmation, confirmation_channel,
};
pub use error::{Error, Result, ToolError};
pub use message::{
    ChatMessage, ChatRole, ContentPart, FunctionCall, MessageContent, ToolCall, system_message, transform_messages,
};
pub use model::{ChatCompletion, ChatCompletionRequest, Choice, ModelClient, OpenAiCompatibleClient, Usage};
pub use orchestration::{Brain, RunOutcome, SAMPLING_SUMMARY, ToolRunner};
pub use provider::{ToolProvider, ToolProviders};
pub use session::{
    ChatEvent, ChatEventReceiver, ChatId, ChatOutcome, ChatSession, ChatState, ChatTracker, Initiator,
    chat_event_channel,
};
pub use tools::{FunctionTool, ProviderTool, ToolDefinition, ToolSet};

//! The completion loop
//!
//! Each round sends the conversation and tool definitions to the model. Tool
//! calls in the reply run one after another, and their results are added as
//! tool messages before the next round. The loop stops on a reply without
//! tool calls or when the completion budget is spent.

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::{CompletionPolicy, RejectionPolicy};
use crate::error::{Error, Result, ToolError};
use crate::message::{ChatMessage, ToolCall};
use crate::model::{ChatCompletionRequest, ModelClient};
use crate::tools::ToolSet;

/// What a finished run produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutcome {
    /// Last assistant turn
    pub final_message: Option<ChatMessage>,
    /// Text of the last tool result, if any tool ran
    pub final_function_result: Option<String>,
    /// Every message the runner added, in order
    pub messages: Vec<ChatMessage>,
    pub completions: usize,
    pub tool_calls: usize,
}

impl RunOutcome {
    pub fn final_text(&self) -> Option<String> {
        self.final_message.as_ref().and_then(ChatMessage::text)
    }
}

pub struct ToolRunner<'a> {
    model: &'a dyn ModelClient,
    model_id: &'a str,
    tools: &'a ToolSet,
    policy: CompletionPolicy,
    rejection: RejectionPolicy,
}

impl<'a> ToolRunner<'a> {
    pub fn new(model: &'a dyn ModelClient, model_id: &'a str, tools: &'a ToolSet) -> Self {
        Self {
            model,
            model_id,
            tools,
            policy: CompletionPolicy::default(),
            rejection: RejectionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CompletionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_rejection_policy(mut self, rejection: RejectionPolicy) -> Self {
        self.rejection = rejection;
        self
    }

    /// Run the loop over `messages`, calling `on_message` for each message the
    /// runner adds (assistant turns and tool results) in order.
    pub async fn run(
        &self,
        mut messages: Vec<ChatMessage>,
        mut on_message: impl FnMut(&ChatMessage) + Send,
    ) -> Result<RunOutcome> {
        let definitions = self.tools.definitions();
        let mut outcome = RunOutcome::default();

        while outcome.completions < self.policy.max_chat_completions {
            let request = ChatCompletionRequest::new(self.model_id, messages.clone())
                .with_tools(definitions.clone());

            let completion = self.model.complete(request).await?;
            outcome.completions += 1;

            let choice = completion
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| Error::Model("Completion returned no choices".to_string()))?;
            let assistant = choice.message;
            debug!(
                round = outcome.completions,
                tool_calls = assistant.tool_calls.len(),
                finish_reason = ?choice.finish_reason,
                "Model turn"
            );

            on_message(&assistant);
            messages.push(assistant.clone());
            outcome.messages.push(assistant.clone());
            outcome.final_message = Some(assistant.clone());

            if assistant.tool_calls.is_empty() {
                break;
            }

            for call in &assistant.tool_calls {
                if outcome.tool_calls >= self.policy.max_tool_calls {
                    return Err(ToolError::LimitExceeded(self.policy.max_tool_calls).into());
                }
                outcome.tool_calls += 1;

                let content = self.execute(call).await?;
                let tool_message = ChatMessage::tool(&call.id, content.clone());

                on_message(&tool_message);
                messages.push(tool_message.clone());
                outcome.messages.push(tool_message);
                outcome.final_function_result = Some(content);
            }
        }

        info!(
            completions = outcome.completions,
            tool_calls = outcome.tool_calls,
            "Tool run finished"
        );
        Ok(outcome)
    }

    /// Run one tool call and return the text the model sees as its result
    async fn execute(&self, call: &ToolCall) -> Result<String> {
        let name = &call.function.name;

        let Some(tool) = self.tools.get(name) else {
            warn!(tool = %name, "Model requested an unknown tool");
            let options: Vec<String> = self.tools.names().iter().map(|n| json!(n).to_string()).collect();
            return Ok(format!(
                "Invalid tool_call: {}. Available options are: {}. Please try again",
                json!(name),
                options.join(", ")
            ));
        };

        let input = match parse_arguments(&call.function.arguments) {
            Ok(input) => input,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool call arguments are not valid JSON");
                return Ok(format!("Invalid arguments for {}: {}", name, e));
            }
        };

        match tool.invoke(input).await {
            Ok(content) => Ok(serde_json::to_string(&content)?),
            Err(Error::ConfirmationRejected { kind, reason })
                if self.rejection == RejectionPolicy::ReportToModel =>
            {
                info!(tool = %name, kind, %reason, "Reporting rejection to the model");
                Ok(rejection_notice(kind, &reason))
            }
            Err(e) => Err(e),
        }
    }
}

/// Tool text for a rejected gate. A rejected result means the tool already ran.
fn rejection_notice(kind: &str, reason: &str) -> String {
    match kind {
        "confirm-tool-result" => format!("The user rejected the result of this tool call: {}", reason),
        _ => format!("The user rejected this tool call: {}", reason),
    }
}

/// Empty arguments mean no arguments
fn parse_arguments(raw: &str) -> serde_json::Result<Value> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw)
}

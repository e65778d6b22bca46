//! Provider-initiated sampling
//!
//! A tool provider may ask the client to run a completion on its behalf.
//! Each request becomes its own background chat, gated before the model is
//! called and again before the answer goes back.

use std::sync::Arc;

use koala_mcp::{ContentItem, CreateMessageParams, CreateMessageResult, Role, ServerRequest, ServerRequestReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::brain::Brain;
use crate::confirmation::ConfirmationRequest;
use crate::error::{Error, Result};
use crate::message::{system_message, transform_messages};
use crate::model::ChatCompletionRequest;
use crate::session::{ChatOutcome, ChatSession, Initiator};

pub const SAMPLING_SUMMARY: &str = "Data sampling";

impl Brain {
    /// Answer one `sampling/createMessage` request.
    ///
    /// Failures close the chat with an error and are returned so the caller
    /// can answer the provider with an error.
    pub async fn handle_sampling(&self, params: CreateMessageParams) -> Result<CreateMessageResult> {
        let mut session = self.tracker.create_session(Initiator::Background, SAMPLING_SUMMARY);

        match self.sample(&mut session, params).await {
            Ok(result) => {
                session.close(ChatOutcome::Success);
                Ok(result)
            }
            Err(e) => {
                error!(chat_id = %session.id(), error = %e, "Sampling failed");
                session.close(ChatOutcome::Error);
                Err(e)
            }
        }
    }

    async fn sample(&self, session: &mut ChatSession, params: CreateMessageParams) -> Result<CreateMessageResult> {
        let mut messages = Vec::with_capacity(params.messages.len() + 1);
        if let Some(system_prompt) = params.system_prompt.filter(|s| !s.is_empty()) {
            messages.push(system_message(system_prompt));
        }
        messages.extend(transform_messages(&params.messages));

        for message in &messages {
            session.append_message(message.clone());
        }

        self.gate
            .request_confirmation(ConfirmationRequest::ConfirmSamplingRequest {
                messages: messages.clone(),
            })
            .await?;

        let model = self.config.provider.model.clone();
        let request = ChatCompletionRequest::new(model.clone(), messages).with_max_tokens(params.max_tokens);
        let completion = self.model.complete(request).await?;

        let first = completion
            .choices
            .first()
            .ok_or_else(|| Error::Model("Completion returned no choices".to_string()))?;
        let text = first.message.text();
        let stop_reason = first.finish_reason.as_deref().map(stop_reason);

        self.gate
            .request_confirmation(ConfirmationRequest::ConfirmSamplingResult { result: text.clone() })
            .await?;

        for choice in completion.choices {
            session.append_message(choice.message);
        }

        Ok(CreateMessageResult {
            role: Role::Assistant,
            content: ContentItem::text(text.unwrap_or_default()),
            model,
            stop_reason,
        })
    }

    /// Answer sampling requests from `requests` until the client goes away.
    /// Each request runs on its own task.
    pub fn serve_sampling(self: Arc<Self>, mut requests: ServerRequestReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                match request {
                    ServerRequest::CreateMessage { id, params, respond_to } => {
                        let brain = self.clone();
                        tokio::spawn(async move {
                            debug!(%id, "Sampling request received");
                            let result = brain.handle_sampling(params).await.map_err(|e| e.to_string());
                            if respond_to.send(result).is_err() {
                                debug!(%id, "Sampling requester went away");
                            }
                        });
                    }
                }
            }
            debug!("Sampling request stream closed");
        })
    }
}

/// Chat completions finish reasons in MCP terms
fn stop_reason(finish_reason: &str) -> String {
    match finish_reason {
        "stop" => "endTurn".to_string(),
        "length" => "maxTokens".to_string(),
        other => other.to_string(),
    }
}

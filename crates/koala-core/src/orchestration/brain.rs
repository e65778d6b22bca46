use std::sync::Arc;

use koala_mcp::{GetPromptParams, PromptMessage};
use tracing::{error, info};

use super::runner::{RunOutcome, ToolRunner};
use crate::config::Config;
use crate::confirmation::ConfirmationGate;
use crate::error::{Error, Result};
use crate::message::transform_messages;
use crate::model::ModelClient;
use crate::provider::{ToolProvider, ToolProviders};
use crate::session::{ChatOutcome, ChatSession, ChatTracker, Initiator};
use crate::tools::ToolSet;

/// Tool-use orchestrator
///
/// Runs move through fetching (tools and prompt), running (the completion
/// loop) and closing. Fetch failures are returned to the caller before a
/// chat opens; anything that fails later closes the chat with an error and
/// yields `Ok(None)`.
pub struct Brain {
    pub(super) config: Arc<Config>,
    providers: Arc<ToolProviders>,
    pub(super) model: Arc<dyn ModelClient>,
    pub(super) gate: ConfirmationGate,
    pub(super) tracker: ChatTracker,
}

impl Brain {
    pub fn new(
        config: Arc<Config>,
        providers: Arc<ToolProviders>,
        model: Arc<dyn ModelClient>,
        gate: ConfirmationGate,
        tracker: ChatTracker,
    ) -> Self {
        Self {
            config,
            providers,
            model,
            gate,
            tracker,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn provider(&self, name: &str) -> Result<Arc<dyn ToolProvider>> {
        self.providers
            .get(name)
            .ok_or_else(|| Error::Provider(format!("Unknown tool provider: {}", name)))
    }

    /// Render the prompt template `prompt` from provider `client` (the
    /// configured default when `None`) and run it with that provider's tools.
    pub async fn use_prompt(
        &self,
        prompt: GetPromptParams,
        client: Option<&str>,
    ) -> Result<Option<RunOutcome>> {
        let client = client.unwrap_or(self.config.orchestrator.default_client.as_str());
        let provider = self.provider(client)?;

        let descriptors = provider.list_tools().await?;
        let rendered = provider.get_prompt(&prompt).await?;
        info!(
            client,
            prompt = %prompt.name,
            tools = descriptors.len(),
            messages = rendered.messages.len(),
            "Prompt fetched"
        );

        let tools = ToolSet::from_descriptors(descriptors, provider, self.gate.clone());
        let mut session = self
            .tracker
            .create_session(Initiator::User, format!("Use prompt template \"{}\"", prompt.name));

        match self.run_tools(&mut session, &rendered.messages, &tools).await {
            Ok(outcome) => {
                session.close(ChatOutcome::Success);
                Ok(Some(outcome))
            }
            Err(e) => {
                error!(chat_id = %session.id(), prompt = %prompt.name, error = %e, "Prompt run failed");
                session.close(ChatOutcome::Error);
                Ok(None)
            }
        }
    }

    /// Normalize `messages`, record them, and drive the tool runner. Every
    /// message the runner adds is recorded in `session` as it is produced.
    pub async fn run_tools(
        &self,
        session: &mut ChatSession,
        messages: &[PromptMessage],
        tools: &ToolSet,
    ) -> Result<RunOutcome> {
        let messages = transform_messages(messages);
        for message in &messages {
            session.append_message(message.clone());
        }

        let orchestrator = &self.config.orchestrator;
        let runner = ToolRunner::new(self.model.as_ref(), &self.config.provider.model, tools)
            .with_policy(orchestrator.completion_policy())
            .with_rejection_policy(orchestrator.rejection_policy);

        runner
            .run(messages, |message| session.append_message(message.clone()))
            .await
    }
}

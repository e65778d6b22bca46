//! Terminal confirmation and display surfaces

use console::style;
use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;
use koala_core::{ChatEvent, ChatEventReceiver, ChatMessage, ChatOutcome, ChatRole, ConfirmationReceiver, ConfirmationRequest};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::warn;

/// Answer confirmations one at a time on the terminal.
/// With `auto_approve` every request is approved without asking.
pub fn spawn_confirmations(mut rx: ConfirmationReceiver, auto_approve: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(pending) = rx.recv().await {
            print_request(&pending.request);

            if auto_approve {
                println!("  {}", style("auto-approved").dim());
                pending.approve();
                continue;
            }

            let prompt = question(&pending.request);
            let answer = tokio::task::spawn_blocking(move || {
                Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt(prompt)
                    .default(true)
                    .interact()
            })
            .await;

            match answer {
                Ok(Ok(true)) => pending.approve(),
                Ok(Ok(false)) => pending.reject(Some("rejected by operator".to_string())),
                Ok(Err(e)) => {
                    warn!(error = %e, "Confirmation prompt failed");
                    pending.reject(Some(e.to_string()));
                }
                Err(e) => {
                    warn!(error = %e, "Confirmation prompt task failed");
                    pending.reject(Some(e.to_string()));
                }
            }
        }
    })
}

fn question(request: &ConfirmationRequest) -> String {
    match request {
        ConfirmationRequest::ConfirmToolCall { tool_name, .. } => format!("Call tool {}?", tool_name),
        ConfirmationRequest::ConfirmToolResult { tool_name, .. } => {
            format!("Accept the result of {}?", tool_name)
        }
        ConfirmationRequest::ConfirmSamplingRequest { messages } => {
            format!("Send {} message(s) to the model for sampling?", messages.len())
        }
        ConfirmationRequest::ConfirmSamplingResult { .. } => "Return the sampled text to the server?".to_string(),
    }
}

fn print_request(request: &ConfirmationRequest) {
    println!("{} {}", style("?").yellow().bold(), style(request.kind()).yellow());
    match request {
        ConfirmationRequest::ConfirmToolCall { input, .. } => print_json(input),
        ConfirmationRequest::ConfirmToolResult { result, .. } => print_json(result),
        ConfirmationRequest::ConfirmSamplingRequest { messages } => {
            for message in messages {
                print_message(message);
            }
        }
        ConfirmationRequest::ConfirmSamplingResult { result } => {
            println!("  {}", result.as_deref().unwrap_or("(no text)"));
        }
    }
}

fn print_json(value: &Value) {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    for line in text.lines() {
        println!("  {}", style(line).dim());
    }
}

/// Print chat events until every tracker is gone
pub fn spawn_display(mut rx: ChatEventReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ChatEvent::CreateChat { initiator, summary, .. } => {
                    println!(
                        "\n{} {} {}",
                        style(">>").cyan().bold(),
                        style(summary).bold(),
                        style(format!("[{:?}]", initiator).to_lowercase()).dim()
                    );
                }
                ChatEvent::AddMessage { message, .. } => print_message(&message),
                ChatEvent::FinishChat { state, .. } => match state {
                    ChatOutcome::Success => println!("{}", style("<< finished").green()),
                    ChatOutcome::Error => println!("{}", style("<< failed").red()),
                },
            }
        }
    })
}

fn print_message(message: &ChatMessage) {
    let role = match message.role {
        ChatRole::System => style("system").magenta(),
        ChatRole::User => style("user").blue(),
        ChatRole::Assistant => style("assistant").green(),
        ChatRole::Tool => style("tool").yellow(),
    };

    if let Some(text) = message.text() {
        println!("  {}: {}", role, text);
    }
    for call in &message.tool_calls {
        println!(
            "  {}: {}({})",
            role,
            style(&call.function.name).bold(),
            call.function.arguments
        );
    }
}

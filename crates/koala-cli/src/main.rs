//! Koala CLI - run MCP prompt templates with human confirmation
//!
//! Connects to one MCP server (stdio subprocess or HTTP+SSE), then lists its
//! tools or prompts, or runs a prompt template through the model. Sampling
//! requests from the server are answered while a run is in progress.

mod surface;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use koala_core::{
    Brain, Config, ModelClient, OpenAiCompatibleClient, ToolProvider, ToolProviders, chat_event_channel,
    confirmation_channel,
};
use koala_mcp::{ClientInfo, GetPromptParams, McpClient, ServerRequestReceiver, SseTransport, StdioTransport};

#[derive(Parser)]
#[command(name = "koala")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run MCP prompt templates with a model, confirming every tool call", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to <config dir>/koala/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// MCP server command to spawn over stdio
    #[arg(long, global = true, conflicts_with = "sse_url")]
    server_cmd: Option<String>,

    /// Argument for the MCP server command (repeatable)
    #[arg(long = "server-arg", global = true, allow_hyphen_values = true)]
    server_args: Vec<String>,

    /// MCP server SSE endpoint
    #[arg(long, global = true)]
    sse_url: Option<String>,

    /// Name the server is registered under (defaults to the configured client)
    #[arg(long, global = true)]
    name: Option<String>,

    /// Approve every confirmation without asking (use with caution!)
    #[arg(short, long, global = true)]
    yes: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the server's tools
    Tools,

    /// Show the server's prompt templates
    Prompts,

    /// Run a prompt template
    Run {
        /// Prompt template name
        prompt: String,

        /// Template argument as key=value (repeatable)
        #[arg(short, long = "arg", value_parser = parse_key_val)]
        args: Vec<(String, String)>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", s))?;
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; warn by default so they stay out of the way of prompts
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose {
            "info,koala_core=debug,koala_mcp=debug"
        } else {
            "warn"
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load_or_default(cli.config.as_deref())?;
    let name = cli
        .name
        .clone()
        .unwrap_or_else(|| config.orchestrator.default_client.clone());

    let (client, requests) = connect(&cli).await?;
    let client = Arc::new(client);
    debug!(
        server = %client.server_info().name,
        version = %client.server_info().version,
        "Connected to MCP server"
    );

    let succeeded = match cli.command {
        Commands::Tools => {
            show_tools(&client).await?;
            true
        }
        Commands::Prompts => {
            show_prompts(&client).await?;
            true
        }
        Commands::Run { prompt, args } => {
            let mut params = GetPromptParams::new(prompt);
            for (key, value) in args {
                params = params.with_argument(key, value);
            }
            run_prompt(Arc::new(config), client.clone(), requests, &name, params, cli.yes).await?
        }
    };

    if let Err(e) = client.close().await {
        debug!(error = %e, "Failed to close MCP connection");
    }

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

async fn connect(cli: &Cli) -> anyhow::Result<(McpClient, ServerRequestReceiver)> {
    let info = ClientInfo::new("koala", env!("CARGO_PKG_VERSION"));

    if let Some(url) = &cli.sse_url {
        let transport = SseTransport::connect(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;
        return Ok(McpClient::connect(transport, info).await?);
    }

    let Some(command) = &cli.server_cmd else {
        anyhow::bail!("Either --server-cmd or --sse-url is required");
    };
    let transport = StdioTransport::spawn(command, &cli.server_args, &HashMap::new())
        .await
        .with_context(|| format!("Failed to start {}", command))?;

    Ok(McpClient::connect(transport, info).await?)
}

async fn show_tools(client: &McpClient) -> anyhow::Result<()> {
    let tools = client.list_tools().await?;

    println!("\n{}\n", style("Available Tools").bold().cyan());
    for tool in tools {
        println!(
            "  {} - {}",
            style(&tool.name).green(),
            tool.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn show_prompts(client: &McpClient) -> anyhow::Result<()> {
    let prompts = client.list_prompts().await?;

    println!("\n{}\n", style("Prompt Templates").bold().cyan());
    for prompt in prompts {
        println!(
            "  {} - {}",
            style(&prompt.name).green(),
            prompt.description.as_deref().unwrap_or("")
        );
        for argument in prompt.arguments {
            let required = if argument.required { " (required)" } else { "" };
            println!(
                "      {}{} {}",
                style(&argument.name).dim(),
                required,
                argument.description.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

/// Returns whether the run produced an outcome
async fn run_prompt(
    config: Arc<Config>,
    client: Arc<McpClient>,
    requests: ServerRequestReceiver,
    name: &str,
    params: GetPromptParams,
    auto_approve: bool,
) -> anyhow::Result<bool> {
    let providers = Arc::new(ToolProviders::new());
    providers.register(name, client as Arc<dyn ToolProvider>);

    let model: Arc<dyn ModelClient> = Arc::new(OpenAiCompatibleClient::new(&config.provider)?);

    let (gate, confirmations) = confirmation_channel(config.orchestrator.confirmation_timeout());
    let confirming = surface::spawn_confirmations(confirmations, auto_approve);
    let (tracker, events) = chat_event_channel();
    let display = surface::spawn_display(events);

    let brain = Arc::new(Brain::new(config, providers, model, gate, tracker));
    let sampling = brain.clone().serve_sampling(requests);

    let outcome = brain.use_prompt(params, Some(name)).await;

    sampling.abort();
    let _ = sampling.await;
    drop(brain);
    // Sampling requests still in flight keep the display open; don't wait on them forever
    let _ = tokio::time::timeout(Duration::from_secs(1), display).await;
    confirming.abort();

    match outcome? {
        Some(outcome) => {
            if let Some(text) = outcome.final_text() {
                println!("\n{}", text);
            }
            Ok(true)
        }
        None => {
            eprintln!("{}", style("Run failed, see the log for details").red());
            Ok(false)
        }
    }
}

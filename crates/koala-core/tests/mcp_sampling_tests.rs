//! Sampling requests arriving over a live MCP connection

use std::sync::Arc;

use async_trait::async_trait;
use koala_core::{
    Brain, ChatCompletion, ChatCompletionRequest, ChatMessage, Choice, Config, ConfirmationGate, ModelClient,
    ProviderConfig, Result, ToolProvider, ToolProviders, chat_event_channel, confirmation_channel,
};
use koala_mcp::{ChannelTransport, ClientInfo, McpClient, PROTOCOL_VERSION, Transport};
use serde_json::{Value, json};

struct EchoModel;

#[async_trait]
impl ModelClient for EchoModel {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletion> {
        let last = request.messages.last().and_then(ChatMessage::text).unwrap_or_default();
        Ok(ChatCompletion {
            id: "chatcmpl-echo".into(),
            model: request.model,
            choices: vec![Choice {
                index: 0,
                message: ChatMessage::assistant(format!("echo: {}", last)),
                finish_reason: Some("length".into()),
            }],
            usage: None,
        })
    }
}

async fn recv(server: &ChannelTransport) -> Value {
    server.receive().await.unwrap().expect("client hung up")
}

/// Connect a client to an in-memory server end and finish the handshake
async fn connect() -> (McpClient, koala_mcp::ServerRequestReceiver, ChannelTransport) {
    let (client_end, server_end) = ChannelTransport::pair();

    let server = tokio::spawn(async move {
        let init = recv(&server_end).await;
        server_end
            .send(json!({
                "jsonrpc": "2.0",
                "id": init["id"],
                "result": {
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "koala-news", "version": "0.1.0"}
                }
            }))
            .await
            .unwrap();
        let initialized = recv(&server_end).await;
        assert_eq!(initialized["method"], "notifications/initialized");
        server_end
    });

    let (client, requests) = McpClient::connect(client_end, ClientInfo::new("koala", "0.1.0"))
        .await
        .unwrap();
    (client, requests, server.await.unwrap())
}

fn build_brain(client: Arc<McpClient>, gate: ConfirmationGate) -> (Arc<Brain>, koala_core::ChatEventReceiver) {
    let providers = Arc::new(ToolProviders::new());
    providers.register("koala-news", client as Arc<dyn ToolProvider>);

    let config = Arc::new(Config {
        provider: ProviderConfig {
            model: "echo-model".into(),
            ..Default::default()
        },
        ..Default::default()
    });
    let (tracker, events) = chat_event_channel();

    (Arc::new(Brain::new(config, providers, Arc::new(EchoModel), gate, tracker)), events)
}

fn sampling_request(id: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "sampling/createMessage",
        "params": {
            "messages": [{"role": "user", "content": {"type": "text", "text": "headline?"}}],
            "systemPrompt": "Be terse",
            "maxTokens": 16
        }
    })
}

#[tokio::test]
async fn test_sampling_round_trip() {
    let (client, requests, server) = connect().await;
    let (brain, _events) = build_brain(Arc::new(client), ConfirmationGate::auto_approve());
    let serving = brain.serve_sampling(requests);

    server.send(sampling_request("s-1")).await.unwrap();

    let response = recv(&server).await;
    assert_eq!(response["id"], "s-1");
    assert_eq!(
        response["result"],
        json!({
            "role": "assistant",
            "content": {"type": "text", "text": "echo: headline?"},
            "model": "echo-model",
            "stopReason": "maxTokens"
        })
    );

    serving.abort();
}

#[tokio::test]
async fn test_rejected_sampling_answers_with_error() {
    let (client, requests, server) = connect().await;
    let (gate, mut confirmations) = confirmation_channel(None);
    tokio::spawn(async move {
        while let Some(pending) = confirmations.recv().await {
            pending.reject(Some("operator declined".into()));
        }
    });
    let (brain, _events) = build_brain(Arc::new(client), gate);
    let serving = brain.serve_sampling(requests);

    server.send(sampling_request("s-2")).await.unwrap();

    let response = recv(&server).await;
    assert_eq!(response["id"], "s-2");
    assert_eq!(response["error"]["code"], -32603);
    assert!(
        response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("operator declined")
    );

    serving.abort();
}

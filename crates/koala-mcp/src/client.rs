//! MCP Client implementation
//!
//! The client owns a reader task that routes every incoming message:
//! responses go back to the caller waiting on that id, server requests
//! (`ping`, `sampling/createMessage`) are answered or forwarded, and log
//! notifications are replayed through `tracing`.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::protocol::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    methods,
};
use crate::transport::Transport;
use crate::{
    CallToolResult, CreateMessageParams, CreateMessageResult, GetPromptParams, GetPromptResult,
    LoggingMessageParams, McpPrompt, McpTool, PROTOCOL_VERSION, ServerCapabilities,
};

/// A request the server sent that needs an answer from the application
#[derive(Debug)]
pub enum ServerRequest {
    /// `sampling/createMessage`: run a completion on the server's behalf.
    /// An `Err` is sent back to the server as a JSON-RPC error.
    CreateMessage {
        id: RequestId,
        params: CreateMessageParams,
        respond_to: oneshot::Sender<Result<CreateMessageResult, String>>,
    },
}

pub type ServerRequestReceiver = mpsc::UnboundedReceiver<ServerRequest>;

#[derive(Default)]
struct PendingRequests {
    waiters: HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>,
    closed: bool,
}

/// MCP Client for connecting to MCP servers
pub struct McpClient {
    transport: Arc<dyn Transport>,
    request_id: AtomicI64,
    pending: Arc<Mutex<PendingRequests>>,
    reader: JoinHandle<()>,
    server_info: ServerInfo,
}

impl McpClient {
    /// Start the reader task and run the initialize handshake.
    ///
    /// The returned receiver yields server-initiated requests; dropping it
    /// makes the client answer them with an error.
    pub async fn connect(
        transport: impl Transport + 'static,
        client_info: ClientInfo,
    ) -> Result<(Self, ServerRequestReceiver), McpError> {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let pending = Arc::new(Mutex::new(PendingRequests::default()));
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(transport.clone(), pending.clone(), requests_tx));

        let mut client = Self {
            transport,
            request_id: AtomicI64::new(1),
            pending,
            reader,
            server_info: ServerInfo::default(),
        };
        client.server_info = client.initialize(client_info).await?;

        Ok((client, requests_rx))
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.request_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn initialize(&self, client_info: ClientInfo) -> Result<ServerInfo, McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "sampling": {}
            },
            "clientInfo": {
                "name": client_info.name,
                "version": client_info.version
            }
        });

        let result: InitializeResult = self.request(methods::INITIALIZE, Some(params)).await?;

        self.notify(JsonRpcNotification::new(methods::INITIALIZED)).await?;

        debug!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            protocol = %result.protocol_version,
            "MCP session initialized"
        );

        Ok(ServerInfo {
            name: result.server_info.name,
            version: result.server_info.version,
            capabilities: result.capabilities,
        })
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// List available tools
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        self.list_all(methods::TOOLS_LIST, "tools").await
    }

    /// List available prompt templates
    pub async fn list_prompts(&self) -> Result<Vec<McpPrompt>, McpError> {
        self.list_all(methods::PROMPTS_LIST, "prompts").await
    }

    /// Render a prompt template with its arguments
    pub async fn get_prompt(&self, params: &GetPromptParams) -> Result<GetPromptResult, McpError> {
        let params = serde_json::to_value(params).map_err(|e| McpError::Protocol(e.to_string()))?;
        self.request(methods::PROMPTS_GET, Some(params)).await
    }

    /// Call a tool
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let params = json!({
            "name": name,
            "arguments": arguments
        });

        self.request(methods::TOOLS_CALL, Some(params)).await
    }

    pub async fn ping(&self) -> Result<(), McpError> {
        let _: Value = self.request(methods::PING, None).await?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.pending.lock().closed
    }

    pub async fn close(&self) -> Result<(), McpError> {
        let result = self
            .transport
            .close()
            .await
            .map_err(|e| McpError::Transport(e.to_string()));
        self.reader.abort();
        mark_closed(&self.pending);
        result
    }

    /// Collect every page of a paginated list method
    async fn list_all<T: DeserializeOwned>(&self, method: &str, key: &str) -> Result<Vec<T>, McpError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let mut page: Value = self.request(method, params).await?;

            if let Some(list) = page.get_mut(key).map(Value::take) {
                let list: Vec<T> =
                    serde_json::from_value(list).map_err(|e| McpError::Protocol(e.to_string()))?;
                items.extend(list);
            }

            match page.get("nextCursor").and_then(Value::as_str) {
                Some(next) if !next.is_empty() => cursor = Some(next.to_string()),
                _ => return Ok(items),
            }
        }
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<R, McpError> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock();
            if pending.closed {
                return Err(McpError::Closed);
            }
            pending.waiters.insert(id.clone(), tx);
        }

        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(params) = params {
            request = request.with_params(params);
        }
        let value = serde_json::to_value(&request).map_err(|e| McpError::Protocol(e.to_string()))?;

        if let Err(e) = self.transport.send(value).await {
            self.pending.lock().waiters.remove(&id);
            return Err(McpError::Transport(e.to_string()));
        }

        let response = rx.await.map_err(|_| McpError::Closed)?;

        if let Some(error) = response.error {
            return Err(McpError::Server {
                code: error.code,
                message: error.message,
            });
        }

        let result = response
            .result
            .ok_or_else(|| McpError::Protocol("Empty response".to_string()))?;
        serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), McpError> {
        let value =
            serde_json::to_value(&notification).map_err(|e| McpError::Protocol(e.to_string()))?;
        self.transport
            .send(value)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    transport: Arc<dyn Transport>,
    pending: Arc<Mutex<PendingRequests>>,
    requests: mpsc::UnboundedSender<ServerRequest>,
) {
    loop {
        let value = match transport.receive().await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("MCP connection closed");
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(error = %e, "Skipping unparseable MCP message");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "MCP transport failed");
                break;
            }
        };

        let message = match JsonRpcMessage::from_value(value) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed MCP message");
                continue;
            }
        };

        match message {
            JsonRpcMessage::Response(response) => {
                let waiter = pending.lock().waiters.remove(&response.id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(response);
                    }
                    None => warn!(id = %response.id, "Response for unknown request"),
                }
            }
            JsonRpcMessage::Request(request) => {
                handle_server_request(&transport, &requests, request).await;
            }
            JsonRpcMessage::Notification(notification) => handle_notification(notification),
        }
    }

    mark_closed(&pending);
}

/// Dropping the waiters wakes every caller with `McpError::Closed`
fn mark_closed(pending: &Mutex<PendingRequests>) {
    let mut pending = pending.lock();
    pending.closed = true;
    pending.waiters.clear();
}

async fn handle_server_request(
    transport: &Arc<dyn Transport>,
    requests: &mpsc::UnboundedSender<ServerRequest>,
    request: JsonRpcRequest,
) {
    let id = request.id;

    match request.method.as_str() {
        methods::PING => send_response(transport.as_ref(), JsonRpcResponse::success(id, json!({}))).await,
        methods::SAMPLING_CREATE_MESSAGE => {
            let params = request.params.unwrap_or(Value::Null);
            let params: CreateMessageParams = match serde_json::from_value(params) {
                Ok(params) => params,
                Err(e) => {
                    warn!(%id, error = %e, "Invalid sampling request");
                    let response = JsonRpcResponse::error(id, JsonRpcError::invalid_params());
                    send_response(transport.as_ref(), response).await;
                    return;
                }
            };

            let (respond_to, answer) = oneshot::channel();
            let forwarded = requests.send(ServerRequest::CreateMessage {
                id: id.clone(),
                params,
                respond_to,
            });
            if forwarded.is_err() {
                let error = JsonRpcError::internal_error("Sampling is not supported by this client");
                send_response(transport.as_ref(), JsonRpcResponse::error(id, error)).await;
                return;
            }

            // Answered off the reader so tool calls can progress meanwhile
            let transport = transport.clone();
            tokio::spawn(async move {
                let response = match answer.await {
                    Ok(Ok(result)) => match serde_json::to_value(&result) {
                        Ok(value) => JsonRpcResponse::success(id, value),
                        Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
                    },
                    Ok(Err(message)) => JsonRpcResponse::error(id, JsonRpcError::internal_error(message)),
                    Err(_) => JsonRpcResponse::error(
                        id,
                        JsonRpcError::internal_error("Sampling request was dropped"),
                    ),
                };
                send_response(transport.as_ref(), response).await;
            });
        }
        other => {
            debug!(method = other, "Unsupported server request");
            send_response(transport.as_ref(), JsonRpcResponse::error(id, JsonRpcError::method_not_found())).await;
        }
    }
}

async fn send_response(transport: &dyn Transport, response: JsonRpcResponse) {
    let id = response.id.clone();
    let value = match serde_json::to_value(&response) {
        Ok(value) => value,
        Err(e) => {
            error!(%id, error = %e, "Failed to encode response");
            return;
        }
    };

    if let Err(e) = transport.send(value).await {
        warn!(%id, error = %e, "Failed to send response");
    }
}

fn handle_notification(notification: JsonRpcNotification) {
    if notification.method != methods::LOGGING_MESSAGE {
        debug!(method = %notification.method, "MCP notification");
        return;
    }

    let Some(params) = notification
        .params
        .and_then(|p| serde_json::from_value::<LoggingMessageParams>(p).ok())
    else {
        warn!("Malformed log notification");
        return;
    };

    let logger = params.logger.as_deref().unwrap_or("server");
    let data = match &params.data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    match params.level.as_str() {
        "debug" => debug!(logger, "{}", data),
        "info" | "notice" => info!(logger, "{}", data),
        "warning" => warn!(logger, "{}", data),
        _ => error!(logger, level = %params.level, "{}", data),
    }
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl ClientInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub capabilities: ServerCapabilities,
}

#[derive(Debug, Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion", default)]
    protocol_version: String,
    #[serde(default)]
    capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    server_info: ServerInfoInner,
}

#[derive(Debug, Deserialize)]
struct ServerInfoInner {
    name: String,
    #[serde(default)]
    version: String,
}

/// MCP errors
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Server error {code}: {message}")]
    Server { code: i64, message: String },
    #[error("Connection closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::error_codes;
    use crate::transport::ChannelTransport;
    use crate::{ContentItem, Role};

    async fn expect_message(server: &ChannelTransport, method: &str) -> Value {
        let message = server.receive().await.unwrap().expect("client hung up");
        assert_eq!(message["method"], method);
        message
    }

    async fn reply(server: &ChannelTransport, id: &Value, result: Value) {
        server
            .send(json!({"jsonrpc": "2.0", "id": id, "result": result}))
            .await
            .unwrap();
    }

    async fn connected() -> (McpClient, ServerRequestReceiver, ChannelTransport) {
        let (client_end, server_end) = ChannelTransport::pair();

        let server = tokio::spawn(async move {
            let init = expect_message(&server_end, "initialize").await;
            assert_eq!(init["params"]["capabilities"]["sampling"], json!({}));
            assert_eq!(init["params"]["clientInfo"]["name"], "koala-test");
            reply(
                &server_end,
                &init["id"],
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}, "prompts": {"listChanged": true}},
                    "serverInfo": {"name": "koala-news", "version": "0.3.0"}
                }),
            )
            .await;
            expect_message(&server_end, "notifications/initialized").await;
            server_end
        });

        let (client, requests) = McpClient::connect(client_end, ClientInfo::new("koala-test", "0.1.0"))
            .await
            .unwrap();
        let server_end = server.await.unwrap();

        (client, requests, server_end)
    }

    #[tokio::test]
    async fn test_handshake_records_server_info() {
        let (client, _requests, _server) = connected().await;

        assert_eq!(client.server_info().name, "koala-news");
        assert_eq!(client.server_info().version, "0.3.0");
        assert!(client.server_info().capabilities.tools.is_some());
    }

    #[tokio::test]
    async fn test_list_tools() {
        let (client, _requests, server) = connected().await;

        let (tools, ()) = tokio::join!(client.list_tools(), async {
            let request = expect_message(&server, "tools/list").await;
            reply(
                &server,
                &request["id"],
                json!({"tools": [
                    {"name": "fetch_news", "description": "Latest headlines", "inputSchema": {"type": "object"}},
                    {"name": "get_article", "inputSchema": {"type": "object", "properties": {"id": {"type": "string"}}}}
                ]}),
            )
            .await;
        });

        let tools = tools.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "fetch_news");
        assert_eq!(tools[1].description, None);
    }

    #[tokio::test]
    async fn test_list_tools_follows_cursor() {
        let (client, _requests, server) = connected().await;

        let (tools, ()) = tokio::join!(client.list_tools(), async {
            let first = expect_message(&server, "tools/list").await;
            assert!(first.get("params").is_none());
            reply(
                &server,
                &first["id"],
                json!({"tools": [{"name": "a", "inputSchema": {}}], "nextCursor": "page-2"}),
            )
            .await;

            let second = expect_message(&server, "tools/list").await;
            assert_eq!(second["params"]["cursor"], "page-2");
            reply(&server, &second["id"], json!({"tools": [{"name": "b", "inputSchema": {}}]})).await;
        });

        let names: Vec<_> = tools.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_call_tool_sends_name_and_arguments() {
        let (client, _requests, server) = connected().await;

        let (result, ()) = tokio::join!(client.call_tool("fetch_news", json!({"topic": "tech"})), async {
            let request = expect_message(&server, "tools/call").await;
            assert_eq!(request["params"]["name"], "fetch_news");
            assert_eq!(request["params"]["arguments"], json!({"topic": "tech"}));
            reply(
                &server,
                &request["id"],
                json!({"content": [{"type": "text", "text": "3 headlines"}]}),
            )
            .await;
        });

        let result = result.unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content, vec![ContentItem::text("3 headlines")]);
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let (client, _requests, server) = connected().await;

        let params = GetPromptParams::new("missing");
        let (result, ()) = tokio::join!(client.get_prompt(&params), async {
            let request = expect_message(&server, "prompts/get").await;
            assert_eq!(request["params"]["name"], "missing");
            server
                .send(json!({
                    "jsonrpc": "2.0",
                    "id": request["id"],
                    "error": {"code": error_codes::INVALID_PARAMS, "message": "Unknown prompt"}
                }))
                .await
                .unwrap();
        });

        match result {
            Err(McpError::Server { code, message }) => {
                assert_eq!(code, error_codes::INVALID_PARAMS);
                assert_eq!(message, "Unknown prompt");
            }
            other => panic!("expected server error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sampling_request_is_forwarded_and_answered() {
        let (_client, mut requests, server) = connected().await;

        server
            .send(json!({
                "jsonrpc": "2.0",
                "id": "s-1",
                "method": "sampling/createMessage",
                "params": {
                    "messages": [{"role": "user", "content": {"type": "text", "text": "Summarize"}}],
                    "maxTokens": 100
                }
            }))
            .await
            .unwrap();

        let Some(ServerRequest::CreateMessage { id, params, respond_to }) = requests.recv().await else {
            panic!("sampling request was not forwarded");
        };
        assert_eq!(id, RequestId::String("s-1".into()));
        assert_eq!(params.max_tokens, Some(100));

        respond_to
            .send(Ok(CreateMessageResult {
                role: Role::Assistant,
                content: ContentItem::text("Short summary"),
                model: "test-model".into(),
                stop_reason: None,
            }))
            .unwrap();

        let response = server.receive().await.unwrap().unwrap();
        assert_eq!(response["id"], "s-1");
        assert_eq!(response["result"]["content"]["text"], "Short summary");
        assert_eq!(response["result"]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_sampling_failure_becomes_json_rpc_error() {
        let (_client, mut requests, server) = connected().await;

        server
            .send(json!({
                "jsonrpc": "2.0",
                "id": 9,
                "method": "sampling/createMessage",
                "params": {"messages": []}
            }))
            .await
            .unwrap();

        let Some(ServerRequest::CreateMessage { respond_to, .. }) = requests.recv().await else {
            panic!("sampling request was not forwarded");
        };
        respond_to.send(Err("rejected by user".into())).unwrap();

        let response = server.receive().await.unwrap().unwrap();
        assert_eq!(response["id"], 9);
        assert_eq!(response["error"]["code"], error_codes::INTERNAL_ERROR);
        assert_eq!(response["error"]["message"], "rejected by user");
    }

    #[tokio::test]
    async fn test_unknown_server_method_and_ping() {
        let (_client, _requests, server) = connected().await;

        server
            .send(json!({"jsonrpc": "2.0", "id": 1, "method": "roots/list"}))
            .await
            .unwrap();
        let response = server.receive().await.unwrap().unwrap();
        assert_eq!(response["error"]["code"], error_codes::METHOD_NOT_FOUND);

        server
            .send(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}))
            .await
            .unwrap();
        let response = server.receive().await.unwrap().unwrap();
        assert_eq!(response["id"], 2);
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn test_log_notification_does_not_disturb_requests() {
        let (client, _requests, server) = connected().await;

        let (result, ()) = tokio::join!(client.ping(), async {
            server
                .send(json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/message",
                    "params": {"level": "info", "logger": "news", "data": "fetching"}
                }))
                .await
                .unwrap();
            let request = expect_message(&server, "ping").await;
            reply(&server, &request["id"], json!({})).await;
        });

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_close_fails_in_flight_request() {
        let (client, _requests, server) = connected().await;

        let (result, ()) = tokio::join!(client.list_tools(), async {
            expect_message(&server, "tools/list").await;
            client.close().await.unwrap();
        });

        assert!(matches!(result, Err(McpError::Closed)));
        assert!(client.is_closed());
        assert!(matches!(client.ping().await, Err(McpError::Closed)));
    }

    #[tokio::test]
    async fn test_closed_connection_fails_pending_and_later_requests() {
        let (client, _requests, server) = connected().await;

        let (result, ()) = tokio::join!(client.list_prompts(), async move {
            expect_message(&server, "prompts/list").await;
            drop(server);
        });
        assert!(matches!(result, Err(McpError::Closed)));

        assert!(client.is_closed());
        assert!(matches!(client.list_tools().await, Err(McpError::Closed)));
    }
}

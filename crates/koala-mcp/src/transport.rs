//! MCP Transport layer implementations
//!
//! A transport moves whole JSON-RPC messages. Sending and receiving take
//! `&self` so the client's reader task can wait for the next message while
//! other tasks keep sending requests.

use std::collections::HashMap;
use std::io;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::debug;

/// Transport trait for MCP communication
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: Value) -> io::Result<()>;
    /// Next message from the peer, `None` once the connection is closed.
    ///
    /// A message that is not JSON yields `io::ErrorKind::InvalidData`; the
    /// connection stays usable and the next call moves on to the next message.
    async fn receive(&self) -> io::Result<Option<Value>>;
    async fn close(&self) -> io::Result<()>;
}

fn parse_message(text: &str) -> io::Result<Value> {
    serde_json::from_str(text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Stdio transport for subprocess communication
pub struct StdioTransport {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    lines: Mutex<FramedRead<ChildStdout, LinesCodec>>,
}

impl StdioTransport {
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> io::Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture stdout"))?;

        debug!(command, "Spawned MCP server process");

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            lines: Mutex::new(FramedRead::new(stdout, LinesCodec::new())),
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: Value) -> io::Result<()> {
        let json = serde_json::to_string(&message)?;
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        Ok(())
    }

    async fn receive(&self) -> io::Result<Option<Value>> {
        let mut lines = self.lines.lock().await;

        loop {
            match lines.next().await {
                Some(Ok(line)) if line.trim().is_empty() => continue,
                Some(Ok(line)) => return parse_message(&line).map(Some),
                Some(Err(LinesCodecError::Io(e))) => return Err(e),
                Some(Err(e)) => return Err(io::Error::other(e)),
                None => return Ok(None),
            }
        }
    }

    async fn close(&self) -> io::Result<()> {
        self.child.lock().await.kill().await
    }
}

/// SSE transport for HTTP-based communication
///
/// The server stream announces a POST endpoint in an `endpoint` event;
/// responses and server requests arrive as `message` events.
pub struct SseTransport {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    incoming: Mutex<mpsc::UnboundedReceiver<io::Result<Value>>>,
    reader: JoinHandle<()>,
}

impl SseTransport {
    pub async fn connect(sse_url: &str) -> io::Result<Self> {
        let client = reqwest::Client::new();
        let response = client
            .get(sse_url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(io::Error::other)?
            .error_for_status()
            .map_err(io::Error::other)?;

        let base = response.url().clone();
        let mut events = Box::pin(response.bytes_stream().eventsource());

        let endpoint = loop {
            match events.next().await {
                Some(Ok(event)) if event.event == "endpoint" => {
                    break base.join(event.data.trim()).map_err(io::Error::other)?;
                }
                Some(Ok(event)) => debug!(event = %event.event, "Ignoring SSE event before endpoint"),
                Some(Err(e)) => return Err(io::Error::other(e.to_string())),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "SSE stream closed before the endpoint event",
                    ));
                }
            }
        };
        debug!(%endpoint, "MCP SSE endpoint announced");

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) if event.event.is_empty() || event.event == "message" => {
                        let parsed = parse_message(&event.data);
                        if tx.send(parsed).is_err() {
                            break;
                        }
                    }
                    Ok(event) => debug!(event = %event.event, "Ignoring SSE event"),
                    Err(e) => {
                        let _ = tx.send(Err(io::Error::other(e.to_string())));
                        break;
                    }
                }
            }
        });

        Ok(Self {
            client,
            endpoint,
            incoming: Mutex::new(rx),
            reader,
        })
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&self, message: Value) -> io::Result<()> {
        self.client
            .post(self.endpoint.clone())
            .json(&message)
            .send()
            .await
            .map_err(io::Error::other)?
            .error_for_status()
            .map_err(io::Error::other)?;

        Ok(())
    }

    async fn receive(&self) -> io::Result<Option<Value>> {
        match self.incoming.lock().await.recv().await {
            Some(message) => message.map(Some),
            None => Ok(None),
        }
    }

    async fn close(&self) -> io::Result<()> {
        self.reader.abort();
        Ok(())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// In-process transport; `pair()` returns two connected ends
pub struct ChannelTransport {
    tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<Value>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl ChannelTransport {
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();

        (
            Self {
                tx: parking_lot::Mutex::new(Some(a_tx)),
                rx: Mutex::new(b_rx),
            },
            Self {
                tx: parking_lot::Mutex::new(Some(b_tx)),
                rx: Mutex::new(a_rx),
            },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: Value) -> io::Result<()> {
        let tx = self.tx.lock().clone();
        match tx {
            Some(tx) => tx
                .send(message)
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "Peer closed")),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "Transport closed")),
        }
    }

    async fn receive(&self) -> io::Result<Option<Value>> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> io::Result<()> {
        self.tx.lock().take();
        Ok(())
    }
}

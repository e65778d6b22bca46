//! Human confirmation gate
//!
//! Every tool call, tool result, sampling request and sampling result is
//! surfaced to a confirmation surface before the run may continue.
//!
//! ## Design
//!
//! - The gate sends a [`PendingConfirmation`] through an mpsc channel
//! - Each pending confirmation carries a oneshot responder
//! - The caller suspends on the responder until approve, reject or timeout
//! - A surface that went away counts as a rejection

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::message::ChatMessage;

/// What the operator is asked to confirm. Serializes as `{type, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ConfirmationRequest {
    ConfirmToolCall {
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
    },
    ConfirmToolResult {
        #[serde(rename = "toolName")]
        tool_name: String,
        result: Value,
    },
    ConfirmSamplingRequest {
        messages: Vec<ChatMessage>,
    },
    ConfirmSamplingResult {
        result: Option<String>,
    },
}

impl ConfirmationRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            ConfirmationRequest::ConfirmToolCall { .. } => "confirm-tool-call",
            ConfirmationRequest::ConfirmToolResult { .. } => "confirm-tool-result",
            ConfirmationRequest::ConfirmSamplingRequest { .. } => "confirm-sampling-request",
            ConfirmationRequest::ConfirmSamplingResult { .. } => "confirm-sampling-result",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationDecision {
    Approved,
    Rejected { reason: Option<String> },
}

/// A request waiting on the confirmation surface
#[derive(Debug)]
pub struct PendingConfirmation {
    pub id: Uuid,
    pub request: ConfirmationRequest,
    responder: oneshot::Sender<ConfirmationDecision>,
}

impl PendingConfirmation {
    pub fn resolve(self, decision: ConfirmationDecision) {
        if self.responder.send(decision).is_err() {
            debug!(id = %self.id, "Confirmation resolved after the requester stopped waiting");
        }
    }

    pub fn approve(self) {
        self.resolve(ConfirmationDecision::Approved);
    }

    pub fn reject(self, reason: Option<String>) {
        self.resolve(ConfirmationDecision::Rejected { reason });
    }
}

/// Receiver half, owned by the confirmation surface
pub type ConfirmationReceiver = mpsc::UnboundedReceiver<PendingConfirmation>;

/// Create a gate and the receiver its requests arrive on
pub fn confirmation_channel(timeout: Option<Duration>) -> (ConfirmationGate, ConfirmationReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConfirmationGate { tx, timeout }, rx)
}

const SURFACE_CLOSED: &str = "confirmation surface closed";

#[derive(Debug, Clone)]
pub struct ConfirmationGate {
    tx: mpsc::UnboundedSender<PendingConfirmation>,
    timeout: Option<Duration>,
}

impl ConfirmationGate {
    /// A gate that approves everything, for unattended runs and tests.
    /// Must be called inside a tokio runtime.
    pub fn auto_approve() -> Self {
        let (gate, mut rx) = confirmation_channel(None);

        tokio::spawn(async move {
            while let Some(pending) = rx.recv().await {
                pending.approve();
            }
        });

        gate
    }

    /// Suspend until the surface resolves `request`.
    ///
    /// Returns `Ok(())` on approval, [`Error::ConfirmationRejected`] on
    /// rejection or when the surface is gone, and
    /// [`Error::ConfirmationTimeout`] when the configured timeout elapses.
    pub async fn request_confirmation(&self, request: ConfirmationRequest) -> Result<()> {
        let kind = request.kind();
        let (responder, decision) = oneshot::channel();
        let pending = PendingConfirmation {
            id: Uuid::new_v4(),
            request,
            responder,
        };
        debug!(kind, id = %pending.id, "Requesting confirmation");

        if self.tx.send(pending).is_err() {
            return Err(rejected(kind, SURFACE_CLOSED));
        }

        let decision = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, decision).await {
                Ok(decision) => decision,
                Err(_) => {
                    warn!(kind, ?timeout, "Confirmation timed out");
                    return Err(Error::ConfirmationTimeout { kind, timeout });
                }
            },
            None => decision.await,
        };

        match decision {
            Ok(ConfirmationDecision::Approved) => Ok(()),
            Ok(ConfirmationDecision::Rejected { reason }) => {
                let reason = reason.unwrap_or_else(|| "rejected by user".to_string());
                warn!(kind, %reason, "Confirmation rejected");
                Err(rejected(kind, reason))
            }
            Err(_) => Err(rejected(kind, SURFACE_CLOSED)),
        }
    }
}

fn rejected(kind: &'static str, reason: impl Into<String>) -> Error {
    Error::ConfirmationRejected {
        kind,
        reason: reason.into(),
    }
}

//! Outbound action sink
//!
//! Where granted responses go. Delivery mechanics live behind the trait.

use cortex_core::{AgentId, ContextId, Error, Result, Tier};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

/// A granted response ready to send.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutboundAction {
    pub action_id: String,
    pub agent_id: AgentId,
    pub context_id: ContextId,
    pub in_reply_to: String,
    pub content: String,
    pub tier: Tier,
    /// Arbitration round that granted the turn.
    pub round: u64,
}

#[async_trait::async_trait]
pub trait ActionSink: Send + Sync {
    async fn deliver(&self, action: OutboundAction) -> Result<()>;
}

/// Hands actions to an mpsc receiver.
pub struct ChannelSink {
    tx: mpsc::Sender<OutboundAction>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundAction>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl ActionSink for ChannelSink {
    async fn deliver(&self, action: OutboundAction) -> Result<()> {
        self.tx
            .send(action)
            .await
            .map_err(|_| Error::Internal("action receiver dropped".into()))
    }
}

/// Logs each action and drops it.
pub struct LogSink;

#[async_trait::async_trait]
impl ActionSink for LogSink {
    async fn deliver(&self, action: OutboundAction) -> Result<()> {
        info!(
            "[{}] {} ({}): {}",
            action.context_id, action.agent_id, action.tier, action.content
        );
        Ok(())
    }
}

//! Core types for Cortex

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Persona identifier - cheaply cloneable
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(Arc<str>);

impl AgentId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Shared conversation identifier (a channel, thread, or task room)
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Arc<str>);

impl ContextId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ContextId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ContextId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Message role
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a conversation transcript
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Who said it. `None` for system text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            author: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            author: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            author: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// Clamp into [0, 1], mapping NaN to 0 so it can never outrank a real value.
pub fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// A pending message in one persona's inbox.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InboxMessage {
    pub message_id: String,
    pub context_id: ContextId,
    pub content: String,
    /// Urgency in [0, 1]. Higher is served first.
    pub priority: f64,
    pub enqueued_at: DateTime<Utc>,
}

impl InboxMessage {
    pub fn new(context_id: impl Into<ContextId>, content: impl Into<String>, priority: f64) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            context_id: context_id.into(),
            content: content.into(),
            priority: clamp_unit(priority),
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn with_enqueued_at(mut self, at: DateTime<Utc>) -> Self {
        self.enqueued_at = at;
        self
    }
}

/// Intent-to-respond announced by a persona for one arbitration round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThoughtBroadcast {
    pub agent_id: AgentId,
    pub context_id: ContextId,
    /// Self-assessed confidence in [0, 1].
    pub confidence: f64,
    pub broadcast_at: DateTime<Utc>,
}

impl ThoughtBroadcast {
    pub fn new(agent_id: impl Into<AgentId>, context_id: impl Into<ContextId>, confidence: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            context_id: context_id.into(),
            confidence: clamp_unit(confidence),
            broadcast_at: Utc::now(),
        }
    }

    pub fn with_broadcast_at(mut self, at: DateTime<Utc>) -> Self {
        self.broadcast_at = at;
        self
    }
}

/// Outcome of one arbitration round. Immutable once issued.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnDecision {
    pub context_id: ContextId,
    pub granted_agent_id: Option<AgentId>,
    pub decided_at: DateTime<Utc>,
    pub window_duration_ms: u64,
    /// Monotonic per-context round number, starting at 1.
    pub round: u64,
}

impl TurnDecision {
    pub fn is_granted_to(&self, agent: &AgentId) -> bool {
        self.granted_agent_id.as_ref() == Some(agent)
    }

    /// Implicit denial used when no decision could be obtained.
    pub fn denied(context_id: ContextId, window_duration_ms: u64) -> Self {
        Self {
            context_id,
            granted_agent_id: None,
            decided_at: Utc::now(),
            window_duration_ms,
            round: 0,
        }
    }
}

//! Scoped memory entries and recall queries

use crate::types::{AgentId, ContextId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Visibility boundary of a stored memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// Owned by `discovered_by`; never visible to anyone else.
    Personal,
    /// Shared among participants of one context, short-lived.
    Task,
    /// Shared among participants of one context, long-lived.
    Project,
    /// Readable by every persona.
    Team,
    /// Readable by every persona.
    Global,
}

impl MemoryScope {
    pub const ALL: [MemoryScope; 5] = [
        MemoryScope::Personal,
        MemoryScope::Task,
        MemoryScope::Project,
        MemoryScope::Team,
        MemoryScope::Global,
    ];

    /// Scopes gated on context participation.
    pub fn requires_context(self) -> bool {
        matches!(self, MemoryScope::Task | MemoryScope::Project)
    }

    /// Scopes written by more than one persona.
    pub fn is_shared(self) -> bool {
        !matches!(self, MemoryScope::Personal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryScope::Personal => "personal",
            MemoryScope::Task => "task",
            MemoryScope::Project => "project",
            MemoryScope::Team => "team",
            MemoryScope::Global => "global",
        }
    }
}

impl std::fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored memory. Content is immutable once created; only the access
/// metadata (`access_count`, `last_accessed_at`) and the archive flag change.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    pub scope: MemoryScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<ContextId>,
    pub discovered_by: AgentId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived: bool,
}

impl MemoryEntry {
    pub fn new(content: impl Into<String>, scope: MemoryScope, discovered_by: impl Into<AgentId>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            scope,
            context_id: None,
            discovered_by: discovered_by.into(),
            embedding: Vec::new(),
            importance: 0.5,
            created_at: Utc::now(),
            expires_at: None,
            access_count: 0,
            last_accessed_at: None,
            archived: false,
        }
    }

    pub fn personal(content: impl Into<String>, owner: impl Into<AgentId>) -> Self {
        Self::new(content, MemoryScope::Personal, owner)
    }

    pub fn task(content: impl Into<String>, by: impl Into<AgentId>, context: impl Into<ContextId>) -> Self {
        Self::new(content, MemoryScope::Task, by).with_context(context)
    }

    pub fn project(content: impl Into<String>, by: impl Into<AgentId>, context: impl Into<ContextId>) -> Self {
        Self::new(content, MemoryScope::Project, by).with_context(context)
    }

    pub fn with_context(mut self, context: impl Into<ContextId>) -> Self {
        self.context_id = Some(context.into());
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn with_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }
}

/// Parameters of one `recall` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecallQuery {
    pub query_text: String,
    pub requester: AgentId,
    /// Restrict to these scopes. `None` means every accessible scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<MemoryScope>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<ContextId>,
    pub k: usize,
    pub min_relevance: f32,
}

impl RecallQuery {
    pub fn new(query_text: impl Into<String>, requester: impl Into<AgentId>) -> Self {
        Self {
            query_text: query_text.into(),
            requester: requester.into(),
            scopes: None,
            context_id: None,
            k: 5,
            min_relevance: 0.3,
        }
    }

    pub fn in_scopes(mut self, scopes: impl Into<Vec<MemoryScope>>) -> Self {
        self.scopes = Some(scopes.into());
        self
    }

    pub fn in_context(mut self, context: impl Into<ContextId>) -> Self {
        self.context_id = Some(context.into());
        self
    }

    pub fn top(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn min_relevance(mut self, min: f32) -> Self {
        self.min_relevance = min;
        self
    }
}

/// A recalled entry with its ranking signals.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    /// Cosine similarity between the query and the entry.
    pub relevance: f32,
    /// Blend of relevance and importance used for ordering.
    pub score: f32,
}

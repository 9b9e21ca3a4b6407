//! Vector store contract and the in-process implementation

use crate::embedding::cosine_similarity;
use chrono::{DateTime, Utc};
use cortex_core::{AgentId, ContextId, MemoryEntry, MemoryScope, Result};
use dashmap::DashMap;
use std::time::Duration;

/// Predicate pushed down into a vector store.
#[derive(Clone, Debug, Default)]
pub struct MemoryFilter {
    /// Only entries of this scope. Needed when one store backs several
    /// scopes.
    pub scope: Option<MemoryScope>,
    /// Only entries discovered by this persona.
    pub owner: Option<AgentId>,
    /// Only entries attached to this context.
    pub context_id: Option<ContextId>,
    /// Hide entries already expired at this instant, unless archived or
    /// important enough to be archived by the next cleanup.
    pub live_at: Option<DateTime<Utc>>,
    pub keep_importance_above: f32,
}

impl MemoryFilter {
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if self.scope.is_some_and(|scope| entry.scope != scope) {
            return false;
        }
        if let Some(owner) = &self.owner {
            if &entry.discovered_by != owner {
                return false;
            }
        }
        if let Some(ctx) = &self.context_id {
            if entry.context_id.as_ref() != Some(ctx) {
                return false;
            }
        }
        if let Some(now) = self.live_at {
            if entry.is_expired_at(now)
                && !entry.archived
                && entry.importance <= self.keep_importance_above
            {
                return false;
            }
        }
        true
    }
}

/// Document/vector store behind one memory scope.
///
/// The memory orchestrator never reimplements search; it only composes
/// these calls.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert(&self, entry: MemoryEntry) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>>;

    async fn query(&self, filter: &MemoryFilter) -> Result<Vec<MemoryEntry>>;

    /// Up to `k` entries matching `filter`, most similar first.
    async fn similarity_search(
        &self,
        vector: &[f32],
        filter: &MemoryFilter,
        k: usize,
    ) -> Result<Vec<(MemoryEntry, f32)>>;

    async fn delete(&self, ids: &[String]) -> Result<usize>;

    async fn archive(&self, ids: &[String]) -> Result<usize>;

    /// Bump access metadata. Commutative: order of concurrent calls does not
    /// matter, and `last_accessed_at` only moves forward.
    async fn record_access(&self, ids: &[String], at: DateTime<Utc>) -> Result<()>;

    async fn len(&self) -> Result<usize>;
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: DashMap<String, MemoryEntry>,
    latency: Option<Duration>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate slow similarity search I/O.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait::async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, entry: MemoryEntry) -> Result<()> {
        self.entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>> {
        Ok(self.entries.get(id).map(|e| e.clone()))
    }

    async fn query(&self, filter: &MemoryFilter) -> Result<Vec<MemoryEntry>> {
        let mut out: Vec<MemoryEntry> = self
            .entries
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        filter: &MemoryFilter,
        k: usize,
    ) -> Result<Vec<(MemoryEntry, f32)>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut scored: Vec<(MemoryEntry, f32)> = self
            .entries
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| {
                let sim = cosine_similarity(vector, &e.value().embedding);
                (e.value().clone(), sim)
            })
            .collect();
        scored.sort_by(|(a, sa), (b, sb)| {
            sb.total_cmp(sa)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        Ok(ids.iter().filter(|id| self.entries.remove(*id).is_some()).count())
    }

    async fn archive(&self, ids: &[String]) -> Result<usize> {
        let mut archived = 0;
        for id in ids {
            if let Some(mut e) = self.entries.get_mut(id) {
                e.archived = true;
                archived += 1;
            }
        }
        Ok(archived)
    }

    async fn record_access(&self, ids: &[String], at: DateTime<Utc>) -> Result<()> {
        for id in ids {
            if let Some(mut e) = self.entries.get_mut(id) {
                e.access_count += 1;
                if e.last_accessed_at.map_or(true, |prev| at > prev) {
                    e.last_accessed_at = Some(at);
                }
            }
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}

//! MemoryStore - scoped storage and semantic recall
//!
//! One vector store per scope. `recall` fans out one similarity search per
//! accessible (scope, context) pair, merges and ranks the hits, and never
//! blocks the caller past the recall timeout.

use crate::backend::{InMemoryVectorStore, MemoryFilter, VectorStore};
use crate::cache::{RecallCache, RecallKey};
use crate::config::MemoryConfig;
use crate::embedding::{Embedder, HashingEmbedder};
use crate::participants::{MemoryNotice, ParticipantRegistry};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cortex_core::{Error, MemoryEntry, MemoryScope, RecallQuery, Result, ScoredMemory};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// What one `cleanup` pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: usize,
    pub archived: usize,
    /// Idle context memberships ended.
    pub participants_expired: usize,
}

pub struct MemoryStore {
    backends: HashMap<MemoryScope, Arc<dyn VectorStore>>,
    embedder: Arc<dyn Embedder>,
    participants: Arc<ParticipantRegistry>,
    cache: RecallCache,
    notices: broadcast::Sender<MemoryNotice>,
    config: MemoryConfig,
}

impl MemoryStore {
    /// In-process stores for every scope and the hashing embedder.
    pub fn new(config: MemoryConfig) -> Self {
        let embedder = Arc::new(HashingEmbedder::new(config.embedding_dimension));
        let mut store = Self::with_embedder(config, embedder);
        for scope in MemoryScope::ALL {
            store
                .backends
                .insert(scope, Arc::new(InMemoryVectorStore::new()));
        }
        store
    }

    /// No backends yet; attach them with [`MemoryStore::with_backend`].
    pub fn with_embedder(config: MemoryConfig, embedder: Arc<dyn Embedder>) -> Self {
        let (notices, _) = broadcast::channel(config.notice_capacity.max(1));
        Self {
            backends: HashMap::new(),
            embedder,
            participants: Arc::new(ParticipantRegistry::new()),
            cache: RecallCache::new(config.cache_ttl()),
            notices,
            config,
        }
    }

    pub fn with_backend(mut self, scope: MemoryScope, backend: Arc<dyn VectorStore>) -> Self {
        self.backends.insert(scope, backend);
        self
    }

    /// Share a participant registry with the rest of the swarm.
    pub fn with_participants(mut self, participants: Arc<ParticipantRegistry>) -> Self {
        self.participants = participants;
        self
    }

    pub fn participants(&self) -> &Arc<ParticipantRegistry> {
        &self.participants
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemoryNotice> {
        self.notices.subscribe()
    }

    fn backend(&self, scope: MemoryScope) -> Result<&Arc<dyn VectorStore>> {
        self.backends
            .get(&scope)
            .ok_or_else(|| Error::MemoryBackend(format!("no store attached for scope {}", scope)))
    }

    fn default_expiry(&self, scope: MemoryScope, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match scope {
            MemoryScope::Task => Some(created_at + ChronoDuration::days(self.config.task_ttl_days)),
            MemoryScope::Project => Some(created_at + ChronoDuration::days(self.config.project_ttl_days)),
            _ => None,
        }
    }

    // ========================================================================
    // Store
    // ========================================================================

    /// Persist an entry and return its id.
    pub async fn store(&self, mut entry: MemoryEntry) -> Result<String> {
        if entry.content.trim().is_empty() {
            return Err(Error::InvalidEntry("content is empty".into()));
        }
        if entry.scope.requires_context() && entry.context_id.is_none() {
            return Err(Error::InvalidEntry(format!(
                "{} memories need a context id",
                entry.scope
            )));
        }
        if entry.importance.is_nan() {
            return Err(Error::InvalidEntry("importance is NaN".into()));
        }
        entry.importance = entry.importance.clamp(0.0, 1.0);

        if entry.embedding.is_empty() {
            entry.embedding = self.embedder.embed(&entry.content).await?;
        }
        if entry.expires_at.is_none() {
            entry.expires_at = self.default_expiry(entry.scope, entry.created_at);
        }

        let backend = self.backend(entry.scope)?;
        let id = entry.id.clone();
        let scope = entry.scope;
        let context_id = entry.context_id.clone();
        let discovered_by = entry.discovered_by.clone();

        match tokio::time::timeout(self.config.store_timeout(), backend.insert(entry)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::MemoryBackend(format!(
                    "store exceeded {}ms",
                    self.config.store_timeout_ms
                )))
            }
        }
        debug!("Stored {} memory {} from {}", scope, id, discovered_by);

        if scope.is_shared() {
            if let Some(ctx) = &context_id {
                let recipients: Vec<_> = self
                    .participants
                    .participants(ctx)
                    .into_iter()
                    .filter(|a| a != &discovered_by)
                    .collect();
                if !recipients.is_empty() {
                    // No subscribers is fine; notices are best effort.
                    let _ = self.notices.send(MemoryNotice {
                        entry_id: id.clone(),
                        scope,
                        context_id: context_id.clone(),
                        discovered_by,
                        recipients,
                    });
                }
            }
        }

        Ok(id)
    }

    // ========================================================================
    // Recall
    // ========================================================================

    /// Scopes `query.requester` may read, restricted to `query.scopes`.
    pub fn accessible_scopes(&self, query: &RecallQuery) -> Vec<MemoryScope> {
        let requested = query.scopes.clone().unwrap_or_else(|| MemoryScope::ALL.to_vec());
        MemoryScope::ALL
            .into_iter()
            .filter(|s| requested.contains(s))
            .filter(|s| {
                if !s.requires_context() {
                    return true;
                }
                match &query.context_id {
                    Some(ctx) => self.participants.is_active(ctx, &query.requester),
                    None => !self.participants.contexts_of(&query.requester).is_empty(),
                }
            })
            .collect()
    }

    /// One filter per accessible (scope, context) pair.
    fn search_plan(&self, query: &RecallQuery, now: DateTime<Utc>) -> Vec<(MemoryScope, MemoryFilter)> {
        let mut plan = Vec::new();
        for scope in self.accessible_scopes(query) {
            let base = MemoryFilter {
                scope: Some(scope),
                live_at: Some(now),
                keep_importance_above: self.config.archive_importance_threshold,
                ..Default::default()
            };
            match scope {
                MemoryScope::Personal => plan.push((
                    scope,
                    MemoryFilter {
                        owner: Some(query.requester.clone()),
                        ..base
                    },
                )),
                MemoryScope::Task | MemoryScope::Project => {
                    let contexts = match &query.context_id {
                        Some(ctx) => vec![ctx.clone()],
                        None => self.participants.contexts_of(&query.requester),
                    };
                    for ctx in contexts {
                        plan.push((
                            scope,
                            MemoryFilter {
                                context_id: Some(ctx),
                                ..base.clone()
                            },
                        ));
                    }
                }
                MemoryScope::Team | MemoryScope::Global => plan.push((scope, base)),
            }
        }
        plan
    }

    /// Semantic recall across every scope the requester may read.
    ///
    /// Fails with [`Error::RecallTimeout`] past the configured deadline;
    /// callers that prefer silence use [`MemoryStore::recall_or_empty`].
    pub async fn recall(&self, query: &RecallQuery) -> Result<Vec<ScoredMemory>> {
        if query.k == 0 {
            return Ok(Vec::new());
        }

        let key = RecallKey::new(query, self.participants.generation());
        if let Some(candidates) = self.cache.get(&key) {
            debug!("Recall cache hit for {} ({:?})", query.requester, query.query_text);
            let hits = select(candidates, query.min_relevance, query.k);
            self.touch(&hits);
            return Ok(hits);
        }

        let timeout = self.config.recall_timeout();
        let candidates = match tokio::time::timeout(timeout, self.search(query)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Recall for {} exceeded {}ms",
                    query.requester, self.config.recall_timeout_ms
                );
                return Err(Error::RecallTimeout {
                    timeout_ms: self.config.recall_timeout_ms,
                });
            }
        };

        self.cache.put(key, candidates.clone());
        let hits = select(candidates, query.min_relevance, query.k);
        debug!("Recalled {} memories for {}", hits.len(), query.requester);
        self.touch(&hits);
        Ok(hits)
    }

    /// `recall`, degrading every failure to "no memories".
    pub async fn recall_or_empty(&self, query: &RecallQuery) -> Vec<ScoredMemory> {
        match self.recall(query).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Proceeding without memories: {}", e);
                Vec::new()
            }
        }
    }

    /// Ranked, deduplicated candidates before thresholding.
    async fn search(&self, query: &RecallQuery) -> Result<Vec<ScoredMemory>> {
        let vector = self.embedder.embed(&query.query_text).await?;
        let plan = self.search_plan(query, Utc::now());
        // Over-fetch so importance can lift an entry past a slightly more
        // similar one.
        let fetch = query.k.saturating_mul(2);

        let searches = plan.iter().map(|(scope, filter)| {
            let vector = &vector;
            async move {
                match self.backends.get(scope) {
                    Some(backend) => backend.similarity_search(vector, filter, fetch).await,
                    None => Ok(Vec::new()),
                }
            }
        });
        let results = futures::future::join_all(searches).await;

        let mut merged: HashMap<String, (MemoryEntry, f32)> = HashMap::new();
        for result in results {
            for (entry, sim) in result? {
                match merged.get(&entry.id) {
                    Some((_, prev)) if *prev >= sim => {}
                    _ => {
                        merged.insert(entry.id.clone(), (entry, sim));
                    }
                }
            }
        }

        let mut ranked: Vec<ScoredMemory> = merged
            .into_values()
            .map(|(entry, relevance)| {
                let score = self.config.rank(relevance, entry.importance);
                ScoredMemory { entry, relevance, score }
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.entry.created_at.cmp(&b.entry.created_at))
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
        Ok(ranked)
    }

    /// Record access on returned entries without blocking the caller.
    fn touch(&self, hits: &[ScoredMemory]) {
        if hits.is_empty() {
            return;
        }
        let mut by_scope: HashMap<MemoryScope, Vec<String>> = HashMap::new();
        for hit in hits {
            by_scope.entry(hit.entry.scope).or_default().push(hit.entry.id.clone());
        }
        let at = Utc::now();
        for (scope, ids) in by_scope {
            if let Some(backend) = self.backends.get(&scope) {
                let backend = Arc::clone(backend);
                tokio::spawn(async move {
                    if let Err(e) = backend.record_access(&ids, at).await {
                        warn!("Failed to record access on {} memories: {}", scope, e);
                    }
                });
            }
        }
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    pub async fn cleanup(&self) -> Result<CleanupReport> {
        self.cleanup_at(Utc::now()).await
    }

    /// Delete entries expired at `now`; archive the important ones instead.
    /// Also ends context memberships idle past `participant_idle_secs`.
    pub async fn cleanup_at(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        for (scope, backend) in &self.backends {
            let filter = MemoryFilter {
                scope: Some(*scope),
                ..Default::default()
            };
            let expired: Vec<MemoryEntry> = backend
                .query(&filter)
                .await?
                .into_iter()
                .filter(|e| e.is_expired_at(now) && !e.archived)
                .collect();
            if expired.is_empty() {
                continue;
            }

            let (keep, drop): (Vec<_>, Vec<_>) = expired
                .into_iter()
                .partition(|e| e.importance > self.config.archive_importance_threshold);
            let keep: Vec<String> = keep.into_iter().map(|e| e.id).collect();
            let drop: Vec<String> = drop.into_iter().map(|e| e.id).collect();

            report.archived += backend.archive(&keep).await?;
            report.deleted += backend.delete(&drop).await?;
            debug!("Cleanup {}: archived {}, deleted {}", scope, keep.len(), drop.len());
        }

        let max_idle = ChronoDuration::from_std(self.config.participant_idle())
            .unwrap_or_else(|_| ChronoDuration::days(36500));
        report.participants_expired = self.participants.prune_idle(now, max_idle);

        if report != CleanupReport::default() {
            self.cache.clear();
            info!(
                "Memory cleanup: deleted {}, archived {}, {} idle participants expired",
                report.deleted, report.archived, report.participants_expired
            );
        }
        Ok(report)
    }

    pub async fn get(&self, id: &str) -> Result<Option<MemoryEntry>> {
        for backend in self.backends.values() {
            if let Some(entry) = backend.get(id).await? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    pub async fn len(&self) -> Result<usize> {
        let mut total = 0;
        for backend in self.backends.values() {
            total += backend.len().await?;
        }
        Ok(total)
    }
}

/// Threshold on similarity, then keep the top `k` by rank.
fn select(candidates: Vec<ScoredMemory>, min_relevance: f32, k: usize) -> Vec<ScoredMemory> {
    candidates
        .into_iter()
        .filter(|m| m.relevance >= min_relevance)
        .take(k)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::{AgentId, ContextId};

    #[tokio::test]
    async fn task_entries_get_seven_day_expiry() {
        let store = MemoryStore::new(MemoryConfig::default());
        let entry = MemoryEntry::task("deploy plan", "ada", "T1");
        let created = entry.created_at;
        let id = store.store(entry).await.unwrap();
        let got = store.get(&id).await.unwrap().unwrap();
        assert_eq!(got.expires_at, Some(created + ChronoDuration::days(7)));
        assert!(!got.embedding.is_empty());
    }

    #[tokio::test]
    async fn personal_and_team_never_expire() {
        let store = MemoryStore::new(MemoryConfig::default());
        let a = store.store(MemoryEntry::personal("x", "ada")).await.unwrap();
        let b = store
            .store(MemoryEntry::new("y", MemoryScope::Team, "ada"))
            .await
            .unwrap();
        assert!(store.get(&a).await.unwrap().unwrap().expires_at.is_none());
        assert!(store.get(&b).await.unwrap().unwrap().expires_at.is_none());
    }

    #[test]
    fn accessible_scopes_depend_on_participation() {
        let store = MemoryStore::new(MemoryConfig::default());
        let q = RecallQuery::new("q", "bob").in_context("T1");
        assert_eq!(
            store.accessible_scopes(&q),
            vec![MemoryScope::Personal, MemoryScope::Team, MemoryScope::Global]
        );

        store
            .participants()
            .join(&ContextId::new("T1"), &AgentId::new("bob"));
        assert_eq!(store.accessible_scopes(&q).len(), 5);
    }

    #[test]
    fn select_thresholds_then_truncates() {
        let mk = |rel: f32| ScoredMemory {
            entry: MemoryEntry::personal("x", "a"),
            relevance: rel,
            score: rel,
        };
        let out = select(vec![mk(0.9), mk(0.2), mk(0.5), mk(0.4)], 0.3, 2);
        let rels: Vec<f32> = out.iter().map(|m| m.relevance).collect();
        assert_eq!(rels, vec![0.9, 0.5]);
    }
}

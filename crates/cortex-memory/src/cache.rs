//! Short-lived recall result cache

use cortex_core::{AgentId, ContextId, MemoryScope, RecallQuery, ScoredMemory};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Identity of a recall for caching purposes.
///
/// `min_relevance` is deliberately not part of the key: two recalls that
/// differ only by threshold share an entry. `participation` is the
/// participant registry generation the result was computed under, so a
/// join or leave never serves a stale visibility decision.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecallKey {
    pub requester: AgentId,
    pub query_text: String,
    pub scopes: Option<Vec<MemoryScope>>,
    pub context_id: Option<ContextId>,
    pub k: usize,
    pub participation: u64,
}

impl RecallKey {
    pub fn new(q: &RecallQuery, participation: u64) -> Self {
        let scopes = q.scopes.as_ref().map(|s| {
            let mut s = s.clone();
            s.sort();
            s.dedup();
            s
        });
        Self {
            requester: q.requester.clone(),
            query_text: q.query_text.clone(),
            scopes,
            context_id: q.context_id.clone(),
            k: q.k,
            participation,
        }
    }
}

/// TTL cache keyed by [`RecallKey`]. Uses tokio's clock so paused-time tests
/// can step past the TTL.
pub struct RecallCache {
    ttl: Duration,
    entries: Mutex<HashMap<RecallKey, (Instant, Vec<ScoredMemory>)>>,
}

impl RecallCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &RecallKey) -> Option<Vec<ScoredMemory>> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((at, hits)) if at.elapsed() < self.ttl => Some(hits.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: RecallKey, hits: Vec<ScoredMemory>) {
        if self.ttl.is_zero() {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            let ttl = self.ttl;
            entries.retain(|_, (at, _)| at.elapsed() < ttl);
            entries.insert(key, (Instant::now(), hits));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_min_relevance_and_scope_order() {
        let a = RecallQuery::new("q", "ada")
            .in_scopes(vec![MemoryScope::Team, MemoryScope::Personal])
            .min_relevance(0.1);
        let b = RecallQuery::new("q", "ada")
            .in_scopes(vec![MemoryScope::Personal, MemoryScope::Team])
            .min_relevance(0.9);
        assert_eq!(RecallKey::new(&a, 0), RecallKey::new(&b, 0));
        assert_ne!(RecallKey::new(&a, 0), RecallKey::new(&a.clone().top(3), 0));
    }

    #[test]
    fn key_tracks_participation_generation() {
        let q = RecallQuery::new("q", "ada").in_context("T1");
        assert_ne!(RecallKey::new(&q, 1), RecallKey::new(&q, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = RecallCache::new(Duration::from_secs(60));
        let key = RecallKey::new(&RecallQuery::new("q", "ada"), 0);
        cache.put(key.clone(), Vec::new());
        assert!(cache.get(&key).is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }
}

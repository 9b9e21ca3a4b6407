//! Tests for cortex-memory: scope isolation, recall ranking and caching, expiry

use chrono::{Duration as ChronoDuration, Utc};
use cortex_core::{AgentId, ContextId, Error, MemoryEntry, MemoryScope, RecallQuery};
use cortex_memory::*;
use std::sync::Arc;
use std::time::Duration;

fn store() -> MemoryStore {
    MemoryStore::new(MemoryConfig::default())
}

fn join(store: &MemoryStore, ctx: &str, agent: &str) {
    store
        .participants()
        .join(&ContextId::new(ctx), &AgentId::new(agent));
}

fn ids(hits: &[cortex_core::ScoredMemory]) -> Vec<String> {
    hits.iter().map(|h| h.entry.id.clone()).collect()
}

// ===========================================================================
// Scope isolation
// ===========================================================================

#[tokio::test]
async fn personal_entries_never_leak_to_other_agents() {
    let store = store();
    store
        .store(MemoryEntry::personal("my private deploy notes for the auth service", "ada"))
        .await
        .unwrap();

    let own = store
        .recall(&RecallQuery::new("auth service deploy notes", "ada"))
        .await
        .unwrap();
    assert_eq!(own.len(), 1);

    let other = store
        .recall(&RecallQuery::new("auth service deploy notes", "bob").min_relevance(0.0))
        .await
        .unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn task_recall_requires_active_participation() {
    let store = store();
    join(&store, "T1", "ada");
    store
        .store(MemoryEntry::task(
            "found the auth bug on line 423 of session handling",
            "ada",
            "T1",
        ))
        .await
        .unwrap();

    let query = RecallQuery::new("auth bug line 423", "bob")
        .in_scopes(vec![MemoryScope::Task])
        .in_context("T1")
        .top(5);

    let outsider = store.recall(&query).await.unwrap();
    assert!(outsider.is_empty());

    join(&store, "T1", "bob");
    let member = store.recall(&query).await.unwrap();
    assert_eq!(member.len(), 1);
    assert!(member[0].relevance >= 0.3);
    assert_eq!(member[0].entry.discovered_by, AgentId::new("ada"));
}

#[tokio::test]
async fn leaving_a_context_revokes_cached_task_access() {
    let store = store();
    store
        .store(MemoryEntry::task("payment webhook retries twice", "ada", "T1"))
        .await
        .unwrap();
    join(&store, "T1", "bob");
    let query = RecallQuery::new("payment webhook retries", "bob")
        .in_scopes(vec![MemoryScope::Task])
        .in_context("T1");
    assert_eq!(store.recall(&query).await.unwrap().len(), 1);

    store
        .participants()
        .leave(&ContextId::new("T1"), &AgentId::new("bob"));
    assert!(store.recall(&query).await.unwrap().is_empty());
}

#[tokio::test]
async fn one_backend_shared_by_every_scope_keeps_scopes_apart() {
    let config = MemoryConfig::default();
    let embedder = Arc::new(HashingEmbedder::new(config.embedding_dimension));
    let shared: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let mut store = MemoryStore::with_embedder(config, embedder);
    for scope in MemoryScope::ALL {
        store = store.with_backend(scope, Arc::clone(&shared));
    }

    store
        .store(MemoryEntry::personal("ada keeps the vault unseal key offline", "ada"))
        .await
        .unwrap();
    store
        .store(MemoryEntry::task("vault unseal runbook draft", "ada", "T1"))
        .await
        .unwrap();

    let bob = store
        .recall(&RecallQuery::new("vault unseal key", "bob").min_relevance(0.0))
        .await
        .unwrap();
    assert!(bob.is_empty());

    let ada = store
        .recall(&RecallQuery::new("vault unseal key", "ada").min_relevance(0.0))
        .await
        .unwrap();
    assert_eq!(ada.len(), 1);
    assert_eq!(ada[0].entry.scope, MemoryScope::Personal);
}

#[tokio::test]
async fn team_entries_are_visible_to_everyone() {
    let store = store();
    store
        .store(MemoryEntry::new("release freeze starts friday", MemoryScope::Team, "ada"))
        .await
        .unwrap();
    let hits = store
        .recall(&RecallQuery::new("release freeze friday", "zed"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

// ===========================================================================
// Ranking
// ===========================================================================

#[tokio::test]
async fn importance_breaks_similarity_ties() {
    let store = store();
    let now = Utc::now();
    let low = MemoryEntry::new("database migration rollback", MemoryScope::Global, "ada")
        .with_importance(0.1)
        .with_created_at(now - ChronoDuration::minutes(2));
    let high = MemoryEntry::new("database migration rollback", MemoryScope::Global, "bob")
        .with_importance(0.9)
        .with_created_at(now - ChronoDuration::minutes(1));
    let high_id = high.id.clone();
    store.store(low).await.unwrap();
    store.store(high).await.unwrap();

    let hits = store
        .recall(&RecallQuery::new("database migration rollback", "cy"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].entry.id, high_id);
    assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn identical_scores_fall_back_to_creation_order() {
    let store = store();
    let now = Utc::now();
    let older = MemoryEntry::new("cache warmup job", MemoryScope::Global, "ada")
        .with_created_at(now - ChronoDuration::hours(2));
    let newer = MemoryEntry::new("cache warmup job", MemoryScope::Global, "bob")
        .with_created_at(now - ChronoDuration::hours(1));
    let older_id = older.id.clone();
    store.store(newer).await.unwrap();
    store.store(older).await.unwrap();

    let hits = store
        .recall(&RecallQuery::new("cache warmup job", "cy"))
        .await
        .unwrap();
    assert_eq!(hits[0].entry.id, older_id);
}

#[tokio::test]
async fn min_relevance_and_k_bound_results() {
    let store = store();
    for i in 0..6 {
        store
            .store(MemoryEntry::new(
                format!("kubernetes pod restart loop {}", i),
                MemoryScope::Global,
                "ada",
            ))
            .await
            .unwrap();
    }
    store
        .store(MemoryEntry::new("weekend hiking trip photos", MemoryScope::Global, "ada"))
        .await
        .unwrap();

    let hits = store
        .recall(&RecallQuery::new("kubernetes pod restart loop", "bob").top(3))
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.relevance >= 0.3));
    assert!(hits.iter().all(|h| !h.entry.content.contains("hiking")));
}

#[tokio::test]
async fn zero_k_returns_nothing() {
    let store = store();
    store
        .store(MemoryEntry::new("anything", MemoryScope::Global, "ada"))
        .await
        .unwrap();
    let hits = store
        .recall(&RecallQuery::new("anything", "ada").top(0))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn entry_reachable_from_two_searches_is_returned_once() {
    // Task and project share one backend, so the same entry surfaces twice.
    let backend = Arc::new(InMemoryVectorStore::new());
    let store = MemoryStore::with_embedder(MemoryConfig::default(), Arc::new(HashingEmbedder::default()))
        .with_backend(MemoryScope::Task, backend.clone())
        .with_backend(MemoryScope::Project, backend);
    join(&store, "T1", "ada");
    let id = store
        .store(MemoryEntry::task("flaky login test", "bob", "T1"))
        .await
        .unwrap();

    let hits = store
        .recall(&RecallQuery::new("flaky login test", "ada").in_context("T1"))
        .await
        .unwrap();
    assert_eq!(ids(&hits), vec![id]);
}

// ===========================================================================
// Caching and access metadata
// ===========================================================================

#[tokio::test]
async fn identical_recalls_within_ttl_match() {
    let store = store();
    for text in ["redis eviction policy", "redis memory limit", "redis cluster failover"] {
        store
            .store(MemoryEntry::new(text, MemoryScope::Global, "ada"))
            .await
            .unwrap();
    }
    let query = RecallQuery::new("redis eviction memory", "bob").min_relevance(0.1);
    let first = store.recall(&query).await.unwrap();

    // A new entry does not disturb results still served from cache.
    store
        .store(MemoryEntry::new("redis eviction memory", MemoryScope::Global, "cy"))
        .await
        .unwrap();
    let second = store.recall(&query).await.unwrap();

    assert!(!first.is_empty());
    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test(start_paused = true)]
async fn cache_expires_after_ttl() {
    let store = store();
    let query = RecallQuery::new("incident postmortem", "bob");
    assert!(store.recall(&query).await.unwrap().is_empty());

    store
        .store(MemoryEntry::new("incident postmortem draft", MemoryScope::Global, "ada"))
        .await
        .unwrap();
    assert!(store.recall(&query).await.unwrap().is_empty());

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(store.recall(&query).await.unwrap().len(), 1);
}

#[tokio::test]
async fn recall_bumps_access_count_in_background() {
    let store = store();
    let id = store
        .store(MemoryEntry::new("grafana dashboard link", MemoryScope::Global, "ada"))
        .await
        .unwrap();
    store
        .recall(&RecallQuery::new("grafana dashboard", "bob"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let entry = store.get(&id).await.unwrap().unwrap();
    assert_eq!(entry.access_count, 1);
    assert!(entry.last_accessed_at.is_some());
}

// ===========================================================================
// Timeouts
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn slow_backend_times_out_and_degrades() {
    let slow: Arc<dyn VectorStore> =
        Arc::new(InMemoryVectorStore::new().with_latency(Duration::from_secs(2)));
    let store = MemoryStore::with_embedder(MemoryConfig::default(), Arc::new(HashingEmbedder::default()))
        .with_backend(MemoryScope::Global, slow);
    store
        .store(MemoryEntry::new("slow storage", MemoryScope::Global, "ada"))
        .await
        .unwrap();

    let query = RecallQuery::new("slow storage", "ada");
    let err = store.recall(&query).await.unwrap_err();
    assert!(matches!(err, Error::RecallTimeout { timeout_ms: 500 }));
    assert!(store.recall_or_empty(&query).await.is_empty());
}

// ===========================================================================
// Expiry and cleanup
// ===========================================================================

#[tokio::test]
async fn expired_task_entry_is_hidden_unless_important() {
    let store = store();
    join(&store, "T1", "ada");
    let eight_days_ago = Utc::now() - ChronoDuration::days(8);

    store
        .store(
            MemoryEntry::task("stale staging credentials rotation", "ada", "T1")
                .with_importance(0.4)
                .with_created_at(eight_days_ago),
        )
        .await
        .unwrap();
    let hits = store
        .recall(&RecallQuery::new("staging credentials rotation", "ada").in_context("T1"))
        .await
        .unwrap();
    assert!(hits.is_empty());

    store
        .store(
            MemoryEntry::task("critical staging credentials rotation", "ada", "T1")
                .with_importance(0.9)
                .with_created_at(eight_days_ago),
        )
        .await
        .unwrap();
    let hits = store
        .recall(
            &RecallQuery::new("staging credentials rotation", "ada")
                .in_context("T1")
                .top(4),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].entry.importance > 0.8);
}

#[tokio::test]
async fn cleanup_archives_important_and_deletes_the_rest() {
    let store = store();
    let now = Utc::now();
    let project = MemoryEntry::project("api versioning decision", "ada", "P1")
        .with_importance(0.95)
        .with_created_at(now - ChronoDuration::days(91));
    let task = MemoryEntry::task("temporary debug flag", "ada", "T1")
        .with_importance(0.4)
        .with_created_at(now - ChronoDuration::days(8));
    let fresh = MemoryEntry::task("current sprint goal", "ada", "T1");
    let project_id = store.store(project).await.unwrap();
    let task_id = store.store(task).await.unwrap();
    let fresh_id = store.store(fresh).await.unwrap();

    let report = store.cleanup().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.archived, 1);

    let archived = store.get(&project_id).await.unwrap().unwrap();
    assert!(archived.archived);
    assert!(store.get(&task_id).await.unwrap().is_none());
    assert!(store.get(&fresh_id).await.unwrap().is_some());

    // Second pass has nothing left to do.
    assert_eq!(store.cleanup().await.unwrap(), CleanupReport::default());
}

#[tokio::test]
async fn cleanup_at_uses_the_given_clock() {
    let store = store();
    let id = store
        .store(MemoryEntry::task("retro notes", "ada", "T1").with_importance(0.2))
        .await
        .unwrap();

    let report = store.cleanup_at(Utc::now() + ChronoDuration::days(6)).await.unwrap();
    assert_eq!(report.deleted, 0);
    let report = store.cleanup_at(Utc::now() + ChronoDuration::days(8)).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(store.get(&id).await.unwrap().is_none());
    assert_eq!(store.len().await.unwrap(), 0);
}

#[tokio::test]
async fn cleanup_expires_idle_participants() {
    let store = store();
    join(&store, "T1", "bob");
    store
        .store(MemoryEntry::task("canary rollout at ten percent", "ada", "T1"))
        .await
        .unwrap();

    let report = store.cleanup_at(Utc::now() + ChronoDuration::minutes(30)).await.unwrap();
    assert_eq!(report.participants_expired, 0);

    let report = store.cleanup_at(Utc::now() + ChronoDuration::hours(2)).await.unwrap();
    assert_eq!(report.participants_expired, 1);
    assert!(!store
        .participants()
        .is_active(&ContextId::new("T1"), &AgentId::new("bob")));
    let hits = store
        .recall(&RecallQuery::new("canary rollout", "bob").in_context("T1"))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

// ===========================================================================
// Validation and notices
// ===========================================================================

#[tokio::test]
async fn task_entry_without_context_is_rejected() {
    let store = store();
    let err = store
        .store(MemoryEntry::new("orphan", MemoryScope::Task, "ada"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidEntry(_)));

    let err = store
        .store(MemoryEntry::new("   ", MemoryScope::Global, "ada"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidEntry(_)));
}

#[tokio::test]
async fn shared_store_notifies_other_participants() {
    let store = store();
    join(&store, "T1", "ada");
    join(&store, "T1", "bob");
    join(&store, "T1", "cy");
    let mut notices = store.subscribe();

    let id = store
        .store(MemoryEntry::task("root cause is a race in the scheduler", "ada", "T1"))
        .await
        .unwrap();
    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.entry_id, id);
    assert_eq!(notice.scope, MemoryScope::Task);
    assert!(notice.is_for(&AgentId::new("bob")));
    assert!(notice.is_for(&AgentId::new("cy")));
    assert!(!notice.is_for(&AgentId::new("ada")));

    store
        .store(MemoryEntry::personal("note to self", "ada"))
        .await
        .unwrap();
    assert!(notices.try_recv().is_err());
}

//! Memory tuning parameters

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[memory]` section of the cortex config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Recall deadline. Past it the caller proceeds with no memories.
    pub recall_timeout_ms: u64,
    /// Store deadline.
    pub store_timeout_ms: u64,
    /// How long identical recalls are served from cache.
    pub cache_ttl_secs: u64,
    /// Default lifetime of task memories.
    pub task_ttl_days: i64,
    /// Default lifetime of project memories.
    pub project_ttl_days: i64,
    /// Expired entries above this importance are archived, not deleted.
    pub archive_importance_threshold: f32,
    /// Ranking weight of query similarity.
    pub similarity_weight: f32,
    /// Ranking weight of stored importance.
    pub importance_weight: f32,
    /// Buffered memory notices per subscriber.
    pub notice_capacity: usize,
    pub embedding_dimension: usize,
    /// A participant not seen in a context for this long stops being one
    /// at the next cleanup.
    pub participant_idle_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recall_timeout_ms: 500,
            store_timeout_ms: 2000,
            cache_ttl_secs: 60,
            task_ttl_days: 7,
            project_ttl_days: 90,
            archive_importance_threshold: 0.8,
            similarity_weight: 0.7,
            importance_weight: 0.3,
            notice_capacity: 256,
            embedding_dimension: 256,
            participant_idle_secs: 3600,
        }
    }
}

impl MemoryConfig {
    pub fn recall_timeout(&self) -> Duration {
        Duration::from_millis(self.recall_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn participant_idle(&self) -> Duration {
        Duration::from_secs(self.participant_idle_secs)
    }

    /// Blend similarity and importance into a ranking score.
    pub fn rank(&self, similarity: f32, importance: f32) -> f32 {
        self.similarity_weight * similarity + self.importance_weight * importance
    }
}

//! Cortex configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use cortex_core::{Error, Result};
use cortex_llm::tier::default_tiers;
use cortex_llm::{TierLadder, TierSpec};
use cortex_memory::MemoryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration shared by every persona in a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CortexConfig {
    /// Energy model and cadence.
    pub agent: EnergyConfig,
    pub inbox: InboxConfig,
    /// Turn arbitration windows.
    pub arbitration: ArbitrationConfig,
    pub complexity: ComplexityConfig,
    /// Progressive upgrade scoring.
    pub scorer: ScorerConfig,
    pub memory: MemoryConfig,
    /// Per-cycle knobs (recall depth, memorize threshold).
    pub cycle: CycleConfig,
    /// Ordered generation tiers, cheapest first.
    pub tiers: Vec<TierSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    /// Energy drained per second of active processing.
    pub drain_per_active_sec: f64,
    /// Energy drained per unit of generation/recall cost.
    pub drain_per_cost: f64,
    /// Energy restored per second of rest.
    pub recovery_per_rest_sec: f64,
    /// Attention drained per unit of cost.
    pub attention_drain_per_cost: f64,
    /// Attention restored per second of rest.
    pub attention_recovery_per_rest_sec: f64,
    /// Below this energy nothing is engaged, whatever the priority.
    pub min_engage_energy: f64,
    /// Cadence at full energy.
    pub cadence_min_ms: u64,
    /// Cadence at zero energy.
    pub cadence_max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboxConfig {
    /// Messages older than this are dropped unanswered.
    pub message_ttl_secs: u64,
    /// Arrival channel capacity.
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    pub min_window_ms: u64,
    pub max_window_ms: u64,
    /// Window of the first round in a context.
    pub initial_window_ms: u64,
    /// EWMA factor applied to each observed round latency (0 - 1).
    pub smoothing: f64,
    /// Window = smoothed latency x headroom, then clamped.
    pub headroom: f64,
    /// Extra wait past the window before a missing decision counts as denial.
    pub decision_grace_ms: u64,
    /// Decisions kept per context.
    pub history_len: usize,
    /// Buffered decisions per subscriber.
    pub channel_capacity: usize,
    /// Quiet contexts are forgotten after this long; their next round
    /// starts over at 1 with the initial window.
    pub idle_context_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityConfig {
    pub length_weight: f64,
    pub code_weight: f64,
    pub technical_weight: f64,
    pub interrogative_weight: f64,
    pub sentence_weight: f64,
    /// Characters at which the length feature saturates.
    pub length_saturation_chars: usize,
    /// Technical terms at which that feature saturates.
    pub technical_saturation: usize,
    pub interrogative_saturation: usize,
    pub sentence_saturation: usize,
    /// Scores below this are low.
    pub low_threshold: f64,
    /// Scores below this (and not low) are medium.
    pub high_threshold: f64,
    /// Terms counted in addition to the built-in vocabulary.
    pub extra_terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Tokens per scored window.
    pub window_tokens: usize,
    /// Weighted hits needed in one window.
    pub hit_threshold: f64,
    /// confidence = min(1, weighted hits / divisor)
    pub confidence_divisor: f64,
    pub confidence_floor: f64,
    pub uncertainty_weight: f64,
    pub self_correction_weight: f64,
    pub hedging_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Recall depth when energy is at or above `recall_energy_split`.
    pub recall_k_high: usize,
    pub recall_k_low: usize,
    pub recall_energy_split: f64,
    pub min_relevance: f32,
    /// Granted exchanges at or above this importance are memorized.
    pub memorize_importance_threshold: f32,
    /// Token budget of the per-context transcript fed into prompts.
    pub recent_context_tokens: usize,
    /// Cost charged per recalled memory.
    pub recall_cost_per_memory: f64,
    /// Buffered cycle events per subscriber.
    pub event_capacity: usize,
}

// ============================================================
// Defaults
// ============================================================

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            agent: EnergyConfig::default(),
            inbox: InboxConfig::default(),
            arbitration: ArbitrationConfig::default(),
            complexity: ComplexityConfig::default(),
            scorer: ScorerConfig::default(),
            memory: MemoryConfig::default(),
            cycle: CycleConfig::default(),
            tiers: default_tiers(),
        }
    }
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            drain_per_active_sec: 0.005,
            drain_per_cost: 0.02,
            recovery_per_rest_sec: 0.01,
            attention_drain_per_cost: 0.03,
            attention_recovery_per_rest_sec: 0.02,
            min_engage_energy: 0.05,
            cadence_min_ms: 3000,
            cadence_max_ms: 10000,
        }
    }
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            message_ttl_secs: 3600,
            channel_capacity: 1024,
        }
    }
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            min_window_ms: 10_000,
            max_window_ms: 20_000,
            initial_window_ms: 10_000,
            smoothing: 0.3,
            headroom: 1.5,
            decision_grace_ms: 5_000,
            history_len: 32,
            channel_capacity: 256,
            idle_context_secs: 3600,
        }
    }
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            length_weight: 0.2,
            code_weight: 0.3,
            technical_weight: 0.25,
            interrogative_weight: 0.1,
            sentence_weight: 0.15,
            length_saturation_chars: 600,
            technical_saturation: 4,
            interrogative_saturation: 2,
            sentence_saturation: 6,
            low_threshold: 0.3,
            high_threshold: 0.7,
            extra_terms: Vec::new(),
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            window_tokens: 200,
            hit_threshold: 3.0,
            confidence_divisor: 4.0,
            confidence_floor: 0.6,
            uncertainty_weight: 1.0,
            self_correction_weight: 1.0,
            hedging_weight: 1.0,
        }
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            recall_k_high: 10,
            recall_k_low: 5,
            recall_energy_split: 0.5,
            min_relevance: 0.3,
            memorize_importance_threshold: 0.5,
            recent_context_tokens: 4000,
            recall_cost_per_memory: 0.05,
            event_capacity: 256,
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl CortexConfig {
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// The validated tier ladder.
    pub fn ladder(&self) -> Result<TierLadder> {
        TierLadder::new(self.tiers.clone())
    }
}

impl InboxConfig {
    pub fn message_ttl(&self) -> Duration {
        Duration::from_secs(self.message_ttl_secs)
    }
}

impl ArbitrationConfig {
    pub fn min_window(&self) -> Duration {
        Duration::from_millis(self.min_window_ms)
    }

    pub fn max_window(&self) -> Duration {
        Duration::from_millis(self.max_window_ms.max(self.min_window_ms))
    }

    pub fn decision_grace(&self) -> Duration {
        Duration::from_millis(self.decision_grace_ms)
    }

    pub fn idle_context(&self) -> Duration {
        Duration::from_secs(self.idle_context_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_roundtrip_through_toml() {
        let config = CortexConfig::default();
        let text = config.to_toml();
        assert!(text.contains("[arbitration]"));
        assert!(text.contains("[[tiers]]"));
        let back = CortexConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.tiers.len(), 3);
        assert_eq!(back.scorer.window_tokens, 200);
        assert_eq!(back.memory.recall_timeout_ms, 500);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = CortexConfig::from_toml_str("[cycle]\nrecall_k_high = 12\n").unwrap();
        assert_eq!(config.cycle.recall_k_high, 12);
        assert_eq!(config.cycle.recall_k_low, 5);
        assert_eq!(config.arbitration.min_window_ms, 10_000);
    }

    #[test]
    fn unsorted_tiers_fail_validation() {
        let mut config = CortexConfig::default();
        config.tiers.reverse();
        assert!(config.ladder().is_err());
    }
}

//! AgentState - energy, attention, mood and cadence of one persona
//!
//! Energy only drains while working and only recovers while resting. Mood
//! and cadence are derived from energy after every update.

use crate::config::EnergyConfig;
use chrono::{DateTime, Utc};
use cortex_core::{clamp_unit, AgentId, InboxMessage};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Idle,
    Active,
    Tired,
    Overwhelmed,
}

impl Mood {
    /// <0.2 overwhelmed, <0.4 tired, <0.7 active, else idle.
    pub fn from_energy(energy: f64) -> Self {
        if energy < 0.2 {
            Mood::Overwhelmed
        } else if energy < 0.4 {
            Mood::Tired
        } else if energy < 0.7 {
            Mood::Active
        } else {
            Mood::Idle
        }
    }

    /// Minimum message priority this mood will act on.
    pub fn engagement_floor(self) -> f64 {
        match self {
            Mood::Idle => 0.1,
            Mood::Active => 0.3,
            Mood::Tired => 0.6,
            Mood::Overwhelmed => 0.85,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mood::Idle => "idle",
            Mood::Active => "active",
            Mood::Tired => "tired",
            Mood::Overwhelmed => "overwhelmed",
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owned, serializable copy of the state at one instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub agent_id: AgentId,
    pub energy: f64,
    pub attention: f64,
    pub mood: Mood,
    pub cadence_ms: u64,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub duty_cycle: f64,
}

#[derive(Clone, Debug)]
pub struct AgentState {
    agent_id: AgentId,
    energy: f64,
    attention: f64,
    mood: Mood,
    cadence_ms: u64,
    last_activity_at: Option<DateTime<Utc>>,
    active: Duration,
    resting: Duration,
    config: EnergyConfig,
}

impl AgentState {
    /// Fully rested.
    pub fn new(agent_id: impl Into<AgentId>, config: EnergyConfig) -> Self {
        let mut state = Self {
            agent_id: agent_id.into(),
            energy: 1.0,
            attention: 1.0,
            mood: Mood::Idle,
            cadence_ms: config.cadence_min_ms,
            last_activity_at: None,
            active: Duration::ZERO,
            resting: Duration::ZERO,
            config,
        };
        state.recompute();
        state
    }

    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = clamp_unit(energy);
        self.recompute();
        self
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn attention(&self) -> f64 {
        self.attention
    }

    pub fn mood(&self) -> Mood {
        self.mood
    }

    pub fn cadence_ms(&self) -> u64 {
        self.cadence_ms
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        self.last_activity_at
    }

    /// Engage iff there is energy left at all and the message clears the
    /// current mood's priority floor.
    pub fn should_engage(&self, msg: &InboxMessage) -> bool {
        self.energy >= self.config.min_engage_energy && msg.priority >= self.mood.engagement_floor()
    }

    /// Charge one processing burst. `cost` covers tier-weighted generation
    /// and recalled context; negative values are ignored.
    pub fn record_activity(&mut self, duration: Duration, cost: f64) {
        let cost = if cost.is_finite() { cost.max(0.0) } else { 0.0 };
        let drain = self.config.drain_per_active_sec * duration.as_secs_f64()
            + self.config.drain_per_cost * cost;
        self.energy = clamp_unit(self.energy - drain.max(0.0));
        self.attention = clamp_unit(self.attention - self.config.attention_drain_per_cost * cost);
        self.active += duration;
        self.last_activity_at = Some(Utc::now());
        self.recompute();
    }

    /// Restore energy in proportion to idle time, capped at 1.0.
    pub fn rest(&mut self, duration: Duration) {
        let secs = duration.as_secs_f64();
        self.energy = clamp_unit(self.energy + self.config.recovery_per_rest_sec * secs);
        self.attention = clamp_unit(self.attention + self.config.attention_recovery_per_rest_sec * secs);
        self.resting += duration;
        self.recompute();
    }

    /// Fraction of accounted time spent working.
    pub fn duty_cycle(&self) -> f64 {
        let total = (self.active + self.resting).as_secs_f64();
        if total == 0.0 {
            0.0
        } else {
            self.active.as_secs_f64() / total
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            agent_id: self.agent_id.clone(),
            energy: self.energy,
            attention: self.attention,
            mood: self.mood,
            cadence_ms: self.cadence_ms,
            last_activity_at: self.last_activity_at,
            duty_cycle: self.duty_cycle(),
        }
    }

    fn recompute(&mut self) {
        self.mood = Mood::from_energy(self.energy);
        let min = self.config.cadence_min_ms as f64;
        let max = self.config.cadence_max_ms.max(self.config.cadence_min_ms) as f64;
        self.cadence_ms = (min + (max - min) * (1.0 - self.energy)).round() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mood_boundaries() {
        assert_eq!(Mood::from_energy(0.19), Mood::Overwhelmed);
        assert_eq!(Mood::from_energy(0.2), Mood::Tired);
        assert_eq!(Mood::from_energy(0.4), Mood::Active);
        assert_eq!(Mood::from_energy(0.7), Mood::Idle);
    }

    #[test]
    fn cadence_spans_configured_range() {
        let fresh = AgentState::new("a", EnergyConfig::default());
        assert_eq!(fresh.cadence_ms(), 3000);
        let drained = fresh.with_energy(0.0);
        assert_eq!(drained.cadence_ms(), 10000);
    }

    #[test]
    fn duty_cycle_tracks_active_share() {
        let mut s = AgentState::new("a", EnergyConfig::default());
        assert_eq!(s.duty_cycle(), 0.0);
        s.record_activity(Duration::from_secs(6), 0.0);
        s.rest(Duration::from_secs(4));
        assert!((s.duty_cycle() - 0.6).abs() < 1e-9);
    }
}

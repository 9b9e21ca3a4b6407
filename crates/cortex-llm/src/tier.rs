//! Ordered tier ladder (cheapest -> most capable)

use cortex_core::{Error, Result, Tier};
use serde::{Deserialize, Serialize};

/// One rung of the ladder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    pub name: String,
    pub model: String,
    /// Relative cost per 1k generated tokens.
    pub cost_weight: f64,
    pub max_tokens: u32,
}

impl TierSpec {
    pub fn new(name: impl Into<String>, model: impl Into<String>, cost_weight: f64, max_tokens: u32) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            cost_weight,
            max_tokens,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TierLadder {
    tiers: Vec<TierSpec>,
}

impl Default for TierLadder {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
        }
    }
}

pub fn default_tiers() -> Vec<TierSpec> {
    vec![
        TierSpec::new("fast", "fast-small", 1.0, 1024),
        TierSpec::new("balanced", "balanced-medium", 3.0, 2048),
        TierSpec::new("deep", "deep-large", 10.0, 4096),
    ]
}

impl TierLadder {
    /// Build a ladder. Rungs must be non-empty and non-decreasing in cost,
    /// so that a higher index is never a cheaper (less capable) tier.
    pub fn new(tiers: Vec<TierSpec>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(Error::ConfigError("tier ladder is empty".into()));
        }
        for pair in tiers.windows(2) {
            if pair[1].cost_weight < pair[0].cost_weight {
                return Err(Error::ConfigError(format!(
                    "tier {} is cheaper than tier {} below it",
                    pair[1].name, pair[0].name
                )));
            }
        }
        Ok(Self { tiers })
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn top(&self) -> Tier {
        Tier(self.tiers.len() - 1)
    }

    /// Pull an out-of-range tier down to the most capable rung.
    pub fn clamp(&self, tier: Tier) -> Tier {
        Tier(tier.0.min(self.tiers.len() - 1))
    }

    pub fn get(&self, tier: Tier) -> Option<&TierSpec> {
        self.tiers.get(tier.0)
    }

    /// Spec for `tier`, clamped into the ladder.
    pub fn spec(&self, tier: Tier) -> &TierSpec {
        &self.tiers[self.clamp(tier).0]
    }

    /// The next strictly more capable tier, if any.
    pub fn next_above(&self, tier: Tier) -> Option<Tier> {
        let next = Tier(tier.0 + 1);
        (next.0 < self.tiers.len()).then_some(next)
    }

    /// Where `tier` sits between cheapest (0.0) and top (1.0).
    pub fn capability_fraction(&self, tier: Tier) -> f64 {
        if self.tiers.len() <= 1 {
            return 1.0;
        }
        self.clamp(tier).0 as f64 / (self.tiers.len() - 1) as f64
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tier, &TierSpec)> {
        self.tiers.iter().enumerate().map(|(i, s)| (Tier(i), s))
    }

    pub fn specs(&self) -> &[TierSpec] {
        &self.tiers
    }
}

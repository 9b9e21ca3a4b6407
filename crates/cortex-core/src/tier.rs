//! Generation tiers and complexity levels

use serde::{Deserialize, Serialize};

/// Position in the ordered tier ladder. `Tier(0)` is the cheapest;
/// larger indices are strictly more capable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tier(pub usize);

impl Tier {
    pub const CHEAPEST: Tier = Tier(0);

    pub fn index(self) -> usize {
        self.0
    }

    pub fn is_more_capable_than(self, other: Tier) -> bool {
        self.0 > other.0
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier{}", self.0)
    }
}

/// Coarse complexity bucket for an incoming message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

impl ComplexityLevel {
    /// low -> tier0, medium -> tier1, high -> tier2
    pub fn start_tier(self) -> Tier {
        match self {
            ComplexityLevel::Low => Tier(0),
            ComplexityLevel::Medium => Tier(1),
            ComplexityLevel::High => Tier(2),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComplexityLevel::Low => "low",
            ComplexityLevel::Medium => "medium",
            ComplexityLevel::High => "high",
        }
    }
}

/// Derived classification of a message. Not persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplexityAssessment {
    pub level: ComplexityLevel,
    /// Weighted feature score in [0, 1].
    pub score: f64,
    pub suggested_start_tier: Tier,
}

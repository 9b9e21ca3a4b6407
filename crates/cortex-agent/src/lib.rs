//! Cortex Agent - Self-paced personas that decide, recall, generate, and take turns

pub mod complexity;
pub mod config;
pub mod context;
pub mod cycle;
pub mod generation;
pub mod inbox;
pub mod progressive;
pub mod prompt;
pub mod sink;
pub mod state;
pub mod turn;

pub use complexity::{ComplexityAssessor, ComplexityFeatures};
pub use config::{
    ArbitrationConfig, ComplexityConfig, CortexConfig, CycleConfig, EnergyConfig, InboxConfig,
    ScorerConfig,
};
pub use context::RecentContext;
pub use cycle::{
    broadcast_confidence, CognitiveCycle, CycleDeps, CycleEvent, CycleOutcome, CyclePhase,
    CycleReport,
};
pub use generation::{GenerationAttempt, GenerationOutcome, ProgressiveGenerator, UpgradeBudget};
pub use inbox::{Inbox, InboxSender};
pub use progressive::{IndicatorFamily, ProgressiveScorer, ScoreVerdict, TokenWindower};
pub use prompt::{build_prompt, default_identity};
pub use sink::{ActionSink, ChannelSink, LogSink, OutboundAction};
pub use state::{AgentState, Mood, StateSnapshot};
pub use turn::{PendingTurn, TurnCoordinator, WindowController};

//! Cortex LLM - Tiered generation contract with streaming support

pub mod provider;
pub mod scripted;
pub mod tier;
pub mod types;

pub use provider::{GenerationEngine, GenerationError, GenerationResult, GenerationStream};
pub use scripted::{Script, ScriptedEngine};
pub use tier::{TierLadder, TierSpec};
pub use tokio_util::sync::CancellationToken;
pub use types::*;

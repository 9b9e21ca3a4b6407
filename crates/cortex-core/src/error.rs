//! Error types for Cortex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("inbox is empty")]
    EmptyQueue,

    #[error("memory recall exceeded {timeout_ms}ms")]
    RecallTimeout { timeout_ms: u64 },

    #[error("generation failed on tier {tier}: {message}")]
    GenerationFailure { tier: String, message: String },

    #[error("no turn decision for context {context} within {waited_ms}ms")]
    ArbitrationTimeout { context: String, waited_ms: u64 },

    #[error("response already upgraded once (current tier {tier})")]
    UpgradeLoopGuard { tier: String },

    #[error("invalid memory entry: {0}")]
    InvalidEntry(String),

    #[error("memory backend error: {0}")]
    MemoryBackend(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn generation_failure(tier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GenerationFailure {
            tier: tier.into(),
            message: message.into(),
        }
    }

    pub fn arbitration_timeout(context: impl Into<String>, waited_ms: u64) -> Self {
        Self::ArbitrationTimeout {
            context: context.into(),
            waited_ms,
        }
    }

    pub fn upgrade_loop_guard(tier: impl Into<String>) -> Self {
        Self::UpgradeLoopGuard { tier: tier.into() }
    }

    /// Errors the cognitive loop absorbs by degrading instead of surfacing.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EmptyQueue
                | Self::RecallTimeout { .. }
                | Self::GenerationFailure { .. }
                | Self::ArbitrationTimeout { .. }
                | Self::UpgradeLoopGuard { .. }
        )
    }
}

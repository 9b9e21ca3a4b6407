//! Generation request and streaming response types

use cortex_core::{Message, Tier};
use serde::{Deserialize, Serialize};

/// One generation call against a single tier.
#[derive(Clone, Debug, Serialize)]
pub struct GenerationRequest {
    pub tier: Tier,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            tier: Tier::CHEAPEST,
            model: String::new(),
            messages: Vec::new(),
            system: None,
            max_tokens: Some(2048),
            temperature: None,
        }
    }
}

impl GenerationRequest {
    /// Same prompt, retargeted at another tier. Used for clean restarts.
    pub fn for_tier(&self, tier: Tier, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            tier,
            model: model.into(),
            max_tokens: Some(max_tokens),
            ..self.clone()
        }
    }
}

/// Streaming delta from a generation engine
#[derive(Clone, Debug)]
pub enum StreamDelta {
    Text(String),
    Done { stop_reason: Option<String>, usage: Option<Usage> },
    Error(String),
}

/// Token usage
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

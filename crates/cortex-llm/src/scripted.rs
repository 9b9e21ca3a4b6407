//! ScriptedEngine - deterministic generation for tests and offline runs
//!
//! Each call to `generate` pops the next script queued for the requested
//! tier, then falls back to the shared sequence, then to the default.
//! Text is streamed in word chunks like a real backend.

use crate::provider::{GenerationEngine, GenerationError, GenerationResult, GenerationStream};
use crate::types::{GenerationRequest, StreamDelta, Usage};
use async_stream::stream;
use cortex_core::{Role, Tier};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// What the engine does for one call.
#[derive(Clone, Debug)]
pub enum Script {
    /// Stream this text, then finish.
    Text(String),
    /// Stream `prefix` followed by the last user message.
    Echo(String),
    /// Finish without producing any text.
    Empty,
    /// Fail the call before any streaming starts.
    Reject(String),
    /// Stream `text`, then fail mid-stream.
    FailAfter { text: String, error: String },
}

pub struct ScriptedEngine {
    name: String,
    per_tier: Mutex<HashMap<Tier, Vec<Script>>>,
    sequence: Mutex<Vec<Script>>,
    default_script: Script,
    calls: Mutex<Vec<Tier>>,
    words_per_chunk: usize,
    chunk_delay: Option<Duration>,
}

impl ScriptedEngine {
    /// An engine that always runs the same script.
    pub fn constant(script: Script) -> Self {
        Self {
            name: "scripted".to_string(),
            per_tier: Mutex::new(HashMap::new()),
            sequence: Mutex::new(Vec::new()),
            default_script: script,
            calls: Mutex::new(Vec::new()),
            words_per_chunk: 8,
            chunk_delay: None,
        }
    }

    /// An engine that consumes scripts in order regardless of tier.
    pub fn sequence(scripts: Vec<Script>) -> Self {
        let engine = Self::constant(Script::Text("(scripted: sequence exhausted)".into()));
        Self {
            sequence: Mutex::new(scripts),
            ..engine
        }
    }

    /// Queue scripts that only `tier` consumes.
    pub fn on_tier(mut self, tier: Tier, scripts: Vec<Script>) -> Self {
        self.per_tier.get_mut().entry(tier).or_default().extend(scripts);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_words_per_chunk(mut self, words: usize) -> Self {
        self.words_per_chunk = words.max(1);
        self
    }

    /// Sleep between chunks so cancellation can land mid-stream.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Tiers requested so far, in call order.
    pub async fn calls(&self) -> Vec<Tier> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    async fn next_script(&self, tier: Tier) -> Script {
        self.calls.lock().await.push(tier);
        tracing::debug!("{}: scripted call on {}", self.name, tier);

        if let Some(queue) = self.per_tier.lock().await.get_mut(&tier) {
            if !queue.is_empty() {
                return queue.remove(0);
            }
        }
        let mut sequence = self.sequence.lock().await;
        if sequence.is_empty() {
            self.default_script.clone()
        } else {
            sequence.remove(0)
        }
    }
}

#[async_trait::async_trait]
impl GenerationEngine for ScriptedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: Option<CancellationToken>,
    ) -> GenerationResult<GenerationStream> {
        let script = self.next_script(request.tier).await;
        let (text, error) = match script {
            Script::Text(text) => (text, None),
            Script::Echo(prefix) => {
                let last_user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                (format!("{} {}", prefix, last_user).trim().to_string(), None)
            }
            Script::Empty => (String::new(), None),
            Script::Reject(msg) => return Err(GenerationError::RequestFailed(msg)),
            Script::FailAfter { text, error } => (text, Some(error)),
        };

        let chunks = chunk_words(&text, self.words_per_chunk);
        let delay = self.chunk_delay;
        let output_tokens = text.split_whitespace().count() as u32;

        Ok(Box::pin(stream! {
            let mut cancelled = false;
            for chunk in chunks {
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                    cancelled = true;
                    break;
                }
                yield Ok(StreamDelta::Text(chunk));
            }

            if cancelled {
                yield Err(GenerationError::Cancelled);
            } else if let Some(e) = error {
                yield Err(GenerationError::StreamError(e));
            } else {
                yield Ok(StreamDelta::Done {
                    stop_reason: Some("end_turn".into()),
                    usage: Some(Usage { input_tokens: 0, output_tokens }),
                });
            }
        }))
    }
}

/// Split text into chunks of `per_chunk` words, keeping the whitespace.
fn chunk_words(text: &str, per_chunk: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut words = 0;
    for piece in text.split_inclusive(char::is_whitespace) {
        current.push_str(piece);
        if !piece.trim().is_empty() {
            words += 1;
        }
        if words >= per_chunk {
            chunks.push(std::mem::take(&mut current));
            words = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_preserves_text() {
        let text = "one two three four five";
        let chunks = chunk_words(text, 2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunking_empty() {
        assert!(chunk_words("", 4).is_empty());
    }
}

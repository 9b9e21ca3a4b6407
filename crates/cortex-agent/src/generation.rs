//! Tiered generation with at most one mid-stream upgrade
//!
//! Streams from the assessed tier and scores every completed window. When a
//! window signals low confidence the stream is cancelled and generation
//! restarts from the original prompt on the next more capable tier. The
//! restarted attempt is never upgraded again.

use crate::progressive::{ProgressiveScorer, ScoreVerdict, TokenWindower};
use cortex_core::{Error, Result, Tier};
use cortex_llm::{CancellationToken, GenerationEngine, GenerationRequest, StreamDelta, TierLadder};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Allows exactly one upgrade per response.
#[derive(Debug, Default)]
pub struct UpgradeBudget {
    used: Option<(Tier, Tier)>,
}

impl UpgradeBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spend the single upgrade. A second call is a loop-guard violation.
    pub fn consume(&mut self, from: Tier, to: Tier) -> Result<()> {
        if self.used.is_some() {
            return Err(Error::upgrade_loop_guard(from.to_string()));
        }
        self.used = Some((from, to));
        Ok(())
    }

    pub fn is_spent(&self) -> bool {
        self.used.is_some()
    }

    pub fn upgrade(&self) -> Option<(Tier, Tier)> {
        self.used
    }
}

/// One streamed attempt on one tier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub tier: Tier,
    pub output_tokens: u32,
    pub cost: f64,
    /// Cancelled for an upgrade.
    pub aborted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub text: String,
    pub start_tier: Tier,
    pub final_tier: Tier,
    pub upgraded: bool,
    pub upgrade_reason: Option<String>,
    pub windows_scored: usize,
    pub attempts: Vec<GenerationAttempt>,
    /// Tier-weighted cost of every attempt, aborted ones included.
    pub total_cost: f64,
    /// Strongest low-confidence signal seen in the final attempt, in [0, 1].
    pub final_signal: f64,
    /// A second upgrade was requested and refused.
    pub guard_tripped: bool,
}

pub struct ProgressiveGenerator {
    engine: Arc<dyn GenerationEngine>,
    ladder: TierLadder,
    scorer: ProgressiveScorer,
    strict_guard: bool,
}

impl ProgressiveGenerator {
    pub fn new(engine: Arc<dyn GenerationEngine>, ladder: TierLadder, scorer: ProgressiveScorer) -> Self {
        Self {
            engine,
            ladder,
            scorer,
            strict_guard: false,
        }
    }

    /// Fail with `UpgradeLoopGuard` instead of clamping to the current tier.
    pub fn with_strict_guard(mut self, strict: bool) -> Self {
        self.strict_guard = strict;
        self
    }

    pub fn ladder(&self) -> &TierLadder {
        &self.ladder
    }

    pub fn scorer(&self) -> &ProgressiveScorer {
        &self.scorer
    }

    /// Generate a response for `prompt`, starting at `start`.
    ///
    /// `cancel` aborts the whole generation (shutdown); upgrades cancel only
    /// their own attempt.
    pub async fn generate(
        &self,
        prompt: &GenerationRequest,
        start: Tier,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome> {
        let start = self.ladder.clamp(start);
        let mut tier = start;
        let mut budget = UpgradeBudget::new();
        let mut attempts = Vec::new();
        let mut windows_scored = 0;
        let mut upgrade_reason = None;
        let mut guard_tripped = false;

        loop {
            let spec = self.ladder.spec(tier);
            let request = prompt.for_tier(tier, spec.model.clone(), spec.max_tokens);
            let attempt_cancel = cancel.child_token();

            debug!("Generating on {} ({})", tier, spec.name);
            let mut stream = self
                .engine
                .generate(request, Some(attempt_cancel.clone()))
                .await
                .map_err(|e| Error::generation_failure(spec.name.clone(), e.to_string()))?;

            let mut windower = TokenWindower::new(self.scorer.window_tokens());
            let mut text = String::new();
            let mut reported_tokens = None;
            let mut signal: f64 = 0.0;
            let mut restart_on: Option<(Tier, ScoreVerdict)> = None;

            while let Some(item) = stream.next().await {
                match item {
                    Ok(StreamDelta::Text(chunk)) => {
                        text.push_str(&chunk);
                        for (window, offset) in windower.push(&chunk) {
                            let verdict = self.scorer.analyze(&window, offset);
                            windows_scored += 1;
                            signal = signal.max(verdict.confidence);
                            if let Some(next) =
                                self.consider(tier, verdict, &mut budget, &mut guard_tripped)?
                            {
                                restart_on = Some(next);
                                break;
                            }
                        }
                        if restart_on.is_some() {
                            break;
                        }
                    }
                    Ok(StreamDelta::Done { usage, .. }) => {
                        reported_tokens = usage.map(|u| u.output_tokens);
                        break;
                    }
                    Ok(StreamDelta::Error(e)) => {
                        return Err(Error::generation_failure(spec.name.clone(), e));
                    }
                    Err(e) => {
                        return Err(Error::generation_failure(spec.name.clone(), e.to_string()));
                    }
                }
            }

            if restart_on.is_none() {
                if let Some((window, offset)) = windower.finish() {
                    let verdict = self.scorer.analyze(&window, offset);
                    windows_scored += 1;
                    signal = signal.max(verdict.confidence);
                    restart_on = self.consider(tier, verdict, &mut budget, &mut guard_tripped)?;
                }
            }

            let output_tokens = reported_tokens
                .unwrap_or_else(|| text.len().div_ceil(4) as u32);
            let cost = output_tokens as f64 / 1000.0 * spec.cost_weight;

            if let Some((next, verdict)) = restart_on {
                attempt_cancel.cancel();
                drop(stream);
                attempts.push(GenerationAttempt {
                    tier,
                    output_tokens,
                    cost,
                    aborted: true,
                });
                info!(
                    "Upgrading {} -> {}: {}",
                    tier,
                    next,
                    verdict.reason.as_deref().unwrap_or("low confidence")
                );
                upgrade_reason = verdict.reason;
                tier = next;
                continue;
            }

            if text.trim().is_empty() {
                return Err(Error::generation_failure(spec.name.clone(), "empty output"));
            }

            attempts.push(GenerationAttempt {
                tier,
                output_tokens,
                cost,
                aborted: false,
            });
            let total_cost = attempts.iter().map(|a| a.cost).sum();
            return Ok(GenerationOutcome {
                text,
                start_tier: start,
                final_tier: tier,
                upgraded: budget.is_spent(),
                upgrade_reason,
                windows_scored,
                attempts,
                total_cost,
                final_signal: signal,
                guard_tripped,
            });
        }
    }

    /// Decide whether a verdict restarts generation, and on which tier.
    fn consider(
        &self,
        tier: Tier,
        verdict: ScoreVerdict,
        budget: &mut UpgradeBudget,
        guard_tripped: &mut bool,
    ) -> Result<Option<(Tier, ScoreVerdict)>> {
        if !verdict.should_upgrade {
            return Ok(None);
        }
        let Some(next) = self.ladder.next_above(tier) else {
            debug!("Low confidence on {} but no tier above it", tier);
            return Ok(None);
        };
        match budget.consume(tier, next) {
            Ok(()) => Ok(Some((next, verdict))),
            Err(e) if self.strict_guard => Err(e),
            Err(e) => {
                if !*guard_tripped {
                    warn!("{}; keeping {} output", e, tier);
                    *guard_tripped = true;
                }
                Ok(None)
            }
        }
    }
}

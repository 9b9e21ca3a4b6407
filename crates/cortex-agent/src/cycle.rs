//! CognitiveCycle - one persona's self-paced decide/recall/generate loop
//!
//! ```text
//! Idle -> Deciding -> Recalling -> Assessing -> Generating (-> Upgrading -> Generating)
//!      -> Arbitrating -> Acting -> Memorizing -> Reflecting -> Idle
//! ```
//!
//! Every failure inside a tick degrades instead of surfacing: a slow recall
//! means no memories, a failed generation or a missing decision means the
//! message is dropped, and the loop carries on.

use crate::complexity::ComplexityAssessor;
use crate::config::{CortexConfig, CycleConfig};
use crate::context::RecentContext;
use crate::generation::{GenerationOutcome, ProgressiveGenerator};
use crate::inbox::{Inbox, InboxSender};
use crate::prompt::{build_prompt, default_identity};
use crate::sink::{ActionSink, OutboundAction};
use crate::state::{AgentState, Mood, StateSnapshot};
use crate::turn::TurnCoordinator;
use chrono::Utc;
use cortex_core::{
    AgentId, ComplexityAssessment, ContextId, MemoryEntry, Message, RecallQuery, ThoughtBroadcast,
    Tier, TurnDecision,
};
use cortex_llm::{CancellationToken, TierLadder};
use cortex_memory::MemoryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Deciding,
    Recalling,
    Assessing,
    Generating,
    Upgrading,
    Arbitrating,
    Acting,
    Memorizing,
    Reflecting,
}

/// Observable milestones of a cycle.
#[derive(Clone, Debug)]
pub enum CycleEvent {
    Phase {
        agent_id: AgentId,
        phase: CyclePhase,
    },
    Declined {
        agent_id: AgentId,
        message_id: String,
        priority: f64,
        mood: Mood,
    },
    Upgraded {
        agent_id: AgentId,
        from: Tier,
        to: Tier,
        reason: Option<String>,
    },
    Granted {
        agent_id: AgentId,
        decision: TurnDecision,
    },
    Denied {
        agent_id: AgentId,
        context_id: ContextId,
        decision: Option<TurnDecision>,
    },
    Delivered {
        agent_id: AgentId,
        action: OutboundAction,
    },
    Memorized {
        agent_id: AgentId,
        entry_id: String,
    },
    Failed {
        agent_id: AgentId,
        message_id: String,
        error: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Nothing queued.
    Idle,
    /// Top message below the current mood's floor; left queued.
    Declined,
    /// Generation failed; message dropped.
    Failed,
    /// Another persona won the turn, or no decision arrived.
    Denied,
    Delivered,
    /// Granted, but the sink refused the response.
    Undelivered,
    /// Shutdown interrupted the tick.
    Cancelled,
}

/// What one `tick` did.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub phases: Vec<CyclePhase>,
    pub message_id: Option<String>,
    pub context_id: Option<ContextId>,
    pub assessment: Option<ComplexityAssessment>,
    pub generation: Option<GenerationOutcome>,
    pub decision: Option<TurnDecision>,
    pub memories_recalled: usize,
    pub cost: f64,
    pub duration: Duration,
    /// State after the tick.
    pub state: StateSnapshot,
}

/// Shared collaborators of a cycle.
#[derive(Clone)]
pub struct CycleDeps {
    pub generator: Arc<ProgressiveGenerator>,
    pub coordinator: Arc<TurnCoordinator>,
    pub memory: Arc<MemoryStore>,
    pub sink: Arc<dyn ActionSink>,
}

pub struct CognitiveCycle {
    agent_id: AgentId,
    identity: String,
    inbox: Inbox,
    state: AgentState,
    assessor: ComplexityAssessor,
    recent: RecentContext,
    deps: CycleDeps,
    config: CycleConfig,
    events: broadcast::Sender<CycleEvent>,
    phase: CyclePhase,
    trace: Vec<CyclePhase>,
}

impl CognitiveCycle {
    /// Returns `(cycle, inbox_sender)`.
    pub fn new(agent_id: impl Into<AgentId>, config: &CortexConfig, deps: CycleDeps) -> (Self, InboxSender) {
        let agent_id = agent_id.into();
        let (inbox, sender) = Inbox::new(&config.inbox);
        let (events, _) = broadcast::channel(config.cycle.event_capacity.max(1));
        let cycle = Self {
            identity: default_identity(&agent_id),
            state: AgentState::new(agent_id.clone(), config.agent.clone()),
            agent_id,
            inbox,
            assessor: ComplexityAssessor::new(config.complexity.clone()),
            recent: RecentContext::new(config.cycle.recent_context_tokens),
            deps,
            config: config.cycle.clone(),
            events,
            phase: CyclePhase::Idle,
            trace: Vec::new(),
        };
        (cycle, sender)
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_state(mut self, state: AgentState) -> Self {
        self.state = state;
        self
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn inbox_mut(&mut self) -> &mut Inbox {
        &mut self.inbox
    }

    pub fn recent(&self) -> &RecentContext {
        &self.recent
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: CycleEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!("{}: {:?} -> {:?}", self.agent_id, self.phase, phase);
        self.phase = phase;
        self.trace.push(phase);
        self.emit(CycleEvent::Phase {
            agent_id: self.agent_id.clone(),
            phase,
        });
    }

    fn finish(&mut self, mut report: CycleReport, outcome: CycleOutcome, started: Instant) -> CycleReport {
        if self.phase != CyclePhase::Idle {
            self.enter(CyclePhase::Idle);
        }
        report.outcome = outcome;
        report.duration = started.elapsed();
        report.phases = std::mem::take(&mut self.trace);
        report.state = self.state.snapshot();
        report
    }

    /// Charge the tick's work against the energy budget.
    fn reflect(&mut self, started: Instant, cost: f64) {
        self.enter(CyclePhase::Reflecting);
        self.state.record_activity(started.elapsed(), cost);
    }

    /// Run one pass over the inbox.
    pub async fn tick(&mut self, cancel: &CancellationToken) -> CycleReport {
        let started = Instant::now();
        self.trace.clear();
        let mut report = CycleReport {
            outcome: CycleOutcome::Idle,
            phases: Vec::new(),
            message_id: None,
            context_id: None,
            assessment: None,
            generation: None,
            decision: None,
            memories_recalled: 0,
            cost: 0.0,
            duration: Duration::ZERO,
            state: self.state.snapshot(),
        };

        self.inbox.drain_arrivals();
        for expired in self.inbox.expire(Utc::now()) {
            debug!("{}: dropping stale message {}", self.agent_id, expired.message_id);
        }
        if self.inbox.is_empty() {
            return self.finish(report, CycleOutcome::Idle, started);
        }

        // Deciding
        self.enter(CyclePhase::Deciding);
        let Some(top) = self.inbox.peek(1).first().map(|m| (*m).clone()) else {
            return self.finish(report, CycleOutcome::Idle, started);
        };
        report.message_id = Some(top.message_id.clone());
        report.context_id = Some(top.context_id.clone());
        if !self.state.should_engage(&top) {
            debug!(
                "{} ({}, energy {:.2}) declines {} at priority {:.2}",
                self.agent_id,
                self.state.mood(),
                self.state.energy(),
                top.message_id,
                top.priority
            );
            self.emit(CycleEvent::Declined {
                agent_id: self.agent_id.clone(),
                message_id: top.message_id.clone(),
                priority: top.priority,
                mood: self.state.mood(),
            });
            return self.finish(report, CycleOutcome::Declined, started);
        }
        let msg = match self.inbox.pop() {
            Ok(msg) => msg,
            Err(e) => {
                debug!("{}: {}", self.agent_id, e);
                return self.finish(report, CycleOutcome::Idle, started);
            }
        };
        let ctx = msg.context_id.clone();
        self.deps.memory.participants().join(&ctx, &self.agent_id);

        // Recalling
        self.enter(CyclePhase::Recalling);
        let k = if self.state.energy() >= self.config.recall_energy_split {
            self.config.recall_k_high
        } else {
            self.config.recall_k_low
        };
        let query = RecallQuery::new(msg.content.clone(), self.agent_id.clone())
            .in_context(ctx.clone())
            .top(k)
            .min_relevance(self.config.min_relevance);
        let memories = self.deps.memory.recall_or_empty(&query).await;
        report.memories_recalled = memories.len();
        let recall_cost = memories.len() as f64 * self.config.recall_cost_per_memory;

        // Assessing
        self.enter(CyclePhase::Assessing);
        let assessment = self.assessor.assess(&msg.content);
        report.assessment = Some(assessment.clone());

        // Generating
        self.enter(CyclePhase::Generating);
        let prompt = build_prompt(&self.identity, &memories, self.recent.messages(&ctx), &msg);
        self.recent.push(&ctx, Message::user(msg.content.clone()));
        let outcome = match self
            .deps
            .generator
            .generate(&prompt, assessment.suggested_start_tier, cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                let cancelled = cancel.is_cancelled();
                if !cancelled {
                    warn!("{}: dropping {}: {}", self.agent_id, msg.message_id, e);
                }
                self.emit(CycleEvent::Failed {
                    agent_id: self.agent_id.clone(),
                    message_id: msg.message_id.clone(),
                    error: e.to_string(),
                });
                // Failed generations are not charged.
                self.reflect(started, 0.0);
                let outcome = if cancelled {
                    CycleOutcome::Cancelled
                } else {
                    CycleOutcome::Failed
                };
                return self.finish(report, outcome, started);
            }
        };
        if outcome.upgraded {
            self.enter(CyclePhase::Upgrading);
            self.emit(CycleEvent::Upgraded {
                agent_id: self.agent_id.clone(),
                from: outcome.start_tier,
                to: outcome.final_tier,
                reason: outcome.upgrade_reason.clone(),
            });
            self.enter(CyclePhase::Generating);
        }
        let cost = outcome.total_cost + recall_cost;
        report.cost = cost;

        // Arbitrating
        self.enter(CyclePhase::Arbitrating);
        let confidence = broadcast_confidence(&outcome, self.deps.generator.ladder());
        let pending = self.deps.coordinator.broadcast(ThoughtBroadcast::new(
            self.agent_id.clone(),
            ctx.clone(),
            confidence,
        ));
        let decision = tokio::select! {
            result = pending.wait() => match result {
                Ok(decision) => Some(decision),
                Err(e) => {
                    warn!("{}: {}; treating as denial", self.agent_id, e);
                    None
                }
            },
            _ = cancel.cancelled() => {
                report.generation = Some(outcome);
                self.reflect(started, cost);
                return self.finish(report, CycleOutcome::Cancelled, started);
            }
        };
        report.decision = decision.clone();

        let granted = decision
            .as_ref()
            .is_some_and(|d| d.is_granted_to(&self.agent_id));
        let result = if !granted {
            debug!("{}: turn on {} denied, discarding response", self.agent_id, ctx);
            self.emit(CycleEvent::Denied {
                agent_id: self.agent_id.clone(),
                context_id: ctx.clone(),
                decision: decision.clone(),
            });
            CycleOutcome::Denied
        } else {
            let round = decision.as_ref().map_or(0, |d| d.round);
            if let Some(decision) = decision.clone() {
                self.emit(CycleEvent::Granted {
                    agent_id: self.agent_id.clone(),
                    decision,
                });
            }

            // Acting
            self.enter(CyclePhase::Acting);
            let action = OutboundAction {
                action_id: uuid::Uuid::new_v4().to_string(),
                agent_id: self.agent_id.clone(),
                context_id: ctx.clone(),
                in_reply_to: msg.message_id.clone(),
                content: outcome.text.clone(),
                tier: outcome.final_tier,
                round,
            };
            match self.deps.sink.deliver(action.clone()).await {
                Ok(()) => {
                    info!("{} answered {} on {} ({})", self.agent_id, msg.message_id, ctx, outcome.final_tier);
                    self.recent.push(
                        &ctx,
                        Message::assistant(outcome.text.clone()).with_author(self.agent_id.as_str()),
                    );
                    self.emit(CycleEvent::Delivered {
                        agent_id: self.agent_id.clone(),
                        action,
                    });
                    self.memorize(&msg.content, &outcome.text, &ctx, msg.priority, &assessment);
                    CycleOutcome::Delivered
                }
                Err(e) => {
                    warn!("{}: sink refused response to {}: {}", self.agent_id, msg.message_id, e);
                    CycleOutcome::Undelivered
                }
            }
        };

        report.generation = Some(outcome);
        self.reflect(started, cost);
        self.finish(report, result, started)
    }

    /// Store the exchange as a task memory if it matters enough. The
    /// embedding and write happen off the cycle.
    fn memorize(
        &mut self,
        question: &str,
        answer: &str,
        ctx: &ContextId,
        priority: f64,
        assessment: &ComplexityAssessment,
    ) {
        let importance = (0.5 * priority + 0.5 * assessment.score) as f32;
        if importance < self.config.memorize_importance_threshold {
            return;
        }
        self.enter(CyclePhase::Memorizing);

        let entry = MemoryEntry::task(
            format!("Q: {}\nA: {}", question, answer),
            self.agent_id.clone(),
            ctx.clone(),
        )
        .with_importance(importance);
        let memory = Arc::clone(&self.deps.memory);
        let events = self.events.clone();
        let agent_id = self.agent_id.clone();
        tokio::spawn(async move {
            match memory.store(entry).await {
                Ok(entry_id) => {
                    debug!("{} memorized {}", agent_id, entry_id);
                    let _ = events.send(CycleEvent::Memorized { agent_id, entry_id });
                }
                Err(e) => warn!("{} failed to memorize exchange: {}", agent_id, e),
            }
        });
    }

    /// Tick until `cancel` fires, resting for the current cadence between
    /// ticks. Returns the number of ticks run.
    pub async fn run(&mut self, cancel: CancellationToken) -> usize {
        info!("{} cycle started", self.agent_id);
        let mut ticks = 0;
        while !cancel.is_cancelled() {
            let report = self.tick(&cancel).await;
            ticks += 1;
            if report.outcome == CycleOutcome::Cancelled {
                break;
            }

            let cadence = self.state.cadence();
            tokio::select! {
                _ = tokio::time::sleep(cadence) => self.state.rest(cadence),
                _ = cancel.cancelled() => break,
            }
        }
        info!(
            "{} cycle stopped after {} ticks (duty cycle {:.0}%)",
            self.agent_id,
            ticks,
            self.state.duty_cycle() * 100.0
        );
        ticks
    }
}

/// Confidence announced for arbitration: high when the final attempt showed
/// little low-confidence language, nudged up for more capable tiers.
pub fn broadcast_confidence(outcome: &GenerationOutcome, ladder: &TierLadder) -> f64 {
    let certainty = 1.0 - outcome.final_signal.clamp(0.0, 1.0);
    (0.8 * certainty + 0.2 * ladder.capability_fraction(outcome.final_tier)).clamp(0.0, 1.0)
}

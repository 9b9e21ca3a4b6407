//! TurnCoordinator - per-context turn arbitration
//!
//! Each context owns one arbiter. The first broadcast into an idle context
//! opens a round; every broadcast that arrives before the window closes
//! competes in it. At close the highest confidence wins (ties go to the
//! earliest `broadcast_at`), everyone else is told no, and only then can the
//! next round open. Contexts never wait on each other.

use crate::config::ArbitrationConfig;
use chrono::Utc;
use cortex_core::{clamp_unit, AgentId, ContextId, Error, Result, ThoughtBroadcast, TurnDecision};
use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

/// Smoothed control loop over round latency.
///
/// Latency is how long after a round opened its last broadcast arrived.
/// The window tracks an EWMA of that latency times a headroom factor,
/// clamped to the configured bounds: slow rounds widen it, fast ones
/// narrow it.
#[derive(Clone, Debug)]
pub struct WindowController {
    smoothed_ms: f64,
    smoothing: f64,
    headroom: f64,
    min: Duration,
    max: Duration,
}

impl WindowController {
    pub fn new(config: &ArbitrationConfig) -> Self {
        let headroom = if config.headroom > 0.0 { config.headroom } else { 1.0 };
        Self {
            smoothed_ms: config.initial_window_ms as f64 / headroom,
            smoothing: config.smoothing.clamp(0.0, 1.0),
            headroom,
            min: config.min_window(),
            max: config.max_window(),
        }
    }

    pub fn current(&self) -> Duration {
        let ms = (self.smoothed_ms * self.headroom).max(0.0);
        Duration::from_millis(ms.round() as u64).clamp(self.min, self.max)
    }

    pub fn observe(&mut self, latency: Duration) {
        let sample = latency.as_secs_f64() * 1000.0;
        self.smoothed_ms = self.smoothing * sample + (1.0 - self.smoothing) * self.smoothed_ms;
    }
}

struct Ballot {
    ticket: u64,
    broadcast: ThoughtBroadcast,
    arrived_after: Duration,
    withdrawn: bool,
    reply: Option<oneshot::Sender<TurnDecision>>,
}

struct OpenRound {
    number: u64,
    opened_at: Instant,
    window: Duration,
    ballots: Vec<Ballot>,
    next_ticket: u64,
}

struct ArbiterState {
    rounds_completed: u64,
    open: Option<OpenRound>,
    controller: WindowController,
    active: Option<TurnDecision>,
    history: VecDeque<TurnDecision>,
    /// When the arbiter was created or last closed a round.
    idle_since: Instant,
}

struct ContextArbiter {
    context: ContextId,
    state: Mutex<ArbiterState>,
    decisions: broadcast::Sender<TurnDecision>,
    history_len: usize,
}

impl ContextArbiter {
    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Join the open round, opening one if needed.
    /// Returns `(round, ticket, window, opened)`.
    fn enter(
        &self,
        mut broadcast: ThoughtBroadcast,
        reply: oneshot::Sender<TurnDecision>,
    ) -> (u64, u64, Duration, bool) {
        broadcast.confidence = clamp_unit(broadcast.confidence);
        let mut state = self.lock();
        let opened = state.open.is_none();
        let number = state.rounds_completed + 1;
        let window = state.controller.current();
        if opened {
            debug!("Opening round {} on {} ({}ms window)", number, self.context, window.as_millis());
        }
        let round = state.open.get_or_insert_with(|| OpenRound {
            number,
            opened_at: Instant::now(),
            window,
            ballots: Vec::new(),
            next_ticket: 0,
        });
        let ticket = round.next_ticket;
        round.next_ticket += 1;
        round.ballots.push(Ballot {
            ticket,
            arrived_after: round.opened_at.elapsed(),
            broadcast,
            withdrawn: false,
            reply: Some(reply),
        });
        (round.number, ticket, round.window, opened)
    }

    fn withdraw(&self, round: u64, ticket: u64) -> bool {
        let mut state = self.lock();
        let Some(open) = state.open.as_mut().filter(|o| o.number == round) else {
            return false;
        };
        match open.ballots.iter_mut().find(|b| b.ticket == ticket && !b.withdrawn) {
            Some(ballot) => {
                ballot.withdrawn = true;
                ballot.reply = None;
                debug!(
                    "{} withdrew from round {} on {}",
                    ballot.broadcast.agent_id, round, self.context
                );
                true
            }
            None => false,
        }
    }

    /// Close `round`, deliver the decision to every live ballot, and record it.
    fn close(&self, round: u64) {
        let mut state = self.lock();
        if !state.open.as_ref().is_some_and(|o| o.number == round) {
            return;
        }
        let Some(open) = state.open.take() else {
            return;
        };

        let live: Vec<&Ballot> = open.ballots.iter().filter(|b| !b.withdrawn).collect();
        let winner = live
            .iter()
            .copied()
            .max_by(|a, b| rank(a, b))
            .map(|b| b.broadcast.agent_id.clone());
        let latency = live
            .iter()
            .map(|b| b.arrived_after)
            .max()
            .unwrap_or(Duration::ZERO);

        let decision = TurnDecision {
            context_id: self.context.clone(),
            granted_agent_id: winner,
            decided_at: Utc::now(),
            window_duration_ms: open.window.as_millis() as u64,
            round: open.number,
        };

        state.controller.observe(latency);
        state.rounds_completed = open.number;
        state.idle_since = Instant::now();
        state.active = Some(decision.clone());
        state.history.push_back(decision.clone());
        while state.history.len() > self.history_len {
            state.history.pop_front();
        }

        match &decision.granted_agent_id {
            Some(agent) => info!(
                "Round {} on {}: granted to {} ({} of {} broadcasts live)",
                decision.round,
                self.context,
                agent,
                live.len(),
                open.ballots.len()
            ),
            None => info!("Round {} on {}: no grant", decision.round, self.context),
        }

        for ballot in open.ballots {
            if let Some(reply) = ballot.reply {
                let _ = reply.send(decision.clone());
            }
        }
        let _ = self.decisions.send(decision);
    }
}

/// Ordering where the preferred ballot is greater: higher confidence, then
/// earlier broadcast, then earlier arrival.
fn rank(a: &Ballot, b: &Ballot) -> Ordering {
    a.broadcast
        .confidence
        .total_cmp(&b.broadcast.confidence)
        .then_with(|| b.broadcast.broadcast_at.cmp(&a.broadcast.broadcast_at))
        .then_with(|| b.ticket.cmp(&a.ticket))
}

/// A broadcast waiting for its round to close.
///
/// Dropping it before the decision arrives withdraws the broadcast.
pub struct PendingTurn {
    arbiter: Arc<ContextArbiter>,
    round: u64,
    ticket: u64,
    window: Duration,
    grace: Duration,
    rx: Option<oneshot::Receiver<TurnDecision>>,
}

impl PendingTurn {
    pub fn context(&self) -> &ContextId {
        &self.arbiter.context
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Suspend until the round closes.
    ///
    /// Fails with `ArbitrationTimeout` if no decision arrives within the
    /// window plus grace; callers treat that as a denial.
    pub async fn wait(mut self) -> Result<TurnDecision> {
        let bound = self.window + self.grace;
        let outcome = match self.rx.as_mut() {
            Some(rx) => tokio::time::timeout(bound, rx).await,
            None => return Err(Error::Internal("turn already settled".into())),
        };
        self.rx = None;
        match outcome {
            Ok(Ok(decision)) => Ok(decision),
            _ => {
                self.arbiter.withdraw(self.round, self.ticket);
                Err(Error::arbitration_timeout(
                    self.arbiter.context.as_str(),
                    bound.as_millis() as u64,
                ))
            }
        }
    }

    /// Leave the round before it closes. Returns `false` if it already closed.
    pub fn withdraw(mut self) -> bool {
        self.rx = None;
        self.arbiter.withdraw(self.round, self.ticket)
    }
}

impl Drop for PendingTurn {
    fn drop(&mut self) {
        if self.rx.is_some() {
            self.arbiter.withdraw(self.round, self.ticket);
        }
    }
}

pub struct TurnCoordinator {
    contexts: DashMap<ContextId, Arc<ContextArbiter>>,
    decisions: broadcast::Sender<TurnDecision>,
    config: ArbitrationConfig,
}

impl Default for TurnCoordinator {
    fn default() -> Self {
        Self::new(ArbitrationConfig::default())
    }
}

impl TurnCoordinator {
    pub fn new(config: ArbitrationConfig) -> Self {
        let (decisions, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            contexts: DashMap::new(),
            decisions,
            config,
        }
    }

    fn arbiter(&self, context: &ContextId) -> Arc<ContextArbiter> {
        self.contexts
            .entry(context.clone())
            .or_insert_with(|| {
                Arc::new(ContextArbiter {
                    context: context.clone(),
                    state: Mutex::new(ArbiterState {
                        rounds_completed: 0,
                        open: None,
                        controller: WindowController::new(&self.config),
                        active: None,
                        history: VecDeque::new(),
                        idle_since: Instant::now(),
                    }),
                    decisions: self.decisions.clone(),
                    history_len: self.config.history_len.max(1),
                })
            })
            .clone()
    }

    /// Enter the current round for the broadcast's context.
    ///
    /// Must be called inside a tokio runtime; the round closer is a task.
    pub fn broadcast(&self, broadcast: ThoughtBroadcast) -> PendingTurn {
        let arbiter = self.arbiter(&broadcast.context_id);
        let (tx, rx) = oneshot::channel();
        let (round, ticket, window, opened) = arbiter.enter(broadcast, tx);

        if opened {
            let closer = Arc::clone(&arbiter);
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                closer.close(round);
            });
        }

        PendingTurn {
            arbiter,
            round,
            ticket,
            window,
            grace: self.config.decision_grace(),
            rx: Some(rx),
        }
    }

    /// Broadcast and wait for the decision.
    pub async fn request_turn(
        &self,
        context: impl Into<ContextId>,
        agent: impl Into<AgentId>,
        confidence: f64,
    ) -> Result<TurnDecision> {
        self.broadcast(ThoughtBroadcast::new(agent, context, confidence))
            .wait()
            .await
    }

    /// Every decision issued on any context.
    pub fn subscribe(&self) -> broadcast::Receiver<TurnDecision> {
        self.decisions.subscribe()
    }

    /// The latest decision for `context`.
    pub fn active_decision(&self, context: &ContextId) -> Option<TurnDecision> {
        self.contexts.get(context).and_then(|a| a.lock().active.clone())
    }

    /// Window of the open round, or of the next one to open.
    pub fn current_window(&self, context: &ContextId) -> Duration {
        match self.contexts.get(context) {
            Some(arbiter) => {
                let state = arbiter.lock();
                state
                    .open
                    .as_ref()
                    .map(|o| o.window)
                    .unwrap_or_else(|| state.controller.current())
            }
            None => WindowController::new(&self.config).current(),
        }
    }

    /// Recent decisions for `context`, oldest first.
    pub fn history(&self, context: &ContextId) -> Vec<TurnDecision> {
        self.contexts
            .get(context)
            .map(|a| a.lock().history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn rounds_completed(&self, context: &ContextId) -> u64 {
        self.contexts
            .get(context)
            .map(|a| a.lock().rounds_completed)
            .unwrap_or(0)
    }

    pub fn is_round_open(&self, context: &ContextId) -> bool {
        self.contexts
            .get(context)
            .is_some_and(|a| a.lock().open.is_some())
    }

    /// Forget contexts with no open round, no pending waiter, and no round
    /// closed within `max_idle`. Returns how many were dropped.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let before = self.contexts.len();
        self.contexts.retain(|_, arbiter| {
            if Arc::strong_count(arbiter) > 1 {
                return true;
            }
            let state = arbiter.lock();
            state.open.is_some() || state.idle_since.elapsed() < max_idle
        });
        let pruned = before.saturating_sub(self.contexts.len());
        if pruned > 0 {
            debug!("Pruned {} idle contexts", pruned);
        }
        pruned
    }

    /// Contexts currently tracked.
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }
}

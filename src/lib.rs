//! Cortex - a swarm of self-paced personas sharing turns and memory
//!
//! A [`Swarm`] wires N cognitive cycles to one turn coordinator, one memory
//! store, and one generation engine. Messages posted to the swarm land in
//! every persona's inbox; each persona decides on its own whether to answer,
//! and the coordinator lets at most one of them speak per round.

use cortex_agent::{
    ActionSink, CognitiveCycle, CortexConfig, CycleDeps, CycleReport, InboxSender,
    ProgressiveGenerator, ProgressiveScorer, TurnCoordinator,
};
use cortex_core::{AgentId, InboxMessage, Result};
use cortex_llm::{CancellationToken, GenerationEngine};
use cortex_memory::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

struct Persona {
    cycle: CognitiveCycle,
    sender: InboxSender,
}

pub struct Swarm {
    config: CortexConfig,
    coordinator: Arc<TurnCoordinator>,
    memory: Arc<MemoryStore>,
    generator: Arc<ProgressiveGenerator>,
    sink: Arc<dyn ActionSink>,
    personas: Vec<Persona>,
    cleanup_interval: Duration,
}

impl Swarm {
    pub fn new(
        config: CortexConfig,
        engine: Arc<dyn GenerationEngine>,
        sink: Arc<dyn ActionSink>,
    ) -> Result<Self> {
        let ladder = config.ladder()?;
        let scorer = ProgressiveScorer::new(config.scorer.clone());
        Ok(Self {
            coordinator: Arc::new(TurnCoordinator::new(config.arbitration.clone())),
            memory: Arc::new(MemoryStore::new(config.memory.clone())),
            generator: Arc::new(ProgressiveGenerator::new(engine, ladder, scorer)),
            sink,
            personas: Vec::new(),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            config,
        })
    }

    /// Use a preconfigured memory store, e.g. one with custom backends.
    pub fn with_memory(mut self, memory: Arc<MemoryStore>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn add_persona(&mut self, agent_id: impl Into<AgentId>) -> InboxSender {
        self.add_persona_with_identity(agent_id, None::<String>)
    }

    /// Add a persona with a custom system identity.
    pub fn add_persona_with_identity(
        &mut self,
        agent_id: impl Into<AgentId>,
        identity: Option<impl Into<String>>,
    ) -> InboxSender {
        let deps = CycleDeps {
            generator: Arc::clone(&self.generator),
            coordinator: Arc::clone(&self.coordinator),
            memory: Arc::clone(&self.memory),
            sink: Arc::clone(&self.sink),
        };
        let (mut cycle, sender) = CognitiveCycle::new(agent_id, &self.config, deps);
        if let Some(identity) = identity {
            cycle = cycle.with_identity(identity);
        }
        debug!("Swarm added persona {}", cycle.agent_id());
        self.personas.push(Persona {
            cycle,
            sender: sender.clone(),
        });
        sender
    }

    pub fn persona_ids(&self) -> Vec<AgentId> {
        self.personas.iter().map(|p| p.cycle.agent_id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    pub fn coordinator(&self) -> &Arc<TurnCoordinator> {
        &self.coordinator
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn config(&self) -> &CortexConfig {
        &self.config
    }

    /// Deliver `msg` to every persona's inbox. Returns how many accepted it.
    pub fn post(&self, msg: InboxMessage) -> usize {
        post_all(self.personas.iter().map(|p| (p.cycle.agent_id(), &p.sender)), &msg)
    }

    /// Run one tick on every persona concurrently.
    pub async fn tick_all(&mut self, cancel: &CancellationToken) -> Vec<CycleReport> {
        futures::future::join_all(self.personas.iter_mut().map(|p| p.cycle.tick(cancel))).await
    }

    /// Start every persona's loop plus periodic maintenance on the current
    /// runtime: memory cleanup and forgetting quiet contexts.
    pub fn spawn(self, cancel: CancellationToken) -> SwarmHandle {
        let mut senders = Vec::with_capacity(self.personas.len());
        let mut tasks = Vec::with_capacity(self.personas.len());
        for persona in self.personas {
            let Persona { mut cycle, sender } = persona;
            let agent_id = cycle.agent_id().clone();
            senders.push((agent_id.clone(), sender));
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                let ticks = cycle.run(cancel).await;
                (agent_id, ticks)
            }));
        }

        let memory = Arc::clone(&self.memory);
        let coordinator = Arc::clone(&self.coordinator);
        let idle_context = self.config.arbitration.idle_context();
        let interval = self.cleanup_interval;
        let janitor_cancel = cancel.clone();
        let janitor = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = janitor_cancel.cancelled() => break,
                }
                match memory.cleanup().await {
                    Ok(report) => debug!(
                        "Memory cleanup: {} archived, {} deleted, {} participants expired",
                        report.archived, report.deleted, report.participants_expired
                    ),
                    Err(e) => warn!("Memory cleanup failed: {}", e),
                }
                coordinator.prune_idle(idle_context);
            }
        });

        info!("Swarm running with {} personas", senders.len());
        SwarmHandle {
            senders,
            tasks,
            janitor,
            cancel,
        }
    }
}

/// A running swarm.
pub struct SwarmHandle {
    senders: Vec<(AgentId, InboxSender)>,
    tasks: Vec<JoinHandle<(AgentId, usize)>>,
    janitor: JoinHandle<()>,
    cancel: CancellationToken,
}

impl SwarmHandle {
    pub fn post(&self, msg: InboxMessage) -> usize {
        post_all(self.senders.iter().map(|(id, s)| (id, s)), &msg)
    }

    /// Stop every persona and wait for them. Returns ticks run per persona.
    pub async fn shutdown(self) -> Vec<(AgentId, usize)> {
        self.cancel.cancel();
        let mut ticks = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            match task.await {
                Ok(result) => ticks.push(result),
                Err(e) => warn!("Persona task failed: {}", e),
            }
        }
        if let Err(e) = self.janitor.await {
            warn!("Cleanup task failed: {}", e);
        }
        info!("Swarm stopped");
        ticks
    }
}

fn post_all<'a>(
    targets: impl Iterator<Item = (&'a AgentId, &'a InboxSender)>,
    msg: &InboxMessage,
) -> usize {
    let mut delivered = 0;
    for (agent_id, sender) in targets {
        match sender.try_send(msg.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => warn!("{} did not receive {}: {}", agent_id, msg.message_id, e),
        }
    }
    delivered
}

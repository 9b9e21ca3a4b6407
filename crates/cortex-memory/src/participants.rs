//! Context participation and best-effort memory notices

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cortex_core::{AgentId, ContextId, MemoryScope};
use dashmap::DashMap;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which personas are currently active in which contexts.
///
/// Gates access to `task`/`project` memories and addresses notices. A
/// participant stays active until it leaves or goes idle past the cutoff
/// passed to [`ParticipantRegistry::prune_idle`].
#[derive(Default)]
pub struct ParticipantRegistry {
    /// Participant -> last time it joined or was seen in the context.
    contexts: DashMap<ContextId, BTreeMap<AgentId, DateTime<Utc>>>,
    /// Bumped on every membership change. Recall caching keys on it.
    generation: AtomicU64,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the persona was not already a participant.
    /// Joining again only refreshes its last-seen time.
    pub fn join(&self, context: &ContextId, agent: &AgentId) -> bool {
        self.join_at(context, agent, Utc::now())
    }

    pub fn join_at(&self, context: &ContextId, agent: &AgentId, at: DateTime<Utc>) -> bool {
        let added = {
            let mut members = self.contexts.entry(context.clone()).or_default();
            match members.entry(agent.clone()) {
                Entry::Occupied(mut seen) => {
                    let seen = seen.get_mut();
                    *seen = (*seen).max(at);
                    false
                }
                Entry::Vacant(slot) => {
                    slot.insert(at);
                    true
                }
            }
        };
        if added {
            self.bump();
        }
        added
    }

    pub fn leave(&self, context: &ContextId, agent: &AgentId) -> bool {
        let removed = self
            .contexts
            .get_mut(context)
            .map(|mut members| members.remove(agent).is_some())
            .unwrap_or(false);
        self.contexts.remove_if(context, |_, members| members.is_empty());
        if removed {
            self.bump();
        }
        removed
    }

    /// Drop participants not seen for longer than `max_idle` before `now`.
    /// Returns how many memberships ended.
    pub fn prune_idle(&self, now: DateTime<Utc>, max_idle: ChronoDuration) -> usize {
        let cutoff = now - max_idle;
        let mut pruned = 0;
        for mut members in self.contexts.iter_mut() {
            let before = members.len();
            members.retain(|_, seen| *seen >= cutoff);
            pruned += before - members.len();
        }
        self.contexts.retain(|_, members| !members.is_empty());
        if pruned > 0 {
            self.bump();
        }
        pruned
    }

    /// Changes whenever anyone joins, leaves or is pruned.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_active(&self, context: &ContextId, agent: &AgentId) -> bool {
        self.contexts
            .get(context)
            .is_some_and(|members| members.contains_key(agent))
    }

    /// Participants in stable (sorted) order.
    pub fn participants(&self, context: &ContextId) -> Vec<AgentId> {
        self.contexts
            .get(context)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contexts_of(&self, agent: &AgentId) -> Vec<ContextId> {
        let mut out: Vec<ContextId> = self
            .contexts
            .iter()
            .filter(|e| e.value().contains_key(agent))
            .map(|e| e.key().clone())
            .collect();
        out.sort();
        out
    }
}

/// "Someone in your context just learned something."
///
/// Delivered at most once, with no acknowledgement; recipients that are not
/// subscribed simply miss it.
#[derive(Clone, Debug)]
pub struct MemoryNotice {
    pub entry_id: String,
    pub scope: MemoryScope,
    pub context_id: Option<ContextId>,
    pub discovered_by: AgentId,
    pub recipients: Vec<AgentId>,
}

impl MemoryNotice {
    pub fn is_for(&self, agent: &AgentId) -> bool {
        self.recipients.contains(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_leave_roundtrip() {
        let reg = ParticipantRegistry::new();
        let ctx = ContextId::new("T1");
        let a = AgentId::new("a");
        assert!(reg.join(&ctx, &a));
        assert!(!reg.join(&ctx, &a));
        assert!(reg.is_active(&ctx, &a));
        assert_eq!(reg.contexts_of(&a), vec![ctx.clone()]);
        assert!(reg.leave(&ctx, &a));
        assert!(!reg.is_active(&ctx, &a));
        assert!(reg.participants(&ctx).is_empty());
    }

    #[test]
    fn participants_sorted() {
        let reg = ParticipantRegistry::new();
        let ctx = ContextId::new("T1");
        reg.join(&ctx, &AgentId::new("zed"));
        reg.join(&ctx, &AgentId::new("amy"));
        let names: Vec<_> = reg.participants(&ctx).iter().map(|a| a.to_string()).collect();
        assert_eq!(names, vec!["amy", "zed"]);
    }

    #[test]
    fn generation_moves_only_on_membership_change() {
        let reg = ParticipantRegistry::new();
        let ctx = ContextId::new("T1");
        let a = AgentId::new("a");
        let g0 = reg.generation();
        reg.join(&ctx, &a);
        let g1 = reg.generation();
        assert!(g1 > g0);
        reg.join(&ctx, &a);
        assert_eq!(reg.generation(), g1);
        assert!(!reg.leave(&ctx, &AgentId::new("b")));
        assert_eq!(reg.generation(), g1);
        reg.leave(&ctx, &a);
        assert!(reg.generation() > g1);
    }

    #[test]
    fn idle_participants_are_pruned() {
        let reg = ParticipantRegistry::new();
        let ctx = ContextId::new("T1");
        let now = Utc::now();
        reg.join_at(&ctx, &AgentId::new("stale"), now - ChronoDuration::hours(3));
        reg.join_at(&ctx, &AgentId::new("fresh"), now - ChronoDuration::minutes(5));
        reg.join_at(&ContextId::new("T2"), &AgentId::new("stale"), now - ChronoDuration::hours(2));

        assert_eq!(reg.prune_idle(now, ChronoDuration::hours(1)), 2);
        assert_eq!(reg.participants(&ctx), vec![AgentId::new("fresh")]);
        assert!(reg.contexts_of(&AgentId::new("stale")).is_empty());
        assert_eq!(reg.prune_idle(now, ChronoDuration::hours(1)), 0);
    }

    #[test]
    fn rejoining_refreshes_last_seen() {
        let reg = ParticipantRegistry::new();
        let ctx = ContextId::new("T1");
        let a = AgentId::new("a");
        let now = Utc::now();
        reg.join_at(&ctx, &a, now - ChronoDuration::hours(3));
        reg.join_at(&ctx, &a, now - ChronoDuration::minutes(1));
        assert_eq!(reg.prune_idle(now, ChronoDuration::hours(1)), 0);
        assert!(reg.is_active(&ctx, &a));
    }
}

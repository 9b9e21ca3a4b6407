//! Prompt construction for one cycle

use cortex_core::{AgentId, InboxMessage, Message, ScoredMemory};
use cortex_llm::GenerationRequest;

/// Default persona identity when none is configured.
pub fn default_identity(agent: &AgentId) -> String {
    format!(
        "You are {}, one of several collaborating agents sharing this conversation. \
         Answer only when you have something useful to add, and keep it brief.",
        agent
    )
}

/// Identity, then recalled memories, then the recent transcript, then the
/// message being answered.
pub fn build_prompt(
    identity: &str,
    memories: &[ScoredMemory],
    recent: &[Message],
    message: &InboxMessage,
) -> GenerationRequest {
    let mut system = identity.to_string();
    if !memories.is_empty() {
        system.push_str("\n\nThings you remember that may be relevant:");
        for m in memories {
            system.push_str(&format!("\n- [{}] {}", m.entry.scope, m.entry.content));
        }
    }

    let mut messages: Vec<Message> = recent.to_vec();
    messages.push(Message::user(message.content.clone()));

    GenerationRequest {
        system: Some(system),
        messages,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::{MemoryEntry, Role};

    #[test]
    fn prompt_orders_sections() {
        let memory = ScoredMemory {
            entry: MemoryEntry::personal("likes short answers", "ada"),
            relevance: 0.9,
            score: 0.8,
        };
        let msg = InboxMessage::new("c", "what now?", 0.5);
        let req = build_prompt("You are ada.", &[memory], &[Message::assistant("earlier")], &msg);

        let system = req.system.unwrap_or_default();
        assert!(system.starts_with("You are ada."));
        assert!(system.contains("- [personal] likes short answers"));
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[1].role, Role::User);
        assert_eq!(req.messages[1].content, "what now?");
    }

    #[test]
    fn no_memories_no_memory_section() {
        let msg = InboxMessage::new("c", "hi", 0.5);
        let req = build_prompt("id", &[], &[], &msg);
        assert_eq!(req.system.as_deref(), Some("id"));
    }
}

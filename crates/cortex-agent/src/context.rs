//! Recent per-context transcript with token budgeting

use cortex_core::{ContextId, Message};
use std::collections::HashMap;

const CHARS_PER_TOKEN: f32 = 4.0;
const MESSAGE_OVERHEAD_TOKENS: usize = 10;

/// What this persona has seen and said in each context, newest last.
///
/// Each transcript is kept under a token budget; the oldest exchanges are
/// dropped first.
pub struct RecentContext {
    max_tokens: usize,
    transcripts: HashMap<ContextId, Vec<Message>>,
}

impl RecentContext {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            transcripts: HashMap::new(),
        }
    }

    pub fn estimate_tokens(text: &str) -> usize {
        (text.len() as f32 / CHARS_PER_TOKEN).ceil() as usize
    }

    pub fn message_tokens(message: &Message) -> usize {
        Self::estimate_tokens(&message.content) + MESSAGE_OVERHEAD_TOKENS
    }

    pub fn calculate_total(messages: &[Message]) -> usize {
        messages.iter().map(Self::message_tokens).sum()
    }

    pub fn push(&mut self, context: &ContextId, message: Message) {
        let transcript = self.transcripts.entry(context.clone()).or_default();
        transcript.push(message);
        Self::compact(transcript, self.max_tokens);
    }

    pub fn messages(&self, context: &ContextId) -> &[Message] {
        self.transcripts
            .get(context)
            .map(|t| t.as_slice())
            .unwrap_or(&[])
    }

    pub fn tokens(&self, context: &ContextId) -> usize {
        Self::calculate_total(self.messages(context))
    }

    pub fn clear(&mut self, context: &ContextId) {
        self.transcripts.remove(context);
    }

    /// Drop from the front until the transcript fits; the newest message
    /// always stays.
    fn compact(messages: &mut Vec<Message>, max_tokens: usize) {
        if Self::calculate_total(messages) <= max_tokens {
            return;
        }
        let before = messages.len();
        while messages.len() > 1 && Self::calculate_total(messages) > max_tokens {
            messages.remove(0);
        }
        tracing::debug!(
            "Compacted context: {} -> {} messages, ~{} tokens",
            before,
            messages.len(),
            Self::calculate_total(messages)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimation() {
        assert_eq!(RecentContext::estimate_tokens(""), 0);
        assert_eq!(RecentContext::estimate_tokens("hello"), 2);
        assert_eq!(RecentContext::estimate_tokens("hello world"), 3);
        assert_eq!(RecentContext::message_tokens(&Message::user("hello world")), 13);
    }

    #[test]
    fn oldest_messages_dropped_first() {
        let mut rc = RecentContext::new(30);
        let ctx = ContextId::new("c");
        rc.push(&ctx, Message::user("first"));
        rc.push(&ctx, Message::assistant("second"));
        rc.push(&ctx, Message::user("third"));
        let contents: Vec<_> = rc.messages(&ctx).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "third"]);
        assert!(rc.tokens(&ctx) <= 30);
    }

    #[test]
    fn newest_message_survives_any_budget() {
        let mut rc = RecentContext::new(1);
        let ctx = ContextId::new("c");
        rc.push(&ctx, Message::user("a long message that blows the budget"));
        assert_eq!(rc.messages(&ctx).len(), 1);
    }
}

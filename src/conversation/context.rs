//! Context assembly: which stored messages go into a completion request.

use crate::llm::ChatMessage;
use crate::store::{Message, MessageRole};

/// How much history is resent on each turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextPolicy {
    /// Resend the whole conversation every turn. Cost grows with length.
    #[default]
    Unbounded,
    /// Resend at most the last `n` messages, starting on a user message.
    LastMessages(usize),
}

impl ContextPolicy {
    /// The slice of `history` this policy keeps.
    pub fn window<'a>(&self, history: &'a [Message]) -> &'a [Message] {
        match *self {
            Self::Unbounded => history,
            Self::LastMessages(n) => {
                let start = history.len().saturating_sub(n.max(1));
                let mut window = &history[start..];
                // Providers expect the first non-system turn to be the user's.
                while window.len() > 1 && window[0].role == MessageRole::Assistant {
                    window = &window[1..];
                }
                window
            }
        }
    }
}

/// Build the role/content list for a completion request from ordered history.
///
/// The instruction preamble is not included; the gateway adds it.
pub fn build_context(history: &[Message], policy: ContextPolicy) -> Vec<ChatMessage> {
    policy.window(history).iter().map(Message::to_chat).collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::llm::ChatRole;

    fn history(n: usize) -> Vec<Message> {
        let conversation_id = Uuid::new_v4();
        (0..n)
            .map(|i| Message {
                id: Uuid::new_v4(),
                conversation_id,
                role: if i % 2 == 0 {
                    MessageRole::User
                } else {
                    MessageRole::Assistant
                },
                content: format!("m{i}"),
                created_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn unbounded_keeps_everything_in_order() {
        let h = history(7);
        let ctx = build_context(&h, ContextPolicy::Unbounded);
        assert_eq!(ctx.len(), 7);
        assert_eq!(ctx[0], ChatMessage::user("m0"));
        assert_eq!(ctx[1], ChatMessage::assistant("m1"));
        assert_eq!(ctx[6].content, "m6");
    }

    #[test]
    fn default_is_unbounded() {
        assert_eq!(ContextPolicy::default(), ContextPolicy::Unbounded);
    }

    #[test]
    fn last_messages_starts_on_a_user_turn() {
        let h = history(7);
        // Last 4 would be m3(assistant) m4 m5 m6; the assistant lead is dropped.
        let ctx = build_context(&h, ContextPolicy::LastMessages(4));
        let contents: Vec<_> = ctx.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m5", "m6"]);
        assert_eq!(ctx[0].role, ChatRole::User);

        let ctx = build_context(&h, ContextPolicy::LastMessages(3));
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx[0].content, "m4");
    }

    #[test]
    fn last_messages_larger_than_history() {
        let h = history(3);
        assert_eq!(build_context(&h, ContextPolicy::LastMessages(50)).len(), 3);
        assert!(build_context(&[], ContextPolicy::LastMessages(5)).is_empty());
    }
}

//! Conversation orchestration.
//!
//! The [`Orchestrator`] sequences store writes and completion calls:
//! persist the user message, rebuild context from the stored history, ask
//! the gateway, persist the reply. It never retries and never rolls back a
//! persisted user message; failures are logged and handed to the caller.
//!
//! Concurrent `send` calls against the same conversation are not
//! serialized here. Callers are expected to issue them one at a time.

pub mod context;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;

pub use context::{ContextPolicy, build_context};
pub use session::{ChatSession, PendingMessage, PendingState, VisibleMessage};

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::assistant::AssistantType;
use crate::error::{Error, Result};
use crate::llm::CompletionGateway;
use crate::store::{Conversation, ConversationStore, Message, MessageRole};

/// A user message and the assistant reply it produced.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub user: Message,
    pub assistant: Message,
}

/// Result of a successful `start`.
#[derive(Debug, Clone, Serialize)]
pub struct Started {
    pub conversation: Conversation,
    pub turn: Turn,
}

/// A conversation with its messages in creation order.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationThread {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

impl ConversationThread {
    /// True when the newest message is a user message with no reply.
    pub fn awaiting_reply(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|m| m.role == MessageRole::User)
    }
}

/// Sequences persistence and completion calls per conversation.
pub struct Orchestrator {
    store: Arc<dyn ConversationStore>,
    gateway: Arc<dyn CompletionGateway>,
    policy: ContextPolicy,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn ConversationStore>, gateway: Arc<dyn CompletionGateway>) -> Self {
        Self {
            store,
            gateway,
            policy: ContextPolicy::default(),
        }
    }

    pub fn with_context_policy(mut self, policy: ContextPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn context_policy(&self) -> ContextPolicy {
        self.policy
    }

    /// Create a conversation from its first message and return its ID.
    pub async fn start(
        &self,
        title: &str,
        initial_message: &str,
        assistant_type: AssistantType,
    ) -> Result<Uuid> {
        self.start_conversation(title, initial_message, assistant_type)
            .await
            .map(|s| s.conversation.id)
    }

    /// Like [`start`](Self::start), returning the conversation and first turn.
    ///
    /// If anything fails after the conversation row exists, the row and any
    /// stored user message are kept and the error is wrapped in
    /// [`Error::StartInterrupted`] so the caller can continue with `send`.
    pub async fn start_conversation(
        &self,
        title: &str,
        initial_message: &str,
        assistant_type: AssistantType,
    ) -> Result<Started> {
        require_text("title", title)?;
        require_text("message", initial_message)?;

        let mut conversation = self
            .store
            .create_conversation(title, assistant_type)
            .await
            .map_err(|e| {
                let e = Error::from(e);
                error!(%assistant_type, error = %e, "Failed to create conversation");
                e
            })?;

        info!(
            conversation_id = %conversation.id,
            %assistant_type,
            "Conversation started"
        );

        match self.first_turn(&conversation, initial_message).await {
            Ok(turn) => {
                conversation.updated_at = turn.assistant.created_at;
                Ok(Started { conversation, turn })
            }
            Err(e) => {
                error!(
                    conversation_id = %conversation.id,
                    kind = e.kind().as_str(),
                    error = %e,
                    "Conversation created but first reply not stored"
                );
                Err(Error::StartInterrupted {
                    conversation_id: conversation.id,
                    source: Box::new(e),
                })
            }
        }
    }

    async fn first_turn(&self, conversation: &Conversation, text: &str) -> Result<Turn> {
        let user = self
            .store
            .append_message(conversation.id, MessageRole::User, text)
            .await?;
        // The first request carries exactly the opening message.
        let context = vec![user.to_chat()];
        let reply = self
            .gateway
            .complete(conversation.assistant_type.as_str(), &context)
            .await?;
        let assistant = self
            .store
            .append_message(conversation.id, MessageRole::Assistant, &reply)
            .await?;
        Ok(Turn { user, assistant })
    }

    /// Append a user message, complete over the full history, store and
    /// return the reply text.
    pub async fn send(&self, conversation_id: Uuid, text: &str) -> Result<String> {
        self.send_turn(conversation_id, text)
            .await
            .map(|turn| turn.assistant.content)
    }

    /// Like [`send`](Self::send), returning both stored messages.
    pub async fn send_turn(&self, conversation_id: Uuid, text: &str) -> Result<Turn> {
        self.run_send(conversation_id, text)
            .await
            .inspect_err(|e| log_failure("send", conversation_id, e))
    }

    async fn run_send(&self, conversation_id: Uuid, text: &str) -> Result<Turn> {
        require_text("message", text)?;
        let conversation = self.require_conversation(conversation_id).await?;

        let user = self
            .store
            .append_message(conversation_id, MessageRole::User, text)
            .await?;

        let assistant = self.reply_to_history(&conversation).await?;
        Ok(Turn { user, assistant })
    }

    /// Produce the missing reply for a conversation whose newest message is
    /// an unanswered user message. No new user message is written.
    pub async fn resume(&self, conversation_id: Uuid) -> Result<Message> {
        self.run_resume(conversation_id)
            .await
            .inspect_err(|e| log_failure("resume", conversation_id, e))
    }

    async fn run_resume(&self, conversation_id: Uuid) -> Result<Message> {
        let conversation = self.require_conversation(conversation_id).await?;
        let history = self.store.list_messages(conversation_id).await?;
        if !history
            .last()
            .is_some_and(|m| m.role == MessageRole::User)
        {
            return Err(Error::InvalidInput(format!(
                "conversation {conversation_id} has no message awaiting a reply"
            )));
        }
        self.complete_and_store(&conversation, &history).await
    }

    async fn reply_to_history(&self, conversation: &Conversation) -> Result<Message> {
        let history = self.store.list_messages(conversation.id).await?;
        self.complete_and_store(conversation, &history).await
    }

    async fn complete_and_store(
        &self,
        conversation: &Conversation,
        history: &[Message],
    ) -> Result<Message> {
        let context = build_context(history, self.policy);
        let reply = self
            .gateway
            .complete(conversation.assistant_type.as_str(), &context)
            .await?;
        let assistant = self
            .store
            .append_message(conversation.id, MessageRole::Assistant, &reply)
            .await?;
        info!(
            conversation_id = %conversation.id,
            context_messages = context.len(),
            "Assistant reply stored"
        );
        Ok(assistant)
    }

    /// The conversation and its messages in creation order.
    pub async fn load(&self, conversation_id: Uuid) -> Result<ConversationThread> {
        self.run_load(conversation_id)
            .await
            .inspect_err(|e| log_failure("load", conversation_id, e))
    }

    async fn run_load(&self, conversation_id: Uuid) -> Result<ConversationThread> {
        let conversation = self.require_conversation(conversation_id).await?;
        let messages = self.store.list_messages(conversation_id).await?;
        Ok(ConversationThread {
            conversation,
            messages,
        })
    }

    /// Conversations of one assistant type, most recently updated first.
    pub async fn list(&self, assistant_type: AssistantType) -> Result<Vec<Conversation>> {
        self.store
            .list_conversations(assistant_type)
            .await
            .map_err(|e| {
                let e = Error::from(e);
                error!(%assistant_type, error = %e, "Failed to list conversations");
                e
            })
    }

    async fn require_conversation(&self, conversation_id: Uuid) -> Result<Conversation> {
        self.store
            .get_conversation(conversation_id)
            .await?
            .ok_or(Error::NotFound { conversation_id })
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

fn log_failure(op: &str, conversation_id: Uuid, e: &Error) {
    error!(
        op,
        conversation_id = %conversation_id,
        kind = e.kind().as_str(),
        error = %e,
        "Conversation operation failed"
    );
}

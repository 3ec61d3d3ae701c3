//! Per-caller chat session.
//!
//! A session is bound to one assistant type and holds at most one active
//! conversation. It keeps two views of that conversation:
//!
//! - **confirmed**: messages the store has acknowledged, in store order;
//! - **pending**: at most one user message shown before the store and the
//!   provider have answered.
//!
//! The pending message is reconciled once the orchestrator returns. On
//! success both stored messages move into the confirmed view. On failure the
//! confirmed view is reloaded from the store; if the user message made it in,
//! the pending copy is dropped, otherwise it stays visible and marked failed.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::Orchestrator;
use crate::assistant::AssistantType;
use crate::error::{Error, ErrorKind, Result};
use crate::store::{Conversation, Message, MessageRole};

/// Delivery state of a pending user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// Staged or sent, no answer yet.
    InFlight,
    /// The last attempt failed and the store does not have the message.
    Failed(ErrorKind),
}

/// A user message not (yet) confirmed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub content: String,
    pub state: PendingState,
}

/// One entry of the caller-visible message list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VisibleMessage<'a> {
    Confirmed(&'a Message),
    Pending(&'a PendingMessage),
}

impl VisibleMessage<'_> {
    pub fn role(&self) -> MessageRole {
        match self {
            Self::Confirmed(m) => m.role,
            Self::Pending(_) => MessageRole::User,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Confirmed(m) => &m.content,
            Self::Pending(p) => &p.content,
        }
    }
}

pub struct ChatSession {
    orchestrator: Arc<Orchestrator>,
    assistant_type: AssistantType,
    active: Option<Conversation>,
    confirmed: Vec<Message>,
    pending: Option<PendingMessage>,
}

impl ChatSession {
    pub fn new(orchestrator: Arc<Orchestrator>, assistant_type: AssistantType) -> Self {
        Self {
            orchestrator,
            assistant_type,
            active: None,
            confirmed: Vec::new(),
            pending: None,
        }
    }

    pub fn assistant_type(&self) -> AssistantType {
        self.assistant_type
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active.as_ref()
    }

    pub fn confirmed(&self) -> &[Message] {
        &self.confirmed
    }

    pub fn pending(&self) -> Option<&PendingMessage> {
        self.pending.as_ref()
    }

    /// Confirmed messages followed by the pending one, if any.
    pub fn visible(&self) -> Vec<VisibleMessage<'_>> {
        let mut out: Vec<_> = self.confirmed.iter().map(VisibleMessage::Confirmed).collect();
        if let Some(p) = &self.pending {
            out.push(VisibleMessage::Pending(p));
        }
        out
    }

    /// True when the store holds a user message with no reply.
    pub fn awaiting_reply(&self) -> bool {
        self.confirmed
            .last()
            .is_some_and(|m| m.role == MessageRole::User)
    }

    /// Conversations for this session's assistant, newest activity first.
    pub async fn conversations(&self) -> Result<Vec<Conversation>> {
        self.orchestrator.list(self.assistant_type).await
    }

    /// Start a new conversation and make it active. Returns the reply text.
    pub async fn start(&mut self, title: &str, text: &str) -> Result<String> {
        self.close();
        self.pending = Some(PendingMessage {
            content: text.to_string(),
            state: PendingState::InFlight,
        });

        match self
            .orchestrator
            .start_conversation(title, text, self.assistant_type)
            .await
        {
            Ok(started) => {
                let reply = started.turn.assistant.content.clone();
                self.active = Some(started.conversation);
                self.confirmed = vec![started.turn.user, started.turn.assistant];
                self.pending = None;
                Ok(reply)
            }
            Err(e) => {
                match e.interrupted_conversation() {
                    Some(id) => self.reconcile(id, &e).await,
                    None => self.mark_failed(&e),
                }
                Err(e)
            }
        }
    }

    /// Make an existing conversation active, replacing both views.
    pub async fn open(&mut self, conversation_id: Uuid) -> Result<()> {
        let thread = self.orchestrator.load(conversation_id).await?;
        if thread.conversation.assistant_type != self.assistant_type {
            return Err(Error::InvalidInput(format!(
                "conversation {conversation_id} belongs to the {} assistant",
                thread.conversation.assistant_type
            )));
        }
        self.active = Some(thread.conversation);
        self.confirmed = thread.messages;
        self.pending = None;
        Ok(())
    }

    /// Show `text` optimistically. Call [`dispatch`](Self::dispatch) to send it.
    pub fn stage(&mut self, text: &str) -> Result<()> {
        if self.active.is_none() {
            return Err(Error::InvalidInput("No active conversation".to_string()));
        }
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("message must not be empty".to_string()));
        }
        if self.pending.is_some() {
            return Err(Error::InvalidInput(
                "a message is already pending; retry or discard it first".to_string(),
            ));
        }
        self.pending = Some(PendingMessage {
            content: text.to_string(),
            state: PendingState::InFlight,
        });
        Ok(())
    }

    /// Send the pending message and reconcile both views with the outcome.
    pub async fn dispatch(&mut self) -> Result<String> {
        let conversation_id = self.active_id()?;
        let content = match self.pending.as_mut() {
            Some(p) => {
                p.state = PendingState::InFlight;
                p.content.clone()
            }
            None => return Err(Error::InvalidInput("Nothing to send".to_string())),
        };

        match self.orchestrator.send_turn(conversation_id, &content).await {
            Ok(turn) => {
                let reply = turn.assistant.content.clone();
                if let Some(active) = self.active.as_mut() {
                    active.updated_at = turn.assistant.created_at;
                }
                self.confirmed.push(turn.user);
                self.confirmed.push(turn.assistant);
                self.pending = None;
                Ok(reply)
            }
            Err(e) => {
                self.reconcile(conversation_id, &e).await;
                Err(e)
            }
        }
    }

    /// `stage` then `dispatch`.
    pub async fn send(&mut self, text: &str) -> Result<String> {
        self.stage(text)?;
        self.dispatch().await
    }

    /// Recover from the last failure: resend a message the store never got,
    /// or ask for the missing reply to a stored one.
    pub async fn retry(&mut self) -> Result<String> {
        if self.pending.is_some() {
            return self.dispatch().await;
        }
        let conversation_id = self.active_id()?;
        let reply = self.orchestrator.resume(conversation_id).await?;
        let text = reply.content.clone();
        if let Some(active) = self.active.as_mut() {
            active.updated_at = reply.created_at;
        }
        self.confirmed.push(reply);
        Ok(text)
    }

    /// Forget the active conversation. Stored data is untouched.
    pub fn close(&mut self) {
        self.active = None;
        self.confirmed.clear();
        self.pending = None;
    }

    /// Drop a pending message without sending it.
    pub fn discard_pending(&mut self) -> Option<PendingMessage> {
        self.pending.take()
    }

    fn active_id(&self) -> Result<Uuid> {
        self.active
            .as_ref()
            .map(|c| c.id)
            .ok_or_else(|| Error::InvalidInput("No active conversation".to_string()))
    }

    fn mark_failed(&mut self, e: &Error) {
        if let Some(p) = self.pending.as_mut() {
            p.state = PendingState::Failed(e.kind());
        }
    }

    /// Reload the confirmed view after a failure and settle the pending copy.
    async fn reconcile(&mut self, conversation_id: Uuid, e: &Error) {
        let known = self.confirmed.len();
        let thread = match self.orchestrator.load(conversation_id).await {
            Ok(thread) => thread,
            Err(reload) => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %reload,
                    "Could not reload conversation after failure"
                );
                self.mark_failed(e);
                return;
            }
        };

        let stored = match (&self.pending, thread.messages.last()) {
            (Some(p), Some(last)) => {
                thread.messages.len() > known
                    && last.role == MessageRole::User
                    && last.content == p.content
            }
            _ => false,
        };

        self.active = Some(thread.conversation);
        self.confirmed = thread.messages;
        if stored {
            debug!(conversation_id = %conversation_id, "Pending message was stored; awaiting reply");
            self.pending = None;
        } else {
            self.mark_failed(e);
        }
    }
}

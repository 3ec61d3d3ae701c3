//! Fakes shared by the conversation tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::assistant::AssistantType;
use crate::error::{DatabaseError, Error, ProviderError};
use crate::llm::{ChatMessage, CompletionGateway};
use crate::store::{Conversation, ConversationStore, LibSqlBackend, Message, MessageRole};

/// Gateway that replays queued outcomes, then echoes the last message.
#[derive(Default)]
pub(crate) struct ScriptedGateway {
    outcomes: Mutex<VecDeque<Result<String, Error>>>,
    calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedGateway {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn reply(&self, text: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Ok(text.to_string()));
    }

    pub(crate) fn fail_with_status(&self, status: u16) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(ProviderError::Status {
                status,
                message: "upstream failure".to_string(),
            }
            .into()));
    }

    pub(crate) fn calls(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn last_context(&self) -> Vec<ChatMessage> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .map(|(_, ctx)| ctx.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn complete(
        &self,
        assistant_type: &str,
        messages: &[ChatMessage],
    ) -> Result<String, Error> {
        self.calls
            .lock()
            .unwrap()
            .push((assistant_type.to_string(), messages.to_vec()));
        let next = self.outcomes.lock().unwrap().pop_front();
        match next {
            Some(outcome) => outcome,
            None => Ok(format!(
                "re: {}",
                messages.last().map(|m| m.content.as_str()).unwrap_or("")
            )),
        }
    }
}

/// Store that can be told to fail the next append of a given role.
pub(crate) struct FlakyStore {
    inner: LibSqlBackend,
    fail_next_append: Mutex<Option<MessageRole>>,
}

impl FlakyStore {
    pub(crate) async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: LibSqlBackend::new_memory().await.unwrap(),
            fail_next_append: Mutex::new(None),
        })
    }

    pub(crate) fn fail_next_append(&self, role: MessageRole) {
        *self.fail_next_append.lock().unwrap() = Some(role);
    }
}

#[async_trait]
impl ConversationStore for FlakyStore {
    async fn create_conversation(
        &self,
        title: &str,
        assistant_type: AssistantType,
    ) -> Result<Conversation, DatabaseError> {
        self.inner.create_conversation(title, assistant_type).await
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, DatabaseError> {
        let fail = {
            let mut slot = self.fail_next_append.lock().unwrap();
            if *slot == Some(role) {
                slot.take();
                true
            } else {
                false
            }
        };
        if fail {
            return Err(DatabaseError::Query("append_message: disk I/O error".into()));
        }
        self.inner.append_message(conversation_id, role, content).await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, DatabaseError> {
        self.inner.list_messages(conversation_id).await
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, DatabaseError> {
        self.inner.get_conversation(id).await
    }

    async fn list_conversations(
        &self,
        assistant_type: AssistantType,
    ) -> Result<Vec<Conversation>, DatabaseError> {
        self.inner.list_conversations(assistant_type).await
    }
}

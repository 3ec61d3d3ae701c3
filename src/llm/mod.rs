//! Completion gateway.
//!
//! Turns role-tagged messages plus an assistant-type tag into a single
//! completion call. The instruction preamble for the assistant type is
//! injected here, so callers only ever pass conversation turns.

pub mod openai;

pub use openai::OpenAiGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Role of a message in a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single role-tagged message, as sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Stateless request/response adapter over the completion provider.
///
/// Implementations make exactly one attempt per call.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Complete `messages` for the assistant identified by `assistant_type`.
    ///
    /// Unknown tags use the default instruction rather than failing.
    async fn complete(&self, assistant_type: &str, messages: &[ChatMessage])
    -> Result<String, Error>;
}

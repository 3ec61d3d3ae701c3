//! Assistant Desk: multi-assistant chat conversations with persistent history.

pub mod assistant;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod server;
pub mod store;

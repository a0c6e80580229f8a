//! Daydream Shared - wire types for the prompt queue
//!
//! This crate contains the types exchanged between the prompt queue backend and
//! its clients:
//! - Prompt records as they appear in queue state pushes
//! - Live-update channel messages (`ServerMessage`)
//! - REST request/response bodies for prompt submission
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, serde_json, chrono, and thiserror
//! 2. **No business logic** - Pure data types and serialization
//! 3. **Lenient decoding** - Unknown message types and missing lists decode cleanly

pub mod messages;
pub mod prompts;
pub mod requests;

pub use messages::{
    CurrentPromptPayload, InitialPayload, ProtocolError, RecentPromptsPayload, ServerMessage,
};
pub use prompts::{CurrentPromptData, PromptRecord, QueuedPrompt};
pub use requests::{SubmitPromptRequest, SubmitPromptResponse};

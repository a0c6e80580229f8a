//! Test doubles for the outbound ports.

mod in_memory_channel;
mod scripted_prompt_api;

pub use in_memory_channel::{InMemoryChannelHandle, InMemoryConnector};
pub use scripted_prompt_api::{RecordedCall, ScriptedPromptApi};

/// Let spawned tasks run until they block, without advancing a paused clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

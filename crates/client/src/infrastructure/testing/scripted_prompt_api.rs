//! Prompt API double with scripted results and an optional gate.
//!
//! While held, calls are recorded and then park until `release()`, which lets
//! tests observe state that only exists while a request is in flight.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use daydream_shared::SubmitPromptResponse;
use tokio::sync::watch;

use crate::ports::outbound::{ApiError, PromptApiPort};
use crate::queue_types::StreamId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Submit { stream_id: StreamId, text: String },
    AddRandom { stream_id: StreamId },
}

struct Script {
    calls: Vec<RecordedCall>,
    submit_result: Result<SubmitPromptResponse, ApiError>,
    random_result: Result<(), ApiError>,
}

#[derive(Clone)]
pub struct ScriptedPromptApi {
    script: Arc<Mutex<Script>>,
    gate: Arc<watch::Sender<bool>>,
}

impl ScriptedPromptApi {
    /// Accepts every submission at the given id and queue position.
    pub fn accepting(prompt_id: &str, queue_position: u32) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            script: Arc::new(Mutex::new(Script {
                calls: Vec::new(),
                submit_result: Ok(SubmitPromptResponse {
                    id: prompt_id.to_string(),
                    queue_position,
                    was_censored: false,
                    message: None,
                }),
                random_result: Ok(()),
            })),
            gate: Arc::new(gate),
        }
    }

    pub fn failing(error: ApiError) -> Self {
        let api = Self::accepting("unused", 0);
        {
            let mut script = api.lock();
            script.submit_result = Err(error.clone());
            script.random_result = Err(error);
        }
        api
    }

    pub fn set_censored(&self, was_censored: bool) {
        if let Ok(response) = self.lock().submit_result.as_mut() {
            response.was_censored = was_censored;
        }
    }

    /// Park subsequent calls until `release()`.
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    async fn pass_gate(&self) {
        let mut open = self.gate.subscribe();
        let _ = open.wait_for(|open| *open).await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl PromptApiPort for ScriptedPromptApi {
    async fn submit_prompt(
        &self,
        stream_id: &StreamId,
        text: &str,
    ) -> Result<SubmitPromptResponse, ApiError> {
        self.lock().calls.push(RecordedCall::Submit {
            stream_id: stream_id.clone(),
            text: text.to_string(),
        });
        self.pass_gate().await;
        self.lock().submit_result.clone()
    }

    async fn add_random_prompt(&self, stream_id: &StreamId) -> Result<(), ApiError> {
        self.lock().calls.push(RecordedCall::AddRandom {
            stream_id: stream_id.clone(),
        });
        self.pass_gate().await;
        self.lock().random_result.clone()
    }
}

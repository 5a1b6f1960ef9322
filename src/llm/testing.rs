use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::provider::LlmProvider;
use super::types::{ContentBlock, MessageRequest, MessageResponse, StopReason, Usage};
use crate::core::errors::ApiError;

/// Replays canned responses in order and records every request it receives.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<MessageResponse, ApiError>>>,
    requests: Mutex<Vec<MessageRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<MessageResponse, ApiError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<MessageRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn create_message(&self, request: MessageRequest) -> Result<MessageResponse, ApiError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Internal("script exhausted".into())))
    }
}

pub fn text_response(text: &str) -> Result<MessageResponse, ApiError> {
    Ok(MessageResponse {
        id: "msg_text".into(),
        content: vec![ContentBlock::Text { text: text.into() }],
        stop_reason: Some(StopReason::EndTurn),
        usage: Usage::default(),
    })
}

pub fn tool_use_response(calls: &[(&str, &str, Value)]) -> Result<MessageResponse, ApiError> {
    Ok(MessageResponse {
        id: "msg_tool".into(),
        content: calls
            .iter()
            .map(|(id, name, input)| ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: input.clone(),
            })
            .collect(),
        stop_reason: Some(StopReason::ToolUse),
        usage: Usage::default(),
    })
}

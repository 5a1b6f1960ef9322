pub mod anthropic;
pub mod generator;
pub mod provider;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use generator::{AiGenerator, GeneratedResponse, GeneratorOptions};
pub use provider::LlmProvider;
pub use types::{
    ContentBlock, Message, MessageRequest, MessageResponse, StopReason, ToolChoice,
    ToolDefinition,
};

use std::sync::Arc;

use super::provider::LlmProvider;
use super::types::{
    ContentBlock, Message, MessageRequest, MessageResponse, ToolChoice, ToolDefinition,
};
use crate::core::config::{AnthropicSettings, RagSettings};
use crate::core::errors::ApiError;
use crate::tools::{Source, ToolManager};

pub const PROCESSING_ERROR_ANSWER: &str = "I encountered an error while processing your request.";
pub const GENERATION_ERROR_ANSWER: &str = "I encountered an error while generating my response.";

pub const SYSTEM_PROMPT: &str = "You are an AI assistant specialized in course materials and educational content, with access to tools for course information.

Tool usage:
- **Course outline tool** (get_course_outline): use for questions about course structure, what a course covers, its lesson list, instructor, or course link. Return the course title, course link and every lesson number with its title.
- **Content search tool** (search_course_content): use for questions about specific course content or detailed educational material. Filter by course name or lesson number when the question names them.
- You may make up to 2 rounds of tool calls per question; use a second round only when the first results show more information is needed.
- Synthesize tool results into accurate, fact-based responses.
- If a tool yields no results, state this clearly without offering alternatives.

Response protocol:
- **General knowledge questions**: answer using existing knowledge without using tools.
- **Course-specific questions**: use the appropriate tool first, then answer.
- **No meta-commentary**: provide direct answers only. No reasoning process, tool explanations or question-type analysis. Do not mention \"based on the search results\".

All responses must be:
1. **Brief, concise and focused**: get to the point quickly
2. **Educational**: maintain instructional value
3. **Clear**: use accessible language
4. **Example-supported**: include relevant examples when they aid understanding

Provide only the direct answer to what was asked.";

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_tool_rounds: usize,
}

impl GeneratorOptions {
    pub fn from_settings(anthropic: &AnthropicSettings, rag: &RagSettings) -> Self {
        Self {
            model: anthropic.model.clone(),
            max_tokens: anthropic.max_tokens,
            temperature: anthropic.temperature,
            max_tool_rounds: rag.max_tool_rounds,
        }
    }
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self::from_settings(&AnthropicSettings::default(), &RagSettings::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedResponse {
    pub answer: String,
    pub sources: Vec<Source>,
}

impl GeneratedResponse {
    fn fallback(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            sources: Vec::new(),
        }
    }
}

/// Per-request message log and the sources gathered while building it.
struct Conversation {
    system: String,
    messages: Vec<Message>,
    sources: Vec<Source>,
}

enum RoundOutcome {
    Answered(String),
    Continue,
    Failed,
}

/// Drives the Messages API, running tool calls for a bounded number of rounds.
#[derive(Clone)]
pub struct AiGenerator {
    provider: Arc<dyn LlmProvider>,
    options: GeneratorOptions,
}

impl AiGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GeneratorOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    pub async fn generate_response(
        &self,
        query: &str,
        conversation_history: Option<&str>,
        tools: Option<&ToolManager>,
    ) -> Result<GeneratedResponse, ApiError> {
        let system = match conversation_history {
            Some(history) if !history.is_empty() => {
                format!("{}\n\nPrevious conversation:\n{}", SYSTEM_PROMPT, history)
            }
            _ => SYSTEM_PROMPT.to_string(),
        };
        let mut conversation = Conversation {
            system,
            messages: vec![Message::user_text(query)],
            sources: Vec::new(),
        };

        let Some(tools) = tools.filter(|manager| !manager.is_empty()) else {
            let response = self.call(&conversation, None, None).await?;
            return Ok(GeneratedResponse {
                answer: response.text(),
                sources: Vec::new(),
            });
        };
        let definitions = tools.get_tool_definitions();

        for round in 1..=self.options.max_tool_rounds {
            tracing::debug!("Tool round {}/{}", round, self.options.max_tool_rounds);
            match self
                .run_round(&mut conversation, tools, &definitions)
                .await
            {
                RoundOutcome::Answered(answer) => {
                    return Ok(GeneratedResponse {
                        answer,
                        sources: conversation.sources,
                    });
                }
                RoundOutcome::Continue => {}
                RoundOutcome::Failed => {
                    return Ok(GeneratedResponse::fallback(PROCESSING_ERROR_ANSWER));
                }
            }
        }

        // Rounds exhausted with tool results pending: force a text answer.
        match self
            .call(&conversation, Some(&definitions), Some(ToolChoice::None))
            .await
        {
            Ok(response) => Ok(GeneratedResponse {
                answer: response.text(),
                sources: conversation.sources,
            }),
            Err(err) => {
                tracing::error!("Final response generation failed: {}", err);
                Ok(GeneratedResponse::fallback(GENERATION_ERROR_ANSWER))
            }
        }
    }

    async fn run_round(
        &self,
        conversation: &mut Conversation,
        tools: &ToolManager,
        definitions: &[ToolDefinition],
    ) -> RoundOutcome {
        let response = match self
            .call(conversation, Some(definitions), Some(ToolChoice::Auto))
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::error!("Messages API call failed: {}", err);
                return RoundOutcome::Failed;
            }
        };

        let tool_uses: Vec<(String, String, serde_json::Value)> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect();

        if !response.wants_tools() || tool_uses.is_empty() {
            return RoundOutcome::Answered(response.text());
        }

        conversation
            .messages
            .push(Message::assistant_blocks(replayable_blocks(response)));

        let mut results = Vec::with_capacity(tool_uses.len());
        for (id, name, input) in tool_uses {
            tracing::debug!("Executing tool {} ({})", name, id);
            match tools.execute_tool(&name, &input).await {
                Ok(output) => {
                    conversation.sources.extend(output.sources);
                    results.push(ContentBlock::ToolResult {
                        tool_use_id: id,
                        content: output.content,
                        is_error: None,
                    });
                }
                Err(ApiError::BadRequest(message)) => {
                    tracing::warn!("Tool {} rejected its arguments: {}", name, message);
                    results.push(ContentBlock::ToolResult {
                        tool_use_id: id,
                        content: message,
                        is_error: Some(true),
                    });
                }
                Err(err) => {
                    tracing::error!("Tool {} failed: {}", name, err);
                    return RoundOutcome::Failed;
                }
            }
        }
        conversation.messages.push(Message::user_blocks(results));

        RoundOutcome::Continue
    }

    async fn call(
        &self,
        conversation: &Conversation,
        tools: Option<&[ToolDefinition]>,
        tool_choice: Option<ToolChoice>,
    ) -> Result<MessageResponse, ApiError> {
        let request = MessageRequest {
            model: self.options.model.clone(),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            system: Some(conversation.system.clone()),
            messages: conversation.messages.clone(),
            tools: tools.map(<[ToolDefinition]>::to_vec),
            tool_choice,
        };
        self.provider.create_message(request).await
    }
}

/// Drops block types that cannot be sent back to the API.
fn replayable_blocks(response: MessageResponse) -> Vec<ContentBlock> {
    response
        .content
        .into_iter()
        .filter(|block| !matches!(block, ContentBlock::Unknown))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{text_response, tool_use_response, ScriptedProvider};
    use crate::llm::types::{MessageContent, Role};
    use crate::tools::{Tool, ToolOutput};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FakeSearch;

    #[async_trait]
    impl Tool for FakeSearch {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "search_course_content".into(),
                description: "search".into(),
                input_schema: json!({ "type": "object" }),
            }
        }

        async fn execute(&self, input: &Value) -> Result<ToolOutput, ApiError> {
            match input["query"].as_str() {
                Some("boom") => Err(ApiError::Internal("store offline".into())),
                Some(query) => Ok(ToolOutput {
                    content: format!("results for {}", query),
                    sources: vec![Source {
                        text: format!("Course - {}", query),
                        link: None,
                    }],
                }),
                None => Err(ApiError::BadRequest("query is required".into())),
            }
        }
    }

    fn manager() -> ToolManager {
        let mut manager = ToolManager::new();
        manager.register_tool(Arc::new(FakeSearch));
        manager
    }

    fn generator(provider: &Arc<ScriptedProvider>) -> AiGenerator {
        AiGenerator::new(provider.clone(), GeneratorOptions::default())
    }

    fn search(id: &str, query: &str) -> Result<MessageResponse, ApiError> {
        tool_use_response(&[(id, "search_course_content", json!({ "query": query }))])
    }

    #[tokio::test]
    async fn direct_answer_makes_one_call_without_tools_field() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Paris")]));

        let response = generator(&provider)
            .generate_response("capital of France?", None, None)
            .await
            .unwrap();

        assert_eq!(response.answer, "Paris");
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_none());
        assert!(requests[0].tool_choice.is_none());
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].max_tokens, 800);
        assert_eq!(requests[0].system.as_deref(), Some(SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn api_error_without_tools_propagates() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ApiError::Upstream(
            "overloaded".into(),
        ))]));

        let err = generator(&provider)
            .generate_response("q", None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Upstream(_)));
    }

    #[tokio::test]
    async fn answer_without_tool_use_takes_one_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("General answer")]));

        let response = generator(&provider)
            .generate_response("what is 2+2", None, Some(&manager()))
            .await
            .unwrap();

        assert_eq!(response.answer, "General answer");
        assert!(response.sources.is_empty());
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tool_choice, Some(ToolChoice::Auto));
        assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn one_tool_round_then_answer_takes_two_calls() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            search("tu_1", "mcp"),
            text_response("MCP is a protocol"),
        ]));

        let response = generator(&provider)
            .generate_response("what is mcp", None, Some(&manager()))
            .await
            .unwrap();

        assert_eq!(response.answer, "MCP is a protocol");
        assert_eq!(
            response.sources,
            vec![Source {
                text: "Course - mcp".into(),
                link: None
            }]
        );

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.messages[1].role, Role::Assistant);
        assert_eq!(
            second.messages[2].content,
            MessageContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: "tu_1".into(),
                content: "results for mcp".into(),
                is_error: None,
            }])
        );
        assert_eq!(second.tool_choice, Some(ToolChoice::Auto));
    }

    #[tokio::test]
    async fn two_tool_rounds_force_a_final_call_with_tool_choice_none() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            search("tu_1", "outline"),
            search("tu_2", "lesson 4"),
            text_response("Combined answer"),
        ]));

        let response = generator(&provider)
            .generate_response("compare", None, Some(&manager()))
            .await
            .unwrap();

        assert_eq!(response.answer, "Combined answer");
        assert_eq!(response.sources.len(), 2);

        let requests = provider.requests();
        assert_eq!(requests.len(), 3);
        let last = &requests[2];
        assert_eq!(last.tool_choice, Some(ToolChoice::None));
        assert!(last.tools.is_some());
        assert_eq!(last.messages.len(), 5);
    }

    #[tokio::test]
    async fn history_is_appended_to_system_prompt() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("ok")]));

        generator(&provider)
            .generate_response("follow up", Some("User: hi\nAssistant: hello"), None)
            .await
            .unwrap();

        assert_eq!(
            provider.requests()[0].system.as_deref(),
            Some(format!("{}\n\nPrevious conversation:\nUser: hi\nAssistant: hello", SYSTEM_PROMPT).as_str())
        );
    }

    #[tokio::test]
    async fn failed_round_call_returns_processing_fallback() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            search("tu_1", "mcp"),
            Err(ApiError::Upstream("rate limited".into())),
        ]));

        let response = generator(&provider)
            .generate_response("q", None, Some(&manager()))
            .await
            .unwrap();

        assert_eq!(response.answer, PROCESSING_ERROR_ANSWER);
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn failed_final_call_returns_generation_fallback() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            search("tu_1", "a"),
            search("tu_2", "b"),
            Err(ApiError::Upstream("overloaded".into())),
        ]));

        let response = generator(&provider)
            .generate_response("q", None, Some(&manager()))
            .await
            .unwrap();

        assert_eq!(response.answer, GENERATION_ERROR_ANSWER);
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn tool_failure_aborts_with_processing_fallback() {
        let provider = Arc::new(ScriptedProvider::new(vec![search("tu_1", "boom")]));

        let response = generator(&provider)
            .generate_response("q", None, Some(&manager()))
            .await
            .unwrap();

        assert_eq!(response.answer, PROCESSING_ERROR_ANSWER);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn invalid_arguments_are_reported_back_to_the_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_use_response(&[("tu_1", "search_course_content", json!({}))]),
            text_response("Sorry"),
        ]));

        let response = generator(&provider)
            .generate_response("q", None, Some(&manager()))
            .await
            .unwrap();

        assert_eq!(response.answer, "Sorry");
        let requests = provider.requests();
        assert_eq!(
            requests[1].messages[2].content,
            MessageContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: "tu_1".into(),
                content: "query is required".into(),
                is_error: Some(true),
            }])
        );
    }

    #[tokio::test]
    async fn unknown_blocks_are_not_replayed() {
        let mut first = search("tu_1", "mcp").unwrap();
        first.content.insert(0, ContentBlock::Unknown);
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(first), text_response("done")]));

        generator(&provider)
            .generate_response("q", None, Some(&manager()))
            .await
            .unwrap();

        let replayed = &provider.requests()[1].messages[1].content;
        match replayed {
            MessageContent::Blocks(blocks) => {
                assert!(!blocks.contains(&ContentBlock::Unknown));
                assert_eq!(blocks.len(), 1);
            }
            other => panic!("unexpected content {:?}", other),
        }
    }
}

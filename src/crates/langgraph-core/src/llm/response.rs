//! Response types returned by [`crate::llm::ChatModel`] implementations.
//!
//! A `ChatModel` always hands back a [`Message`] plus whatever bookkeeping
//! the caller needs to make routing and cost decisions: token usage, the
//! reasoning trace for thinking models, and free-form provider metadata.

use crate::llm_stream::MessageChunkStream;
use crate::Message;
use std::collections::HashMap;

/// Token accounting for a single `chat`/`stream` call.
///
/// `total_tokens` is provided separately rather than derived because some
/// providers bill a handful of tokens (e.g. a function-call wrapper) that
/// show up in the total without being attributable to either side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageMetadata {
    /// Tokens consumed by the prompt (messages, tool definitions, etc.).
    pub input_tokens: u64,

    /// Tokens generated in the response.
    pub output_tokens: u64,

    /// Tokens spent on internal reasoning, for thinking models that report
    /// it separately from `output_tokens`.
    pub reasoning_tokens: Option<u64>,

    /// Total billed tokens for the call.
    pub total_tokens: u64,
}

/// The extracted "thinking" trace for a model run with
/// [`ReasoningMode::Separated`](crate::llm::ReasoningMode::Separated) or
/// [`ReasoningMode::Extended`](crate::llm::ReasoningMode::Extended).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReasoningContent {
    /// The reasoning/thinking text itself.
    pub content: String,

    /// Whether the provider indicated this trace was truncated.
    pub truncated: bool,
}

/// A complete response from [`ChatModel::chat`](crate::llm::ChatModel::chat).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// The assistant's reply.
    pub message: Message,

    /// Token usage for the call, when the provider reports it.
    pub usage: Option<UsageMetadata>,

    /// Extracted reasoning content, present only under
    /// [`ReasoningMode::Separated`](crate::llm::ReasoningMode::Separated) or
    /// [`ReasoningMode::Extended`](crate::llm::ReasoningMode::Extended).
    pub reasoning: Option<ReasoningContent>,

    /// Provider-specific metadata not otherwise modeled (finish reason,
    /// model version actually served, etc.).
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ChatResponse {
    /// Build a response carrying only a message, no usage or reasoning data.
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: None,
            reasoning: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_usage(mut self, usage: UsageMetadata) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_reasoning(mut self, reasoning: ReasoningContent) -> Self {
        self.reasoning = Some(reasoning);
        self
    }
}

/// A streaming response from [`ChatModel::stream`](crate::llm::ChatModel::stream).
///
/// Usage and reasoning are only known once the stream is drained, so unlike
/// [`ChatResponse`] they travel as a final chunk's metadata rather than as
/// fields populated up front; callers fold the stream to recover them.
pub struct ChatStreamResponse {
    /// The chunk-by-chunk message content.
    pub stream: MessageChunkStream,

    /// Reasoning stream, present only under `Separated`/`Extended` modes and
    /// only for providers that stream thinking content separately from the
    /// final answer.
    pub reasoning_stream: Option<MessageChunkStream>,
}

impl ChatStreamResponse {
    pub fn new(stream: MessageChunkStream) -> Self {
        Self {
            stream,
            reasoning_stream: None,
        }
    }

    pub fn with_reasoning_stream(mut self, reasoning_stream: MessageChunkStream) -> Self {
        self.reasoning_stream = Some(reasoning_stream);
        self
    }
}

impl std::fmt::Debug for ChatStreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStreamResponse")
            .field("reasoning_stream", &self.reasoning_stream.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, MessageRole};

    #[test]
    fn chat_response_builder_sets_usage_and_reasoning() {
        let response = ChatResponse::new(Message::assistant("hi"))
            .with_usage(UsageMetadata {
                input_tokens: 10,
                output_tokens: 2,
                reasoning_tokens: None,
                total_tokens: 12,
            })
            .with_reasoning(ReasoningContent {
                content: "thinking...".to_string(),
                truncated: false,
            });

        assert_eq!(response.message.role, MessageRole::Assistant);
        assert_eq!(response.usage.unwrap().total_tokens, 12);
        assert_eq!(response.reasoning.unwrap().content, "thinking...");
    }
}

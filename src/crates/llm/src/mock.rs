//! A deterministic [`ChatModel`] used in place of a real provider in tests.
//!
//! Concrete vendor clients (Ollama, OpenAI, Claude, etc.) are not part of
//! this crate — callers implement `ChatModel` themselves against whatever
//! provider they need. `MockChatModel` exists so the rest of the workspace
//! can exercise gateway, routing, and graph-execution code without a real
//! network call: it returns a fixed or scripted reply and echoes back
//! whatever usage figures it's configured with.

use crate::error::Result;
use crate::provider_utils::{ModelInfo, ProviderUtils};
use async_trait::async_trait;
use futures::stream;
use langgraph_core::llm::{
    ChatModel, ChatRequest, ChatResponse, ChatStreamResponse, ToolDefinition, UsageMetadata,
};
use langgraph_core::llm_stream::MessageChunk;
use langgraph_core::Message;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Replies a [`MockChatModel`] hands out, in order. Once exhausted, the
/// model repeats its last reply rather than erroring, so a test that calls
/// `chat` more times than it scripted still gets a deterministic response.
#[derive(Clone)]
pub struct MockChatModel {
    replies: Arc<Mutex<VecDeque<String>>>,
    last_reply: Arc<Mutex<String>>,
    tools: Vec<ToolDefinition>,
    available: bool,
    model: String,
}

impl MockChatModel {
    /// A model that always answers with `reply`.
    pub fn fixed(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            last_reply: Arc::new(Mutex::new(reply)),
            tools: Vec::new(),
            available: true,
            model: "mock-model".to_string(),
        }
    }

    /// A model that answers each successive `chat` call with the next entry
    /// in `replies`, then keeps repeating the final one.
    pub fn scripted(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut queue: VecDeque<String> = replies.into_iter().map(Into::into).collect();
        let last = queue.back().cloned().unwrap_or_default();
        Self {
            replies: Arc::new(Mutex::new(queue.drain(..).collect())),
            last_reply: Arc::new(Mutex::new(last)),
            tools: Vec::new(),
            available: true,
            model: "mock-model".to_string(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Make `is_available()` report `false`, simulating a provider that is
    /// reachable but down.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    fn next_reply(&self) -> String {
        let mut queue = self.replies.lock();
        match queue.pop_front() {
            Some(reply) => {
                *self.last_reply.lock() = reply.clone();
                reply
            }
            None => self.last_reply.lock().clone(),
        }
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn chat(&self, _request: ChatRequest) -> langgraph_core::error::Result<ChatResponse> {
        let text = self.next_reply();
        let usage = UsageMetadata {
            input_tokens: 0,
            output_tokens: text.split_whitespace().count() as u64,
            reasoning_tokens: None,
            total_tokens: text.split_whitespace().count() as u64,
        };
        Ok(ChatResponse::new(Message::assistant(text)).with_usage(usage))
    }

    async fn stream(
        &self,
        request: ChatRequest,
    ) -> langgraph_core::error::Result<ChatStreamResponse> {
        let response = self.chat(request).await?;
        let text = response
            .message
            .text()
            .unwrap_or_default()
            .to_string();
        let chunk = MessageChunk::new(text).final_chunk();
        let stream = Box::pin(stream::once(async move { chunk }));
        Ok(ChatStreamResponse::new(stream))
    }

    async fn is_available(&self) -> langgraph_core::error::Result<bool> {
        Ok(self.available)
    }

    fn bound_tools(&self) -> Vec<ToolDefinition> {
        self.tools.clone()
    }

    fn clone_box(&self) -> Box<dyn ChatModel> {
        Box::new(self.clone())
    }
}

/// Convenience used by callers that want `Result<_, crate::error::LlmError>`
/// rather than `langgraph_core::error::GraphError` at the call site.
pub fn into_llm_result<T>(result: langgraph_core::error::Result<T>) -> Result<T> {
    result.map_err(|err| crate::error::LlmError::ProviderError(err.to_string()))
}

#[async_trait]
impl ProviderUtils for MockChatModel {
    async fn ping(&self) -> Result<bool> {
        Ok(self.available)
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo::new(&self.model)])
    }

    async fn use_model(&mut self, model: impl Into<String> + Send) -> Result<String> {
        self.model = model.into();
        Ok(self.model.clone())
    }

    fn current_model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_model_always_answers_the_same() {
        let model = MockChatModel::fixed("hello there");
        let request = ChatRequest::new(vec![Message::human("hi")]);

        let first = model.chat(request.clone()).await.unwrap();
        let second = model.chat(request).await.unwrap();

        assert_eq!(first.message.text(), Some("hello there"));
        assert_eq!(second.message.text(), Some("hello there"));
    }

    #[tokio::test]
    async fn scripted_model_advances_then_repeats_last() {
        let model = MockChatModel::scripted(["first", "second"]);
        let request = ChatRequest::new(vec![Message::human("hi")]);

        let r1 = model.chat(request.clone()).await.unwrap();
        let r2 = model.chat(request.clone()).await.unwrap();
        let r3 = model.chat(request).await.unwrap();

        assert_eq!(r1.message.text(), Some("first"));
        assert_eq!(r2.message.text(), Some("second"));
        assert_eq!(r3.message.text(), Some("second"));
    }

    #[tokio::test]
    async fn unavailable_model_reports_unavailable() {
        let model = MockChatModel::fixed("x").unavailable();
        assert!(!model.is_available().await.unwrap());
    }
}

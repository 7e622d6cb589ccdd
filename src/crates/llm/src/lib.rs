//! The outbound model-provider boundary for rorca.
//!
//! This crate does not ship concrete vendor clients (Ollama, OpenAI, Claude,
//! and so on). Those belong to whatever deployment wires a real provider in;
//! integrating one means implementing `langgraph_core::llm::ChatModel`
//! directly, as its own docs describe. What lives here is the *shape* of
//! that boundary from the orchestrator's point of view:
//!
//! - [`LocalLlmConfig`] / [`RemoteLlmConfig`] — connection configuration a
//!   provider implementation can be built from.
//! - [`LlmError`] — an error taxonomy providers can map their own failures
//!   into, so the gateway's retry/breaker logic has one vocabulary to read.
//! - [`provider_utils::ProviderUtils`] — optional extended capabilities
//!   (health ping, model listing, model switching) a provider can opt into.
//! - [`mock::MockChatModel`] — a deterministic `ChatModel` used by the rest
//!   of the workspace's tests in place of a real network call.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::mock::MockChatModel;
//! use langgraph_core::llm::{ChatModel, ChatRequest};
//! use langgraph_core::Message;
//!
//! # async fn run() {
//! let model = MockChatModel::fixed("Rust is a systems language.");
//! let request = ChatRequest::new(vec![Message::human("What is Rust?")]);
//! let response = model.chat(request).await.unwrap();
//! println!("{}", response.message.text().unwrap());
//! # }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod provider_utils;

// Re-export commonly used types
pub use config::{LocalLlmConfig, RemoteLlmConfig};
pub use error::{LlmError, Result};
pub use mock::MockChatModel;
pub use provider_utils::{ModelInfo, ProviderUtils};

// Re-export langgraph-core types for convenience
pub use langgraph_core::llm::{
    ChatConfig, ChatModel, ChatRequest, ChatResponse, ChatStreamResponse, ReasoningContent,
    ReasoningMode, ToolCall, ToolDefinition, ToolResult, UsageMetadata,
};
pub use langgraph_core::Message;


//! Answer generation on top of retrieval.
//!
//! Defines the [`GenerationProvider`] trait, its HTTP implementations, and
//! [`answer`], which retrieves context for a question, assembles the prompt,
//! and asks the provider for a reply.
//!
//! Chat history is an explicit [`Conversation`] value owned by the caller.
//! Providers hold no per-session state; [`Conversation::with_exchange`]
//! returns the extended history and a fresh session is `Conversation::new()`.
//!
//! # Prompt
//!
//! ```text
//! Context: {passage contents scoring above the threshold, joined by ' '}
//! Question: {query}
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{GenerationBackend, GenerationConfig};
use crate::engine::RetrievalEngine;
use crate::error::{ProviderError, Result};
use crate::http::{self, Service};
use crate::models::QueryResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Prior turns of a chat session, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// This conversation followed by one user prompt and the assistant reply.
    pub fn with_exchange(&self, prompt: &str, response: &str) -> Self {
        let mut messages = self.messages.clone();
        messages.push(ChatMessage::user(prompt));
        messages.push(ChatMessage::assistant(response));
        Self { messages }
    }

    /// The messages to send for `prompt`: history plus the new user turn.
    pub fn request_messages(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = self.messages.clone();
        messages.push(ChatMessage::user(prompt));
        messages
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }
}

/// A chat model that answers a prompt given prior turns.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Reply to `prompt` in the context of `conversation`. Does not modify
    /// the conversation.
    async fn generate(
        &self,
        conversation: &Conversation,
        prompt: &str,
    ) -> std::result::Result<String, ProviderError>;
}

// ============ OpenAI-compatible Provider ============

/// Chat provider for OpenAI-compatible `/chat/completions` endpoints
/// (OpenAI, Together, and other hosts selected via `generation.url`).
pub struct OpenAiChat {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    api_key: String,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiChat {
    pub fn new(config: &GenerationConfig) -> std::result::Result<Self, ProviderError> {
        let model = config.model.clone().ok_or_else(|| {
            ProviderError::Generation("generation.model required for OpenAI provider".to_string())
        })?;
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ProviderError::Generation(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;
        let base = config
            .url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/');

        Ok(Self {
            client: http::client(config.timeout_secs, Service::Generation)?,
            model,
            endpoint: format!("{}/chat/completions", base),
            api_key,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        conversation: &Conversation,
        prompt: &str,
    ) -> std::result::Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": conversation.request_messages(prompt),
        });
        let json = http::post_json(
            &self.client,
            &self.endpoint,
            Some(&self.api_key),
            &body,
            self.max_retries,
            self.timeout_secs,
            Service::Generation,
        )
        .await?;
        parse_openai_reply(&json)
    }
}

fn parse_openai_reply(json: &serde_json::Value) -> std::result::Result<String, ProviderError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ProviderError::Generation(
                "invalid OpenAI response: missing choices[0].message.content".to_string(),
            )
        })
}

// ============ Ollama Provider ============

/// Chat provider using a local Ollama instance's `/api/chat` endpoint.
pub struct OllamaChat {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    max_retries: u32,
    timeout_secs: u64,
}

impl OllamaChat {
    pub fn new(config: &GenerationConfig) -> std::result::Result<Self, ProviderError> {
        let model = config.model.clone().ok_or_else(|| {
            ProviderError::Generation("generation.model required for Ollama provider".to_string())
        })?;
        let base = config
            .url
            .as_deref()
            .unwrap_or("http://localhost:11434")
            .trim_end_matches('/');

        Ok(Self {
            client: http::client(config.timeout_secs, Service::Generation)?,
            model,
            endpoint: format!("{}/api/chat", base),
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        conversation: &Conversation,
        prompt: &str,
    ) -> std::result::Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": conversation.request_messages(prompt),
            "stream": false,
        });
        let json = http::post_json(
            &self.client,
            &self.endpoint,
            None,
            &body,
            self.max_retries,
            self.timeout_secs,
            Service::Generation,
        )
        .await?;
        parse_ollama_reply(&json)
    }
}

fn parse_ollama_reply(json: &serde_json::Value) -> std::result::Result<String, ProviderError> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ProviderError::Generation("invalid Ollama response: missing message.content".to_string())
        })
}

/// Create the [`GenerationProvider`] selected by configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | error: [`ProviderError::Disabled`] |
/// | `"openai"` | [`OpenAiChat`] |
/// | `"ollama"` | [`OllamaChat`] |
pub fn create_generator(
    config: &GenerationConfig,
) -> std::result::Result<Arc<dyn GenerationProvider>, ProviderError> {
    match config.provider {
        GenerationBackend::Disabled => Err(ProviderError::Disabled("generation")),
        GenerationBackend::OpenAi => Ok(Arc::new(OpenAiChat::new(config)?)),
        GenerationBackend::Ollama => Ok(Arc::new(OllamaChat::new(config)?)),
    }
}

// ============ Context assembly ============

pub fn build_prompt(context: &str, question: &str) -> String {
    format!("Context: {}\nQuestion: {}", context, question)
}

/// Join the contents of results scoring strictly above `threshold`.
///
/// Returns the joined text and the number of passages it contains.
pub fn relevant_context(response: &QueryResponse, threshold: f32) -> (String, usize) {
    let contents: Vec<&str> = response
        .results
        .iter()
        .filter(|r| r.score > threshold)
        .map(|r| r.content.as_str())
        .collect();
    (contents.join(" "), contents.len())
}

/// The reply to one question, plus the conversation extended by it.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub query: String,
    pub response: String,
    /// Passages that made it into the prompt.
    pub context_passages: usize,
    pub conversation: Conversation,
}

/// Retrieve `top_k` passages for `query`, keep those above `threshold`, and
/// ask `generator` to answer with them as context.
///
/// The returned conversation records the full prompt sent, so later turns
/// see the same context the model saw.
pub async fn answer(
    engine: &RetrievalEngine,
    generator: &dyn GenerationProvider,
    conversation: &Conversation,
    query: &str,
    top_k: usize,
    threshold: f32,
) -> Result<Answer> {
    let retrieved = engine.query(query, top_k).await?;
    let (context, context_passages) = relevant_context(&retrieved, threshold);
    debug!(
        retrieved = retrieved.results.len(),
        context_passages, threshold, "assembled generation context"
    );

    let prompt = build_prompt(&context, &retrieved.query);
    let response = generator.generate(conversation, &prompt).await?;

    Ok(Answer {
        query: query.to_string(),
        conversation: conversation.with_exchange(&prompt, &response),
        response,
        context_passages,
    })
}

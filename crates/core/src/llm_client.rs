use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::generic_types::{ChatMessage, ChatRole};

/// Sampling temperature used for every remote call.
pub const TEMPERATURE: f32 = 0.3;
/// Upper bound on generated tokens for every remote call.
pub const MAX_OUTPUT_TOKENS: u32 = 1024;
/// Placeholder value from sample `.env` files; treated as "no key".
pub const PLACEHOLDER_API_KEY: &str = "GROQ_API_KEY";

/// Ways a remote model call can fail.
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    /// Transport, authentication, or API-level failure reported by the provider SDK.
    #[error("Provider request failed: {0}")]
    Provider(#[from] OpenAIError),
    /// The provider answered without a choice or without message content.
    #[error("Provider response had no text content")]
    EmptyResponse,
}

/// A stream of non-empty text fragments from the LLM.
pub type LLMStream = Pin<Box<dyn Stream<Item = Result<String, LLMError>> + Send>>;

/// A generic client for interacting with an LLM.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Sends the full message list and waits for the complete reply.
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, LLMError>;

    /// Sends the full message list and returns the reply as it is generated.
    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<LLMStream, LLMError>;
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL of the service.
    /// * `model` - The model identifier to use for chat completions.
    /// * `http_client` - Transport used for every request, carrying timeouts and proxy policy.
    pub fn new(config: OpenAIConfig, model: String, http_client: reqwest::Client) -> Self {
        Self {
            client: Client::with_config(config).with_http_client(http_client),
            model,
        }
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(messages)
            .temperature(TEMPERATURE)
            .max_completion_tokens(MAX_OUTPUT_TOKENS);
        if stream {
            args.stream(true);
        }
        args.build()
    }
}

fn to_request_message(msg: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    Ok(match msg.role {
        ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(msg.content.clone())
            .build()?
            .into(),
        ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(msg.content.clone())
            .build()?
            .into(),
        ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(msg.content.clone())
            .build()?
            .into(),
    })
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, LLMError> {
        let request = self.build_request(&messages, false)?;
        let response = self.client.chat().create(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LLMError::EmptyResponse)
    }

    async fn stream(&self, messages: Vec<ChatMessage>) -> Result<LLMStream, LLMError> {
        let request = self.build_request(&messages, true)?;
        let stream = self.client.chat().create_stream(request).await?;

        Ok(Box::pin(stream.filter_map(|result| async move {
            match result {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .filter(|content| !content.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(LLMError::Provider(e))),
            }
        })))
    }
}

/// What is needed to reach the remote model.
#[derive(Clone, Debug)]
pub struct LLMSettings {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

/// Builds the remote model client, or `None` when it cannot be used.
///
/// A missing or placeholder key and any construction failure are logged and
/// reported as `None`, leaving the caller on rule-based replies.
pub fn build_llm_client(settings: &LLMSettings) -> Option<Arc<dyn LLMClient>> {
    let api_key = match settings.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() && key != PLACEHOLDER_API_KEY => key,
        _ => {
            warn!("No usable API key configured, using rule-based responses");
            return None;
        }
    };

    let http_client = match reqwest::Client::builder()
        .timeout(settings.timeout)
        .no_proxy()
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build remote model transport, using rule-based responses");
            return None;
        }
    };

    let config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(&settings.api_base);

    info!(model = %settings.model, api_base = %settings.api_base, "Remote model client initialized");
    Some(Arc::new(OpenAICompatibleClient::new(
        config,
        settings.model.clone(),
        http_client,
    )))
}

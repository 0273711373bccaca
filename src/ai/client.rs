//! OpenAI-backed text generator.

use super::{GeneratorError, PromptRequest, Role, TextGenerator};
use crate::config::AiConfig;
use crate::error::Result;
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use secrecy::{ExposeSecret as _, SecretString};

pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    config: AiConfig,
}

impl OpenAiGenerator {
    pub fn new(api_key: &SecretString, config: AiConfig) -> Self {
        let openai_config = OpenAIConfig::new().with_api_key(api_key.expose_secret());
        let client = Client::with_config(openai_config);

        Self { client, config }
    }

    /// Build a generator with the key named by `config.api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::PipelineError::Config`] when the variable is unset or holds a
    /// placeholder value.
    pub fn from_env(config: AiConfig) -> Result<Self> {
        let key = config.api_key()?;
        Ok(Self::new(&key, config))
    }

    fn build_messages(
        request: &PromptRequest,
    ) -> std::result::Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.as_str())
                .build()?
                .into(),
        ];

        for message in &request.messages {
            let built: ChatCompletionRequestMessage = match message.role {
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content.as_str())
                    .build()?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content.as_str())
                    .build()?
                    .into(),
            };
            messages.push(built);
        }

        Ok(messages)
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, request: &PromptRequest) -> std::result::Result<String, GeneratorError> {
        let messages = Self::build_messages(request)
            .map_err(|e| GeneratorError::Fatal(format!("Failed to build prompt: {e}")))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages(messages)
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens)
            .build()
            .map_err(|e| GeneratorError::Fatal(format!("Failed to build chat request: {e}")))?;

        tracing::debug!(model = %self.config.model, "Requesting plan from OpenAI");

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_error)?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| GeneratorError::Transient("No response content received".to_owned()))
    }
}

fn classify_error(err: OpenAIError) -> GeneratorError {
    match err {
        OpenAIError::Reqwest(e) if e.is_timeout() => GeneratorError::Timeout,
        OpenAIError::Reqwest(e) => GeneratorError::Transient(format!("OpenAI request failed: {e}")),
        OpenAIError::ApiError(api) => {
            let transient = api.code.as_deref() == Some("rate_limit_exceeded")
                || api.r#type.as_deref() == Some("server_error");
            let message = format!("OpenAI API error: {}", api.message);
            if transient {
                GeneratorError::Transient(message)
            } else {
                GeneratorError::Fatal(message)
            }
        }
        other => GeneratorError::Fatal(format!("OpenAI API error: {other}")),
    }
}

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use debate_shared::{ChatMessage, MessageRole};
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::error::ServiceError;

/// Lazily produced text fragments from a streaming completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ServiceError>> + Send>>;

/// A chat-completions backend.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Check that the backend can be called at all, without touching the network.
    fn preflight(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f32,
    ) -> Result<FragmentStream, ServiceError>;

    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f32,
    ) -> Result<String, ServiceError>;
}

/// DeepSeek (OpenAI-compatible) chat completions.
pub struct LlmService {
    client: Option<Client<OpenAIConfig>>,
    timeout: Duration,
    debug: bool,
}

impl LlmService {
    pub fn new(settings: &Settings) -> Self {
        let client = settings.deepseek_api_key.as_ref().map(|key| {
            let config = OpenAIConfig::new()
                .with_api_key(key)
                .with_api_base(&settings.deepseek_base_url);
            Client::with_config(config)
        });
        if client.is_some() {
            info!("LLM service targeting {}", settings.deepseek_base_url);
        } else {
            info!("DEEPSEEK_API_KEY not set; debate endpoints will report a configuration error");
        }
        Self {
            client,
            timeout: settings.upstream_timeout,
            debug: settings.debug,
        }
    }

    fn client(&self) -> Result<&Client<OpenAIConfig>, ServiceError> {
        self.client
            .as_ref()
            .ok_or_else(|| ServiceError::Configuration("DeepSeek API key not configured".to_string()))
    }

    fn build_request(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f32,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, ServiceError> {
        if self.debug {
            for (i, msg) in messages.iter().enumerate() {
                debug!("Prompt[{}] {:?}: {}", i, msg.role, msg.content);
            }
        }

        let messages = messages
            .into_iter()
            .map(convert_to_openai_message)
            .collect::<Result<Vec<_>, _>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(temperature)
            .stream(stream)
            .build()?;
        Ok(request)
    }
}

#[async_trait]
impl ChatCompletion for LlmService {
    fn preflight(&self) -> Result<(), ServiceError> {
        self.client().map(|_| ())
    }

    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f32,
    ) -> Result<FragmentStream, ServiceError> {
        let client = self.client()?;
        let request = self.build_request(messages, model, temperature, true)?;

        // The connection is opened lazily on the first poll, so the relay's
        // idle timeout is what bounds it.
        let stream = client.chat().create_stream(request).await.map_err(|e| {
            error!("Failed to create upstream stream: {:?}", e);
            e
        })?;

        let fragments = stream.filter_map(|result| async move {
            match result {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .map(|choice| Ok(choice.delta.content.unwrap_or_default())),
                Err(e) => {
                    error!("Upstream stream error: {}", e);
                    Some(Err(ServiceError::from(e)))
                }
            }
        });

        Ok(Box::pin(fragments))
    }

    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f32,
    ) -> Result<String, ServiceError> {
        let client = self.client()?;
        let request = self.build_request(messages, model, temperature, false)?;

        let response = tokio::time::timeout(self.timeout, client.chat().create(request))
            .await
            .map_err(|_| ServiceError::Timeout(self.timeout))??;

        let content = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Transport("completion returned no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();

        if self.debug {
            debug!("Completion ({} chars): {}", content.len(), content);
        }
        Ok(content)
    }
}

fn convert_to_openai_message(msg: ChatMessage) -> Result<ChatCompletionRequestMessage, ServiceError> {
    let message = match msg.role {
        MessageRole::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content)
                .build()?,
        ),
        MessageRole::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content)
                .build()?,
        ),
        MessageRole::Assistant => ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(msg.content)
                .build()?,
        ),
    };
    Ok(message)
}

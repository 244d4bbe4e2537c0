use async_trait::async_trait;
use std::error::Error as StdError;
use log::{ debug, info };

use super::{ ChatClient, CompletionResponse, PromptEntry, PromptRole };
use crate::llm::{ LlmConfig, LlmType };
use rllm::chat::{ ChatMessage, ChatRole, MessageType };
use rllm::builder::LLMBuilder;
use rllm::LLMProvider;

/// Hosted model reached through `rllm`. A provider is built per call so the
/// system instruction and temperature travel with each prompt.
pub struct ProviderChatClient {
    llm_type: LlmType,
    api_key: String,
    model: String,
    base_url: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

impl ProviderChatClient {
    pub fn new(
        llm_type: LlmType,
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        timeout_secs: Option<u64>
    ) -> Self {
        let model = model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| llm_type.default_model().to_string());
        Self {
            llm_type,
            api_key,
            model,
            base_url,
            max_tokens,
            timeout_secs,
        }
    }

    /// The credential is checked per turn, so a missing key is not an error here.
    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key.clone().unwrap_or_default();
        Ok(
            Self::new(
                config.llm_type,
                api_key,
                config.completion_model.clone(),
                config.base_url.clone(),
                config.max_tokens,
                config.timeout_secs
            )
        )
    }

    fn build_provider(
        &self,
        system: Option<String>,
        temperature: f32
    ) -> Result<Box<dyn LLMProvider>, Box<dyn StdError + Send + Sync>> {
        let mut builder = LLMBuilder::new()
            .backend(self.llm_type.backend())
            .model(&self.model)
            .temperature(temperature)
            .stream(false);

        if !self.api_key.is_empty() {
            builder = builder.api_key(self.api_key.clone());
        }
        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(tokens) = self.max_tokens {
            builder = builder.max_tokens(tokens);
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout_seconds(secs);
        }
        if let Some(system) = system {
            builder = builder.system(system);
        }

        Ok(builder.build()?)
    }
}

/// Splits a prompt sequence into the provider's system text and chat turns.
pub(crate) fn to_provider_messages(prompt: &[PromptEntry]) -> (Option<String>, Vec<ChatMessage>) {
    let mut system_parts = Vec::new();
    let mut messages = Vec::with_capacity(prompt.len());

    for entry in prompt {
        let role = match entry.role {
            PromptRole::System => {
                system_parts.push(entry.content.as_str());
                continue;
            }
            PromptRole::Human => ChatRole::User,
            PromptRole::Model => ChatRole::Assistant,
        };
        messages.push(ChatMessage {
            role,
            content: entry.content.clone(),
            message_type: MessageType::Text,
        });
    }

    let system = if system_parts.is_empty() { None } else { Some(system_parts.join("\n\n")) };
    (system, messages)
}

#[async_trait]
impl ChatClient for ProviderChatClient {
    async fn chat(
        &self,
        prompt: &[PromptEntry],
        temperature: f32
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let (system, messages) = to_provider_messages(prompt);
        info!(
            "ProviderChatClient::chat() → backend={} model={} turns={} base_url={:?}",
            self.llm_type,
            self.model,
            messages.len(),
            self.base_url
        );
        let provider = self.build_provider(system, temperature)?;
        let resp = provider.chat(&messages).await?;
        let text = resp.text().unwrap_or_default();
        debug!("ProviderChatClient::chat() ← {} chars", text.len());
        Ok(CompletionResponse { response: text })
    }

    fn get_api_key(&self) -> String {
        self.api_key.clone()
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        self.base_url.clone()
    }

    fn requires_api_key(&self) -> bool {
        self.llm_type.requires_api_key()
    }
}

pub mod provider;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::sync::Arc;
use super::LlmConfig;
use self::provider::ProviderChatClient;

/// Role tag of one entry in a prompt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    Human,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptEntry {
    pub role: PromptRole,
    pub content: String,
}

impl PromptEntry {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: PromptRole::System, content: content.into() }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self { role: PromptRole::Human, content: content.into() }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self { role: PromptRole::Model, content: content.into() }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends the whole prompt sequence and returns the model's reply text.
    async fn chat(
        &self,
        prompt: &[PromptEntry],
        temperature: f32
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>>;

    fn get_api_key(&self) -> String;
    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
    fn requires_api_key(&self) -> bool {
        true
    }

    fn has_credentials(&self) -> bool {
        !self.requires_api_key() || !self.get_api_key().trim().is_empty()
    }
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = Arc::new(ProviderChatClient::from_config(config)?);
    Ok(client)
}

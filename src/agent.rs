use crate::error::ChatError;
use crate::history::{ build_prompt, initialize_history_store, ChatStore };
use crate::cli::Args;
use crate::config::prompt;
use crate::llm::{ format::format_response, LlmConfig, LlmType };
use crate::llm::chat::{ ChatClient, new_client as new_chat_client };
use crate::models::chat::{ truncate_with_ellipsis, ChatMessage, Conversation, Role };

use log::{ info, warn, error };
use std::error::Error;
use std::sync::Arc;

const TITLE_MAX_CHARS: usize = 50;

/// Sampling temperature for every chat turn.
pub const CHAT_TEMPERATURE: f32 = 0.7;

/// The persisted halves of a completed turn.
#[derive(Debug, Clone)]
pub struct Turn {
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
}

/// A conversation with its messages, oldest first.
#[derive(Debug, Clone)]
pub struct ConversationThread {
    pub conversation: Conversation,
    pub messages: Vec<ChatMessage>,
}

/// Owns the conversation workflow: history CRUD scoped to the caller and
/// the user → LLM → assistant turn.
#[derive(Clone)]
pub struct ChatAgent {
    chat_client: Arc<dyn ChatClient>,
    history_store: Arc<dyn ChatStore>,
    system_prompt: Arc<str>,
    history_warn_len: usize,
}

impl ChatAgent {
    fn initialize_chat_client(args: &Args) -> Result<Arc<dyn ChatClient>, Box<dyn Error + Send + Sync>> {
        let chat_llm_type: LlmType = args.chat_llm_type.parse()?;
        let chat_api_key = if !args.chat_api_key.trim().is_empty() {
            Some(args.chat_api_key.clone())
        } else {
            None
        };
        let chat_config = LlmConfig {
            llm_type: chat_llm_type,
            base_url: args.chat_base_url.clone(),
            api_key: chat_api_key,
            completion_model: args.chat_model.clone(),
            max_tokens: args.chat_max_tokens,
            timeout_secs: args.chat_timeout_secs,
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={}, Timeout={:?}",
            chat_llm_type,
            chat_client.get_model(),
            chat_client.get_base_url().as_deref().unwrap_or("provider default"),
            chat_config.timeout_secs
        );
        if !chat_client.has_credentials() {
            warn!("No API key configured for {}; chat turns will fail until one is set", chat_llm_type);
        }
        Ok(chat_client)
    }

    pub async fn new(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let chat_client = Self::initialize_chat_client(args)?;
        let history_store = initialize_history_store(args)?;
        let system_prompt = prompt::load_system_prompt(args.system_prompt_path.as_deref())?;

        Ok(
            Self::from_parts(chat_client, history_store, system_prompt).with_history_warn_len(
                args.history_warn_len
            )
        )
    }

    pub fn from_parts(
        chat_client: Arc<dyn ChatClient>,
        history_store: Arc<dyn ChatStore>,
        system_prompt: Arc<str>
    ) -> Self {
        Self {
            chat_client,
            history_store,
            system_prompt,
            history_warn_len: 50,
        }
    }

    pub fn with_history_warn_len(mut self, history_warn_len: usize) -> Self {
        self.history_warn_len = history_warn_len;
        self
    }

    pub fn history_store(&self) -> Arc<dyn ChatStore> {
        Arc::clone(&self.history_store)
    }

    async fn owned_conversation(
        &self,
        conversation_id: i64,
        user_id: i64
    ) -> Result<Conversation, ChatError> {
        self.history_store
            .get_conversation(conversation_id, user_id).await?
            .ok_or(ChatError::NotFound("Conversation"))
    }

    pub async fn start_conversation(
        &self,
        user_id: i64,
        title: Option<String>
    ) -> Result<Conversation, ChatError> {
        let title = title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        let conversation = self.history_store.create_conversation(user_id, title).await?;
        info!("User {} started conversation {}", user_id, conversation.id);
        Ok(conversation)
    }

    /// The caller's conversations with their messages, most recently updated first.
    pub async fn list_conversations(&self, user_id: i64) -> Result<Vec<ConversationThread>, ChatError> {
        let conversations = self.history_store.list_conversations(user_id).await?;
        let mut threads = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let messages = self.history_store.list_messages(conversation.id).await?;
            threads.push(ConversationThread { conversation, messages });
        }
        Ok(threads)
    }

    pub async fn get_conversation(
        &self,
        conversation_id: i64,
        user_id: i64
    ) -> Result<ConversationThread, ChatError> {
        let conversation = self.owned_conversation(conversation_id, user_id).await?;
        let messages = self.history_store.list_messages(conversation.id).await?;
        Ok(ConversationThread { conversation, messages })
    }

    pub async fn delete_conversation(&self, conversation_id: i64, user_id: i64) -> Result<(), ChatError> {
        if !self.history_store.delete_conversation(conversation_id, user_id).await? {
            return Err(ChatError::NotFound("Conversation"));
        }
        info!("User {} deleted conversation {}", user_id, conversation_id);
        Ok(())
    }

    /// Runs one turn. The user message is stored before the model is called
    /// and stays stored when the call fails; the assistant message is stored
    /// only on success.
    pub async fn submit_turn(
        &self,
        conversation_id: i64,
        user_id: i64,
        content: &str
    ) -> Result<Turn, ChatError> {
        let conversation = self.owned_conversation(conversation_id, user_id).await?;
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::field("content", "Message content is required"));
        }

        let user_message = self.history_store.add_message(
            conversation.id,
            Role::User,
            content
        ).await?;

        let stored = self.history_store.list_messages(conversation.id).await?;
        let previous: Vec<ChatMessage> = stored
            .into_iter()
            .filter(|m| m.id != user_message.id)
            .collect();

        let first_user_message = !previous.iter().any(|m| m.role == Role::User);
        if !conversation.has_title() && first_user_message {
            let title = truncate_with_ellipsis(content, TITLE_MAX_CHARS);
            self.history_store.set_title(conversation.id, &title).await?;
        }

        if !self.chat_client.has_credentials() {
            error!("LLM API key not configured; conversation {} left without a reply", conversation.id);
            return Err(ChatError::UpstreamConfig);
        }

        if previous.len() > self.history_warn_len {
            warn!(
                "Conversation {} sends {} prior messages to the model; prompt size grows without bound",
                conversation.id,
                previous.len()
            );
        }
        let prompt = build_prompt(&self.system_prompt, &previous, content);

        let reply = match self.chat_client.chat(&prompt, CHAT_TEMPERATURE).await {
            Ok(resp) if !resp.response.trim().is_empty() => resp.response,
            Ok(_) => {
                error!("LLM API error: empty response for conversation {}", conversation.id);
                return Err(ChatError::Upstream("Empty response from LLM API".to_string()));
            }
            Err(e) => {
                error!("LLM API error: {}", e);
                return Err(ChatError::Upstream(e.to_string()));
            }
        };

        let assistant_message = self.history_store.add_message(
            conversation.id,
            Role::Assistant,
            &format_response(&reply)
        ).await?;

        Ok(Turn { user_message, assistant_message })
    }
}

mod memory;
mod redis;
pub mod context;

pub use context::build_prompt;
pub use memory::MemoryChatStore;
pub use self::redis::RedisChatStore;

use async_trait::async_trait;
use chrono::{ DateTime, Duration, Utc };
use log::info;
use std::sync::Arc;
use thiserror::Error;
use crate::cli::Args;
use crate::models::chat::{ ChatMessage, Conversation, NewUser, Role, User };

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a user with that {field} already exists")]
    Duplicate { field: &'static str },
    #[error("conversation {0} does not exist")]
    MissingConversation(i64),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("stored record is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Persistence for users, their conversations and the messages inside them.
///
/// Conversation reads and deletes take the caller's user id and behave as if
/// the conversation does not exist when it belongs to someone else.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn create_conversation(
        &self,
        user_id: i64,
        title: Option<String>
    ) -> Result<Conversation, StoreError>;

    /// Owner's conversations, most recently updated first.
    async fn list_conversations(&self, user_id: i64) -> Result<Vec<Conversation>, StoreError>;

    async fn get_conversation(
        &self,
        conversation_id: i64,
        user_id: i64
    ) -> Result<Option<Conversation>, StoreError>;

    async fn set_title(&self, conversation_id: i64, title: &str) -> Result<Conversation, StoreError>;

    /// Removes the conversation and all of its messages. Returns false when
    /// nothing owned by `user_id` matched.
    async fn delete_conversation(
        &self,
        conversation_id: i64,
        user_id: i64
    ) -> Result<bool, StoreError>;

    async fn add_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str
    ) -> Result<ChatMessage, StoreError>;

    /// Messages oldest first.
    async fn list_messages(&self, conversation_id: i64) -> Result<Vec<ChatMessage>, StoreError>;
}

/// Creation time for the next message, kept strictly after `last`.
pub(crate) fn next_timestamp(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last {
        Some(last) if now <= last => last + Duration::microseconds(1),
        _ => now,
    }
}

pub fn create_history_store(args: &Args) -> Result<Arc<dyn ChatStore>, StoreError> {
    match args.history_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryChatStore::new())),
        "redis" => {
            let store = RedisChatStore::new(&args.history_host, &args.history_redis_prefix)?;
            Ok(Arc::new(store))
        }
        other => Err(StoreError::Backend(format!("Unsupported history store type: {}", other))),
    }
}

pub fn initialize_history_store(args: &Args) -> Result<Arc<dyn ChatStore>, StoreError> {
    if args.history_type.eq_ignore_ascii_case("memory") {
        info!("Chat history will be kept in process memory");
    } else {
        info!("Chat history will be stored in: {} at {}", args.history_type, args.history_host);
    }
    create_history_store(args)
}

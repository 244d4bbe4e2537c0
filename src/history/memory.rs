use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{ next_timestamp, ChatStore, StoreError };
use crate::models::chat::{ ChatMessage, Conversation, NewUser, Role, User };

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    conversations: BTreeMap<i64, Conversation>,
    messages: BTreeMap<i64, Vec<ChatMessage>>,
    next_user_id: i64,
    next_conversation_id: i64,
    next_message_id: i64,
}

impl MemoryState {
    fn bump(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

/// Process-local store. Everything is lost on restart.
#[derive(Default)]
pub struct MemoryChatStore {
    state: RwLock<MemoryState>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate { field: "username" });
        }
        if state.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::Duplicate { field: "email" });
        }

        let id = MemoryState::bump(&mut state.next_user_id);
        let record = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            is_active: true,
            date_joined: Utc::now(),
        };
        state.users.insert(id, record.clone());
        Ok(record)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn create_conversation(
        &self,
        user_id: i64,
        title: Option<String>
    ) -> Result<Conversation, StoreError> {
        let mut state = self.state.write().await;
        let id = MemoryState::bump(&mut state.next_conversation_id);
        let now = Utc::now();
        let conversation = Conversation {
            id,
            user_id,
            title,
            created_at: now,
            updated_at: now,
        };
        state.conversations.insert(id, conversation.clone());
        state.messages.insert(id, Vec::new());
        Ok(conversation)
    }

    async fn list_conversations(&self, user_id: i64) -> Result<Vec<Conversation>, StoreError> {
        let state = self.state.read().await;
        let mut owned: Vec<Conversation> = state.conversations
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(owned)
    }

    async fn get_conversation(
        &self,
        conversation_id: i64,
        user_id: i64
    ) -> Result<Option<Conversation>, StoreError> {
        let state = self.state.read().await;
        Ok(
            state.conversations
                .get(&conversation_id)
                .filter(|c| c.user_id == user_id)
                .cloned()
        )
    }

    async fn set_title(&self, conversation_id: i64, title: &str) -> Result<Conversation, StoreError> {
        let mut state = self.state.write().await;
        let conversation = state.conversations
            .get_mut(&conversation_id)
            .ok_or(StoreError::MissingConversation(conversation_id))?;
        conversation.title = Some(title.to_string());
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    async fn delete_conversation(
        &self,
        conversation_id: i64,
        user_id: i64
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let owned = state.conversations
            .get(&conversation_id)
            .map(|c| c.user_id == user_id)
            .unwrap_or(false);
        if !owned {
            return Ok(false);
        }
        state.conversations.remove(&conversation_id);
        state.messages.remove(&conversation_id);
        Ok(true)
    }

    async fn add_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str
    ) -> Result<ChatMessage, StoreError> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(&conversation_id) {
            return Err(StoreError::MissingConversation(conversation_id));
        }
        let id = MemoryState::bump(&mut state.next_message_id);
        let last = state.messages
            .get(&conversation_id)
            .and_then(|m| m.last())
            .map(|m| m.created_at);
        let message = ChatMessage {
            id,
            conversation_id,
            role,
            content: content.to_string(),
            created_at: next_timestamp(last),
        };
        state.messages.entry(conversation_id).or_default().push(message.clone());
        if let Some(conversation) = state.conversations.get_mut(&conversation_id) {
            conversation.updated_at = message.created_at;
        }
        Ok(message)
    }

    async fn list_messages(&self, conversation_id: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let state = self.state.read().await;
        Ok(state.messages.get(&conversation_id).cloned().unwrap_or_default())
    }
}

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::warn;
use redis::{ AsyncCommands, Client };
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ next_timestamp, ChatStore, StoreError };
use crate::models::chat::{ ChatMessage, Conversation, NewUser, Role, User };

/// Redis layout, every key under the configured prefix:
///
/// - `user:{id}` / `conversation:{id}` JSON records
/// - `user:username:{name}` and `user:email:{email}` uniqueness reservations
/// - `user:{id}:conversations` set of owned conversation ids
/// - `conversation:{id}:messages` list of JSON messages, oldest first
/// - `{user,conversation,message}:next_id` counters
pub struct RedisChatStore {
    client: Client,
    key_prefix: String,
}

impl RedisChatStore {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}{}", self.key_prefix, suffix)
    }

    fn user_key(&self, user_id: i64) -> String {
        self.key(&format!("user:{}", user_id))
    }

    fn owned_conversations_key(&self, user_id: i64) -> String {
        self.key(&format!("user:{}:conversations", user_id))
    }

    fn conversation_key(&self, conversation_id: i64) -> String {
        self.key(&format!("conversation:{}", conversation_id))
    }

    fn messages_key(&self, conversation_id: i64) -> String {
        self.key(&format!("conversation:{}:messages", conversation_id))
    }

    async fn next_id(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        entity: &str
    ) -> Result<i64, StoreError> {
        let id: i64 = conn.incr(self.key(&format!("{}:next_id", entity)), 1).await?;
        Ok(id)
    }

    async fn load<T: DeserializeOwned>(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        key: &str
    ) -> Result<Option<T>, StoreError> {
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save<T: Serialize + Sync>(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        key: &str,
        value: &T
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        let _: () = conn.set(key, json).await?;
        Ok(())
    }

    /// Overwrites `key` only while it still exists. Returns false when the
    /// record was removed in the meantime.
    async fn save_existing<T: Serialize + Sync>(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        key: &str,
        value: &T
    ) -> Result<bool, StoreError> {
        let json = serde_json::to_string(value)?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(json)
            .arg("XX")
            .query_async(conn).await?;
        Ok(reply.is_some())
    }

    async fn user_by_index(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        index_key: &str
    ) -> Result<Option<User>, StoreError> {
        let id: Option<i64> = conn.get(index_key).await?;
        match id {
            Some(id) => self.load(conn, &self.user_key(id)).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ChatStore for RedisChatStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut conn = self.get_connection().await?;
        let id = self.next_id(&mut conn, "user").await?;
        let username_key = self.key(&format!("user:username:{}", user.username));
        let email_key = self.key(&format!("user:email:{}", user.email.to_lowercase()));

        let reserved: bool = conn.set_nx(&username_key, id).await?;
        if !reserved {
            return Err(StoreError::Duplicate { field: "username" });
        }
        let reserved: bool = conn.set_nx(&email_key, id).await?;
        if !reserved {
            let _: i64 = conn.del(&username_key).await?;
            return Err(StoreError::Duplicate { field: "email" });
        }

        let record = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            is_active: true,
            date_joined: Utc::now(),
        };
        self.save(&mut conn, &self.user_key(id), &record).await?;
        Ok(record)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StoreError> {
        let mut conn = self.get_connection().await?;
        self.load(&mut conn, &self.user_key(user_id)).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.get_connection().await?;
        let index_key = self.key(&format!("user:email:{}", email.to_lowercase()));
        self.user_by_index(&mut conn, &index_key).await
    }

    async fn create_conversation(
        &self,
        user_id: i64,
        title: Option<String>
    ) -> Result<Conversation, StoreError> {
        let mut conn = self.get_connection().await?;
        let id = self.next_id(&mut conn, "conversation").await?;
        let now = Utc::now();
        let conversation = Conversation {
            id,
            user_id,
            title,
            created_at: now,
            updated_at: now,
        };
        self.save(&mut conn, &self.conversation_key(id), &conversation).await?;
        let _: i64 = conn.sadd(self.owned_conversations_key(user_id), id).await?;
        Ok(conversation)
    }

    async fn list_conversations(&self, user_id: i64) -> Result<Vec<Conversation>, StoreError> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<i64> = conn.smembers(self.owned_conversations_key(user_id)).await?;
        let mut conversations = Vec::with_capacity(ids.len());

        for id in ids {
            let conversation: Option<Conversation> = self.load(
                &mut conn,
                &self.conversation_key(id)
            ).await?;
            match conversation {
                Some(conversation) if conversation.user_id == user_id => conversations.push(conversation),
                _ => warn!("Conversation {} listed for user {} but not found", id, user_id),
            }
        }

        newest_first(&mut conversations);
        Ok(conversations)
    }

    async fn get_conversation(
        &self,
        conversation_id: i64,
        user_id: i64
    ) -> Result<Option<Conversation>, StoreError> {
        let mut conn = self.get_connection().await?;
        let conversation: Option<Conversation> = self.load(
            &mut conn,
            &self.conversation_key(conversation_id)
        ).await?;
        Ok(conversation.filter(|c| c.user_id == user_id))
    }

    async fn set_title(&self, conversation_id: i64, title: &str) -> Result<Conversation, StoreError> {
        let mut conn = self.get_connection().await?;
        let key = self.conversation_key(conversation_id);
        let mut conversation: Conversation = self
            .load(&mut conn, &key).await?
            .ok_or(StoreError::MissingConversation(conversation_id))?;
        conversation.title = Some(title.to_string());
        conversation.updated_at = Utc::now();
        if !self.save_existing(&mut conn, &key, &conversation).await? {
            return Err(StoreError::MissingConversation(conversation_id));
        }
        Ok(conversation)
    }

    async fn delete_conversation(
        &self,
        conversation_id: i64,
        user_id: i64
    ) -> Result<bool, StoreError> {
        let mut conn = self.get_connection().await?;
        let conversation: Option<Conversation> = self.load(
            &mut conn,
            &self.conversation_key(conversation_id)
        ).await?;
        if !conversation.map(|c| c.user_id == user_id).unwrap_or(false) {
            return Ok(false);
        }

        let _: i64 = conn.del(
            vec![self.conversation_key(conversation_id), self.messages_key(conversation_id)]
        ).await?;
        let _: i64 = conn.srem(self.owned_conversations_key(user_id), conversation_id).await?;
        Ok(true)
    }

    async fn add_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str
    ) -> Result<ChatMessage, StoreError> {
        let mut conn = self.get_connection().await?;
        let conversation_key = self.conversation_key(conversation_id);
        let mut conversation: Conversation = self
            .load(&mut conn, &conversation_key).await?
            .ok_or(StoreError::MissingConversation(conversation_id))?;

        let messages_key = self.messages_key(conversation_id);
        let last: Option<String> = conn.lindex(&messages_key, -1).await?;
        let last_created = last_created_at(last.as_deref())?;

        let message = ChatMessage {
            id: self.next_id(&mut conn, "message").await?,
            conversation_id,
            role,
            content: content.to_string(),
            created_at: next_timestamp(last_created),
        };
        let json_msg = serde_json::to_string(&message)?;
        let _: i64 = conn.rpush(&messages_key, &json_msg).await?;

        conversation.updated_at = message.created_at;
        if !self.save_existing(&mut conn, &conversation_key, &conversation).await? {
            // Deleted while appending; drop the list the push recreated.
            let _: i64 = conn.del(&messages_key).await?;
            return Err(StoreError::MissingConversation(conversation_id));
        }
        Ok(message)
    }

    async fn list_messages(&self, conversation_id: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let mut conn = self.get_connection().await?;
        let json_entries: Vec<String> = conn.lrange(self.messages_key(conversation_id), 0, -1).await?;
        decode_messages(&json_entries)
    }
}

fn decode_messages(entries: &[String]) -> Result<Vec<ChatMessage>, StoreError> {
    entries
        .iter()
        .map(|entry| serde_json::from_str(entry).map_err(StoreError::from))
        .collect()
}

/// Creation time of the newest stored message, from its raw list entry.
fn last_created_at(entry: Option<&str>) -> Result<Option<DateTime<Utc>>, StoreError> {
    match entry {
        Some(json) => Ok(Some(serde_json::from_str::<ChatMessage>(json)?.created_at)),
        None => Ok(None),
    }
}

fn newest_first(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_the_configured_prefix() {
        let store = RedisChatStore::new("redis://127.0.0.1:6379", "care:").unwrap();
        assert_eq!(store.user_key(4), "care:user:4");
        assert_eq!(store.owned_conversations_key(4), "care:user:4:conversations");
        assert_eq!(store.conversation_key(9), "care:conversation:9");
        assert_eq!(store.messages_key(9), "care:conversation:9:messages");
    }

    #[test]
    fn invalid_url_is_a_backend_error() {
        let err = RedisChatStore::new("not a url", "care:").err().unwrap();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    fn stored_message(id: i64, content: &str, created_at: DateTime<Utc>) -> String {
        serde_json::to_string(&ChatMessage {
            id,
            conversation_id: 1,
            role: Role::User,
            content: content.into(),
            created_at,
        }).unwrap()
    }

    #[test]
    fn unreadable_message_fails_the_whole_read() {
        let entries = vec![stored_message(1, "fine", Utc::now()), "{broken".to_string()];
        let err = decode_messages(&entries).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn messages_decode_in_list_order() {
        let now = Utc::now();
        let entries = vec![stored_message(1, "first", now), stored_message(2, "second", now)];
        let messages = decode_messages(&entries).unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn next_message_time_follows_the_last_entry() {
        let future = Utc::now() + chrono::Duration::seconds(30);
        let entry = stored_message(1, "ahead", future);
        let last = last_created_at(Some(&entry)).unwrap();
        assert_eq!(last, Some(future));
        assert!(next_timestamp(last) > future);

        assert_eq!(last_created_at(None).unwrap(), None);
        assert!(matches!(last_created_at(Some("nope")), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn conversations_sort_newest_update_first() {
        let now = Utc::now();
        let conversation = |id: i64, age_secs: i64| Conversation {
            id,
            user_id: 1,
            title: None,
            created_at: now,
            updated_at: now - chrono::Duration::seconds(age_secs),
        };
        let mut conversations = vec![conversation(1, 30), conversation(2, 0), conversation(3, 30)];
        newest_first(&mut conversations);
        let ids: Vec<i64> = conversations.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    // The tests below need a running redis; HISTORY_HOST selects it.
    // Run with `cargo test -- --ignored`.

    fn live_store() -> RedisChatStore {
        let host = std::env::var("HISTORY_HOST").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        RedisChatStore::new(&host, &format!("care-test:{}:", uuid::Uuid::new_v4())).unwrap()
    }

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "x".into(),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn live_usernames_and_emails_are_reserved() {
        let store = live_store();
        store.create_user(new_user("ana", "ana@example.com")).await.unwrap();

        let err = store.create_user(new_user("ana", "other@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "username" }));

        let err = store.create_user(new_user("bob", "ANA@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "email" }));

        // The username taken by the failed attempt was released.
        let bob = store.create_user(new_user("bob", "bob@example.com")).await.unwrap();
        let found = store.find_user_by_email("BOB@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, bob.id);
    }

    #[tokio::test]
    #[ignore]
    async fn live_messages_keep_order_and_delete_cascades() {
        let store = live_store();
        let conversation = store.create_conversation(1, None).await.unwrap();
        let mut previous = None;
        for i in 0..5 {
            let message = store
                .add_message(conversation.id, Role::User, &format!("m{}", i)).await
                .unwrap();
            if let Some(prev) = previous {
                assert!(message.created_at > prev);
            }
            previous = Some(message.created_at);
        }

        let messages = store.list_messages(conversation.id).await.unwrap();
        assert_eq!(messages.len(), 5);
        assert!(messages.windows(2).all(|w| w[0].created_at < w[1].created_at));
        let updated = store.get_conversation(conversation.id, 1).await.unwrap().unwrap();
        assert_eq!(Some(updated.updated_at), previous);

        assert!(!store.delete_conversation(conversation.id, 2).await.unwrap());
        assert!(store.delete_conversation(conversation.id, 1).await.unwrap());
        assert!(store.list_messages(conversation.id).await.unwrap().is_empty());
        assert!(store.list_conversations(1).await.unwrap().is_empty());
        let err = store.add_message(conversation.id, Role::User, "late").await.unwrap_err();
        assert!(matches!(err, StoreError::MissingConversation(_)));
    }
}

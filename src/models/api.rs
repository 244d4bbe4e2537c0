use chrono::{ DateTime, Utc };
use serde::{ Serialize, Deserialize };
use super::chat::{ truncate_with_ellipsis, ChatMessage, Conversation, Role, User };

const LIST_PREVIEW_CHARS: usize = 100;

#[derive(Deserialize, Debug, Default)]
pub struct SignupRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub date_joined: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            date_joined: user.date_joined,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct SessionResponse {
    pub message: String,
    pub user: UserResponse,
    pub token: String,
}

#[derive(Serialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatMessageResponse {
    pub id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ChatMessage> for ChatMessageResponse {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id,
            role: message.role,
            content: message.content.clone(),
            created_at: message.created_at,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ConversationDetail {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessageResponse>,
    pub message_count: usize,
}

impl ConversationDetail {
    pub fn new(conversation: &Conversation, messages: &[ChatMessage]) -> Self {
        Self {
            id: conversation.id,
            title: conversation.title.clone().unwrap_or_default(),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            messages: messages.iter().map(ChatMessageResponse::from).collect(),
            message_count: messages.len(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LastMessagePreview {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
pub struct ConversationSummary {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message: Option<LastMessagePreview>,
    pub message_count: usize,
}

impl ConversationSummary {
    pub fn new(conversation: &Conversation, messages: &[ChatMessage]) -> Self {
        let last_message = messages.last().map(|m| LastMessagePreview {
            role: m.role,
            content: truncate_with_ellipsis(&m.content, LIST_PREVIEW_CHARS),
            created_at: m.created_at,
        });
        Self {
            id: conversation.id,
            title: conversation.title.clone().unwrap_or_default(),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            last_message,
            message_count: messages.len(),
        }
    }
}

/// Both halves of a completed turn.
#[derive(Serialize, Debug)]
pub struct TurnResponse {
    pub user_message: ChatMessageResponse,
    pub assistant_message: ChatMessageResponse,
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub status: String,
}

use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use axum::Json;
use log::error;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::history::StoreError;

/// Field name → messages, shaped like a form-validation response.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Key used for errors that concern the request as a whole.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{message}")]
    Validation {
        message: String,
        fields: FieldErrors,
    },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Authentication credentials were not provided or are invalid")]
    Unauthorized,
    #[error("LLM API key not configured")]
    UpstreamConfig,
    #[error("Error calling LLM API: {0}")]
    Upstream(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), vec![message.clone()]);
        ChatError::Validation { message, fields }
    }

    /// Builds a validation error from collected field errors; `None` when empty.
    pub fn from_fields(fields: FieldErrors) -> Option<Self> {
        let message = fields.values().flatten().next()?.clone();
        Some(ChatError::Validation { message, fields })
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Validation { .. } => StatusCode::BAD_REQUEST,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Unauthorized => StatusCode::UNAUTHORIZED,
            ChatError::UpstreamConfig
            | ChatError::Upstream(_)
            | ChatError::Store(_)
            | ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a FieldErrors>,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, fields) = match &self {
            ChatError::Validation { message, fields } => (message.clone(), Some(fields)),
            ChatError::Store(e) => {
                error!("Storage error: {}", e);
                ("Storage error".to_string(), None)
            }
            ChatError::Internal(e) => {
                error!("Internal error: {}", e);
                ("Internal server error".to_string(), None)
            }
            other => (other.to_string(), None),
        };
        (status, Json(ErrorBody { error: message, fields })).into_response()
    }
}

pub mod password;
pub mod session;

use axum::extract::{ FromRef, FromRequestParts };
use axum::http::header::{ AUTHORIZATION, COOKIE };
use axum::http::request::Parts;
use axum::http::HeaderMap;
use log::{ info, warn };
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{ ChatError, FieldErrors, NON_FIELD_ERRORS };
use crate::history::{ ChatStore, StoreError };
use crate::models::api::{ LoginRequest, SignupRequest };
use crate::models::chat::{ NewUser, User };
use self::password::{ hash_password_blocking, verify_password_blocking };
use self::session::{ SessionSigner, SESSION_COOKIE };

const USERNAME_MAX_CHARS: usize = 150;
const PASSWORD_MIN_CHARS: usize = 8;

static USERNAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.@+-]+$").unwrap());

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session token is malformed")]
    MalformedToken,
    #[error("session token signature mismatch")]
    BadSignature,
    #[error("session token expired")]
    Expired,
    #[error("session key rejected")]
    InvalidKey,
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Account creation, login and session checks.
pub struct AuthService {
    store: Arc<dyn ChatStore>,
    signer: SessionSigner,
}

impl AuthService {
    pub fn new(store: Arc<dyn ChatStore>, signer: SessionSigner) -> Self {
        Self { store, signer }
    }

    pub fn signer(&self) -> &SessionSigner {
        &self.signer
    }

    /// Creates the account and returns it with a fresh session token.
    pub async fn signup(&self, req: SignupRequest) -> Result<(User, String), ChatError> {
        validate_signup(&req)?;

        let password_hash = hash_password_blocking(req.password.clone()).await.map_err(|e|
            ChatError::Internal(e.to_string())
        )?;
        let new_user = NewUser {
            username: req.username.trim().to_string(),
            email: req.email.trim().to_string(),
            password_hash,
        };
        let user = match self.store.create_user(new_user).await {
            Ok(user) => user,
            Err(StoreError::Duplicate { field }) => {
                return Err(ChatError::field(field, format!("A user with that {} already exists.", field)));
            }
            Err(e) => return Err(e.into()),
        };

        info!("Created user {} ({})", user.id, user.username);
        let token = self.issue(&user)?;
        Ok((user, token))
    }

    pub async fn login(&self, req: LoginRequest) -> Result<(User, String), ChatError> {
        let mut fields = FieldErrors::new();
        check_email(&req.email, &mut fields);
        if req.password.is_empty() {
            push(&mut fields, "password", "This field may not be blank.");
        }
        if let Some(err) = ChatError::from_fields(fields) {
            return Err(err);
        }

        let invalid = || ChatError::field(NON_FIELD_ERRORS, "Invalid email or password");
        let user = self.store.find_user_by_email(req.email.trim()).await?.ok_or_else(invalid)?;
        if !verify_password_blocking(user.password_hash.clone(), req.password.clone()).await {
            return Err(invalid());
        }
        if !user.is_active {
            return Err(ChatError::field(NON_FIELD_ERRORS, "User account is disabled"));
        }

        let token = self.issue(&user)?;
        Ok((user, token))
    }

    fn issue(&self, user: &User) -> Result<String, ChatError> {
        self.signer.issue(user.id).map_err(|e| ChatError::Internal(e.to_string()))
    }

    /// Resolves a session token to an active user.
    pub async fn authenticate(&self, token: &str) -> Result<User, ChatError> {
        let user_id = self.signer.verify(token).map_err(|e| {
            warn!("Rejected session token: {}", e);
            ChatError::Unauthorized
        })?;
        match self.store.get_user(user_id).await? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(ChatError::Unauthorized),
        }
    }
}

fn push(fields: &mut FieldErrors, field: &str, message: &str) {
    fields.entry(field.to_string()).or_default().push(message.to_string());
}

fn check_email(email: &str, fields: &mut FieldErrors) {
    let email = email.trim();
    if email.is_empty() {
        push(fields, "email", "This field may not be blank.");
    } else if !is_valid_email(email) {
        push(fields, "email", "Enter a valid email address.");
    }
}

fn check_password(field: &str, value: &str, fields: &mut FieldErrors) {
    if value.is_empty() {
        push(fields, field, "This field may not be blank.");
    } else if value.chars().count() < PASSWORD_MIN_CHARS {
        push(fields, field, "Ensure this field has at least 8 characters.");
    }
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() &&
        !email.chars().any(char::is_whitespace) &&
        !domain.contains('@') &&
        domain.contains('.') &&
        domain.split('.').all(|label| !label.is_empty())
}

pub fn validate_signup(req: &SignupRequest) -> Result<(), ChatError> {
    let mut fields = FieldErrors::new();

    let username = req.username.trim();
    if username.is_empty() {
        push(&mut fields, "username", "This field may not be blank.");
    } else if username.chars().count() > USERNAME_MAX_CHARS {
        push(&mut fields, "username", "Ensure this field has no more than 150 characters.");
    } else if !USERNAME_CHARS.is_match(username) {
        push(
            &mut fields,
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
        );
    }
    check_email(&req.email, &mut fields);
    check_password("password", &req.password, &mut fields);
    check_password("password_confirm", &req.password_confirm, &mut fields);

    if fields.is_empty() && req.password != req.password_confirm {
        push(&mut fields, NON_FIELD_ERRORS, "Passwords don't match");
    }

    match ChatError::from_fields(fields) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Session token from `Authorization: Bearer` or the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// The signed-in user, extracted from the request's session token.
pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
    where Arc<AuthService>: FromRef<S>, S: Send + Sync
{
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        let token = session_token(&parts.headers).ok_or(ChatError::Unauthorized)?;
        let user = auth.authenticate(&token).await?;
        Ok(AuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryChatStore;
    use axum::http::HeaderValue;

    fn service() -> AuthService {
        AuthService::new(Arc::new(MemoryChatStore::new()), SessionSigner::new("secret", 3600))
    }

    fn signup_request(username: &str, email: &str) -> SignupRequest {
        SignupRequest {
            username: username.into(),
            email: email.into(),
            password: "password123".into(),
            password_confirm: "password123".into(),
        }
    }

    fn field_messages(err: &ChatError, field: &str) -> Vec<String> {
        match err {
            ChatError::Validation { fields, .. } => fields.get(field).cloned().unwrap_or_default(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("ana@example.com"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ana@@example.com"));
        assert!(!is_valid_email("ana @example.com"));
        assert!(!is_valid_email("ana@example..com"));
    }

    #[test]
    fn signup_reports_every_bad_field() {
        let req = SignupRequest {
            username: "bad name!".into(),
            email: "nope".into(),
            password: "short".into(),
            password_confirm: String::new(),
        };
        let err = validate_signup(&req).unwrap_err();
        assert_eq!(field_messages(&err, "username").len(), 1);
        assert_eq!(field_messages(&err, "email"), vec!["Enter a valid email address."]);
        assert_eq!(
            field_messages(&err, "password"),
            vec!["Ensure this field has at least 8 characters."]
        );
        assert_eq!(field_messages(&err, "password_confirm"), vec!["This field may not be blank."]);
    }

    #[test]
    fn mismatched_passwords_are_a_non_field_error() {
        let mut req = signup_request("ana", "ana@example.com");
        req.password_confirm = "password124".into();
        let err = validate_signup(&req).unwrap_err();
        assert_eq!(field_messages(&err, NON_FIELD_ERRORS), vec!["Passwords don't match"]);
    }

    #[tokio::test]
    async fn signup_then_login_issues_working_tokens() {
        let auth = service();
        let (user, token) = auth.signup(signup_request("ana", "ana@example.com")).await.unwrap();
        assert_eq!(auth.authenticate(&token).await.unwrap().id, user.id);

        let (same, token) = auth
            .login(LoginRequest { email: "ana@example.com".into(), password: "password123".into() }).await
            .unwrap();
        assert_eq!(same.id, user.id);
        assert_eq!(auth.authenticate(&token).await.unwrap().username, "ana");
    }

    #[tokio::test]
    async fn duplicate_username_is_a_field_error() {
        let auth = service();
        auth.signup(signup_request("ana", "ana@example.com")).await.unwrap();
        let err = auth.signup(signup_request("ana", "other@example.com")).await.unwrap_err();
        assert_eq!(
            field_messages(&err, "username"),
            vec!["A user with that username already exists."]
        );
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let auth = service();
        auth.signup(signup_request("ana", "ana@example.com")).await.unwrap();

        let wrong = auth
            .login(LoginRequest { email: "ana@example.com".into(), password: "password999".into() }).await
            .unwrap_err();
        let unknown = auth
            .login(LoginRequest { email: "bea@example.com".into(), password: "password123".into() }).await
            .unwrap_err();
        assert_eq!(wrong.to_string(), "Invalid email or password");
        assert_eq!(unknown.to_string(), "Invalid email or password");
    }

    #[tokio::test]
    async fn token_for_missing_user_is_unauthorized() {
        let auth = service();
        let token = auth.signer().issue(99).unwrap();
        assert!(matches!(auth.authenticate(&token).await.unwrap_err(), ChatError::Unauthorized));
    }

    #[test]
    fn token_is_read_from_bearer_or_cookie() {
        let mut headers = HeaderMap::new();
        assert!(session_token(&headers).is_none());

        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session=abc"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers).as_deref(), Some("xyz"));
    }
}

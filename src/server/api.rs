use crate::agent::{ ChatAgent, ConversationThread };
use crate::auth::session::SessionSigner;
use crate::auth::{ AuthService, AuthUser };
use crate::error::{ ChatError, NON_FIELD_ERRORS };
use crate::models::api::{
    ChatMessageResponse,
    ConversationDetail,
    ConversationSummary,
    CreateConversationRequest,
    HealthResponse,
    LoginRequest,
    MessageResponse,
    SendMessageRequest,
    SessionResponse,
    SignupRequest,
    TurnResponse,
    UserResponse,
};
use axum::{
    body::Bytes,
    extract::{ FromRef, Path, State },
    http::{ header::SET_COOKIE, StatusCode },
    response::IntoResponse,
    routing::{ get, post },
    Json,
    Router,
};
use log::{ error, info };
use serde::de::DeserializeOwned;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{ Any, CorsLayer };

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ChatAgent>,
    pub auth: Arc<AuthService>,
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.auth)
    }
}

pub struct TlsPaths {
    pub cert_path: String,
    pub key_path: String,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/signup", post(signup_handler))
        .route("/api/login", post(login_handler))
        .route("/api/logout", post(logout_handler))
        .route("/api/user", get(current_user_handler))
        .route("/api/conversations", get(list_conversations_handler).post(create_conversation_handler))
        .route(
            "/api/conversations/{id}",
            get(get_conversation_handler).delete(delete_conversation_handler)
        )
        .route("/api/conversations/{id}/messages", post(send_message_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    addr: &str,
    state: AppState,
    tls: Option<TlsPaths>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;
    let app = build_router(state);

    match tls {
        Some(paths) => {
            let _ = rustls::crypto::ring::default_provider().install_default();
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                &paths.cert_path,
                &paths.key_path
            ).await?;
            info!("Starting HTTPS API server on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                e
            })?;
            info!("Starting HTTP API server on: http://{}", addr);
            axum::serve(listener, app.into_make_service()).await?;
        }
    }

    Ok(())
}

/// Reads a JSON body; an empty body is the request type's default.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ChatError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ChatError::field(NON_FIELD_ERRORS, format!("JSON parse error - {}", e)))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".into() })
}

async fn signup_handler(
    State(state): State<AppState>,
    body: Bytes
) -> Result<impl IntoResponse, ChatError> {
    let req: SignupRequest = parse_body(&body)?;
    let (user, token) = state.auth.signup(req).await?;
    let cookie = state.auth.signer().cookie(&token);
    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, cookie)],
        Json(SessionResponse {
            message: "User created successfully".into(),
            user: UserResponse::from(&user),
            token,
        }),
    ))
}

async fn login_handler(
    State(state): State<AppState>,
    body: Bytes
) -> Result<impl IntoResponse, ChatError> {
    let req: LoginRequest = parse_body(&body)?;
    let (user, token) = state.auth.login(req).await?;
    info!("User {} logged in", user.id);
    let cookie = state.auth.signer().cookie(&token);
    Ok((
        [(SET_COOKIE, cookie)],
        Json(SessionResponse {
            message: "Login successful".into(),
            user: UserResponse::from(&user),
            token,
        }),
    ))
}

async fn logout_handler(AuthUser(user): AuthUser) -> impl IntoResponse {
    info!("User {} logged out", user.id);
    (
        [(SET_COOKIE, SessionSigner::clear_cookie())],
        Json(MessageResponse { message: "Logout successful".into() }),
    )
}

async fn current_user_handler(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}

async fn list_conversations_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser
) -> Result<Json<Vec<ConversationSummary>>, ChatError> {
    let threads = state.agent.list_conversations(user.id).await?;
    let summaries = threads
        .iter()
        .map(|thread| ConversationSummary::new(&thread.conversation, &thread.messages))
        .collect();
    Ok(Json(summaries))
}

async fn create_conversation_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Bytes
) -> Result<impl IntoResponse, ChatError> {
    let req: CreateConversationRequest = parse_body(&body)?;
    let conversation = state.agent.start_conversation(user.id, req.title).await?;
    Ok((StatusCode::CREATED, Json(ConversationDetail::new(&conversation, &[]))))
}

async fn get_conversation_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>
) -> Result<Json<ConversationDetail>, ChatError> {
    let ConversationThread { conversation, messages } = state.agent.get_conversation(id, user.id).await?;
    Ok(Json(ConversationDetail::new(&conversation, &messages)))
}

async fn delete_conversation_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>
) -> Result<Json<MessageResponse>, ChatError> {
    state.agent.delete_conversation(id, user.id).await?;
    Ok(Json(MessageResponse { message: "Conversation deleted".into() }))
}

async fn send_message_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    body: Bytes
) -> Result<impl IntoResponse, ChatError> {
    let req: SendMessageRequest = parse_body(&body)?;
    let turn = state.agent.submit_turn(id, user.id, &req.content).await?;
    Ok((
        StatusCode::CREATED,
        Json(TurnResponse {
            user_message: ChatMessageResponse::from(&turn.user_message),
            assistant_message: ChatMessageResponse::from(&turn.assistant_message),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Default, Debug)]
    struct Sample {
        #[serde(default)]
        name: String,
    }

    #[test]
    fn empty_body_is_default() {
        let sample: Sample = parse_body(&Bytes::from_static(b"  ")).unwrap();
        assert_eq!(sample.name, "");
    }

    #[test]
    fn malformed_body_is_a_validation_error() {
        let err = parse_body::<Sample>(&Bytes::from_static(b"{not json")).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn body_fields_are_read() {
        let sample: Sample = parse_body(&Bytes::from_static(br#"{"name":"ana"}"#)).unwrap();
        assert_eq!(sample.name, "ana");
    }
}

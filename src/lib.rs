pub mod agent;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;

use agent::ChatAgent;
use auth::session::SessionSigner;
use auth::AuthService;
use cli::Args;
use log::{ info, warn };
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("provider default"));
    info!("History Store Type: {}", args.history_type);
    if !args.history_type.eq_ignore_ascii_case("memory") {
        info!("History Store Host: {}", args.history_host);
    }
    info!("History Warning Length: {}", args.history_warn_len);
    info!("System Prompt Path: {}", args.system_prompt_path.as_deref().unwrap_or("built-in"));
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let agent = Arc::new(ChatAgent::new(&args).await?);

    let signer = match args.session_secret.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(secret) => SessionSigner::new(secret, args.session_ttl_secs),
        None => {
            warn!("SESSION_SECRET not set; using a random secret, sessions end on restart");
            SessionSigner::random(args.session_ttl_secs)
        }
    };
    let auth = Arc::new(AuthService::new(agent.history_store(), signer));

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, agent, auth, args);
    server.run().await?;

    Ok(())
}

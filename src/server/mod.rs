pub mod api;

use crate::agent::ChatAgent;
use crate::auth::AuthService;
use crate::cli::Args;
use api::{ AppState, TlsPaths };
use log::warn;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    agent: Arc<ChatAgent>,
    auth: Arc<AuthService>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, agent: Arc<ChatAgent>, auth: Arc<AuthService>, args: Args) -> Self {
        Self {
            addr,
            agent,
            auth,
            args,
        }
    }

    fn tls_paths(&self) -> Option<TlsPaths> {
        if !self.args.enable_tls {
            return None;
        }
        match (&self.args.tls_cert_path, &self.args.tls_key_path) {
            (Some(cert_path), Some(key_path)) =>
                Some(TlsPaths {
                    cert_path: cert_path.clone(),
                    key_path: key_path.clone(),
                }),
            _ => {
                warn!("ENABLE_TLS is set but TLS_CERT_PATH or TLS_KEY_PATH is missing; serving plain HTTP");
                None
            }
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let state = AppState {
            agent: Arc::clone(&self.agent),
            auth: Arc::clone(&self.auth),
        };
        api::start_http_server(&self.addr, state, self.tls_paths()).await
    }
}

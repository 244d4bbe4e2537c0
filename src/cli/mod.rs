use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- History Store Args ---
    /// History chat store type (memory, redis)
    #[arg(long, env = "HISTORY_TYPE", default_value = "memory")]
    pub history_type: String,

    /// History chat store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for Redis history keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "care:")]
    pub history_redis_prefix: String,

    /// Log a warning when a conversation sent to the LLM holds more stored messages than this.
    /// History is never truncated.
    #[arg(long, env = "HISTORY_WARN_LEN", default_value = "50")]
    pub history_warn_len: usize,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (gemini, openai, anthropic, ollama, deepseek, xai, groq)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "gemini")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let the provider handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider. Turns fail with a configuration error while unset.
    #[arg(long, env = "CHAT_API_KEY", default_value = "", hide_env_values = true)]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gemini-2.5-flash-lite, gpt-4o, llama3)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on provider defaults if None
    pub chat_model: Option<String>,

    /// Maximum tokens the model may generate per reply.
    #[arg(long, env = "CHAT_MAX_TOKENS")]
    pub chat_max_tokens: Option<u32>,

    /// Timeout in seconds for one LLM call. Unset keeps the client library default.
    #[arg(long, env = "CHAT_TIMEOUT_SECS")]
    pub chat_timeout_secs: Option<u64>,

    // --- Prompt Args ---
    /// Optional JSON file ({"system_prompt": "..."}) overriding the built-in system prompt.
    #[arg(long, env = "SYSTEM_PROMPT_PATH")]
    pub system_prompt_path: Option<String>,

    // --- Session Args ---
    /// Secret used to sign session tokens. A random one is generated when unset,
    /// which logs everybody out on restart.
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,

    /// Lifetime of a session token in seconds.
    #[arg(long, env = "SESSION_TTL_SECS", default_value = "1209600")] // 14 days
    pub session_ttl_secs: i64,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:8000")]
    pub server_addr: String,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

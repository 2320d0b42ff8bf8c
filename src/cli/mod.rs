use crate::llm::chat::BoxError;
use crate::llm::{ LlmConfig, LlmType };
use clap::{ Args as ClapArgs, Parser, Subcommand };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the chat relay HTTP server.
    Serve(ServeArgs),
    /// Open the interactive chat in this terminal, talking to a running relay.
    Chat(ChatArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Host address and port for the relay to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (openai, ollama, anthropic, gemini, deepseek, xai, groq)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai")]
    pub chat_llm_type: String,

    /// Endpoint of the Chat LLM provider. Full completions URL for OpenAI-compatible
    /// providers, server root for Ollama (e.g., http://localhost:11434)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider
    #[arg(long, env = "CHAT_API_KEY", default_value = "", hide_env_values = true)]
    pub chat_api_key: String,

    /// Model name for chat completion
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    // --- Relay Args ---
    /// Longest a single reply may stream before it is cut off, in seconds.
    #[arg(long, env = "MAX_DURATION_SECS", default_value = "60")]
    pub max_duration_secs: u64,

    /// Optional text file replacing the built-in system prompt.
    #[arg(long, env = "SYSTEM_PROMPT_FILE")]
    pub system_prompt_file: Option<String>,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl ServeArgs {
    /// Provider settings for the relay. Unset model and URL fall through to
    /// the provider's own defaults.
    pub fn llm_config(&self) -> Result<LlmConfig, BoxError> {
        let llm_type: LlmType = self.chat_llm_type.parse()?;
        Ok(LlmConfig {
            llm_type,
            api_key: Some(self.chat_api_key.clone()).filter(|k| !k.is_empty()),
            completion_model: self.chat_model.clone().filter(|m| !m.is_empty()),
            base_url: self.chat_base_url.clone(),
        })
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ChatArgs {
    /// Base URL of the relay server.
    #[arg(long, env = "RELAY_URL", default_value = "http://127.0.0.1:3000")]
    pub relay_url: String,

    /// Stream protocol to request from the relay (data, text)
    #[arg(long, env = "STREAM_PROTOCOL", default_value = "data")]
    pub protocol: String,
}

pub mod cli;
pub mod codec;
pub mod config;
pub mod llm;
pub mod models;
pub mod relay;
pub mod server;
pub mod ui;

use cli::{ Args, Command, ServeArgs };
use config::prompt::load_system_prompt;
use llm::chat::{ new_client, BoxError, ChatClient };
use log::info;
use relay::Relay;
use server::Server;
use std::time::Duration;

pub async fn run(args: Args) -> Result<(), BoxError> {
    match args.command {
        Command::Serve(serve) => run_server(serve).await,
        Command::Chat(chat) => ui::terminal::run(chat).await,
    }
}

async fn run_server(args: ServeArgs) -> Result<(), BoxError> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("(provider default)"));
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("(provider default)"));
    info!("Max Response Duration: {}s", args.max_duration_secs);
    info!("System Prompt File: {}", args.system_prompt_file.as_deref().unwrap_or("(built-in)"));
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let client = new_client(&args.llm_config()?)?;
    info!("Chat model resolved to: {}", client.get_model());
    let system_prompt = load_system_prompt(args.system_prompt_file.as_deref())?;
    let relay = Relay::new(client, system_prompt, Duration::from_secs(args.max_duration_secs));

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, relay, args);
    server.run().await?;

    Ok(())
}

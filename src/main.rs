use civic_assistant::cli::Args;
use civic_assistant::llm::chat::BoxError;
use clap::Parser;
use dotenv::dotenv;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    civic_assistant::run(args).await
}

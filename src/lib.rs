pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod server;

use cli::{ Args, Command, ServeArgs };
use log::info;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    match args.command {
        Command::Serve(serve_args) => serve(serve_args).await,
        Command::Chat(chat_args) => client::terminal::run_repl(chat_args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat API Key: {}", if args.chat_api_key.trim().is_empty() { "missing" } else { "set" });
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("provider default"));
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("provider default"));
    info!("Max Completion Tokens: {}", args.max_completion_tokens);
    info!("Temperature: {}", args.temperature);
    info!("Top P: {}", args.top_p);
    info!(
        "System Prompt: {}",
        args.system_prompt_path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "built-in".to_string())
    );
    info!("CORS Enabled: {}", args.enable_cors);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let server = Server::new(args)?;
    server.run().await
}

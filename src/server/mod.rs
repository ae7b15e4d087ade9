pub mod api;

use crate::cli::ServeArgs;
use crate::config::prompt::load_system_prompt;
use crate::llm::chat::new_client;
use crate::llm::{ GenerationParams, LlmConfig, LlmType };
use self::api::{ router, AppState };
use std::error::Error;
use std::net::SocketAddr;
use log::{ error, info };

pub struct Server {
    args: ServeArgs,
    state: AppState,
}

impl Server {
    pub fn new(args: ServeArgs) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let state = build_state(&args)?;
        Ok(Self { args, state })
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.args.server_addr.parse::<SocketAddr>()?;
        let app = router(self.state, self.args.enable_cors);

        if self.args.enable_tls {
            let (cert_path, key_path) = match (&self.args.tls_cert_path, &self.args.tls_key_path) {
                (Some(cert), Some(key)) => (cert, key),
                (Some(_), None) | (None, Some(_)) => {
                    error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                    return Err("Missing TLS certificate or key path".into());
                }
                (None, None) => {
                    error!("--enable-tls was set but no certificate/key paths provided.");
                    return Err("TLS enabled without cert/key".into());
                }
            };

            info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;

            info!("Chat relay listening on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
        } else {
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
                e
            })?;

            info!("Chat relay listening on: http://{}", listener.local_addr()?);
            axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
        }

        info!("Chat relay stopped");
        Ok(())
    }
}

/// Resolves provider, persona and sampling settings. A missing API key is not
/// fatal: the server still starts and answers every chat with a 500.
pub fn build_state(args: &ServeArgs) -> Result<AppState, Box<dyn Error + Send + Sync>> {
    let llm_type: LlmType = args.chat_llm_type.parse()?;
    let system_prompt = load_system_prompt(args.system_prompt_path.as_deref())?;

    let config = LlmConfig {
        llm_type,
        api_key: Some(args.chat_api_key.clone()).filter(|k| !k.trim().is_empty()),
        completion_model: args.chat_model.clone(),
        base_url: args.chat_base_url.clone(),
    };

    let chat_client = if config.api_key.is_some() {
        let client = new_client(&config)?;
        info!("Chat client configured: Type={}, Model={}, BaseURL={}", llm_type, client.get_model(), client.get_base_url());
        Some(client)
    } else {
        error!("CEREBRAS_API_KEY is not set. Chat functionality will not work.");
        None
    };

    let params = GenerationParams {
        model: args.chat_model.clone().unwrap_or_else(|| llm_type.default_model().to_string()),
        max_completion_tokens: args.max_completion_tokens,
        temperature: args.temperature,
        top_p: args.top_p,
    };

    Ok(AppState { chat_client, system_prompt, params })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

use std::sync::Arc;

use assistant_desk::cli::TerminalChat;
use assistant_desk::config::AppConfig;
use assistant_desk::conversation::{ChatSession, ContextPolicy, Orchestrator};
use assistant_desk::llm::{CompletionGateway, OpenAiGateway};
use assistant_desk::server::api_routes;
use assistant_desk::store::{ConversationStore, LibSqlBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("  export OPENAI_API_KEY=sk-...");
        std::process::exit(1);
    });

    let openai = OpenAiGateway::new(&config.provider)?;
    let model = openai.model_name().to_string();
    let gateway: Arc<dyn CompletionGateway> = Arc::new(openai);

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn ConversationStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );

    let orchestrator = Arc::new(
        Orchestrator::new(store, gateway.clone()).with_context_policy(config.context_policy),
    );

    eprintln!("💬 Assistant Desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", model);
    eprintln!("   Database: {}", config.db_path.display());
    match config.context_policy {
        ContextPolicy::Unbounded => eprintln!("   Context: full history"),
        ContextPolicy::LastMessages(n) => eprintln!("   Context: last {} messages", n),
    }
    eprintln!("   API: http://0.0.0.0:{}/api/conversations", config.port);
    eprintln!("   Chat API: http://0.0.0.0:{}/api/assistant-chat\n", config.port);

    let app = api_routes(orchestrator.clone(), gateway);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "HTTP server started");

    match config.cli_assistant {
        Some(assistant_type) => {
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!("HTTP server stopped: {}", e);
                }
            });
            TerminalChat::new(ChatSession::new(orchestrator, assistant_type))
                .run()
                .await;
        }
        None => axum::serve(listener, app).await?,
    }

    Ok(())
}

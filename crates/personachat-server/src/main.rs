//! PersonaChat server binary: persona chatbots over OpenAI and Gemini.

use std::sync::Arc;

use personachat_core::ChatConfig;
use personachat_server::{build_router, AppState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!("PersonaChat: persona chatbot server");
    println!();
    println!("Usage: personachat [command]");
    println!();
    println!("Commands:");
    println!("  (none)     Start the server");
    println!("  check      Show which providers are configured");
    println!("  help       Show this help message");
    println!();
    println!("Environment:");
    println!("  OPENAI_API_KEY, GEMINI_API_KEY, OPENAI_MODEL, GEMINI_MODEL,");
    println!("  OPENAI_API_BASE, GEMINI_API_BASE, DEFAULT_PROVIDER, PORT,");
    println!("  PERSONACHAT_CONFIG (JSON config file, default personachat.json)");
}

fn print_check(config: &ChatConfig) {
    let status = config.status();
    let mark = |ok: bool| if ok { "configured" } else { "missing" };
    println!("Config file:      {}", config.config_path.display());
    println!("Default provider: {}", status.default_provider);
    println!("OpenAI:           {} ({})", mark(status.openai_configured), status.openai_model);
    println!("Gemini:           {} ({})", mark(status.gemini_configured), status.gemini_model);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ChatConfig::load(&ChatConfig::default_path());

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--check" | "check" => {
                print_check(&config);
                let status = config.status();
                std::process::exit(if status.openai_configured || status.gemini_configured {
                    0
                } else {
                    1
                });
            }
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'personachat help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let status = config.status();
    if !status.openai_configured && !status.gemini_configured {
        warn!("No server-side API keys configured; only client-supplied OpenAI keys will work");
    }
    info!(
        "Providers: openai={} ({}), gemini={} ({}), default={}",
        status.openai_configured,
        status.openai_model,
        status.gemini_configured,
        status.gemini_model,
        status.default_provider
    );

    let port = config.port;
    let state = Arc::new(AppState::from_config(&config)?);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("PersonaChat server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

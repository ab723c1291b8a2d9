use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Use the library instead of redeclaring modules
use logo_service::{
    config::Config,
    database::Database,
    llm::{anthropic::AnthropicClient, openai::OpenAiClient, LlmClient},
    processing::ImageProcessor,
    providers::{github::GithubProvider, llm::LlmSearchProvider, LogoProvider},
    service::LogoService,
    storage::LogoStorage,
    web::WebServer,
};

#[derive(Parser)]
#[command(name = "logo-service")]
#[command(version = "0.1.0")]
#[command(about = "Stock ticker logo acquisition and serving service")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Bulk import logos from external sources
    Import {
        /// Import source: all, github
        #[arg(long, default_value = "all")]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with specified level
    let log_filter = if cli.log_level == "trace" {
        format!("logo_service={},tower_http=trace", cli.log_level)
    } else {
        format!("logo_service={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting logo service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration from specified file
    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("Configuration loaded from: {}", cli.config);

    // Override config with CLI arguments
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }

    info!("Using database: {}", config.database.url);

    let database = Database::new(&config.database.url).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    let storage = LogoStorage::new(config.storage.logo_path.clone());
    let processor = ImageProcessor::new();

    let mut providers: Vec<Arc<dyn LogoProvider>> =
        vec![Arc::new(GithubProvider::new(config.github.repos.clone()))];

    match build_llm_provider(&config, database.clone()) {
        Some(provider) => providers.push(Arc::new(provider)),
        None => warn!("No LLM backends configured, logo discovery limited to GitHub repos"),
    }

    let service = LogoService::new(database, storage, processor, providers);

    // Cancelled on SIGINT/SIGTERM; in-flight acquisitions, rate-limit waits,
    // and background imports all observe it
    let shutdown_token = CancellationToken::new();
    spawn_signal_handler(shutdown_token.clone());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let server = WebServer::new(config, service, shutdown_token.clone())?;
            info!(
                "Starting web server on {}:{}",
                server.host(),
                server.port()
            );
            server.serve(shutdown_token).await?;
        }
        Command::Import { source } => {
            let stats = service.import(&source, &shutdown_token).await?;
            info!(
                "Import complete: {} total, {} imported, {} skipped, {} failed",
                stats.total, stats.imported, stats.skipped, stats.failed
            );
            if !stats.errors.is_empty() {
                warn!("Import had {} errors", stats.errors.len());
            }
        }
    }

    Ok(())
}

/// Build LLM clients in the configured order. Backends without an API key
/// in config or environment are skipped; with no usable backend at all the
/// LLM layer is left out entirely.
fn build_llm_provider(config: &Config, database: Database) -> Option<LlmSearchProvider> {
    let mut clients: Vec<Box<dyn LlmClient>> = Vec::new();

    for name in &config.llm.provider_order {
        match name.as_str() {
            "anthropic" => {
                let mut api_key = config.llm.anthropic.api_key.clone();
                if api_key.is_empty() {
                    api_key = std::env::var("LOGO_LLM_ANTHROPIC_API_KEY").unwrap_or_default();
                }
                if !api_key.is_empty() {
                    info!("LLM backend added: anthropic ({})", config.llm.anthropic.model);
                    clients.push(Box::new(AnthropicClient::new(
                        api_key,
                        config.llm.anthropic.model.clone(),
                    )));
                }
            }
            "openai" => {
                let mut api_key = config.llm.openai.api_key.clone();
                if api_key.is_empty() {
                    api_key = std::env::var("LOGO_LLM_OPENAI_API_KEY").unwrap_or_default();
                }
                if !api_key.is_empty() {
                    info!("LLM backend added: openai ({})", config.llm.openai.model);
                    clients.push(Box::new(OpenAiClient::new(
                        api_key,
                        config.llm.openai.model.clone(),
                    )));
                }
            }
            other => {
                warn!("Unknown LLM provider '{}' in config, skipping", other);
            }
        }
    }

    if clients.is_empty() {
        return None;
    }

    Some(LlmSearchProvider::new(
        clients,
        config.llm.rate_per_minute,
        database,
    ))
}

fn spawn_signal_handler(shutdown_token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sig) => sig,
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    return;
                }
            };
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(sig) => sig,
                Err(e) => {
                    error!("Failed to install SIGINT handler: {}", e);
                    return;
                }
            };

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            info!("Received Ctrl+C, shutting down gracefully");
        }

        shutdown_token.cancel();
    });
}

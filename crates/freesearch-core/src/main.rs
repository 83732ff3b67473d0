use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use freesearch_core::{
    http, prompts, stdio, ChatCompletionClient, CompletionProvider, Config, Dispatcher,
    TemplateStore, ToolRegistry,
};
use freesearch_tools::DuckDuckGoClient;

#[derive(Parser)]
#[command(name = "freesearch", version, about = "Free web search and summarization tools over JSON-RPC")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve newline-delimited JSON-RPC on stdin/stdout
    Stdio {
        /// YAML file overriding the bundled prompt templates
        #[arg(long)]
        prompt_file: Option<PathBuf>,
    },
    /// Serve JSON-RPC over HTTP
    Serve {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        prompt_file: Option<PathBuf>,
    },
}

fn init_tracing(to_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "freesearch=debug,info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    // stdout belongs to the protocol in stdio mode
    if to_stderr {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(unix)]
fn spawn_reload_on_sighup(templates: Arc<TemplateStore>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading templates");
            if let Err(e) = prompts::reload_off_runtime(templates.clone()).await {
                warn!("Template reload failed, keeping previous templates: {}", e);
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_reload_on_sighup(_templates: Arc<TemplateStore>) -> Result<()> {
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Stdio { prompt_file: None });

    init_tracing(matches!(command, Command::Stdio { .. }));
    info!("FreeSearch {} starting up...", env!("CARGO_PKG_VERSION"));

    dotenvy::dotenv().ok();
    let mut config = Config::from_env()?;
    match &command {
        Command::Stdio { prompt_file } => {
            if prompt_file.is_some() {
                config.prompt_file = prompt_file.clone();
            }
        }
        Command::Serve { port, prompt_file } => {
            if let Some(port) = port {
                config.http_port = *port;
            }
            if prompt_file.is_some() {
                config.prompt_file = prompt_file.clone();
            }
        }
    }

    info!("Configuration loaded");
    info!("  DuckDuckGo API: {}", config.ddg_api_url);
    match &config.prompt_file {
        Some(path) => info!("  Prompt overrides: {}", path.display()),
        None => info!("  Prompt overrides: none"),
    }

    let source = Arc::new(
        DuckDuckGoClient::new()
            .context("Failed to build DuckDuckGo client")?
            .with_base_url(config.ddg_api_url.clone()),
    );
    let templates = Arc::new(
        TemplateStore::new(config.prompt_file.clone()).context("Failed to load prompt templates")?,
    );
    info!("Templates loaded: {:?}", templates.names());

    let completion: Option<Arc<dyn CompletionProvider>> = match config.completion() {
        Some(settings) => {
            info!("Completion endpoint enabled ({})", settings.model);
            Some(Arc::new(ChatCompletionClient::new(settings)?))
        }
        None => {
            warn!("COMPLETION_API_URL/COMPLETION_MODEL not set - summarize returns the rendered prompt");
            None
        }
    };

    let tools = ToolRegistry::standard(source, templates.clone(), completion);
    let dispatcher = Arc::new(Dispatcher::new(tools, templates.clone()));

    spawn_reload_on_sighup(templates)?;

    match command {
        Command::Stdio { .. } => {
            info!("Serving JSON-RPC on stdio");
            tokio::select! {
                result = stdio::run_stdio(dispatcher) => result?,
                _ = shutdown_signal() => {}
            }
        }
        Command::Serve { .. } => {
            http::serve(dispatcher, config.http_port, shutdown_signal()).await?;
        }
    }

    info!("FreeSearch has shut down.");
    Ok(())
}

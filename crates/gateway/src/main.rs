use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wh_domain::config::Config;
use wh_gateway::api;
use wh_gateway::state::AppState;
use wh_providers::{LlmProvider, OpenAiCompatProvider};
use wh_store::Store;

#[derive(Parser)]
#[command(name = "wheelhouse", about = "Web-facing LLM agent orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "wheelhouse.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP/SSE server (default).
    Serve,
    /// Print the version and exit.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = load_config(&cli.config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Version) => {
            println!("wheelhouse {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,wh_gateway=debug")),
        )
        .init();
}

/// Load the TOML config; a missing file yields defaults so the server
/// comes up (LLM-less) out of the box.
fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("wheelhouse starting");

    let db_path = config.resolved_db_path();
    let store = Arc::new(Store::open(&db_path).context("opening database")?);
    tracing::info!(path = %db_path.display(), "database ready");

    let provider: Option<Arc<dyn LlmProvider>> = if config.llm.base_url.is_empty() {
        tracing::warn!(
            "no LLM endpoint configured — sessions are browsable but turns will return 503; \
             set [llm] base_url and api_key in the config"
        );
        None
    } else {
        let provider = OpenAiCompatProvider::new(
            &config.llm.base_url,
            &config.llm.api_key,
            &config.llm.model,
            std::time::Duration::from_secs(config.llm.request_timeout_secs),
        )
        .context("building LLM provider")?;
        tracing::info!(base_url = %config.llm.base_url, model = %config.llm.model, "LLM provider ready");
        Some(Arc::new(provider))
    };

    let state = AppState::new(config.clone(), store, provider).context("assembling state")?;
    tracing::info!(fs_root = %state.fs_root.display(), "sandbox root ready");

    let app = api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app).await.context("server error")
}

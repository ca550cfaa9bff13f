mod cli;
mod config;
mod repl;
mod storage;

use std::sync::Arc;

use crate::cli::ConfigCommand;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use todo_agent::{
    openrouter::{OpenRouterModel, OpenRouterSettings, API_KEY_ENV},
    rate_limit::RateLimiter,
    tools::{TodoClient, TodoToolbox},
    ChatFacade, Dispatcher,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Overrides `OPENROUTER_API_KEY` when both are set.
const API_KEY_OVERRIDE_ENV: &str = "TODO_AGENT_API_KEY";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command.unwrap_or(cli::Command::Chat) {
        cli::Command::Chat => {
            let facade = build_facade(&config)?;
            repl::run(&facade).await?
        }
        cli::Command::Ask { prompt } => run_ask(prompt, &config).await?,
        cli::Command::Serve { bind, database } => run_serve(bind, database, &config).await?,
        cli::Command::Version => print_version(),
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("todo-cli {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

async fn run_ask(prompt: Vec<String>, config: &config::Config) -> Result<()> {
    let facade = build_facade(config)?;
    let reply = facade.chat(&prompt.join(" ")).await;
    println!("{reply}");
    Ok(())
}

async fn run_serve(
    bind: Option<std::net::SocketAddr>,
    database: Option<std::path::PathBuf>,
    config: &config::Config,
) -> Result<()> {
    let addr = bind.unwrap_or(config.server.bind);
    let database = database.or_else(|| config.server.database.clone());
    let repo = storage::open_repo(database.as_deref())?;
    info!(%addr, persistent = database.is_some(), "starting todo store");
    todo_server::serve(addr, repo)
        .await
        .map_err(|e| eyre!("todo store stopped: {e:#}"))
}

/// Wire the model, tools and limiter into a chat façade.
fn build_facade(config: &config::Config) -> Result<ChatFacade> {
    let limiter = RateLimiter::per_minute(config.agent.requests_per_minute)?;
    let settings = resolve_openrouter_settings(config, |name| std::env::var(name).ok())?;
    info!(model = %settings.model, "using openrouter");
    let model = OpenRouterModel::new(settings).map_err(|e| eyre!("{e:#}"))?;

    let toolbox = TodoToolbox::new(TodoClient::new(config.agent.resource_url.clone()));
    let dispatcher = Dispatcher::new(Arc::new(limiter), Arc::new(model), Arc::new(toolbox))
        .with_max_rounds(config.agent.max_rounds);
    Ok(ChatFacade::new(dispatcher))
}

/// Key precedence: config file, then `TODO_AGENT_API_KEY`, then `OPENROUTER_API_KEY`.
fn resolve_openrouter_settings(
    config: &config::Config,
    env: impl Fn(&str) -> Option<String>,
) -> Result<OpenRouterSettings> {
    let api_key = config
        .openrouter
        .api_key
        .clone()
        .or_else(|| env(API_KEY_OVERRIDE_ENV))
        .or_else(|| env(API_KEY_ENV))
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            eyre!("no OpenRouter API key; set {API_KEY_ENV} or add api_key under [openrouter]")
        })?;

    let mut settings = OpenRouterSettings::new(api_key);
    if let Some(model) = &config.openrouter.model {
        settings.model = model.clone();
    }
    settings.api_base = config.openrouter.endpoint.clone();
    Ok(settings)
}

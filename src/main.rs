mod config;
mod context;
mod error;
mod event;
mod gate;
mod handler;
mod helper;
mod lead_store;
mod llm;
mod logging;
mod pipeline;
mod plugin;
mod search;
mod volatile_state;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use serenity::{all::GatewayIntents, Client};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::{mpsc, RwLock};

/// Discord bot that collects business leads and drafts cold emails for them.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file.  Defaults to ~/.config/leadbot/config.toml
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    discord_token: Option<String>,
    /// Bearer token for the chat endpoint, if it wants one
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,
    #[arg(long, env = "SERPER_API_KEY", hide_env_values = true)]
    search_api_key: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Default)]
enum Command {
    /// Connect to Discord and answer commands
    #[default]
    Serve,
    /// Draft emails for every pending lead from the terminal, then exit
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::Config::load(cli.config).await?;
    cfg.apply(config::Overrides {
        discord_token: cli.discord_token,
        llm_api_key: cli.llm_api_key,
        search_api_key: cli.search_api_key,
    });

    let store = lead_store::LeadStore::new(&cfg.storage.pending_leads, &cfg.storage.lead_dir);
    store.init().await?;
    let gate = Arc::new(gate::CallGate::new(
        cfg.rate_limit.max_calls,
        cfg.rate_limit_period(),
    ));
    log_internal!(
        "Allowing {} LLM call(s) every {} second(s)",
        gate.max_calls(),
        gate.time_period().as_secs()
    );

    match cli.command.unwrap_or_default() {
        Command::Serve => serve(cfg, store, gate).await,
        Command::Run => run(cfg, store, gate).await,
    }
}

async fn serve(
    cfg: config::Config,
    store: lead_store::LeadStore,
    gate: Arc<gate::CallGate>,
) -> anyhow::Result<()> {
    let token = match cfg.discord_token() {
        Ok(token) => token.to_owned(),
        Err(e) => {
            log_error!("{}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(RwLock::new(store));
    let vstate = Arc::new(RwLock::new(volatile_state::VolatileState::new()));
    let (pipeline_tx, pipeline_rx) = mpsc::unbounded_channel();
    let handler = handler::Handler::new(
        Arc::new(cfg),
        Arc::clone(&store),
        Arc::clone(&vstate),
        gate,
        pipeline_tx,
    );

    // Things we want discord to tell us about.
    let intents = GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .await?;
    tokio::spawn(pipeline::relay(
        pipeline_rx,
        Arc::clone(&client.http),
        store,
        vstate,
    ));

    client.start().await.map_err(Into::into)
}

async fn run(
    cfg: config::Config,
    store: lead_store::LeadStore,
    gate: Arc<gate::CallGate>,
) -> anyhow::Result<()> {
    let leads = store.queue.list_pending().await?;
    if leads.is_empty() {
        log_internal!("No pending leads");
        return Ok(());
    }
    log_internal!("Drafting emails for {} lead(s)", leads.len());

    let pipeline = pipeline::Pipeline::from_config(&cfg, gate, store.files.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    pipeline.run(leads.into_vec(), None, tx).await;

    let store = RwLock::new(store);
    let vstate = RwLock::new(volatile_state::VolatileState::new());
    let mut failed = false;
    while let Some(event) = rx.recv().await {
        failed |= matches!(event.update, pipeline::PipelineUpdate::Failed { .. });
        if let Some(text) = pipeline::apply(&event.update, &store, &vstate).await {
            log_internal!("{}", text);
        }
    }

    if failed {
        return Err(anyhow!("Email automation stopped early"));
    }
    Ok(())
}

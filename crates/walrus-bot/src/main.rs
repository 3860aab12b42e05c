use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use election::{
    ElectionController, ElectionRegistry, EventBus, GuildMembershipProvider, InMemoryOntology,
    OntologyClient, OntologySync,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use walrus_bot::api::{create_router, AppState};
use walrus_bot::commands::CommandDispatcher;
use walrus_bot::discord::DiscordClient;
use walrus_bot::event_log;
use walrus_bot::foundry::{FoundryClient, FoundryCredentials};
use walrus_bot::BotConfig;

#[derive(Debug, Parser)]
#[command(name = "walrus-bot", about = "Guild election bot")]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "WALRUS_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Mirror guilds, members, roles and channels into the ontology on startup
    #[arg(long)]
    sync_on_startup: bool,

    /// Rewrite every mirrored object, not just missing ones
    #[arg(long, requires = "sync_on_startup")]
    force_sync: bool,

    /// Keep the ontology in process memory instead of Foundry
    #[arg(long)]
    in_memory_ontology: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = BotConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.api.bind = bind;
    }
    config.validate(args.in_memory_ontology)?;

    info!(
        bind = %config.api.bind,
        discord_api = %config.discord.api_base,
        foundry = %config.foundry.url,
        in_memory_ontology = args.in_memory_ontology,
        "Walrus bot starting"
    );

    let platform: Arc<dyn GuildMembershipProvider> = Arc::new(DiscordClient::new(
        config.discord.api_base.clone(),
        config.discord.token.clone(),
    ));
    let ontology: Arc<dyn OntologyClient> = if args.in_memory_ontology {
        warn!("Using in-memory ontology; settings and results are lost on exit");
        Arc::new(InMemoryOntology::new())
    } else {
        Arc::new(FoundryClient::new(
            config.foundry.url.clone(),
            config.foundry.ontology.clone(),
            FoundryCredentials {
                client_id: config.foundry.client_id.clone(),
                client_secret: config.foundry.client_secret.clone(),
            },
        ))
    };

    if args.sync_on_startup {
        let report = OntologySync::new(Arc::clone(&platform), Arc::clone(&ontology))
            .sync_ontology(args.force_sync)
            .await
            .context("Ontology sync failed")?;
        info!(?report, "Startup sync finished");
    }

    let controller = Arc::new(ElectionController::new(
        Arc::clone(&platform),
        ontology,
        ElectionRegistry::new().shared(),
        EventBus::new().shared(),
        config.controller_config(),
    ));
    // Outlives the HTTP server so cancellations during shutdown are logged
    let event_log_stop = CancellationToken::new();
    let event_log = tokio::spawn(event_log::log_events(
        controller.events().subscribe(),
        event_log_stop.clone(),
    ));

    let commands = Arc::new(CommandDispatcher::new(
        Arc::clone(&controller),
        platform,
        config.commands.prefix.clone(),
    ));
    let app = create_router(AppState::new(
        Arc::clone(&controller),
        commands,
        config.api.token.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(&config.api.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.api.bind))?;
    info!(addr = %config.api.bind, "HTTP API listening");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
        }
        info!("Shutdown requested");
        signal.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .context("HTTP server failed")?;

    controller.shutdown().await;
    event_log_stop.cancel();
    if let Err(e) = event_log.await {
        warn!("Election event log task failed: {e}");
    }
    info!("Walrus bot stopped");
    Ok(())
}

use anyhow::{bail, Context};
use clap::{Arg, ArgAction, Command};
use draftsync_core::SystemClock;
use draftsync_server::{
    AppState, ConcurrencyController, InMemoryReportRepository, ServerConfig, StaticSessions,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Command::new("draftsync-server")
        .version(draftsync_server::VERSION)
        .about("Report endpoint with optimistic concurrency for draftsync clients")
        .arg(
            Arg::new("bind")
                .long("bind")
                .value_parser(clap::value_parser!(SocketAddr))
                .help("Listen address (overrides the config file)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("session")
                .long("session")
                .action(ArgAction::Append)
                .value_name("TOKEN=NAME")
                .help("Accept a bearer token for the given editor name (repeatable)"),
        );

    let matches = cli.get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ServerConfig::from_file(path).with_context(|| format!("loading {path}"))?,
        None => ServerConfig::new(),
    };
    if let Some(bind) = matches.get_one::<SocketAddr>("bind") {
        config = config.with_bind(*bind);
    }
    for session in matches.get_many::<String>("session").unwrap_or_default() {
        let Some((token, name)) = session.split_once('=') else {
            bail!("--session expects TOKEN=NAME, got '{session}'");
        };
        config = config.with_session(token.trim(), name.trim());
    }
    config.validate()?;

    if config.sessions.is_empty() {
        tracing::warn!("No sessions configured; every request will be rejected with 401");
    }

    let controller = ConcurrencyController::new(
        Arc::new(InMemoryReportRepository::new()),
        Arc::new(SystemClock),
    );
    let sessions = Arc::new(StaticSessions::from_pairs(config.sessions.clone()));
    let state = AppState::new(controller, sessions);

    let (addr, server) = draftsync_server::http::bind_with_shutdown(state, config.bind, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", err);
        }
    })
    .with_context(|| format!("binding {}", config.bind))?;

    tracing::info!("draftsync-server {} listening on {}", draftsync_server::VERSION, addr);
    server.await;
    tracing::info!("Shut down");

    Ok(())
}

mod pidfile;
mod signals;
mod telemetry;
mod ws_client;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use vargos_gateway::{server, ChannelRegistry};
use vargos_protocol::{DEFAULT_HOST, DEFAULT_PORT};
use vargos_service_traits::Services;

#[derive(Parser)]
#[command(name = "vargos", about = "Vargos — personal-assistant gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// `DEBUG=<scope,scope,...>` or `DEBUG=1` — scoped debug logging (spec.md §6).
    #[arg(long, global = true, env = "DEBUG")]
    debug: Option<String>,

    /// Address:port the gateway binds to.
    #[arg(long, global = true, default_value_t = format!("{DEFAULT_HOST}:{DEFAULT_PORT}"))]
    bind: String,

    /// Overrides the data dir (default `~/.vargos`); also settable via
    /// `VARGOS_DATA_DIR` (spec.md §6).
    #[arg(long, global = true, env = "VARGOS_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is given).
    Gateway,
    /// Send a text message to a session through the running gateway.
    Send {
        #[arg(long)]
        to: String,
        #[arg(short, long)]
        message: String,
    },
    /// Session management against the running gateway.
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Channel adapter status.
    Channels,
}

#[derive(Subcommand)]
enum SessionAction {
    List,
    History { key: String },
    Delete { key: String },
}

fn data_dir(cli: &Cli) -> PathBuf {
    cli.data_dir.clone().unwrap_or_else(|| {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vargos")
    })
}

fn ws_url(bind: &str) -> String {
    format!("ws://{bind}/ws")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.debug.as_deref());

    info!(version = env!("CARGO_PKG_VERSION"), "vargos starting");

    match cli.command {
        None | Some(Commands::Gateway) => run_gateway(&cli).await,
        Some(Commands::Send { to, message }) => {
            let url = ws_url(&cli.bind);
            let result = ws_client::call(
                &url,
                "channels",
                "send",
                Some(serde_json::json!({ "to": to, "text": message })),
            )
            .await?;
            println!("{result}");
            Ok(())
        },
        Some(Commands::Sessions { action }) => run_sessions(&cli, action).await,
        Some(Commands::Channels) => {
            let url = ws_url(&cli.bind);
            let result = ws_client::call(&url, "channels", "status", None).await?;
            println!("{result}");
            Ok(())
        },
    }
}

async fn run_sessions(cli: &Cli, action: SessionAction) -> anyhow::Result<()> {
    let url = ws_url(&cli.bind);
    let result = match action {
        SessionAction::List => ws_client::call(&url, "sessions", "list", None).await?,
        SessionAction::History { key } => {
            ws_client::call(
                &url,
                "sessions",
                "history",
                Some(serde_json::json!({ "sessionKey": key })),
            )
            .await?
        },
        SessionAction::Delete { key } => {
            ws_client::call(
                &url,
                "sessions",
                "delete",
                Some(serde_json::json!({ "sessionKey": key })),
            )
            .await?
        },
    };
    println!("{result}");
    Ok(())
}

/// Bring up the gateway: write the PID file, build the fully-wired
/// `GatewayState` (agent bridge, in-memory session store, noop LLM
/// provider/tools/channels until a real deployment wires concrete ones in),
/// serve until a shutdown signal arrives, then drain and exit.
///
/// `SIGTERM` triggers a graceful shutdown (stop accepting connections,
/// cancel active runs, flush adapter writes, exit 0); `SIGUSR2` re-execs the
/// process in place; `SIGINT` behaves like `SIGTERM` for the server itself
/// (spec.md §6 reserves the client-disconnect meaning for the interactive
/// CLI, not the gateway process).
async fn run_gateway(cli: &Cli) -> anyhow::Result<()> {
    let data_dir = data_dir(cli);
    let pid_path = pidfile::write(&data_dir)?;

    let addr: SocketAddr = cli
        .bind
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)));

    let sessions: Arc<dyn vargos_sessions::SessionStore> = Arc::new(vargos_sessions::MemorySessionStore::new());
    let channels = Arc::new(ChannelRegistry::new());
    let tools = vargos_agents::ToolRegistry::new();
    let provider: Arc<dyn vargos_agents::LlmProvider> = Arc::new(vargos_agents::NoopLlmProvider);
    let cron = Arc::new(vargos_gateway::GatewayCronService::new());
    let services = Arc::new(Services {
        cron: Arc::clone(&cron) as Arc<dyn vargos_service_traits::CronService>,
        ..Services::default()
    });

    let state = vargos_gateway::build_gateway_state(provider, tools, sessions, channels, services);
    let cron_ticker = cron.spawn_ticker(Arc::clone(&state.session_queue), state.shutdown.clone());

    let mut signals = signals::install()?;
    let shutdown_state = Arc::clone(&state);
    let watcher = tokio::spawn(async move {
        loop {
            match signals.recv().await {
                Some(signals::Signal::Terminate) => {
                    info!("received shutdown signal, cancelling active runs and draining connections");
                    shutdown_state.session_queue.cancel_all().await;
                    shutdown_state.shutdown.cancel();
                    break;
                },
                Some(signals::Signal::Restart) => {
                    warn!("received restart signal, re-executing process");
                    signals::reexec();
                },
                None => break,
            }
        }
    });

    let result = server::run(addr, Arc::clone(&state)).await;
    watcher.abort();
    cron_ticker.abort();
    pidfile::remove(&pid_path);

    result.map_err(anyhow::Error::from)
}

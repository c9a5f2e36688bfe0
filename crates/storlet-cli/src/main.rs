//! storlet-daemon
//!
//! デーモンモード（ゲートウェイから起動される形）:
//! ```text
//! storlet-daemon <storlet_name> <sbus_path> <log_level> <pool_size> <container_id> [--strict]
//! ```
//! クライアントモード（動いているデーモンへサービスコマンドを送る）:
//! ```text
//! storlet-daemon ping <sbus_path>
//! storlet-daemon halt <sbus_path>
//! storlet-daemon cancel <sbus_path> <task_id>
//! ```

mod storlets;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use storlet_core::app::{DaemonBuilder, DaemonConfig, FailurePolicy, parse_log_level};
use storlet_core::domain::Command;
use storlet_core::impls::{SBusClient, SBusTransport};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "storlet-daemon", version)]
#[command(about = "Run one storlet behind a bus socket, or send it a service command")]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Cli {
    #[command(subcommand)]
    client: Option<ClientCommand>,

    #[command(flatten)]
    daemon: DaemonArgs,
}

#[derive(clap::Args, Debug)]
struct DaemonArgs {
    /// Bundled storlet to serve (identity, half)
    #[arg(required = true)]
    storlet_name: Option<String>,

    /// Path of the bus socket to bind
    #[arg(required = true)]
    sbus_path: Option<PathBuf>,

    /// TRACE, DEBUG, INFO, WARNING, ERROR, CRITICAL or OFF
    #[arg(env = "STORLET_LOG_LEVEL", default_value = "INFO")]
    log_level: String,

    /// Maximum number of concurrently running executions
    #[arg(env = "STORLET_POOL_SIZE", default_value_t = 5)]
    pool_size: usize,

    /// Container (tenant) id tagged on every log line
    #[arg(default_value = "")]
    container_id: String,

    /// Stop serving on the first request that cannot be decoded or validated
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand, Debug)]
enum ClientCommand {
    /// Check that the daemon answers
    Ping { sbus_path: PathBuf },
    /// Ask the daemon to stop
    Halt { sbus_path: PathBuf },
    /// Cancel a running execution
    Cancel { sbus_path: PathBuf, task_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.client {
        Some(command) => run_client(command).await,
        None => run_daemon(cli.daemon).await,
    }
}

async fn run_daemon(args: DaemonArgs) -> anyhow::Result<()> {
    let (Some(storlet_name), Some(sbus_path)) = (args.storlet_name, args.sbus_path) else {
        anyhow::bail!("storlet_name and sbus_path are required");
    };

    let config = DaemonConfig {
        storlet_name,
        sbus_path,
        log_level: args.log_level,
        pool_size: args.pool_size,
        container_id: args.container_id,
        failure_policy: if args.strict {
            FailurePolicy::Strict
        } else {
            FailurePolicy::Lenient
        },
    };
    init_tracing(&config.log_level)?;

    let transport = SBusTransport::bind(&config.sbus_path)
        .with_context(|| format!("failed to bind {}", config.sbus_path.display()))?;
    let daemon = DaemonBuilder::new(config)
        .registry(storlets::registry()?)
        .build(transport)?;

    tracing::info!(
        storlet = %daemon.config().storlet_name,
        pool_size = daemon.config().pool_size,
        "storlet daemon starting"
    );
    daemon.run().await?;
    Ok(())
}

async fn run_client(command: ClientCommand) -> anyhow::Result<()> {
    init_tracing("WARNING")?;

    let (path, command, task_id) = match command {
        ClientCommand::Ping { sbus_path } => (sbus_path, Command::Ping, None),
        ClientCommand::Halt { sbus_path } => (sbus_path, Command::Halt, None),
        ClientCommand::Cancel { sbus_path, task_id } => (sbus_path, Command::Cancel, Some(task_id)),
    };

    let response = SBusClient::service_command(&path, command, task_id)
        .await
        .with_context(|| format!("{command} to {} failed", path.display()))?;
    println!("{}", serde_json::to_string(&response)?);

    if !response.status {
        anyhow::bail!("{}", response.message);
    }
    Ok(())
}

/// `RUST_LOG` wins when set; otherwise the gateway's level name applies.
fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::default().add_directive(parse_log_level(level)?.into()),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
    Ok(())
}

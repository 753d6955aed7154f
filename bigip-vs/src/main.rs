//! bigip-vs: converge BIG-IP virtual servers to a declared state.
//!
//! Reads desired state from a task file, reconciles each virtual server
//! against the device over iControl REST and prints one JSON result per
//! line on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bigip_vs::config::DEFAULT_PARTITION;
use bigip_vs::{
    parse_tasks, validate, BigIpClient, ConnectionArgs, ConnectionConfig, DesiredState,
    DeviceApi, Error, FullName, OperationResult, State, VirtualServerReconciler,
};

/// BIG-IP virtual server reconciler
#[derive(Parser, Debug)]
#[command(name = "bigip-vs", version, about)]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Partition for names given without one
    #[arg(long, env = "F5_PARTITION", default_value = DEFAULT_PARTITION, global = true)]
    partition: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile the virtual servers declared in a YAML or JSON file
    Apply {
        file: PathBuf,

        /// Report what would change without writing to the device
        #[arg(long)]
        check: bool,
    },
    /// Print the observed state of a virtual server
    Show { name: String },
    /// Remove a virtual server if it exists
    Delete {
        name: String,

        #[arg(long)]
        check: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bigip_vs=info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = ConnectionConfig::from(args.connection);
    let timeout = config.timeout;
    let client = BigIpClient::new(&config)?;
    info!("Managing virtual servers on {}", client.base_url());

    let outcome = run(&client, timeout, &args.partition, args.command).await;

    if let Err(e) = client.logout().await {
        warn!("Failed to release auth token: {}", e);
    }

    if outcome? {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

/// Run one command. Returns true if any reconcile failed.
async fn run(
    client: &BigIpClient,
    timeout: Duration,
    partition: &str,
    command: Command,
) -> Result<bool> {
    match command {
        Command::Apply { file, check } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let tasks = parse_tasks(&text)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            info!("Loaded {} virtual server(s) from {}", tasks.len(), file.display());

            let reconciler = VirtualServerReconciler::new(client)
                .with_timeout(timeout)
                .with_check_mode(check);

            let mut failed = false;
            for mut params in tasks {
                if params.partition.is_none() {
                    params.partition = Some(partition.to_string());
                }
                let name = FullName::parse(params.name.trim(), partition);
                let result = match validate(params) {
                    Ok(desired) => reconciler.apply(&desired).await,
                    Err(e) => OperationResult::failure(&name, &Error::from(e)),
                };
                failed |= result.failed;
                println!("{}", serde_json::to_string(&result)?);
            }
            Ok(failed)
        }
        Command::Show { name } => {
            let name = FullName::parse(&name, partition);
            let observed = tokio::time::timeout(timeout, client.fetch(&name))
                .await
                .map_err(|_| Error::Timeout(timeout))??;
            println!("{}", serde_json::to_string_pretty(&observed)?);
            Ok(false)
        }
        Command::Delete { name, check } => {
            let name = FullName::parse(&name, partition);
            let desired = DesiredState::named(name.partition, name.name, State::Absent);
            let result = VirtualServerReconciler::new(client)
                .with_timeout(timeout)
                .with_check_mode(check)
                .apply(&desired)
                .await;
            println!("{}", serde_json::to_string(&result)?);
            Ok(result.failed)
        }
    }
}

//! discoveryctl: talk to the discovery tier from the shell.
//!
//! # Usage
//!
//! ```text
//! discoveryctl -s ds-1:9020 -s ds-2:9020 heartbeat /service/workers worker-1 --attr host=10.0.0.7
//! discoveryctl --config discovery.toml list /service/workers --limit 10
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "discoveryctl",
    about = "Discovery client: heartbeat members and inspect groups",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Client configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Discovery server address; repeatable. Overrides the config file list.
    #[arg(short = 's', long = "server", global = true)]
    servers: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a member and keep its lease alive until Ctrl-C.
    Heartbeat {
        group: String,
        member: String,
        #[arg(long, default_value = "0")]
        priority: i64,
        #[arg(long, default_value = "0")]
        revision: i64,
        /// Attribute as key=value; repeatable.
        #[arg(short, long = "attr")]
        attrs: Vec<String>,
        /// Lease length.
        #[arg(long, default_value = "60s")]
        lease: String,
        /// Renewal period. Must be shorter than the lease.
        #[arg(long, default_value = "20s")]
        interval: String,
        /// Send a single heartbeat and exit.
        #[arg(long)]
        once: bool,
    },
    /// Print group metadata as JSON.
    Meta { group: String },
    /// Print group members as JSON.
    List {
        group: String,
        #[arg(short, long)]
        limit: Option<i32>,
        /// Only return these attribute keys; repeatable.
        #[arg(short, long = "key")]
        keys: Vec<String>,
    },
    /// Show the resolved discovery servers.
    Servers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,discovery_client=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref(), &cli.servers)?;

    match cli.command {
        Command::Heartbeat {
            group,
            member,
            priority,
            revision,
            attrs,
            lease,
            interval,
            once,
        } => {
            let args = commands::heartbeat::HeartbeatArgs {
                group,
                member,
                priority,
                revision,
                attrs,
                lease,
                interval,
                once,
            };
            commands::heartbeat::run(&config, args).await
        }
        Command::Meta { group } => commands::query::meta(&config, &group).await,
        Command::List { group, limit, keys } => {
            commands::query::list(&config, &group, limit, keys).await
        }
        Command::Servers => commands::query::servers(&config).await,
    }
}

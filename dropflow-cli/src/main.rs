//! Dropflow CLI - run managers, submit graphs and schedule task DAGs.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dropflow_manager::observability::{TracingConfig, TracingGuard, init_tracing};
use dropflow_scheduler::SlotPolicy;

/// Dropflow - distributed execution of physical dataflow graphs.
#[derive(Parser)]
#[command(name = "dropflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node manager
    Nm {
        /// Node name other managers know this node by
        #[arg(short, long)]
        name: String,

        /// Host to bind to
        #[arg(short = 'H', long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Peer node managers as NAME=URL
        #[arg(long = "peer")]
        peers: Vec<String>,
    },

    /// Run a data island manager over node managers
    Dim {
        /// Island name
        #[arg(short, long)]
        name: String,

        /// Host to bind to
        #[arg(short = 'H', long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8001")]
        port: u16,

        /// Node managers as NAME=URL or HOST:PORT
        #[arg(long = "node", required = true)]
        nodes: Vec<String>,
    },

    /// Run a master manager over data island managers
    Mm {
        /// Master name
        #[arg(short, long, default_value = "master")]
        name: String,

        /// Host to bind to
        #[arg(short = 'H', long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8002")]
        port: u16,

        /// Data island managers as NAME=URL or HOST:PORT
        #[arg(long = "island", required = true)]
        islands: Vec<String>,
    },

    /// Create a session from a physical graph and deploy it
    Submit {
        /// Path to the graph JSON file
        file: String,

        /// Manager URL
        #[arg(short, long, default_value = "http://localhost:8000")]
        manager: String,

        /// Session id (generated when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Drops to complete at deploy (defaults to the graph's roots)
        #[arg(short, long, value_delimiter = ',')]
        completed: Option<Vec<String>>,
    },

    /// Show a session's status
    Status {
        /// Session id
        session: String,

        /// Manager URL
        #[arg(short, long, default_value = "http://localhost:8000")]
        manager: String,

        /// Show the status of every drop
        #[arg(short, long)]
        drops: bool,
    },

    /// Schedule a task DAG described in a JSON file
    Schedule {
        /// Path to the scheduling problem JSON file
        file: String,

        /// Slot policy overriding the file's (dag_preserving or deferred)
        #[arg(short, long)]
        policy: Option<SlotPolicy>,
    },
}

fn setup_logging(verbosity: u8) -> Result<TracingGuard> {
    let config = TracingConfig::from_env();
    let filter = match verbosity {
        0 => return init_tracing(config),
        1 => "debug",
        _ => "trace",
    };
    init_tracing(
        TracingConfig::builder()
            .log_format(config.log_format())
            .log_filter(filter)
            .build(),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing_guard = setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Nm {
            name,
            host,
            port,
            peers,
        } => commands::serve::node(&name, &host, port, &peers).await,
        Commands::Dim {
            name,
            host,
            port,
            nodes,
        } => commands::serve::island(&name, &host, port, &nodes).await,
        Commands::Mm {
            name,
            host,
            port,
            islands,
        } => commands::serve::master(&name, &host, port, &islands).await,
        Commands::Submit {
            file,
            manager,
            session,
            completed,
        } => commands::submit::run(&file, &manager, session, completed).await,
        Commands::Status {
            session,
            manager,
            drops,
        } => commands::status::run(&session, &manager, drops).await,
        Commands::Schedule { file, policy } => commands::schedule::run(&file, policy),
    }
}

use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tally::consts::{
    AUTHOR, DEFAULT_BIND, DEFAULT_LOG_FILTER, DEFAULT_REQUEST_TIMEOUT, DEFAULT_WORKERS, HOMEPAGE,
    REPO,
};
use tally::finder::DfsFinder;
use tally::orchestrator::{
    DataflowExecutor, Executor, LayeredExecutor, OrchestratorConfig, RedefinitionPolicy,
};
use tally::protocol::{self, ErrorBody, ProcessResponse};
use tally::server::{self, ServerConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Schedule {
    /// One task per required variable, ordered by the variables themselves
    Dataflow,
    /// Topological order on a bounded worker pool
    Layered,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Redefinition {
    /// Fail the batch when a variable is defined twice
    Reject,
    /// Later definitions replace earlier ones
    LastWins,
}

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    author = AUTHOR,
    about = "Concurrent evaluator for variable batches.",
    after_help = format!("Homepage: {HOMEPAGE}\nSource:   {REPO}")
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Evaluation strategy
    #[arg(
        long,
        value_enum,
        default_value_t = Schedule::Dataflow,
        env = "TALLY_SCHEDULE",
        global = true
    )]
    schedule: Schedule,

    /// Sentences in flight at once (layered schedule only)
    #[arg(short, long, default_value_t = DEFAULT_WORKERS, env = "TALLY_WORKERS", global = true)]
    workers: usize,

    /// How to treat a variable defined by more than one calc command
    #[arg(long, value_enum, default_value_t = Redefinition::Reject, global = true)]
    redefinition: Redefinition,

    /// Per-batch deadline in seconds
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs(),
        env = "TALLY_TIMEOUT",
        global = true
    )]
    timeout: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Serve `POST /process` over HTTP
    Serve {
        /// Listen address
        #[arg(short, long, default_value = DEFAULT_BIND, env = "TALLY_BIND")]
        bind: SocketAddr,
    },
    /// Evaluate one batch and print the JSON response
    Eval {
        /// JSON file with the command array (stdin when omitted)
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(io::stderr)
        .init();

    let config = OrchestratorConfig {
        redefinition: match cli.redefinition {
            Redefinition::Reject => RedefinitionPolicy::Reject,
            Redefinition::LastWins => RedefinitionPolicy::LastWins,
        },
    };
    let finder = Arc::new(DfsFinder::new());
    let executor: Arc<dyn Executor> = match cli.schedule {
        Schedule::Dataflow => Arc::new(DataflowExecutor::new(finder, config)),
        Schedule::Layered => Arc::new(LayeredExecutor::new(finder, config, cli.workers)),
    };
    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Command::Serve { bind } => {
            let config = ServerConfig {
                bind,
                request_timeout: timeout,
            };
            serve(executor, config).await
        }
        Command::Eval { file } => eval(executor, file, timeout).await,
    }
}

async fn serve(executor: Arc<dyn Executor>, config: ServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
        }
        trigger.cancel();
    });

    server::serve(listener, executor, config.request_timeout, shutdown).await?;
    Ok(())
}

async fn eval(
    executor: Arc<dyn Executor>,
    file: Option<PathBuf>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let commands = match &file {
        Some(path) => protocol::load_commands(path)?,
        None => protocol::read_commands(io::stdin().lock())?,
    };
    let batch = protocol::parse_batch(&commands)?;

    let token = CancellationToken::new();
    let _guard = token.clone().drop_guard();

    let outcome = tokio::time::timeout(timeout, executor.run(&token, &batch)).await;

    let mut stdout = io::stdout().lock();
    match outcome {
        Ok(Ok(items)) => {
            serde_json::to_writer_pretty(&mut stdout, &ProcessResponse { items })?;
            writeln!(stdout)?;
            Ok(())
        }
        Ok(Err(err)) => {
            serde_json::to_writer_pretty(&mut stdout, &ErrorBody::from(&err))?;
            writeln!(stdout)?;
            bail!(err)
        }
        Err(_) => bail!("batch did not finish within {timeout:?}"),
    }
}

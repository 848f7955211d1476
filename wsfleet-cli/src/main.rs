use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wsfleet_http::{
    ClusterController, WORKER_INDEX_ENV, WorkerCommand,
    runtime::{AppState, ServerConfig, ServerConfigBuilder, ServerResult, WorkerServer, shared_counter},
};

#[derive(Parser, Debug)]
#[command(name = "wsfleet", version)]
#[command(about = "Clustered WebSocket server with HTTP command dispatch")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server; forks workers when clustering is enabled
    Serve(ServeArgs),
    /// Run one worker process (started by the cluster controller)
    #[command(hide = true)]
    Worker,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Listening address (overrides WSFLEET_HOST)
    #[arg(long)]
    host: Option<String>,
    /// Listening port (overrides WSFLEET_PORT)
    #[arg(long)]
    port: Option<u16>,
    /// Enable cluster mode (overrides WSFLEET_CLUSTER_ENABLED)
    #[arg(long)]
    cluster: bool,
    /// Number of worker processes (overrides WSFLEET_WORKERS)
    #[arg(long)]
    workers: Option<usize>,
}

impl ServeArgs {
    fn apply(self, mut builder: ServerConfigBuilder) -> ServerConfigBuilder {
        if let Some(host) = self.host {
            builder = builder.host(host);
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if self.cluster {
            builder = builder.cluster_enabled(true);
        }
        if let Some(workers) = self.workers {
            builder = builder.workers(workers);
        }
        builder
    }

    fn load(self) -> ServerResult<ServerConfig> {
        Ok(self.apply(ServerConfigBuilder::from_env()?).build()?)
    }
}

fn init_logging() {
    // Initialize JSON logging once.
    let level = std::env::var("WSFLEET_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .try_init();
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %e, "wsfleet stopped with an error");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ServerResult<u8> {
    // Each process is single threaded; parallelism comes from worker processes.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Serve(args) => runtime.block_on(serve(args.load()?)),
        Commands::Worker => runtime.block_on(worker(ServeArgs::default().load()?)),
    }
}

async fn serve(config: ServerConfig) -> ServerResult<u8> {
    if !config.cluster.enabled {
        return worker(config).await;
    }

    let controller = ClusterController::new(config, WorkerCommand::current_exe()?);
    let exit = controller.run().await?;
    Ok(exit_code(exit.exit_code()))
}

async fn worker(config: ServerConfig) -> ServerResult<u8> {
    let index = std::env::var(WORKER_INDEX_ENV).ok();
    let shared = shared_counter(&config)?;
    let server = WorkerServer::bind(AppState::new(config, shared)).await?;
    info!(pid = std::process::id(), worker = ?index, "Worker ready");

    let kind = server.run().await?;
    Ok(exit_code(kind.exit_code()))
}

fn exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

//! # Cluster membership
//!
//! In cluster mode the controller process accepts no connections. It resets
//! the shared counter once, launches N identical worker processes that bind
//! the same port with `SO_REUSEPORT`, forwards termination signals to them
//! and logs their exits. Workers are never respawned.

use crate::runtime::{
    ServerConfig, ServerError, ServerResult, ShutdownKind, server::shared_counter, shutdown_signal,
};
use std::{num::NonZeroUsize, path::PathBuf, process::ExitStatus};
use tokio::{
    process::{Child, Command},
    sync::mpsc,
};
use tracing::{debug, error, info, warn};

/// Environment variable carrying a worker's index
pub const WORKER_INDEX_ENV: &str = "WSFLEET_WORKER_INDEX";

/// Number of workers to launch
pub fn worker_count(config: &ServerConfig) -> usize {
    config.cluster.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    })
}

/// Program and arguments used to start a worker
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Re-run the current executable with the `worker` subcommand
    pub fn current_exe() -> ServerResult<Self> {
        Ok(Self::new(std::env::current_exe()?, ["worker"]))
    }

    /// Start worker `index`.
    ///
    /// The worker inherits the controller's environment; the listening
    /// address and cluster flag are pinned so CLI overrides reach it too.
    fn spawn(&self, index: usize, config: &ServerConfig) -> ServerResult<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .env(WORKER_INDEX_ENV, index.to_string())
            .env("WSFLEET_HOST", &config.host)
            .env("WSFLEET_PORT", config.port.to_string())
            .env("WSFLEET_CLUSTER_ENABLED", "true")
            .env(
                "WSFLEET_CLUSTER_CACHE_ENABLED",
                config.cache.enabled.to_string(),
            )
            .spawn()
            .map_err(|source| ServerError::Spawn { index, source })
    }
}

/// Why the controller stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerExit {
    /// A signal arrived and was forwarded to the workers
    Signalled(ShutdownKind),
    /// Every worker exited on its own
    WorkersExited,
}

impl ControllerExit {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Signalled(kind) => kind.exit_code(),
            Self::WorkersExited => 1,
        }
    }
}

#[derive(Debug)]
struct WorkerExit {
    index: usize,
    pid: Option<u32>,
    status: std::io::Result<ExitStatus>,
}

/// Supervisor of the worker processes
#[derive(Debug)]
pub struct ClusterController {
    config: ServerConfig,
    command: WorkerCommand,
}

impl ClusterController {
    pub fn new(config: ServerConfig, command: WorkerCommand) -> Self {
        Self { config, command }
    }

    /// Launch the workers and supervise them until SIGINT or SIGTERM
    pub async fn run(self) -> ServerResult<ControllerExit> {
        self.run_until(shutdown_signal()).await
    }

    pub async fn run_until<F>(self, signal: F) -> ServerResult<ControllerExit>
    where
        F: Future<Output = ShutdownKind>,
    {
        self.init_shared_counter().await;

        let count = worker_count(&self.config);
        info!(
            pid = std::process::id(),
            workers = count,
            "Controller starting {} workers on port {}",
            count,
            self.config.port
        );

        let mut children = Vec::with_capacity(count);
        for index in 0..count {
            match self.command.spawn(index, &self.config) {
                Ok(child) => children.push((index, child)),
                Err(e) => {
                    let pids: Vec<u32> = children.iter().filter_map(|(_, c)| c.id()).collect();
                    forward_signal(ShutdownKind::Terminate, &pids);
                    return Err(e);
                }
            }
        }

        supervise(children, signal).await
    }

    /// Set the shared counter to 0 before any worker can count
    async fn init_shared_counter(&self) {
        if !self.config.uses_shared_counter() {
            return;
        }
        let counter = match shared_counter(&self.config) {
            Ok(Some(counter)) => counter,
            Ok(None) => return,
            Err(e) => {
                error!(error = %e, "Unable to create shared counter client");
                return;
            }
        };
        match counter.reset().await {
            Ok(()) => info!(key = %counter.key(), "Shared connection counter reset"),
            Err(e) => error!(key = %counter.key(), error = %e, "Error resetting connection count"),
        }
    }
}

async fn supervise<F>(children: Vec<(usize, Child)>, signal: F) -> ServerResult<ControllerExit>
where
    F: Future<Output = ShutdownKind>,
{
    let pids: Vec<u32> = children.iter().filter_map(|(_, c)| c.id()).collect();
    let mut remaining = children.len();

    let (exit_tx, mut exits) = mpsc::unbounded_channel();
    for (index, mut child) in children {
        let exit_tx = exit_tx.clone();
        let pid = child.id();
        info!(worker = index, pid, "Worker started");
        tokio::spawn(async move {
            let status = child.wait().await;
            let _ = exit_tx.send(WorkerExit { index, pid, status });
        });
    }
    drop(exit_tx);

    let mut signal = std::pin::pin!(signal);
    let mut requested = None;

    while remaining > 0 {
        tokio::select! {
            exit = exits.recv() => match exit {
                Some(exit) => {
                    log_exit(&exit, requested.is_some());
                    remaining -= 1;
                }
                None => break,
            },
            kind = &mut signal, if requested.is_none() => {
                forward_signal(kind, &pids);
                if kind == ShutdownKind::Terminate {
                    error!(pid = std::process::id(), "Server is forcefully terminated");
                    return Ok(ControllerExit::Signalled(kind));
                }
                info!(pid = std::process::id(), "Server is shutting down with pid {}", std::process::id());
                requested = Some(kind);
            }
        }
    }

    match requested {
        Some(kind) => {
            info!("All workers stopped");
            Ok(ControllerExit::Signalled(kind))
        }
        None => {
            warn!("All workers exited, controller stopping");
            Ok(ControllerExit::WorkersExited)
        }
    }
}

fn log_exit(exit: &WorkerExit, expected: bool) {
    match &exit.status {
        Ok(status) if expected || status.success() => {
            info!(worker = exit.index, pid = exit.pid, %status, "Worker exited");
        }
        Ok(status) => {
            warn!(worker = exit.index, pid = exit.pid, %status, "Worker died");
        }
        Err(e) => {
            error!(worker = exit.index, pid = exit.pid, error = %e, "Unable to wait for worker");
        }
    }
}

/// Send the signal matching `kind` to each worker
#[cfg(unix)]
fn forward_signal(kind: ShutdownKind, pids: &[u32]) {
    let signal = match kind {
        ShutdownKind::Interrupt => libc::SIGINT,
        ShutdownKind::Terminate => libc::SIGTERM,
    };
    for &pid in pids {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            continue;
        };
        let rc = unsafe { libc::kill(pid, signal) };
        if rc == 0 {
            debug!(pid, signal, "Forwarded signal to worker");
        } else {
            debug!(pid, signal, error = %std::io::Error::last_os_error(), "Signal not delivered");
        }
    }
}

#[cfg(not(unix))]
fn forward_signal(kind: ShutdownKind, pids: &[u32]) {
    warn!(?kind, workers = pids.len(), "Signal forwarding is only supported on unix");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ServerConfigBuilder;
    use std::time::Duration;

    #[test]
    fn explicit_worker_count_wins() {
        let config = ServerConfigBuilder::new()
            .cluster_enabled(true)
            .workers(3)
            .build()
            .unwrap();
        assert_eq!(worker_count(&config), 3);
    }

    #[test]
    fn default_worker_count_is_positive() {
        let config = ServerConfigBuilder::new().cluster_enabled(true).build().unwrap();
        assert!(worker_count(&config) >= 1);
    }

    #[test]
    fn controller_exit_codes() {
        assert_eq!(ControllerExit::Signalled(ShutdownKind::Interrupt).exit_code(), 0);
        assert_eq!(ControllerExit::Signalled(ShutdownKind::Terminate).exit_code(), 1);
        assert_eq!(ControllerExit::WorkersExited.exit_code(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exits_when_every_worker_exits() {
        let config = ServerConfigBuilder::new()
            .cluster_enabled(true)
            .workers(2)
            .build()
            .unwrap();
        let controller = ClusterController::new(config, WorkerCommand::new("true", Vec::<String>::new()));

        let exit = controller
            .run_until(std::future::pending::<ShutdownKind>())
            .await
            .unwrap();
        assert_eq!(exit, ControllerExit::WorkersExited);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn interrupt_is_forwarded_to_workers() {
        let config = ServerConfigBuilder::new()
            .cluster_enabled(true)
            .workers(2)
            .build()
            .unwrap();
        let controller =
            ClusterController::new(config, WorkerCommand::new("sleep", ["30"]));

        let exit = tokio::time::timeout(
            Duration::from_secs(10),
            controller.run_until(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                ShutdownKind::Interrupt
            }),
        )
        .await
        .expect("controller should stop once workers are interrupted")
        .unwrap();
        assert_eq!(exit, ControllerExit::Signalled(ShutdownKind::Interrupt));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let config = ServerConfigBuilder::new()
            .cluster_enabled(true)
            .workers(1)
            .build()
            .unwrap();
        let controller = ClusterController::new(
            config,
            WorkerCommand::new("/nonexistent/wsfleet-worker", Vec::<String>::new()),
        );
        let err = controller
            .run_until(std::future::pending::<ShutdownKind>())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Spawn { index: 0, .. }));
    }
}

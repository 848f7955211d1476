//! Listener binding and the worker serve loop

use super::{
    AppState, ServerConfig,
    error::{ServerError, ServerResult},
    router::router,
    shutdown::{ShutdownKind, shutdown_signal},
};
use std::{future::IntoFuture, io, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpSocket},
    sync::oneshot,
};
use tracing::{error, info};
use wsfleet_counter::SharedCounter;

/// How long an interrupted worker waits for connections to finish closing
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const LISTEN_BACKLOG: u32 = 1024;

/// Bind a TCP listener on `host:port`.
///
/// With `reuse_port` several processes can bind the same port and the kernel
/// spreads incoming connections across them.
pub async fn bind_listener(host: &str, port: u16, reuse_port: bool) -> ServerResult<TcpListener> {
    let addr = format!("{host}:{port}");
    let socket_addr = tokio::net::lookup_host(&addr)
        .await
        .map_err(|e| ServerError::bind(addr.as_str(), e))?
        .next()
        .ok_or_else(|| {
            ServerError::bind(
                addr.as_str(),
                io::Error::new(io::ErrorKind::AddrNotAvailable, "address did not resolve"),
            )
        })?;

    let socket = if socket_addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| ServerError::bind_socket(socket_addr, e))?;

    socket
        .set_reuseaddr(true)
        .map_err(|e| ServerError::bind_socket(socket_addr, e))?;

    if reuse_port {
        #[cfg(unix)]
        socket
            .set_reuseport(true)
            .map_err(|e| ServerError::bind_socket(socket_addr, e))?;
        #[cfg(not(unix))]
        tracing::warn!("SO_REUSEPORT is unavailable on this platform, workers cannot share the port");
    }

    socket
        .bind(socket_addr)
        .map_err(|e| ServerError::bind_socket(socket_addr, e))?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|e| ServerError::bind_socket(socket_addr, e))
}

/// Shared counter for the worker, when the configuration asks for one
#[cfg(feature = "redis")]
pub fn shared_counter(config: &ServerConfig) -> ServerResult<Option<Arc<dyn SharedCounter>>> {
    if !config.uses_shared_counter() {
        return Ok(None);
    }
    let counter = wsfleet_counter::RedisCounter::new(&config.counter_config())?;
    Ok(Some(Arc::new(counter)))
}

/// Shared counter for the worker, when the configuration asks for one
#[cfg(not(feature = "redis"))]
pub fn shared_counter(config: &ServerConfig) -> ServerResult<Option<Arc<dyn SharedCounter>>> {
    if config.uses_shared_counter() {
        tracing::warn!("Shared cache requested but wsfleet was built without the redis feature");
    }
    Ok(None)
}

/// One worker: a bound listener plus the state its handlers share
#[derive(Debug)]
pub struct WorkerServer {
    listener: TcpListener,
    state: AppState,
}

impl WorkerServer {
    /// Bind the configured address; the port is shared when clustering
    pub async fn bind(state: AppState) -> ServerResult<Self> {
        let config = &state.config;
        let listener = bind_listener(&config.host, config.port, config.cluster.enabled).await?;
        Ok(Self::from_listener(listener, state))
    }

    pub fn from_listener(listener: TcpListener, state: AppState) -> Self {
        Self { listener, state }
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until SIGINT or SIGTERM
    pub async fn run(self) -> ServerResult<ShutdownKind> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `signal` resolves.
    ///
    /// On [`ShutdownKind::Interrupt`] every connection is sent a close frame,
    /// the listener stops accepting and in-flight connections get
    /// [`DRAIN_TIMEOUT`] to finish. On [`ShutdownKind::Terminate`] serving
    /// stops immediately; the caller is expected to exit non-zero.
    pub async fn run_until<F>(self, signal: F) -> ServerResult<ShutdownKind>
    where
        F: Future<Output = ShutdownKind>,
    {
        let Self { listener, state } = self;
        let pid = std::process::id();
        let addr = listener.local_addr()?;
        info!(pid, %addr, "Server is listening on port {}", addr.port());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let serve = axum::serve(listener, router(state.clone()))
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .into_future();
        let mut serve = std::pin::pin!(serve);

        let kind = tokio::select! {
            result = &mut serve => {
                result?;
                return Err(ServerError::Io(io::Error::other("listener stopped unexpectedly")));
            }
            kind = signal => kind,
        };

        match kind {
            ShutdownKind::Terminate => {
                error!(pid, "Server is forcefully terminated");
            }
            ShutdownKind::Interrupt => {
                info!(pid, "Server is shutting down with pid {}", pid);
                let asked = state.registry().close_all().await;
                info!(connections = asked, "Asked open connections to close");

                let _ = stop_tx.send(());
                serve.await?;

                if state.tracker.drain(DRAIN_TIMEOUT).await {
                    info!(pid, "Server stopped");
                }
            }
        }
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ServerConfigBuilder;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = bind_listener("127.0.0.1", 0, false).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reuse_port_allows_shared_binding() {
        let first = bind_listener("127.0.0.1", 0, true).await.unwrap();
        let port = first.local_addr().unwrap().port();
        let second = bind_listener("127.0.0.1", port, true).await.unwrap();
        assert_eq!(second.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn occupied_port_is_a_bind_error() {
        let first = bind_listener("127.0.0.1", 0, false).await.unwrap();
        let port = first.local_addr().unwrap().port();
        let err = bind_listener("127.0.0.1", port, false).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[tokio::test]
    async fn no_shared_counter_outside_cluster_mode() {
        let config = ServerConfigBuilder::new().cache_enabled(true).build().unwrap();
        assert!(shared_counter(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn interrupt_stops_the_worker() {
        let config = ServerConfigBuilder::new()
            .host("127.0.0.1")
            .port(0)
            .build()
            .unwrap();
        let server = WorkerServer::bind(AppState::new(config, None)).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);

        let kind = server
            .run_until(async { ShutdownKind::Interrupt })
            .await
            .unwrap();
        assert_eq!(kind, ShutdownKind::Interrupt);
    }

    fn assert_send<T: Send>(_: T) {}

    #[tokio::test]
    async fn serve_future_can_be_spawned() {
        let config = ServerConfigBuilder::new()
            .host("127.0.0.1")
            .port(0)
            .build()
            .unwrap();
        let server = WorkerServer::bind(AppState::new(config, None)).await.unwrap();
        assert_send(server.run_until(async { ShutdownKind::Interrupt }));
    }

    #[tokio::test]
    async fn spawned_worker_stops_on_interrupt() {
        let config = ServerConfigBuilder::new()
            .host("127.0.0.1")
            .port(0)
            .build()
            .unwrap();
        let server = WorkerServer::bind(AppState::new(config, None)).await.unwrap();
        let task = tokio::spawn(server.run_until(async { ShutdownKind::Interrupt }));
        assert_eq!(task.await.unwrap().unwrap(), ShutdownKind::Interrupt);
    }
}

//! Signal handling
//!
//! SIGINT asks for an orderly stop: connections get a close frame, the
//! listener drains and the process exits 0. SIGTERM is the severe path: the
//! process exits 1 without closing anything, so supervisors see an abnormal
//! termination.

use tokio::signal;
use tracing::{error, info};

/// Which signal ended the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl ShutdownKind {
    /// Process exit code for this kind of shutdown
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Interrupt => 0,
            Self::Terminate => 1,
        }
    }
}

/// Complete when SIGINT or SIGTERM arrives
///
/// A handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() -> ShutdownKind {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown");
            ShutdownKind::Interrupt
        },
        _ = terminate => {
            info!("Received SIGTERM");
            ShutdownKind::Terminate
        },
    }
}

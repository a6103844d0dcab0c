//! Start-all / run / stop-all orchestration.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::supervisor::InputSupervisor;

/// Keeps the process in service until it should shut down.
#[async_trait]
pub trait ServiceRunner: Send + Sync {
    /// Block for the service's operational lifetime.
    async fn run(&self) -> Result<()>;
}

/// Runs until Ctrl-C, or SIGTERM on unix.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalService;

#[async_trait]
impl ServiceRunner for SignalService {
    async fn run(&self) -> Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut terminate = signal(SignalKind::terminate())?;
            tokio::select! {
                received = tokio::signal::ctrl_c() => {
                    received?;
                    tracing::info!("Received Ctrl-C, shutting down");
                }
                _ = terminate.recv() => {
                    tracing::info!("Received SIGTERM, shutting down");
                }
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            tracing::info!("Received Ctrl-C, shutting down");
        }
        Ok(())
    }
}

/// Drives an [`InputSupervisor`] through start, service lifetime and stop.
pub struct Lifecycle<S> {
    supervisor: InputSupervisor,
    service: S,
}

impl<S: ServiceRunner> Lifecycle<S> {
    pub fn new(supervisor: InputSupervisor, service: S) -> Self {
        Self {
            supervisor,
            service,
        }
    }

    pub fn supervisor(&self) -> &InputSupervisor {
        &self.supervisor
    }

    /// Start every channel, serve, then stop.
    ///
    /// Stop runs exactly once on every path, including a partially failed
    /// start. Startup failures and service errors are returned.
    pub async fn run(&self) -> Result<()> {
        if let Err(e) = self.supervisor.start().await {
            tracing::error!(error = %e, "Failed to start input supervisor");
            self.supervisor.stop().await;
            return Err(Error::Startup(e));
        }

        let served = self.service.run().await;
        if let Err(e) = &served {
            tracing::error!(error = %e, "Service exited with error");
        }

        self.supervisor.stop().await;
        served
    }
}

//! Server setup and lifecycle management

use crate::api::{create_router, AppState};
use crate::config::OperatorConfig;
use crate::context::{cancelled, OperatorContext};
use crate::error::{OperatorError, OperatorResult};
use crate::scheduler::Scheduler;
use crate::substrate::{InMemorySubstrate, Substrate};
use crate::watcher::{spawn_watcher, ScopeSupervisor};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Quorum operator daemon
pub struct Server {
    ctx: Arc<OperatorContext>,
}

impl Server {
    /// Create a server backed by the in-memory substrate
    pub fn new(config: OperatorConfig) -> OperatorResult<Self> {
        let substrate: Arc<dyn Substrate> = Arc::new(InMemorySubstrate::new());
        Ok(Self::with_context(OperatorContext::new(config, substrate)?))
    }

    pub fn with_context(ctx: Arc<OperatorContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<OperatorContext> {
        &self.ctx
    }

    /// Run the scheduler, scope watcher and diagnostics API until shutdown
    pub async fn run(self) -> OperatorResult<()> {
        let config = self.ctx.config();
        let addr = config.server.listen_addr;

        let (scheduler, triggers) = Scheduler::new(self.ctx.clone());
        let (supervisor, scope) = ScopeSupervisor::new(self.ctx.clone(), scheduler.clone());
        let (signal_tx, signal_rx) = mpsc::channel(config.scope.channel_capacity.max(1));

        let watcher_task = spawn_watcher(self.ctx.clone(), signal_tx);
        let supervisor_task = tokio::spawn(supervisor.run(signal_rx));
        let scheduler_task = tokio::spawn(scheduler.run(triggers, scope));

        let app = create_router(AppState::new(self.ctx.clone()));
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, namespaces = ?config.scope.namespaces, "quorumd listening");

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.ctx.clone()))
            .await
            .map_err(|e| OperatorError::Server(e.to_string()));

        info!("quorumd shutting down");
        self.ctx.shutdown();

        let tasks = [
            ("watcher", watcher_task),
            ("supervisor", supervisor_task),
            ("scheduler", scheduler_task),
        ];
        for (name, task) in tasks {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "Background task ended abnormally");
            }
        }

        served
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal(ctx: Arc<OperatorContext>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let mut token = ctx.shutdown_token();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        }
        _ = cancelled(&mut token) => {
            info!("Shutdown requested");
        }
    }
}

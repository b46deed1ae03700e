use crate::api::{create_router, AppState};
use crate::orchestrator::{Orchestrator, TaskEventKind, TaskEvents};
use anyhow::Context;
use gitlite_core::{Config, Repository};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

pub struct GitliteServer {
    orchestrator: Orchestrator,
    events: TaskEvents,
}

impl GitliteServer {
    pub fn open(root: &Path, config: Config) -> anyhow::Result<Self> {
        let repo = Repository::open(root, config)
            .with_context(|| format!("failed to open repository at {}", root.display()))?;
        let (orchestrator, events) = Orchestrator::new(Arc::new(Mutex::new(repo)));
        Ok(Self::with_orchestrator(orchestrator, events))
    }

    pub fn with_orchestrator(orchestrator: Orchestrator, events: TaskEvents) -> Self {
        Self {
            orchestrator,
            events,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let root = {
            let repo = self
                .orchestrator
                .repository();
            let guard = repo
                .lock()
                .map_err(|_| anyhow::anyhow!("repository lock poisoned"))?;
            guard.root().to_path_buf()
        };

        tokio::spawn(drain_events(self.events));

        let app = create_router(AppState {
            orchestrator: self.orchestrator,
        });

        info!("Server listening on {}", addr);
        info!("Repository: {:?}", root);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

/// Logs every task event until all senders are gone.
pub async fn drain_events(mut events: TaskEvents) {
    while let Some(event) = events.recv().await {
        let task = event.task_id;
        let op = event.operation.as_str();
        match event.kind {
            TaskEventKind::Progress { message, percent } => {
                debug!(%task, "{} {}% {}", op, percent, message)
            }
            TaskEventKind::Succeeded { .. } => info!(%task, "{} succeeded", op),
            TaskEventKind::Cancelled { .. } => info!(%task, "{} cancelled", op),
            TaskEventKind::Failed { message, kind } => {
                error!(%task, ?kind, "{} failed: {}", op, message)
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

//! Node assembly: wires the catalog, identity guard, engine, reconciler and
//! publication pool together and owns their background tasks.

use anyhow::{Context, Result};
use fedreg_model::RegistryEntry;
use fedreg_store::{Catalog, JsonSchemaTransform, RecordStore, RemoteRecordStore};
use fedreg_sync::{
    FederationEngine, IdentityGuard, LoggingSink, PublicationPool, PublicationReconciler,
    Reconciler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::{build_router, AppState};
use crate::config::NodeConfig;

/// A running node without its HTTP listener.
pub struct Node {
    state: AppState,
    identity: RegistryEntry,
    pool: PublicationPool,
    stop: watch::Sender<bool>,
    reconcile_task: JoinHandle<()>,
    grace: Duration,
}

impl Node {
    /// Starts a node over `local`.
    ///
    /// Seeds the identity guard, registers every configured peer, makes sure
    /// the identity entry exists, then starts the publication workers and
    /// the reconciliation loop over the pull-enabled peers.
    pub async fn start(config: &NodeConfig, local: Arc<dyn RecordStore>) -> Result<Self> {
        let federation = config.federation.clone();
        let catalog = Arc::new(Catalog::new(local));

        let guard = Arc::new(IdentityGuard::new(Arc::new(LoggingSink)));
        guard
            .initialize(&*catalog, federation.page_size)
            .await
            .context("Failed to seed registry ids from the local store")?;
        catalog.add_plugin(guard).await;

        for remote in &config.remotes {
            let store = RemoteRecordStore::new(&remote.id, &remote.url, config.remote_timeout())
                .with_context(|| format!("Failed to create client for peer {}", remote.id))?;
            catalog.register_store(Arc::new(store)).await;
            info!("Registered peer {} at {}", remote.id, remote.url);
        }

        let engine = Arc::new(FederationEngine::new(
            catalog.clone(),
            Arc::new(JsonSchemaTransform),
            federation.clone(),
        ));

        let notifications = catalog.subscribe().await;
        let identity = engine
            .ensure_identity_entry(&federation.node)
            .await
            .context("Failed to create the identity entry")?;

        let publisher = Arc::new(PublicationReconciler::new(engine.clone()));
        let pool = PublicationPool::start(
            publisher.clone(),
            notifications,
            federation.worker_pool_size,
        );

        let reconciler = Arc::new(Reconciler::new(engine.clone()));
        for source in config.pull_sources() {
            let report = reconciler.subscribe(source.clone()).await;
            if !report.sources_failed.is_empty() {
                warn!("Initial pull from {} failed, retrying on the next cycle", source);
            }
        }
        let (stop, stop_rx) = watch::channel(false);
        let reconcile_task = tokio::spawn(
            reconciler
                .clone()
                .run(federation.refresh_interval(), stop_rx),
        );

        let state = AppState {
            engine,
            catalog,
            reconciler,
            publisher,
            push_targets: Arc::new(config.push_targets()),
        };
        Ok(Self {
            state,
            identity,
            pool,
            stop,
            reconcile_task,
            grace: federation.shutdown_grace(),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn engine(&self) -> &Arc<FederationEngine> {
        &self.state.engine
    }

    /// The identity entry as of startup.
    pub fn identity(&self) -> &RegistryEntry {
        &self.identity
    }

    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Stops the reconciliation loop and drains the publication workers.
    /// Returns `false` if workers had to be aborted.
    pub async fn shutdown(self) -> bool {
        let _ = self.stop.send(true);
        if let Err(e) = self.reconcile_task.await {
            warn!("Reconciliation loop ended abnormally: {}", e);
        }
        self.pool.shutdown(self.grace).await
    }
}

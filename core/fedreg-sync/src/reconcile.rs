//! Pull reconciliation of remote registry state into the local store.
//!
//! Each cycle queries every subscribed source concurrently, collapses
//! duplicate registry ids to the latest copy and merges the result against
//! the local view. Locally-owned entries are never overwritten.

use crate::engine::FederationEngine;
use fedreg_model::RegistryEntry;
use fedreg_types::RegistryId;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Summary of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub sources_queried: usize,
    /// Sources that failed or timed out this cycle.
    pub sources_failed: Vec<String>,
    pub created: usize,
    pub updated: usize,
    /// Remote copies of locally-owned entries that were ignored.
    pub skipped_local: usize,
}

impl ReconciliationReport {
    /// Number of local writes the cycle performed.
    pub fn writes(&self) -> usize {
        self.created + self.updated
    }
}

/// Collapses entries from several sources to one per registry id.
///
/// Sources are visited in ascending id order and an entry replaces the
/// current pick only when strictly newer, so ties go to the
/// lexicographically smallest source id. Entries without a registry id are
/// dropped.
pub fn collapse_latest(
    by_source: &BTreeMap<String, Vec<RegistryEntry>>,
) -> BTreeMap<RegistryId, RegistryEntry> {
    let mut latest: BTreeMap<RegistryId, RegistryEntry> = BTreeMap::new();
    for entries in by_source.values() {
        for entry in entries {
            let Some(registry_id) = &entry.registry_id else {
                continue;
            };
            match latest.get(registry_id) {
                Some(current) if !entry.is_newer_than(current) => {}
                _ => {
                    latest.insert(registry_id.clone(), entry.clone());
                }
            }
        }
    }
    latest
}

/// Pulls registry entries from subscribed remote sources.
pub struct Reconciler {
    engine: Arc<FederationEngine>,
    subscriptions: RwLock<BTreeSet<String>>,
    source_timeout: Duration,
}

impl Reconciler {
    pub fn new(engine: Arc<FederationEngine>) -> Self {
        let source_timeout = engine.config().source_query_timeout();
        Self {
            engine,
            subscriptions: RwLock::new(BTreeSet::new()),
            source_timeout,
        }
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Adds a pull-allowed source and reconciles it immediately.
    pub async fn subscribe(&self, source: impl Into<String>) -> ReconciliationReport {
        let source = source.into();
        self.subscriptions.write().await.insert(source.clone());
        info!("Subscribed to registry source {}", source);
        self.reconcile(&BTreeSet::from([source])).await
    }

    pub async fn unsubscribe(&self, source: &str) -> bool {
        let removed = self.subscriptions.write().await.remove(source);
        if removed {
            info!("Unsubscribed from registry source {}", source);
        }
        removed
    }

    pub async fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.read().await.iter().cloned().collect()
    }

    /// Reconciles every subscribed source.
    pub async fn refresh(&self) -> ReconciliationReport {
        let sources = self.subscriptions.read().await.clone();
        if sources.is_empty() {
            debug!("No registry subscriptions to refresh");
            return ReconciliationReport::default();
        }
        self.reconcile(&sources).await
    }

    async fn pull(
        &self,
        sources: &BTreeSet<String>,
        report: &mut ReconciliationReport,
    ) -> BTreeMap<String, Vec<RegistryEntry>> {
        let queries = sources.iter().map(|source| async move {
            let result =
                tokio::time::timeout(self.source_timeout, self.engine.query_source_entries(source))
                    .await;
            (source.clone(), result)
        });

        let mut by_source = BTreeMap::new();
        for (source, result) in join_all(queries).await {
            report.sources_queried += 1;
            match result {
                Ok(Ok(entries)) => {
                    debug!("Pulled {} registry entries from {}", entries.len(), source);
                    by_source.insert(source, entries);
                }
                Ok(Err(e)) => {
                    warn!("Registry source {} failed: {}", source, e);
                    report.sources_failed.push(source);
                }
                Err(_) => {
                    warn!("Registry source {} timed out after {:?}", source, self.source_timeout);
                    report.sources_failed.push(source);
                }
            }
        }
        by_source
    }

    /// Runs one reconciliation cycle over `sources`.
    pub async fn reconcile(&self, sources: &BTreeSet<String>) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();
        let by_source = self.pull(sources, &mut report).await;
        let remote = collapse_latest(&by_source);
        if remote.is_empty() {
            return report;
        }

        let local = match self.engine.query_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Reconciliation aborted, local registry query failed: {}", e);
                return report;
            }
        };
        let mut local_by_id: HashMap<RegistryId, RegistryEntry> = HashMap::new();
        for entry in local {
            let Some(registry_id) = entry.registry_id.clone() else {
                continue;
            };
            match local_by_id.get(&registry_id) {
                Some(existing) if existing.local_node => {}
                _ => {
                    local_by_id.insert(registry_id, entry);
                }
            }
        }

        let mut creates = Vec::new();
        let mut updates = Vec::new();
        for (registry_id, entry) in remote {
            match local_by_id.get(&registry_id) {
                Some(existing) if existing.local_node => report.skipped_local += 1,
                Some(existing) if entry.is_newer_than(existing) => updates.push(entry.detached()),
                Some(_) => {}
                None => creates.push(entry.detached()),
            }
        }

        if !creates.is_empty() {
            let count = creates.len();
            match self.engine.add_entries(creates).await {
                Ok(created) => report.created = created.len(),
                Err(e) => warn!("Failed to import {} remote registry entries: {}", count, e),
            }
        }
        if !updates.is_empty() {
            let count = updates.len();
            match self.engine.update_entries(updates).await {
                Ok(updated) => report.updated = updated,
                Err(e) => warn!("Failed to merge {} remote registry entries: {}", count, e),
            }
        }

        info!(
            "Reconciled {} source(s): {} created, {} updated, {} local skipped",
            report.sources_queried, report.created, report.updated, report.skipped_local
        );
        report
    }

    /// Refreshes all subscriptions every `interval`, starting one interval
    /// from now, until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Reconciliation loop stopped");
    }
}

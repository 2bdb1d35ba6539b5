//! Publication reconciliation: keeps each destination's copy of a registry
//! entry in line with the entry's desired published locations.

use crate::engine::FederationEngine;
use crate::error::{FederationError, FederationResult};
use fedreg_model::RegistryEntry;
use fedreg_store::ChangeNotification;
use fedreg_types::{ChangeKind, RegistryId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of reconciling one entry's publications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationOutcome {
    /// Destinations a create succeeded at, or that already held a copy.
    pub published: BTreeSet<String>,
    /// Destinations confirmed gone.
    pub unpublished: BTreeSet<String>,
    /// Destinations kept in place and sent the new state.
    pub refreshed: BTreeSet<String>,
    /// Destinations whose outcome could not be confirmed.
    pub failed: BTreeSet<String>,
    /// Destinations recorded as holding a copy after this pass.
    pub confirmed: BTreeSet<String>,
}

/// Pushes registry entries to the destinations they should be published to.
pub struct PublicationReconciler {
    engine: Arc<FederationEngine>,
    attempts: u32,
    backoff: Duration,
}

fn single(destination: &str) -> BTreeSet<String> {
    BTreeSet::from([destination.to_string()])
}

impl PublicationReconciler {
    pub fn new(engine: Arc<FederationEngine>) -> Self {
        let config = engine.config();
        let attempts = config.publish_attempts.max(1);
        let backoff = config.publish_retry_backoff();
        Self {
            engine,
            attempts,
            backoff,
        }
    }

    /// Whether a notification calls for a publication pass.
    pub fn needs_publication(notification: &ChangeNotification) -> bool {
        if notification.kind == ChangeKind::Deleted || !notification.entry.is_registry_entry() {
            return false;
        }
        let entry = &notification.entry;
        let stale = entry
            .last_published
            .is_none_or(|published| published < entry.modified);
        stale && !entry.published_to().is_empty()
    }

    /// Handles one change notification. Returns `None` when nothing needed doing.
    pub async fn handle(&self, notification: &ChangeNotification) -> Option<PublicationOutcome> {
        if !Self::needs_publication(notification) {
            return None;
        }
        let entry = &notification.entry;
        let desired = entry.published_to();
        let previous = notification
            .previous
            .as_ref()
            .map(RegistryEntry::published_to)
            .unwrap_or_default();

        let outcome = self.reconcile(entry, &desired, &previous).await;
        if let Err(e) = self.write_back(entry, &outcome.confirmed).await {
            warn!("Failed to record publications for {:?}: {}", entry.registry_id, e);
        }
        Some(outcome)
    }

    /// Operator form: makes `destinations` the complete set of places the
    /// local entry is published to.
    pub async fn update_publications(
        &self,
        registry_id: &RegistryId,
        destinations: BTreeSet<String>,
    ) -> FederationResult<PublicationOutcome> {
        let entry = self
            .engine
            .entry_by_registry_id(registry_id, BTreeSet::new())
            .await?
            .ok_or_else(|| {
                FederationError::NotFound(format!("no registry entry with registry id {registry_id}"))
            })?;
        let previous = entry.published_to();
        let outcome = self.reconcile(&entry, &destinations, &previous).await;
        self.write_back(&entry, &outcome.confirmed).await?;
        Ok(outcome)
    }

    async fn reconcile(
        &self,
        entry: &RegistryEntry,
        desired: &BTreeSet<String>,
        previous: &BTreeSet<String>,
    ) -> PublicationOutcome {
        let mut outcome = PublicationOutcome::default();
        let Some(registry_id) = entry.registry_id.clone() else {
            return outcome;
        };

        for destination in desired.difference(previous) {
            let created = self
                .with_retries(move || self.engine.add_entry_to(entry.clone(), single(destination)))
                .await;
            let present = match created {
                Ok(_) => true,
                Err(e) => {
                    warn!("Publishing {} to {} failed: {}", registry_id, destination, e);
                    self.exists_at(&registry_id, destination).await.unwrap_or(false)
                }
            };
            if present {
                outcome.published.insert(destination.clone());
                outcome.confirmed.insert(destination.clone());
            } else {
                outcome.failed.insert(destination.clone());
            }
        }

        let ids = std::slice::from_ref(&registry_id);
        for destination in previous.difference(desired) {
            let deleted = self
                .with_retries(move || {
                    self.engine
                        .delete_entries_by_registry_ids_to(ids, single(destination))
                })
                .await;
            let gone = match deleted {
                Ok(_) => true,
                Err(e) => {
                    warn!("Unpublishing {} from {} failed: {}", registry_id, destination, e);
                    matches!(self.exists_at(&registry_id, destination).await, Some(false))
                }
            };
            if gone {
                outcome.unpublished.insert(destination.clone());
            } else {
                outcome.failed.insert(destination.clone());
                outcome.confirmed.insert(destination.clone());
            }
        }

        for destination in desired.intersection(previous) {
            let pushed = self
                .with_retries(move || self.engine.update_entry_to(entry.clone(), single(destination)))
                .await;
            if let Err(e) = pushed {
                warn!("Refreshing {} at {} failed: {}", registry_id, destination, e);
            }
            outcome.refreshed.insert(destination.clone());
            outcome.confirmed.insert(destination.clone());
        }

        info!(
            "Publication pass for {}: {} published, {} unpublished, {} refreshed, {} failed",
            registry_id,
            outcome.published.len(),
            outcome.unpublished.len(),
            outcome.refreshed.len(),
            outcome.failed.len()
        );
        outcome
    }

    /// Records `confirmed` and stamps `last_published` with the published
    /// version's `modified`, in one transient-only update of the current
    /// stored state.
    async fn write_back(
        &self,
        entry: &RegistryEntry,
        confirmed: &BTreeSet<String>,
    ) -> FederationResult<()> {
        let Some(registry_id) = &entry.registry_id else {
            return Ok(());
        };
        let Some(mut current) = self
            .engine
            .entry_by_registry_id(registry_id, BTreeSet::new())
            .await?
        else {
            debug!("{} was deleted before its publications were recorded", registry_id);
            return Ok(());
        };
        current.published_locations = Some(confirmed.clone());
        current.last_published = Some(entry.modified);
        current.source_id = None;
        self.engine.update_entry(current).await
    }

    /// `Some(true)` if the destination holds the entry, `None` when it cannot tell.
    async fn exists_at(&self, registry_id: &RegistryId, destination: &str) -> Option<bool> {
        match self
            .engine
            .entry_by_registry_id(registry_id, single(destination))
            .await
        {
            Ok(found) => Some(found.is_some()),
            Err(FederationError::Conflict(_)) => Some(true),
            Err(e) => {
                warn!("Existence check for {} at {} failed: {}", registry_id, destination, e);
                None
            }
        }
    }

    async fn with_retries<T, F, Fut>(&self, mut op: F) -> FederationResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FederationResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.attempts || !retryable(&e) => return Err(e),
                Err(e) => {
                    debug!("Attempt {} of {} failed: {}", attempt, self.attempts, e);
                    attempt += 1;
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}

/// Errors that another attempt cannot fix are not retried.
fn retryable(err: &FederationError) -> bool {
    matches!(err, FederationError::Ingest(_) | FederationError::Query(_))
}

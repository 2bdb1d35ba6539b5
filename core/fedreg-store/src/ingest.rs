//! Typed requests, contexts and change notifications passed through the gateway.

use fedreg_model::RegistryEntry;
use fedreg_types::{ChangeKind, EntryId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::filter::Query;

/// Identity a write is performed as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub system: bool,
}

impl Subject {
    /// The installation itself. Used by every engine operation.
    pub fn system() -> Self {
        Self {
            name: "system".to_string(),
            system: true,
        }
    }
}

/// Per-request state shared between the gateway and ingest plugins.
#[derive(Debug, Clone, Default)]
pub struct IngestContext {
    /// Security subject. Writes without one are rejected.
    pub subject: Option<Subject>,
    /// Set by the gateway when it starts processing the request.
    pub operation: Option<ChangeKind>,
    /// Stored state of the records an update targets. `None` when the
    /// gateway could not look it up.
    pub previous: Option<Vec<RegistryEntry>>,
    /// The update only changes transient fields.
    pub transient_update: bool,
}

impl IngestContext {
    pub fn system() -> Self {
        Self {
            subject: Some(Subject::system()),
            ..Default::default()
        }
    }

    pub fn with_transient_update(mut self, transient: bool) -> Self {
        self.transient_update = transient;
        self
    }

    /// Previous state of the record stored under `id`.
    pub fn previous_for(&self, id: &EntryId) -> Option<&RegistryEntry> {
        self.previous
            .as_ref()?
            .iter()
            .find(|e| e.id.as_ref() == Some(id))
    }
}

/// Attribute an update or delete is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdField {
    Id,
    RegistryId,
}

impl IdField {
    /// Value of this field on `entry`, if set.
    pub fn value_of(&self, entry: &RegistryEntry) -> Option<String> {
        match self {
            Self::Id => entry.id.map(|id| id.to_string()),
            Self::RegistryId => entry.registry_id.as_ref().map(|id| id.to_string()),
        }
    }
}

/// Create request. Empty `destinations` means the local store.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub entries: Vec<RegistryEntry>,
    pub destinations: BTreeSet<String>,
    pub context: IngestContext,
}

impl CreateRequest {
    pub fn new(entries: Vec<RegistryEntry>, context: IngestContext) -> Self {
        Self {
            entries,
            destinations: BTreeSet::new(),
            context,
        }
    }

    pub fn to(mut self, destinations: BTreeSet<String>) -> Self {
        self.destinations = destinations;
        self
    }

    pub fn is_local(&self) -> bool {
        self.destinations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub id_field: IdField,
    /// `(key, new state)` pairs, the key being the `id_field` value.
    pub updates: Vec<(String, RegistryEntry)>,
    pub destinations: BTreeSet<String>,
    pub context: IngestContext,
}

impl UpdateRequest {
    pub fn new(
        id_field: IdField,
        updates: Vec<(String, RegistryEntry)>,
        context: IngestContext,
    ) -> Self {
        Self {
            id_field,
            updates,
            destinations: BTreeSet::new(),
            context,
        }
    }

    pub fn to(mut self, destinations: BTreeSet<String>) -> Self {
        self.destinations = destinations;
        self
    }

    pub fn is_local(&self) -> bool {
        self.destinations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub id_field: IdField,
    pub ids: Vec<String>,
    pub destinations: BTreeSet<String>,
    pub context: IngestContext,
}

impl DeleteRequest {
    pub fn new(id_field: IdField, ids: Vec<String>, context: IngestContext) -> Self {
        Self {
            id_field,
            ids,
            destinations: BTreeSet::new(),
            context,
        }
    }

    pub fn to(mut self, destinations: BTreeSet<String>) -> Self {
        self.destinations = destinations;
        self
    }

    pub fn is_local(&self) -> bool {
        self.destinations.is_empty()
    }
}

/// Query request. Empty `sources` means the local store.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: Query,
    pub sources: BTreeSet<String>,
}

impl QueryRequest {
    pub fn local(query: Query) -> Self {
        Self {
            query,
            sources: BTreeSet::new(),
        }
    }

    pub fn from_sources(query: Query, sources: BTreeSet<String>) -> Self {
        Self { query, sources }
    }
}

/// Old and new state of one updated record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub new: RegistryEntry,
    pub old: RegistryEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub created: Vec<RegistryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub updated: Vec<EntryUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: Vec<RegistryEntry>,
}

/// Emitted after a local write commits.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub kind: ChangeKind,
    pub entry: RegistryEntry,
    /// State before an update.
    pub previous: Option<RegistryEntry>,
}

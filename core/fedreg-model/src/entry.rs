use crate::document::{DocumentError, RegistryDocument};
use crate::transient::TRANSIENT_FIELDS;
use crate::REGISTRY_TAG;
use chrono::{DateTime, Utc};
use fedreg_types::{EntryId, RegistryId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A catalog record describing one federated registry node.
///
/// `modified` drives last-writer-wins between copies of the same record;
/// `published_locations` and `last_published` are transient and belong to
/// the installation holding this copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Store-assigned id, absent until the entry has been created somewhere.
    #[serde(default)]
    pub id: Option<EntryId>,
    #[serde(default)]
    pub registry_id: Option<RegistryId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub local_node: bool,
    #[serde(default)]
    pub identity_node: bool,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub published_locations: Option<BTreeSet<String>>,
    #[serde(default)]
    pub last_published: Option<DateTime<Utc>>,
    /// Serialized [`RegistryDocument`].
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Store the entry was read from. Set by stores on query.
    #[serde(default)]
    pub source_id: Option<String>,
}

impl RegistryEntry {
    /// Creates a registry-tagged entry stamped with the current time.
    #[must_use]
    pub fn new(registry_id: RegistryId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            registry_id: Some(registry_id),
            title: Some(title.into()),
            tags: BTreeSet::from([REGISTRY_TAG.to_string()]),
            local_node: false,
            identity_node: false,
            created: now,
            modified: now,
            published_locations: None,
            last_published: None,
            metadata: String::new(),
            attributes: BTreeMap::new(),
            source_id: None,
        }
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Whether the entry carries the registry tag.
    #[must_use]
    pub fn is_registry_entry(&self) -> bool {
        self.has_tag(REGISTRY_TAG)
    }

    /// Strictly newer than `other` by `modified`.
    #[must_use]
    pub fn is_newer_than(&self, other: &RegistryEntry) -> bool {
        self.modified > other.modified
    }

    /// Copies every transient field that is unset here from `previous`.
    pub fn carry_transient_from(&mut self, previous: &RegistryEntry) {
        for field in TRANSIENT_FIELDS {
            if !field.is_set(self) && field.is_set(previous) {
                field.copy(previous, self);
            }
        }
    }

    /// Whether any transient field set on this entry differs from `stored`.
    #[must_use]
    pub fn transient_differs_from(&self, stored: &RegistryEntry) -> bool {
        TRANSIENT_FIELDS.iter().any(|field| field.differs(self, stored))
    }

    /// Clears both transient fields.
    pub fn clear_transient(&mut self) {
        self.published_locations = None;
        self.last_published = None;
    }

    /// Copy to hand to another registry: no store id, not local, not the
    /// identity node, no transient fields.
    #[must_use]
    pub fn detached(&self) -> RegistryEntry {
        let mut copy = self.clone();
        copy.id = None;
        copy.local_node = false;
        copy.identity_node = false;
        copy.source_id = None;
        copy.clear_transient();
        copy
    }

    /// Destinations this copy is currently published to.
    #[must_use]
    pub fn published_to(&self) -> BTreeSet<String> {
        self.published_locations.clone().unwrap_or_default()
    }

    /// Parses the metadata document.
    pub fn document(&self) -> Result<RegistryDocument, DocumentError> {
        RegistryDocument::from_json(self.metadata.as_bytes())
    }

    /// Replaces the metadata with `document`.
    pub fn set_document(&mut self, document: &RegistryDocument) -> Result<(), DocumentError> {
        self.metadata = document.to_json()?;
        Ok(())
    }
}

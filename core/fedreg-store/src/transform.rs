//! Conversion between wire documents and registry entries.

use chrono::{DateTime, Utc};
use fedreg_model::{RegistryDocument, RegistryEntry, LAST_UPDATED_SLOT, LIVE_DATE_SLOT};
use fedreg_types::RegistryId;

use crate::error::{StoreError, StoreResult};

/// Marshals registry documents to and from catalog entries.
pub trait SchemaTransform: Send + Sync {
    fn document_to_entry(&self, document: &[u8]) -> StoreResult<RegistryEntry>;

    fn entry_to_document(&self, entry: &RegistryEntry) -> StoreResult<Vec<u8>>;
}

/// Transform for JSON-encoded [`RegistryDocument`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaTransform;

fn slot_time(document: &RegistryDocument, name: &str) -> Option<DateTime<Utc>> {
    let value = document.slot(name)?.first_value()?;
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl SchemaTransform for JsonSchemaTransform {
    fn document_to_entry(&self, document: &[u8]) -> StoreResult<RegistryEntry> {
        let doc = RegistryDocument::from_json(document)
            .map_err(|e| StoreError::Transform(e.to_string()))?;
        let registry_id = RegistryId::new(doc.id.clone())
            .map_err(|e| StoreError::Transform(e.to_string()))?;

        let mut entry = RegistryEntry::new(registry_id, doc.name.clone().unwrap_or_default());
        entry.title = doc.name.clone();
        if let Some(live) = slot_time(&doc, LIVE_DATE_SLOT) {
            entry.created = live;
        }
        entry.modified = slot_time(&doc, LAST_UPDATED_SLOT).unwrap_or(entry.created);
        for (key, value) in [
            ("home", &doc.home),
            ("version", &doc.version),
            ("object_type", &doc.object_type),
        ] {
            if let Some(v) = value {
                entry
                    .attributes
                    .insert(key.to_string(), serde_json::Value::String(v.clone()));
            }
        }
        entry
            .set_document(&doc)
            .map_err(|e| StoreError::Transform(e.to_string()))?;
        Ok(entry)
    }

    fn entry_to_document(&self, entry: &RegistryEntry) -> StoreResult<Vec<u8>> {
        if entry.metadata.is_empty() {
            return Err(StoreError::Transform(format!(
                "entry {:?} carries no registry document",
                entry.registry_id
            )));
        }
        let doc = entry
            .document()
            .map_err(|e| StoreError::Transform(e.to_string()))?;
        doc.to_json()
            .map(String::into_bytes)
            .map_err(|e| StoreError::Transform(e.to_string()))
    }
}

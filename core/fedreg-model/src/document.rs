//! The registry document carried in an entry's metadata.
//!
//! The document is the wire form exchanged with peers: the package id equals
//! the entry's registry id, node attributes live in named slots, and each
//! service lists its bindings with their own slots.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reading or writing a registry document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed registry document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("registry document has no id")]
    MissingId,
}

/// Identifier annotation attached to a registry object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIdentifier {
    pub id: String,
    /// Registry id of the object this annotation belongs to.
    #[serde(default)]
    pub registry_object: String,
    pub identification_scheme: String,
    pub value: String,
}

/// Named multi-valued attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_type: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Slot {
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            slot_type: None,
            values,
        }
    }

    #[must_use]
    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// One way of reaching a service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBinding {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_uri: Option<String>,
    #[serde(default)]
    pub slots: Vec<Slot>,
}

impl ServiceBinding {
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub bindings: Vec<ServiceBinding>,
}

/// Full description of a registry node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDocument {
    /// Package id; equal to the entry's registry id.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_identifiers: Vec<ExternalIdentifier>,
    #[serde(default)]
    pub slots: Vec<Slot>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub persons: Vec<serde_json::Value>,
}

impl RegistryDocument {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Parses a document, rejecting one without a package id.
    pub fn from_json(bytes: &[u8]) -> Result<Self, DocumentError> {
        let doc: Self = serde_json::from_slice(bytes)?;
        if doc.id.trim().is_empty() {
            return Err(DocumentError::MissingId);
        }
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string(self)?)
    }

    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// Replaces the values of slot `name`, appending it when missing.
    pub fn set_slot(&mut self, name: &str, slot_type: Option<&str>, values: Vec<String>) {
        match self.slots.iter_mut().find(|s| s.name == name) {
            Some(slot) => {
                slot.values = values;
                if slot_type.is_some() {
                    slot.slot_type = slot_type.map(str::to_string);
                }
            }
            None => self.slots.push(Slot {
                name: name.to_string(),
                slot_type: slot_type.map(str::to_string),
                values,
            }),
        }
    }

    #[must_use]
    pub fn external_identifier(&self, id: &str) -> Option<&ExternalIdentifier> {
        self.external_identifiers.iter().find(|e| e.id == id)
    }

    /// Every service binding in document order.
    pub fn bindings(&self) -> impl Iterator<Item = &ServiceBinding> {
        self.services.iter().flat_map(|s| s.bindings.iter())
    }
}

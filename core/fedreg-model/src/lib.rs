//! Registry entry model for the federated registry.
//!
//! A [`RegistryEntry`] is the catalog record describing one federated node.
//! Its `metadata` carries the full [`RegistryDocument`] (services, bindings,
//! slots and identifier annotations) as JSON.

mod document;
mod entry;
mod transient;

pub use document::{
    DocumentError, ExternalIdentifier, RegistryDocument, Service, ServiceBinding, Slot,
};
pub use entry::RegistryEntry;
pub use transient::{TransientField, TRANSIENT_FIELDS};

/// Tag every registry entry must carry to be recognized as one.
pub const REGISTRY_TAG: &str = "registry";

/// Object type of a registry node document.
pub const REGISTRY_NODE_OBJECT_TYPE: &str = "urn:registry:federation:node";

/// Identifier annotation holding the entry id in the store that holds this copy.
pub const LOCAL_ID_ANNOTATION: &str = "urn:registry:entry:local-id";

/// Identifier annotation holding the entry id in the store that created the record.
pub const ORIGIN_ID_ANNOTATION: &str = "urn:registry:entry:origin-id";

/// Identification scheme of both entry-id annotations.
pub const ENTRY_ID_SCHEME: &str = "urn:registry:entry:id";

/// Node slot stamped once when a local entry is first created.
pub const LIVE_DATE_SLOT: &str = "liveDate";

/// Node slot refreshed on every local edit.
pub const LAST_UPDATED_SLOT: &str = "lastUpdated";

/// Slot type used for the date slots.
pub const DATE_TIME_SLOT_TYPE: &str = "xs:dateTime";

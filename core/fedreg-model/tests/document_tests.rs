use fedreg_model::{
    DocumentError, RegistryDocument, RegistryEntry, Service, ServiceBinding, Slot,
};
use fedreg_types::RegistryId;
use pretty_assertions::assert_eq;

fn make_document() -> RegistryDocument {
    let mut doc = RegistryDocument::new("urn:uuid:1234");
    doc.name = Some("node-a".into());
    doc.services.push(Service {
        id: "svc-1".into(),
        bindings: vec![ServiceBinding {
            id: "bind-1".into(),
            access_uri: Some("https://node-a/services/csw".into()),
            slots: vec![Slot::new("bindingType", vec!["Csw_Federated_Source".into()])],
            ..Default::default()
        }],
        ..Default::default()
    });
    doc
}

#[test]
fn document_without_id_is_rejected() {
    let err = RegistryDocument::from_json(br#"{"id": "  "}"#).unwrap_err();
    assert!(matches!(err, DocumentError::MissingId));
}

#[test]
fn malformed_document_is_rejected() {
    let err = RegistryDocument::from_json(b"<rim:RegistryPackage/>").unwrap_err();
    assert!(matches!(err, DocumentError::Malformed(_)));
}

#[test]
fn document_roundtrips_through_entry_metadata() {
    let doc = make_document();
    let mut entry = RegistryEntry::new(RegistryId::new("urn:uuid:1234").unwrap(), "node-a");
    entry.set_document(&doc).unwrap();
    assert_eq!(entry.document().unwrap(), doc);
}

#[test]
fn set_slot_replaces_existing_values() {
    let mut doc = make_document();
    doc.set_slot("lastUpdated", Some("xs:dateTime"), vec!["a".into()]);
    doc.set_slot("lastUpdated", None, vec!["b".into()]);
    let slot = doc.slot("lastUpdated").unwrap();
    assert_eq!(slot.values, vec!["b".to_string()]);
    assert_eq!(slot.slot_type.as_deref(), Some("xs:dateTime"));
    assert_eq!(doc.slots.len(), 1);
}

#[test]
fn bindings_iterates_across_services() {
    let mut doc = make_document();
    doc.services.push(Service {
        id: "svc-2".into(),
        bindings: vec![ServiceBinding {
            id: "bind-2".into(),
            ..Default::default()
        }],
        ..Default::default()
    });
    let ids: Vec<_> = doc.bindings().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["bind-1", "bind-2"]);
    assert_eq!(
        doc.bindings().next().unwrap().slot("bindingType").unwrap().first_value(),
        Some("Csw_Federated_Source")
    );
}

#[test]
fn unknown_pass_through_sections_survive() {
    let json = br#"{"id":"urn:uuid:9","organizations":[{"name":"Codice"}],"persons":[{"email":"a@b"}]}"#;
    let doc = RegistryDocument::from_json(json).unwrap();
    let back = RegistryDocument::from_json(doc.to_json().unwrap().as_bytes()).unwrap();
    assert_eq!(back.organizations[0]["name"], "Codice");
    assert_eq!(back.persons.len(), 1);
}

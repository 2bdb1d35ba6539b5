//! The one filter builder behind every registry query.

use fedreg_model::{RegistryEntry, REGISTRY_TAG};
use fedreg_store::{Field, Filter, Query, QueryRequest, RecordGateway, Sort, StoreResult};
use fedreg_types::RegistryId;
use std::collections::BTreeSet;

/// Builds registry queries: always tag-scoped, page-bounded and sorted by
/// creation time, optionally narrowed to local entries, the identity entry,
/// or a set of registry ids.
#[derive(Debug, Clone)]
pub struct RegistryQuery {
    page_size: usize,
    local_only: bool,
    identity_only: bool,
    registry_ids: Option<Vec<RegistryId>>,
}

impl RegistryQuery {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            local_only: false,
            identity_only: false,
            registry_ids: None,
        }
    }

    pub fn local(mut self) -> Self {
        self.local_only = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity_only = true;
        self
    }

    pub fn registry_ids(mut self, ids: &[RegistryId]) -> Self {
        self.registry_ids = Some(ids.to_vec());
        self
    }

    pub fn build(self) -> Query {
        let mut clauses = vec![Filter::equals(Field::Tags, REGISTRY_TAG)];
        if self.local_only {
            clauses.push(Filter::is(Field::LocalNode, true));
        }
        if self.identity_only {
            clauses.push(Filter::is(Field::IdentityNode, true));
        }
        if let Some(ids) = self.registry_ids {
            clauses.push(Filter::or(
                ids.iter()
                    .map(|id| Filter::equals(Field::RegistryId, id.as_str()))
                    .collect(),
            ));
        }
        Query::new(Filter::and(clauses), self.page_size).sorted_by(Sort::ascending(Field::Created))
    }
}

/// Runs `query` page by page against `sources` (local when empty) until every
/// hit has been read.
///
/// With several sources each one is paged independently, so the offset moves
/// by a full page every round. Stops early on an empty page.
pub async fn fetch_all(
    gateway: &dyn RecordGateway,
    mut query: Query,
    sources: BTreeSet<String>,
) -> StoreResult<Vec<RegistryEntry>> {
    query.page_size = query.page_size.max(1);
    query.start_index = 0;
    let mut entries = Vec::new();
    loop {
        let page = gateway
            .query(QueryRequest::from_sources(query.clone(), sources.clone()))
            .await?;
        if page.results.is_empty() {
            break;
        }
        entries.extend(page.results);
        if entries.len() as u64 >= page.hits {
            break;
        }
        query.start_index += query.page_size;
    }
    Ok(entries)
}

//! Attribute filters, sorting and paging over registry entries.

use fedreg_model::RegistryEntry;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Queryable entry attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Id,
    RegistryId,
    Title,
    Tags,
    LocalNode,
    IdentityNode,
    Created,
    Modified,
}

/// Boolean filter tree.
///
/// `Like` patterns are case-sensitive and treat `*` as "any run of
/// characters". `Equals` compares the value verbatim. On [`Field::Tags`]
/// either matches when any tag matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    All,
    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Like { field: Field, pattern: String },
    Equals { field: Field, value: String },
    Is { field: Field, value: bool },
}

impl Filter {
    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And { filters }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or { filters }
    }

    pub fn like(field: Field, pattern: impl Into<String>) -> Self {
        Self::Like {
            field,
            pattern: pattern.into(),
        }
    }

    pub fn equals(field: Field, value: impl Into<String>) -> Self {
        Self::Equals {
            field,
            value: value.into(),
        }
    }

    pub fn is(field: Field, value: bool) -> Self {
        Self::Is { field, value }
    }

    /// Evaluates the filter against `entry`. An empty `Or` matches nothing.
    pub fn matches(&self, entry: &RegistryEntry) -> bool {
        match self {
            Self::All => true,
            Self::And { filters } => filters.iter().all(|f| f.matches(entry)),
            Self::Or { filters } => filters.iter().any(|f| f.matches(entry)),
            Self::Like { field, pattern } => match field {
                Field::Tags => entry.tags.iter().any(|t| wildcard_match(pattern, t)),
                _ => text_value(entry, *field)
                    .map(|v| wildcard_match(pattern, &v))
                    .unwrap_or(false),
            },
            Self::Equals { field, value } => match field {
                Field::Tags => entry.tags.contains(value),
                _ => text_value(entry, *field).is_some_and(|v| v == *value),
            },
            Self::Is { field, value } => match field {
                Field::LocalNode => entry.local_node == *value,
                Field::IdentityNode => entry.identity_node == *value,
                _ => false,
            },
        }
    }
}

fn text_value(entry: &RegistryEntry, field: Field) -> Option<String> {
    match field {
        Field::Id => entry.id.map(|id| id.to_string()),
        Field::RegistryId => entry.registry_id.as_ref().map(|id| id.to_string()),
        Field::Title => entry.title.clone(),
        Field::Created => Some(entry.created.to_rfc3339()),
        Field::Modified => Some(entry.modified.to_rfc3339()),
        Field::Tags | Field::LocalNode | Field::IdentityNode => None,
    }
}

/// Glob match supporting `*` only.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && p[pi] != '*' && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: Field,
    pub order: SortOrder,
}

impl Sort {
    pub fn ascending(field: Field) -> Self {
        Self {
            field,
            order: SortOrder::Ascending,
        }
    }

    pub fn compare(&self, a: &RegistryEntry, b: &RegistryEntry) -> Ordering {
        let ord = match self.field {
            Field::Created => a.created.cmp(&b.created),
            Field::Modified => a.modified.cmp(&b.modified),
            Field::LocalNode => a.local_node.cmp(&b.local_node),
            Field::IdentityNode => a.identity_node.cmp(&b.identity_node),
            Field::Id => a.id.cmp(&b.id),
            Field::RegistryId => a.registry_id.cmp(&b.registry_id),
            Field::Title => a.title.cmp(&b.title),
            Field::Tags => a.tags.cmp(&b.tags),
        };
        match self.order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    }
}

/// A filtered, sorted, paged query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub filter: Filter,
    #[serde(default)]
    pub sort: Option<Sort>,
    /// Zero-based offset of the first result.
    #[serde(default)]
    pub start_index: usize,
    pub page_size: usize,
}

impl Query {
    pub fn new(filter: Filter, page_size: usize) -> Self {
        Self {
            filter,
            sort: None,
            start_index: 0,
            page_size,
        }
    }

    pub fn sorted_by(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Applies filter, sort and paging to `entries`.
    pub fn evaluate(&self, entries: Vec<RegistryEntry>) -> QueryResponse {
        let mut matched: Vec<RegistryEntry> =
            entries.into_iter().filter(|e| self.filter.matches(e)).collect();
        if let Some(sort) = &self.sort {
            matched.sort_by(|a, b| sort.compare(a, b));
        }
        let hits = matched.len() as u64;
        let results = matched
            .into_iter()
            .skip(self.start_index)
            .take(self.page_size)
            .collect();
        QueryResponse { results, hits }
    }
}

/// Results of one query page plus the total number of matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<RegistryEntry>,
    pub hits: u64,
}

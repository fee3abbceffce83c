//! Filter helpers for Qdrant search queries.

use serde_json::{Value, json};

use crate::config::SourceMatch;
use crate::store::SourceFilter;

/// Compose the Qdrant filter that scopes a query to one file.
///
/// `Exact` matches the `document` keyword; `Contains` uses a text match on `source`, which
/// Qdrant evaluates as a substring test when the field carries no full-text index.
pub fn build_source_filter(filter: &SourceFilter) -> Value {
    let condition = match filter.mode() {
        SourceMatch::Exact => json!({
            "key": "document",
            "match": { "value": filter.value() }
        }),
        SourceMatch::Contains => json!({
            "key": "source",
            "match": { "text": filter.value() }
        }),
    };
    json!({ "must": [condition] })
}

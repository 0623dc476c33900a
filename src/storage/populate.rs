//! Reference population shared by the store backends
//!
//! A reference field holds the id of a document in another collection (or an
//! array of such ids). Population replaces each id with the referenced
//! document, provided it satisfies the `match` filter:
//!
//! - single reference that does not match → `null`
//! - array of references → unmatched entries are dropped

use crate::core::query::Condition;
use crate::core::store::{Document, DocumentStore, FindOptions, ID_FIELD, Populate, StoreError};
use serde_json::Value;
use std::collections::HashMap;

fn referenced_ids(documents: &[Document], path: &str) -> Vec<Value> {
    let mut ids: Vec<Value> = Vec::new();
    let mut push = |value: &Value| {
        if value.is_string() && !ids.contains(value) {
            ids.push(value.clone());
        }
    };
    for document in documents {
        match document.get(path) {
            Some(Value::Array(items)) => items.iter().for_each(&mut push),
            Some(value) => push(value),
            None => {}
        }
    }
    ids
}

/// Expand every requested reference on `documents`
pub async fn populate<S>(
    store: &S,
    mut documents: Vec<Document>,
    specs: &[Populate],
) -> Result<Vec<Document>, StoreError>
where
    S: DocumentStore + ?Sized,
{
    for spec in specs {
        let ids = referenced_ids(&documents, &spec.path);
        let found: HashMap<String, Document> = if ids.is_empty() {
            HashMap::new()
        } else {
            // Population requests with an `id` match are rejected upstream
            let filter = spec.filter.clone().and(ID_FIELD, Condition::in_list(ids));
            store
                .find(&spec.collection, &filter, &FindOptions::default())
                .await?
                .into_iter()
                .filter_map(|doc| {
                    let id = doc.get(ID_FIELD)?.as_str()?.to_string();
                    Some((id, doc))
                })
                .collect()
        };

        let resolve = |id: &Value| -> Option<Value> {
            let doc = found.get(id.as_str()?)?;
            let doc = match &spec.select {
                Some(select) => select.apply(doc),
                None => doc.clone(),
            };
            Some(Value::Object(doc))
        };

        for document in documents.iter_mut() {
            let Some(current) = document.get_mut(&spec.path) else {
                continue;
            };
            let resolved = match &*current {
                Value::Null => Value::Null,
                Value::Array(items) => Value::Array(items.iter().filter_map(&resolve).collect()),
                single => resolve(single).unwrap_or(Value::Null),
            };
            *current = resolved;
        }
    }
    Ok(documents)
}

//! `meta.include` support: compound documents for operation results.

use anyhow::Result;
use itertools::Itertools;
use serde_json::{json, Value};
use std::collections::HashSet;

use crate::logic::handler::HandlerRegistry;
use crate::model::{operation_pointer, AtomicError, ErrorKind, Id, Operation, Resource};
use crate::store::traits::StoreTransaction;

/// A validated include path, one relationship name per segment.
pub type IncludePath = Vec<String>;

/// Checks every dotted path of the operation against the resource schemas.
pub fn check_paths(
    registry: &HandlerRegistry,
    operation: &Operation,
) -> Result<Vec<IncludePath>, AtomicError> {
    operation
        .includes()
        .iter()
        .map(|path| check_path(registry, operation, path))
        .collect()
}

fn check_path(
    registry: &HandlerRegistry,
    operation: &Operation,
    path: &str,
) -> Result<IncludePath, AtomicError> {
    let invalid = |detail: String| {
        AtomicError::new(
            ErrorKind::InvalidIncludePath,
            detail,
            operation_pointer(operation.index, &["meta", "include"]),
        )
    };

    let segments: IncludePath = path.split('.').map(str::to_string).collect();
    let mut resource_type = operation.resource_type.clone();

    for segment in &segments {
        let schema = registry
            .schema_handler(&resource_type)
            .map(|handler| handler.schema())
            .ok_or_else(|| invalid(format!("Include path '{}' cannot be resolved", path)))?;

        let relationship = schema.get_relationship(segment).ok_or_else(|| {
            invalid(format!(
                "Include path '{}': '{}' is not a relationship of '{}'",
                path, segment, resource_type
            ))
        })?;
        resource_type = relationship.target.clone();
    }

    Ok(segments)
}

/// Resources reachable from `primary` through `paths`, rendered, each at most
/// once and never the primary resource itself.
pub async fn collect(
    registry: &HandlerRegistry,
    tx: &mut dyn StoreTransaction,
    primary: &Resource,
    paths: &[IncludePath],
) -> Result<Vec<Value>> {
    collect_many(registry, tx, std::slice::from_ref(primary), paths).await
}

/// Same as [`collect`] for several primary resources sharing one
/// `included` list.
pub async fn collect_many(
    registry: &HandlerRegistry,
    tx: &mut dyn StoreTransaction,
    primaries: &[Resource],
    paths: &[IncludePath],
) -> Result<Vec<Value>> {
    let mut seen: HashSet<(String, Id)> = primaries
        .iter()
        .map(|primary| (primary.resource_type.clone(), primary.id.clone()))
        .collect();
    let mut included = Vec::new();

    for path in paths {
        let mut frontier = primaries.to_vec();

        for segment in path {
            let mut next = Vec::new();
            let identifiers = frontier
                .iter()
                .flat_map(|resource| resource.related(segment))
                .unique()
                .collect::<Vec<_>>();

            for identifier in identifiers {
                let Some(id) = identifier.id.as_deref() else {
                    continue;
                };
                // Dangling linkage is skipped
                let Some(related) = tx.get(&identifier.resource_type, id).await? else {
                    continue;
                };

                let key = (related.resource_type.clone(), related.id.clone());
                if seen.insert(key) {
                    included.push(render(registry, &related));
                }
                next.push(related);
            }
            frontier = next;
        }
    }

    Ok(included)
}

/// Result document for one resource, with `included` when non-empty.
pub fn document(data: Value, included: Vec<Value>) -> Value {
    if included.is_empty() {
        json!({ "data": data })
    } else {
        json!({ "data": data, "included": included })
    }
}

fn render(registry: &HandlerRegistry, resource: &Resource) -> Value {
    match registry.schema_handler(&resource.resource_type) {
        Some(handler) => handler.render(resource),
        None => resource.to_resource_object(),
    }
}

//! Local identifier (lid) registry and substitution.
//!
//! The registry lives for exactly one batch. An `add` that declared a lid
//! registers the server-assigned id once it has been applied; every later
//! operation has its lid references rewritten to ids before dispatch.

use serde_json::Value;
use std::collections::HashMap;

use crate::model::{identifier_member, AtomicError, ErrorKind, Id, OpCode, Operation};

#[derive(Debug, Default, Clone)]
pub struct LidRegistry {
    entries: HashMap<String, HashMap<String, Id>>,
}

/// A lid reference that could not be resolved, with its path inside the
/// walked payload.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UnresolvedLid {
    lid: String,
    path: Vec<String>,
}

impl LidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite (last write wins).
    pub fn register(&mut self, resource_type: &str, lid: &str, id: &str) {
        self.entries
            .entry(resource_type.to_string())
            .or_default()
            .insert(lid.to_string(), id.to_string());
    }

    pub fn resolve(&self, resource_type: &str, lid: &str) -> Option<&Id> {
        self.entries.get(resource_type)?.get(lid)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrites every `{type, lid}` object without an `id` inside `node`.
    /// With `is_top_level_add` the root object is left alone: an add
    /// establishes its own lid instead of referencing one.
    pub fn substitute(
        &self,
        node: &mut Value,
        operation: &Operation,
        is_top_level_add: bool,
    ) -> Result<(), AtomicError> {
        let mut path = Vec::new();
        self.walk(node, &mut path, is_top_level_add)
            .map_err(|unresolved| {
                AtomicError::new(
                    ErrorKind::UnknownLid,
                    format!(
                        "Object with lid `{}` received for operation with index `{}` does not exist",
                        unresolved.lid, operation.index
                    ),
                    operation.source_pointer(&unresolved.path),
                )
            })
    }

    /// Resolves all lid references of an operation in place and fills in
    /// the target id for update/remove/update-relationship.
    pub fn resolve_operation(&self, operation: &mut Operation) -> Result<(), AtomicError> {
        let mut payload = std::mem::take(&mut operation.payload);
        let is_top_level_add = operation.code == OpCode::Add;
        let outcome = self.substitute(&mut payload, operation, is_top_level_add);
        operation.payload = payload;
        outcome?;

        match operation.code {
            OpCode::Update | OpCode::Remove | OpCode::UpdateRelationship => {
                if operation.id.is_none() {
                    operation.id = operation
                        .payload
                        .as_object()
                        .and_then(|object| identifier_member(object, "id"));
                }
            }
            OpCode::Add | OpCode::Invoke => {}
        }
        Ok(())
    }

    fn walk(
        &self,
        node: &mut Value,
        path: &mut Vec<String>,
        exempt: bool,
    ) -> Result<(), UnresolvedLid> {
        match node {
            Value::Object(object) => {
                if !exempt {
                    let lid = identifier_member(object, "lid");
                    let has_id = object.get("id").is_some_and(|id| !id.is_null());

                    if let (Some(lid), false) = (lid, has_id) {
                        let resolved = object
                            .get("type")
                            .and_then(Value::as_str)
                            .and_then(|resource_type| self.resolve(resource_type, &lid));

                        match resolved {
                            Some(id) => {
                                object.insert("id".to_string(), Value::String(id.clone()));
                            }
                            None => {
                                let mut lid_path = path.clone();
                                lid_path.push("lid".to_string());
                                return Err(UnresolvedLid {
                                    lid,
                                    path: lid_path,
                                });
                            }
                        }
                    }
                }

                for (key, child) in object.iter_mut() {
                    path.push(key.clone());
                    self.walk(child, path, false)?;
                    path.pop();
                }
                Ok(())
            }
            Value::Array(items) => {
                for (position, child) in items.iter_mut().enumerate() {
                    path.push(position.to_string());
                    self.walk(child, path, false)?;
                    path.pop();
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// `(type, lid)` pairs referenced inside `node` that still lack an `id`.
/// The root object of a top-level add declares its lid and is skipped.
pub fn lid_references(node: &Value, is_top_level_add: bool) -> Vec<(String, String)> {
    let mut references = Vec::new();
    collect_references(node, is_top_level_add, &mut references);
    references
}

fn collect_references(node: &Value, exempt: bool, references: &mut Vec<(String, String)>) {
    match node {
        Value::Object(object) => {
            if !exempt && object.get("id").map_or(true, Value::is_null) {
                let resource_type = object.get("type").and_then(Value::as_str);
                if let (Some(resource_type), Some(lid)) =
                    (resource_type, identifier_member(object, "lid"))
                {
                    references.push((resource_type.to_string(), lid));
                }
            }
            for child in object.values() {
                collect_references(child, false, references);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_references(child, false, references);
            }
        }
        _ => {}
    }
}

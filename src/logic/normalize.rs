//! Converts raw operation objects into canonical `Operation` records.
//!
//! Every operation is checked and normalized before anything executes, so a
//! malformed operation at any index rejects the batch with no side effects.

use serde_json::{Map, Value};

use crate::logic::envelope::{check_operation, check_root};
use crate::model::{identifier_member, is_bulk_type, AtomicError, OpCode, Operation};

/// Normalizes a whole request document, in input order.
pub fn normalize_request(document: &Value) -> Result<Vec<Operation>, AtomicError> {
    check_root(document)?
        .iter()
        .enumerate()
        .map(|(index, operation)| normalize(index, operation))
        .collect()
}

/// Normalizes the operation object at `index`.
pub fn normalize(index: usize, operation: &Value) -> Result<Operation, AtomicError> {
    let code = check_operation(index, operation)?;
    // `check_operation` has already proven the shape below
    let empty = Map::new();
    let object = operation.as_object().unwrap_or(&empty);

    let meta = object
        .get("meta")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let operation = match code {
        OpCode::Add => {
            let payload = canonical_resource(section(object, "data"));
            let resource_type = type_of(&payload);
            Operation {
                index,
                code,
                bulk_collection: is_bulk_type(&resource_type),
                resource_type,
                id: identifier_of(&payload, "id"),
                lid: identifier_of(&payload, "lid"),
                relationship_name: None,
                payload,
                href: None,
                meta,
            }
        }
        OpCode::Remove => {
            let payload = canonical_resource(section(object, "ref"));
            target_operation(index, code, payload, None, meta)
        }
        OpCode::Update | OpCode::UpdateRelationship => match section(object, "ref") {
            Value::Object(reference) if !reference.is_empty() => {
                let name = reference
                    .get("relationship")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let data = object.get("data").cloned().unwrap_or(Value::Null);

                let mut target = reference.clone();
                target.remove("relationship");
                let mut payload = canonical_resource(Value::Object(target));
                if let Value::Object(payload) = &mut payload {
                    let mut relationships = Map::new();
                    relationships.insert(name.clone(), serde_json::json!({ "data": data }));
                    payload.insert("relationships".to_string(), Value::Object(relationships));
                }
                target_operation(index, OpCode::UpdateRelationship, payload, Some(name), meta)
            }
            _ => {
                let payload = canonical_resource(section(object, "data"));
                target_operation(index, OpCode::Update, payload, None, meta)
            }
        },
        OpCode::Invoke => {
            let reference = object.get("ref").and_then(Value::as_object).unwrap_or(&empty);
            let payload = match section(object, "data") {
                data @ Value::Object(_) if is_resource_like(&data) => canonical_resource(data),
                data => data,
            };
            Operation {
                index,
                code,
                resource_type: reference
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                id: identifier_member(reference, "id"),
                lid: None,
                relationship_name: None,
                payload,
                href: reference
                    .get("href")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                meta,
                bulk_collection: false,
            }
        }
    };

    Ok(operation)
}

fn target_operation(
    index: usize,
    code: OpCode,
    payload: Value,
    relationship_name: Option<String>,
    meta: Map<String, Value>,
) -> Operation {
    Operation {
        index,
        code,
        resource_type: type_of(&payload),
        id: identifier_of(&payload, "id"),
        lid: identifier_of(&payload, "lid"),
        relationship_name,
        payload,
        href: None,
        meta,
        bulk_collection: false,
    }
}

fn section(object: &Map<String, Value>, key: &str) -> Value {
    object.get(key).cloned().unwrap_or(Value::Null)
}

/// Renders a numeric top-level `id` as a string; drops an empty one.
fn canonical_resource(mut value: Value) -> Value {
    if let Value::Object(object) = &mut value {
        match identifier_member(object, "id") {
            Some(id) => {
                object.insert("id".to_string(), Value::String(id));
            }
            None => {
                object.remove("id");
            }
        }
    }
    value
}

fn is_resource_like(data: &Value) -> bool {
    data.get("attributes").is_some() || data.get("relationships").is_some()
}

fn type_of(payload: &Value) -> String {
    payload
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn identifier_of(payload: &Value, key: &str) -> Option<String> {
    payload.as_object().and_then(|object| identifier_member(object, key))
}

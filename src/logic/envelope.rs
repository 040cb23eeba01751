//! Structural validation of the request document and of each operation
//! object. Nothing here touches the store: a failure rejects the whole
//! request before anything executes.

use itertools::Itertools;
use serde_json::{Map, Value};

use crate::model::{
    identifier_member, operation_pointer, operations_pointer, AtomicError, ErrorKind, OpCode,
    ATOMIC_OPERATIONS,
};

/// Returns the operation objects of a request document.
pub fn check_root(document: &Value) -> Result<&Vec<Value>, AtomicError> {
    let operations = document
        .as_object()
        .and_then(|root| root.get(ATOMIC_OPERATIONS))
        .ok_or_else(|| {
            AtomicError::new(
                ErrorKind::MissingOperationObjects,
                "Received document does not contain operations objects",
                operations_pointer(),
            )
        })?;

    operations.as_array().ok_or_else(|| {
        AtomicError::new(
            ErrorKind::InvalidOperationObjects,
            "Received operation objects is not a valid JSON:API atomic operation request",
            operations_pointer(),
        )
    })
}

/// Checks one operation object and returns its code.
pub fn check_operation(index: usize, operation: &Value) -> Result<OpCode, AtomicError> {
    let object = operation.as_object().ok_or_else(|| {
        AtomicError::new(
            ErrorKind::InvalidOperationObjects,
            "Received operation is not an object",
            operation_pointer::<&str>(index, &[]),
        )
    })?;

    let raw_code = match object.get("op") {
        None | Some(Value::Null) => None,
        Some(Value::String(code)) if code.is_empty() => None,
        Some(code) => Some(code),
    }
    .ok_or_else(|| {
        AtomicError::new(
            ErrorKind::MissingOperationCode,
            "Received operation does not provide an operation code",
            operation_pointer(index, &["op"]),
        )
    })?;

    let code = raw_code.as_str().and_then(OpCode::from_wire);

    if is_present(object.get("href")) && code != Some(OpCode::Invoke) {
        return Err(AtomicError::new(
            ErrorKind::NotImplemented,
            "Operation 'href' is only supported for invoke operations. Use 'ref' instead.",
            operation_pointer(index, &["href"]),
        ));
    }

    let code = code.ok_or_else(|| {
        AtomicError::new(
            ErrorKind::UnknownOperationCode,
            format!(
                "Unknown operation '{}'. Supported operations: {}",
                display_code(raw_code),
                OpCode::SUPPORTED.iter().map(OpCode::as_str).join(", ")
            ),
            operation_pointer(index, &["op"]),
        )
    })?;

    match code {
        OpCode::Add => check_add(index, object)?,
        OpCode::Remove => check_remove(index, object)?,
        OpCode::Update | OpCode::UpdateRelationship => check_update(index, object)?,
        OpCode::Invoke => check_invoke(index, object)?,
    }

    check_meta(index, object)?;
    Ok(code)
}

/// Update/remove targets need exactly one of `id`/`lid`; every identifier
/// needs a `type`.
pub fn check_resource_identifier(
    index: usize,
    identifier: &Map<String, Value>,
    require_id: bool,
    location: &[&str],
) -> Result<(), AtomicError> {
    if require_id {
        let id = identifier_member(identifier, "id");
        let lid = identifier_member(identifier, "lid");

        match (id, lid) {
            (None, None) => {
                return Err(AtomicError::new(
                    ErrorKind::MissingId,
                    "The resource identifier object must contain an `id` member or a `lid` member",
                    operation_pointer(index, location),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(AtomicError::new(
                    ErrorKind::MultipleIdFields,
                    "Only one of `id`, `lid` may be specified",
                    operation_pointer(index, location),
                ))
            }
            _ => {}
        }
    }

    let has_type = identifier
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.is_empty());
    if !has_type {
        return Err(AtomicError::new(
            ErrorKind::MissingType,
            "The resource identifier object must contain a `type` member",
            operation_pointer(index, location),
        ));
    }
    Ok(())
}

fn check_add(index: usize, operation: &Map<String, Value>) -> Result<(), AtomicError> {
    let data = match operation.get("data") {
        None | Some(Value::Null) => return Err(missing_primary_data(index)),
        Some(Value::Object(data)) => data,
        Some(_) => return Err(invalid_primary_data_type(index, "object")),
    };
    check_resource_identifier(index, data, false, &["data"])
}

fn check_remove(index: usize, operation: &Map<String, Value>) -> Result<(), AtomicError> {
    let reference = required_ref(index, operation, "`ref` must be part of remove operation")?;
    check_resource_identifier(index, reference, true, &["ref"])
}

fn check_update(index: usize, operation: &Map<String, Value>) -> Result<(), AtomicError> {
    if is_present(operation.get("ref")) {
        return check_relationship_update(index, operation);
    }

    match operation.get("data") {
        None | Some(Value::Null) => Err(missing_primary_data(index)),
        Some(Value::Object(data)) if data.is_empty() => Err(missing_primary_data(index)),
        Some(Value::Object(data)) => check_resource_identifier(index, data, true, &["data"]),
        Some(_) => Err(invalid_primary_data_type(index, "object")),
    }
}

fn check_relationship_update(index: usize, operation: &Map<String, Value>) -> Result<(), AtomicError> {
    let reference = required_ref(index, operation, "`ref` must be an object")?;
    check_resource_identifier(index, reference, true, &["ref"])?;

    let named = reference
        .get("relationship")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.is_empty());
    if !named {
        return Err(AtomicError::new(
            ErrorKind::MissingRelationshipNaming,
            "relationship must be named by the `relationship` attribute",
            operation_pointer(index, &["ref"]),
        ));
    }

    // `data` must be present, even if it is null
    match operation.get("data") {
        None => Err(missing_primary_data(index)),
        Some(Value::Null) => Ok(()),
        Some(Value::Object(identifier)) => check_resource_identifier(index, identifier, true, &["data"]),
        Some(Value::Array(identifiers)) => {
            for (position, identifier) in identifiers.iter().enumerate() {
                let position = position.to_string();
                let location = ["data", position.as_str()];
                let identifier = identifier.as_object().ok_or_else(|| {
                    AtomicError::new(
                        ErrorKind::InvalidPrimaryDataType,
                        "Relationship data entries must be resource identifier objects",
                        operation_pointer(index, &location),
                    )
                })?;
                check_resource_identifier(index, identifier, true, &location)?;
            }
            Ok(())
        }
        Some(_) => Err(invalid_primary_data_type(index, "object or array")),
    }
}

fn check_invoke(index: usize, operation: &Map<String, Value>) -> Result<(), AtomicError> {
    let reference = required_ref(index, operation, "`ref` is required for invoke operation")?;

    if !reference.get("href").and_then(Value::as_str).is_some_and(|h| !h.is_empty()) {
        return Err(AtomicError::new(
            ErrorKind::MissingHrefAttribute,
            "`href` is required in ref for invoke operation",
            operation_pointer(index, &["ref"]),
        ));
    }

    if !reference.get("type").and_then(Value::as_str).is_some_and(|t| !t.is_empty()) {
        return Err(AtomicError::new(
            ErrorKind::MissingType,
            "`type` is required in ref for invoke operation",
            operation_pointer(index, &["ref"]),
        ));
    }
    Ok(())
}

fn check_meta(index: usize, operation: &Map<String, Value>) -> Result<(), AtomicError> {
    let meta = match operation.get("meta") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Object(meta)) => meta,
        Some(_) => {
            return Err(AtomicError::new(
                ErrorKind::InvalidOperationMetaObject,
                "Received operation meta data value is not valid",
                operation_pointer(index, &["meta"]),
            ))
        }
    };

    if let Some(include) = meta.get("include") {
        let valid = include
            .as_array()
            .is_some_and(|paths| paths.iter().all(Value::is_string));
        if !valid {
            return Err(AtomicError::new(
                ErrorKind::InvalidOperationIncludeValue,
                "Received operation include value is not a list",
                operation_pointer(index, &["meta", "include"]),
            ));
        }
    }
    Ok(())
}

fn required_ref<'a>(
    index: usize,
    operation: &'a Map<String, Value>,
    detail: &str,
) -> Result<&'a Map<String, Value>, AtomicError> {
    operation
        .get("ref")
        .and_then(Value::as_object)
        .filter(|reference| !reference.is_empty())
        .ok_or_else(|| {
            AtomicError::new(
                ErrorKind::MissingRefAttribute,
                detail,
                operation_pointer::<&str>(index, &[]),
            )
        })
}

fn missing_primary_data(index: usize) -> AtomicError {
    AtomicError::new(
        ErrorKind::MissingPrimaryData,
        "The operation must contain a `data` member",
        operation_pointer::<&str>(index, &[]),
    )
}

fn invalid_primary_data_type(index: usize, expected: &str) -> AtomicError {
    AtomicError::new(
        ErrorKind::InvalidPrimaryDataType,
        format!("Primary data must be of type {}", expected),
        operation_pointer(index, &["data"]),
    )
}

/// Absent, `null`, `""`, `{}` and `[]` all count as not provided.
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(_) => true,
    }
}

fn display_code(code: &Value) -> String {
    match code {
        Value::String(code) => code.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kind(operation: Value) -> ErrorKind {
        check_operation(0, &operation).unwrap_err().kind
    }

    #[test]
    fn test_root_shape() {
        assert_eq!(
            check_root(&json!([])).unwrap_err().kind,
            ErrorKind::MissingOperationObjects
        );
        assert_eq!(
            check_root(&json!({"data": {}})).unwrap_err().kind,
            ErrorKind::MissingOperationObjects
        );
        let error = check_root(&json!({"atomic:operations": {}})).unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidOperationObjects);
        assert_eq!(error.pointer, "/atomic:operations");
        assert!(check_root(&json!({"atomic:operations": []})).unwrap().is_empty());
    }

    #[test]
    fn test_operation_code() {
        let error = check_operation(2, &json!({"data": {"type": "articles"}})).unwrap_err();
        assert_eq!(error.kind, ErrorKind::MissingOperationCode);
        assert_eq!(error.pointer, "/atomic:operations/2/op");

        let error = check_operation(0, &json!({"op": "upsert"})).unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnknownOperationCode);
        assert_eq!(
            error.detail,
            "Unknown operation 'upsert'. Supported operations: add, update, remove, invoke"
        );
        assert_eq!(kind(json!({"op": "update-relationship"})), ErrorKind::UnknownOperationCode);
        assert_eq!(kind(json!("add")), ErrorKind::InvalidOperationObjects);
    }

    #[test]
    fn test_href_only_on_invoke() {
        let error = check_operation(
            1,
            &json!({"op": "add", "href": "/articles", "data": {"type": "articles"}}),
        )
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::NotImplemented);
        assert_eq!(error.pointer, "/atomic:operations/1/href");

        // Takes precedence over every other shape problem
        assert_eq!(kind(json!({"op": "remove", "href": "/x"})), ErrorKind::NotImplemented);
        assert_eq!(kind(json!({"op": "bogus", "href": "/x"})), ErrorKind::NotImplemented);
    }

    #[test]
    fn test_add_shape() {
        assert_eq!(kind(json!({"op": "add"})), ErrorKind::MissingPrimaryData);
        assert_eq!(kind(json!({"op": "add", "data": [1]})), ErrorKind::InvalidPrimaryDataType);
        assert_eq!(kind(json!({"op": "add", "data": {"lid": "a"}})), ErrorKind::MissingType);
        assert_eq!(
            check_operation(0, &json!({"op": "add", "data": {"type": "articles"}})).unwrap(),
            OpCode::Add
        );
    }

    #[test]
    fn test_remove_identifier_rules() {
        assert_eq!(kind(json!({"op": "remove"})), ErrorKind::MissingRefAttribute);

        let error = check_operation(0, &json!({"op": "remove", "ref": {"type": "articles"}})).unwrap_err();
        assert_eq!(error.kind, ErrorKind::MissingId);
        assert_eq!(error.pointer, "/atomic:operations/0/ref");

        assert_eq!(
            kind(json!({"op": "remove", "ref": {"type": "articles", "id": "1", "lid": "a"}})),
            ErrorKind::MultipleIdFields
        );
        assert_eq!(kind(json!({"op": "remove", "ref": {"id": "1"}})), ErrorKind::MissingType);
        assert!(check_operation(0, &json!({"op": "remove", "ref": {"type": "articles", "lid": "a"}})).is_ok());
    }

    #[test]
    fn test_update_resource_rules() {
        assert_eq!(kind(json!({"op": "update"})), ErrorKind::MissingPrimaryData);
        assert_eq!(kind(json!({"op": "update", "data": "x"})), ErrorKind::InvalidPrimaryDataType);
        assert_eq!(
            kind(json!({"op": "update", "data": {"type": "articles"}})),
            ErrorKind::MissingId
        );
        assert_eq!(
            kind(json!({"op": "update", "data": {"type": "articles", "id": "1", "lid": "a"}})),
            ErrorKind::MultipleIdFields
        );
        assert!(check_operation(0, &json!({"op": "update", "data": {"type": "articles", "id": "1"}})).is_ok());
    }

    #[test]
    fn test_relationship_update_rules() {
        assert_eq!(
            kind(json!({"op": "update", "ref": {"type": "articles", "id": "1"}, "data": null})),
            ErrorKind::MissingRelationshipNaming
        );
        assert_eq!(
            kind(json!({"op": "update", "ref": {"type": "articles", "id": "1", "relationship": "author"}})),
            ErrorKind::MissingPrimaryData
        );
        assert!(check_operation(
            0,
            &json!({"op": "update", "ref": {"type": "articles", "id": "1", "relationship": "author"}, "data": null})
        )
        .is_ok());
        assert_eq!(
            kind(json!({"op": "update", "ref": {"type": "articles", "id": "1", "relationship": "author"}, "data": 3})),
            ErrorKind::InvalidPrimaryDataType
        );

        let error = check_operation(
            0,
            &json!({
                "op": "update",
                "ref": {"type": "articles", "id": "1", "relationship": "comments"},
                "data": [{"type": "comments", "id": "1"}, {"type": "comments"}]
            }),
        )
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::MissingId);
        assert_eq!(error.pointer, "/atomic:operations/0/data/1");
    }

    #[test]
    fn test_invoke_rules() {
        assert_eq!(kind(json!({"op": "invoke"})), ErrorKind::MissingRefAttribute);
        assert_eq!(
            kind(json!({"op": "invoke", "ref": {"type": "articles"}})),
            ErrorKind::MissingHrefAttribute
        );
        assert_eq!(
            kind(json!({"op": "invoke", "ref": {"href": "/articles/publish"}})),
            ErrorKind::MissingType
        );
        assert!(check_operation(
            0,
            &json!({"op": "invoke", "href": "/x", "ref": {"type": "articles", "href": "/articles/publish"}})
        )
        .is_ok());
    }

    #[test]
    fn test_meta_rules() {
        let base = |meta: Value| json!({"op": "add", "data": {"type": "articles"}, "meta": meta});

        let error = check_operation(0, &base(json!("x"))).unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidOperationMetaObject);
        assert_eq!(error.pointer, "/atomic:operations/0/meta");

        let error = check_operation(0, &base(json!({"include": "author"}))).unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidOperationIncludeValue);
        assert_eq!(error.pointer, "/atomic:operations/0/meta/include");

        assert!(check_operation(0, &base(json!({"include": ["author"]}))).is_ok());
        assert!(check_operation(0, &base(json!(null))).is_ok());
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{operation_pointer, Id};

/// Canonical operation codes. `UpdateRelationship` never appears on the wire;
/// it is derived from an `update` carrying a `ref.relationship`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpCode {
    Add,
    Update,
    Remove,
    Invoke,
    UpdateRelationship,
}

impl OpCode {
    /// Codes accepted in the `op` member of a request.
    pub const SUPPORTED: [OpCode; 4] = [OpCode::Add, OpCode::Update, OpCode::Remove, OpCode::Invoke];

    pub fn from_wire(code: &str) -> Option<Self> {
        match code {
            "add" => Some(OpCode::Add),
            "update" => Some(OpCode::Update),
            "remove" => Some(OpCode::Remove),
            "invoke" => Some(OpCode::Invoke),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpCode::Add => "add",
            OpCode::Update => "update",
            OpCode::Remove => "remove",
            OpCode::Invoke => "invoke",
            OpCode::UpdateRelationship => "update-relationship",
        }
    }

    /// Only creation and deletion can be collapsed into one persistence call.
    pub fn is_bulk_eligible(&self) -> bool {
        match self {
            OpCode::Add | OpCode::Remove => true,
            OpCode::Update | OpCode::Invoke | OpCode::UpdateRelationship => false,
        }
    }

    /// Relationship updates are side-effect only.
    pub fn produces_result(&self) -> bool {
        match self {
            OpCode::Add | OpCode::Update | OpCode::Remove | OpCode::Invoke => true,
            OpCode::UpdateRelationship => false,
        }
    }

    /// Code used to select the resource handler.
    pub fn dispatch_code(&self) -> OpCode {
        match self {
            OpCode::UpdateRelationship => OpCode::Update,
            other => *other,
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized operation. Built once by the normalizer; only the lid
/// resolver mutates it afterwards (id injection).
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub index: usize,
    pub code: OpCode,
    pub resource_type: String,
    pub id: Option<Id>,
    pub lid: Option<String>,
    pub relationship_name: Option<String>,
    /// Resource object (add/update/remove/update-relationship) or invoke data
    pub payload: Value,
    pub href: Option<String>,
    pub meta: Map<String, Value>,
    /// Resource type carries the bulk collection marker
    pub bulk_collection: bool,
}

impl Operation {
    /// Request member the payload was taken from.
    pub fn source_section(&self) -> &'static str {
        match self.code {
            OpCode::Add | OpCode::Update | OpCode::Invoke => "data",
            OpCode::Remove | OpCode::UpdateRelationship => "ref",
        }
    }

    /// Maps a path inside the canonical payload back to a pointer into the
    /// original request document.
    pub fn source_pointer<S: AsRef<str>>(&self, path: &[S]) -> String {
        if self.code == OpCode::UpdateRelationship {
            if let (Some(name), [first, second, third, rest @ ..]) =
                (self.relationship_name.as_deref(), path)
            {
                if first.as_ref() == "relationships"
                    && second.as_ref() == name
                    && third.as_ref() == "data"
                {
                    let mut tail = vec!["data"];
                    tail.extend(rest.iter().map(|s| s.as_ref()));
                    return operation_pointer(self.index, &tail);
                }
            }
        }

        let mut tail = vec![self.source_section()];
        tail.extend(path.iter().map(|s| s.as_ref()));
        operation_pointer(self.index, &tail)
    }

    /// Pointer to the operation object itself.
    pub fn pointer(&self) -> String {
        operation_pointer::<&str>(self.index, &[])
    }

    /// Action name for invoke operations: last non-empty segment of `href`.
    pub fn action(&self) -> Option<&str> {
        self.href
            .as_deref()
            .and_then(|href| href.trim_end_matches('/').rsplit('/').next())
            .filter(|segment| !segment.is_empty())
    }

    /// Dotted relationship paths requested through `meta.include`.
    pub fn includes(&self) -> Vec<String> {
        match self.meta.get("include") {
            Some(Value::Array(paths)) => paths
                .iter()
                .filter_map(|p| p.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Key used to group contiguous operations in bulk mode.
    pub fn bulk_key(&self) -> Option<BulkKey> {
        if self.code.is_bulk_eligible() {
            Some(BulkKey {
                code: self.code,
                resource_type: self.resource_type.clone(),
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BulkKey {
    pub code: OpCode,
    pub resource_type: String,
}

/// `{type, id?, lid?}` naming a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
}

impl ResourceIdentifier {
    pub fn new(resource_type: impl Into<String>, id: impl Into<Id>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: Some(id.into()),
            lid: None,
        }
    }

    /// Reads an identifier out of an arbitrary JSON object, if it has a type.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let resource_type = object.get("type")?.as_str()?.to_string();
        Some(Self {
            resource_type,
            id: identifier_member(object, "id"),
            lid: identifier_member(object, "lid"),
        })
    }
}

/// Reads an `id`/`lid` member. Strings must be non-empty; numbers are
/// accepted and rendered as strings.
pub fn identifier_member(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn operation(code: OpCode) -> Operation {
        Operation {
            index: 2,
            code,
            resource_type: "articles".to_string(),
            id: Some("1".to_string()),
            lid: None,
            relationship_name: None,
            payload: json!({}),
            href: None,
            meta: Map::new(),
            bulk_collection: false,
        }
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(OpCode::from_wire("add"), Some(OpCode::Add));
        assert_eq!(OpCode::from_wire("update-relationship"), None);
        assert_eq!(OpCode::from_wire("ADD"), None);
        assert_eq!(OpCode::UpdateRelationship.dispatch_code(), OpCode::Update);
        assert!(!OpCode::UpdateRelationship.produces_result());
        assert!(OpCode::Remove.is_bulk_eligible());
        assert!(!OpCode::Update.is_bulk_eligible());
    }

    #[test]
    fn test_source_pointer_per_code() {
        assert_eq!(
            operation(OpCode::Add).source_pointer(&["attributes", "title"]),
            "/atomic:operations/2/data/attributes/title"
        );
        assert_eq!(
            operation(OpCode::Remove).source_pointer(&["id"]),
            "/atomic:operations/2/ref/id"
        );

        let mut relationship = operation(OpCode::UpdateRelationship);
        relationship.relationship_name = Some("author".to_string());
        assert_eq!(
            relationship.source_pointer(&["relationships", "author", "data", "lid"]),
            "/atomic:operations/2/data/lid"
        );
        assert_eq!(
            relationship.source_pointer(&["relationships", "author", "data", "1", "lid"]),
            "/atomic:operations/2/data/1/lid"
        );
        assert_eq!(
            relationship.source_pointer(&["lid"]),
            "/atomic:operations/2/ref/lid"
        );
    }

    #[test]
    fn test_action_from_href() {
        let mut invoke = operation(OpCode::Invoke);
        invoke.href = Some("/api/articles/publish/".to_string());
        assert_eq!(invoke.action(), Some("publish"));
        invoke.href = Some("publish".to_string());
        assert_eq!(invoke.action(), Some("publish"));
        invoke.href = Some("/".to_string());
        assert_eq!(invoke.action(), None);
    }

    #[test]
    fn test_identifier_from_value() {
        let identifier = ResourceIdentifier::from_value(&json!({"type": "people", "lid": "p"}))
            .expect("identifier");
        assert_eq!(identifier.resource_type, "people");
        assert_eq!(identifier.id, None);
        assert_eq!(identifier.lid.as_deref(), Some("p"));
        assert!(ResourceIdentifier::from_value(&json!({"id": "1"})).is_none());
        assert_eq!(
            ResourceIdentifier::from_value(&json!({"type": "people", "id": 7}))
                .and_then(|i| i.id),
            Some("7".to_string())
        );
    }
}

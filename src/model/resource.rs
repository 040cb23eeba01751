use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::model::{Id, ResourceIdentifier};

/// A persisted resource record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Id,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub attributes: Map<String, Value>,
    /// Relationship name to resource linkage (`null`, identifier or list of identifiers)
    pub relationships: Map<String, Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Resource input model for creation. The ID is generated server-side
/// unless the client supplied one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub attributes: Map<String, Value>,
    pub relationships: Map<String, Value>,
}

impl Resource {
    pub fn from_new(new_resource: NewResource) -> Self {
        let now = Utc::now();
        Self {
            id: new_resource.id.unwrap_or_else(crate::model::generate_id),
            resource_type: new_resource.resource_type,
            attributes: new_resource.attributes,
            relationships: new_resource.relationships,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier::new(self.resource_type.clone(), self.id.clone())
    }

    /// Identifiers this resource links to through `relationship`.
    pub fn related(&self, relationship: &str) -> Vec<ResourceIdentifier> {
        match self.relationships.get(relationship) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(ResourceIdentifier::from_value)
                .filter(|identifier| identifier.id.is_some())
                .collect(),
            Some(value @ Value::Object(_)) => ResourceIdentifier::from_value(value)
                .filter(|identifier| identifier.id.is_some())
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// JSON:API resource object: `{type, id, attributes, relationships}`.
    pub fn to_resource_object(&self) -> Value {
        let relationships: Map<String, Value> = self
            .relationships
            .iter()
            .map(|(name, linkage)| (name.clone(), json!({ "data": linkage })))
            .collect();

        let mut object = Map::new();
        object.insert("type".to_string(), Value::String(self.resource_type.clone()));
        object.insert("id".to_string(), Value::String(self.id.clone()));
        object.insert("attributes".to_string(), Value::Object(self.attributes.clone()));
        if !relationships.is_empty() {
            object.insert("relationships".to_string(), Value::Object(relationships));
        }
        Value::Object(object)
    }
}

/// Typed view of an incoming resource object after lid substitution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceObject {
    pub resource_type: String,
    pub id: Option<Id>,
    pub lid: Option<String>,
    pub attributes: Map<String, Value>,
    /// Relationship name to relationship object (`{"data": ...}`)
    pub relationships: Map<String, Value>,
}

impl ResourceObject {
    /// Lenient read: missing members become empty. Structural checks have
    /// already run by the time handlers see a payload.
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let members = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };

        Self {
            resource_type: object
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            id: crate::model::identifier_member(object, "id"),
            lid: crate::model::identifier_member(object, "lid"),
            attributes: members("attributes"),
            relationships: members("relationships"),
        }
    }

    /// Linkage carried by a relationship object, `None` when the relationship
    /// is absent or its object has no `data` member.
    pub fn linkage(&self, relationship: &str) -> Option<Value> {
        self.relationships
            .get(relationship)
            .and_then(Value::as_object)
            .and_then(|object| object.get("data"))
            .map(strip_lids)
    }
}

/// Stored linkage keeps only `{type, id}`; lids are request-scoped.
fn strip_lids(linkage: &Value) -> Value {
    match linkage {
        Value::Array(items) => Value::Array(items.iter().map(strip_lids).collect()),
        Value::Object(object) => {
            let mut stripped = object.clone();
            stripped.remove("lid");
            Value::Object(stripped)
        }
        other => other.clone(),
    }
}

use serde::{Deserialize, Serialize};

use crate::model::{DataType, OpCode};

/// Structure of one resource type: which attributes and relationships it
/// accepts and which operation codes may target it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSchema {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub attributes: Vec<AttributeDef>,
    pub relationships: Vec<RelationshipDef>,
    pub operations: Vec<OpCode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub data_type: DataType,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    /// Resource type on the other side of the relationship
    pub target: String,
    pub cardinality: Cardinality,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

impl ResourceSchema {
    /// Schema accepting add, update and remove.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
            operations: vec![OpCode::Add, OpCode::Update, OpCode::Remove],
        }
    }

    pub fn attribute(mut self, name: &str, data_type: DataType, required: bool) -> Self {
        self.attributes.push(AttributeDef {
            name: name.to_string(),
            data_type,
            required,
        });
        self
    }

    pub fn to_one(mut self, name: &str, target: &str, required: bool) -> Self {
        self.relationships.push(RelationshipDef {
            name: name.to_string(),
            target: target.to_string(),
            cardinality: Cardinality::ToOne,
            required,
        });
        self
    }

    pub fn to_many(mut self, name: &str, target: &str) -> Self {
        self.relationships.push(RelationshipDef {
            name: name.to_string(),
            target: target.to_string(),
            cardinality: Cardinality::ToMany,
            required: false,
        });
        self
    }

    pub fn with_operations(mut self, operations: &[OpCode]) -> Self {
        self.operations = operations.to_vec();
        self
    }

    pub fn get_attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn get_relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Update-relationship is accepted wherever update is.
    pub fn accepts(&self, code: OpCode) -> bool {
        self.operations.contains(&code.dispatch_code())
    }
}

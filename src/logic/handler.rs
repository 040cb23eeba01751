//! Resource handler contract and the registry that selects handlers by
//! `(operation code, resource type)` or `(resource type, action)`.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::model::{Id, NewResource, OpCode, Resource, ResourceObject, ResourceSchema};
use crate::store::traits::StoreTransaction;

/// Where a handler validation failure sits inside the resource object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLocation {
    Attribute(String),
    Relationship(String),
    Resource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub location: FieldLocation,
    pub detail: String,
}

impl FieldError {
    pub fn attribute(name: &str, detail: impl Into<String>) -> Self {
        Self {
            location: FieldLocation::Attribute(name.to_string()),
            detail: detail.into(),
        }
    }

    pub fn relationship(name: &str, detail: impl Into<String>) -> Self {
        Self {
            location: FieldLocation::Relationship(name.to_string()),
            detail: detail.into(),
        }
    }

    pub fn resource(detail: impl Into<String>) -> Self {
        Self {
            location: FieldLocation::Resource,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("validation failed with {} error(s)", .0.len())]
    Invalid(Vec<FieldError>),
    #[error("{resource_type} `{id}` does not exist")]
    NotFound { resource_type: String, id: Id },
    #[error("{0}")]
    Unsupported(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Output of a successful `validate`: what `apply` will persist.
#[derive(Debug, Clone, PartialEq)]
pub enum Validated {
    Create(NewResource),
    Replace(Resource),
}

#[async_trait::async_trait]
pub trait ResourceHandler: Send + Sync {
    fn schema(&self) -> &ResourceSchema;

    fn supports(&self, code: OpCode) -> bool {
        self.schema().accepts(code)
    }

    async fn locate(
        &self,
        tx: &mut dyn StoreTransaction,
        id: &str,
    ) -> Result<Option<Resource>, HandlerError>;

    /// Check a payload. `instance` is the located resource for updates;
    /// `partial` is set for updates, where absent members keep their value.
    fn validate(
        &self,
        payload: &ResourceObject,
        instance: Option<&Resource>,
        partial: bool,
    ) -> Result<Validated, HandlerError>;

    async fn apply(
        &self,
        tx: &mut dyn StoreTransaction,
        validated: Validated,
    ) -> Result<Resource, HandlerError>;

    /// JSON:API resource object for a resource of this type
    fn render(&self, instance: &Resource) -> Value;

    async fn delete(
        &self,
        tx: &mut dyn StoreTransaction,
        instance: &Resource,
    ) -> Result<(), HandlerError>;

    async fn apply_many(
        &self,
        tx: &mut dyn StoreTransaction,
        validated: Vec<Validated>,
    ) -> Result<Vec<Resource>, HandlerError> {
        let mut applied = Vec::with_capacity(validated.len());
        for item in validated {
            applied.push(self.apply(tx, item).await?);
        }
        Ok(applied)
    }

    async fn delete_many(
        &self,
        tx: &mut dyn StoreTransaction,
        instances: &[Resource],
    ) -> Result<(), HandlerError> {
        for instance in instances {
            self.delete(tx, instance).await?;
        }
        Ok(())
    }
}

/// Custom action reached through an invoke operation.
#[async_trait::async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action; returns the primary data of the result document.
    async fn invoke(
        &self,
        tx: &mut dyn StoreTransaction,
        data: &Value,
    ) -> Result<Value, HandlerError>;
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    resources: HashMap<String, Arc<dyn ResourceHandler>>,
    actions: HashMap<(String, String), Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_resource(&mut self, handler: Arc<dyn ResourceHandler>) -> &mut Self {
        let resource_type = handler.schema().resource_type.clone();
        self.resources.insert(resource_type, handler);
        self
    }

    pub fn register_action(
        &mut self,
        resource_type: &str,
        action: &str,
        handler: Arc<dyn ActionHandler>,
    ) -> &mut Self {
        self.actions
            .insert((resource_type.to_string(), action.to_string()), handler);
        self
    }

    /// Handler for a resource type regardless of operation code.
    pub fn schema_handler(&self, resource_type: &str) -> Option<&Arc<dyn ResourceHandler>> {
        self.resources.get(resource_type)
    }

    /// Handler selected by `(code, type)`; `None` when the type is unknown
    /// or does not accept the code.
    pub fn resource_handler(
        &self,
        code: OpCode,
        resource_type: &str,
    ) -> Option<&Arc<dyn ResourceHandler>> {
        self.resources
            .get(resource_type)
            .filter(|handler| handler.supports(code))
    }

    pub fn action_handler(&self, resource_type: &str, action: &str) -> Option<&Arc<dyn ActionHandler>> {
        self.actions
            .get(&(resource_type.to_string(), action.to_string()))
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut resources: Vec<&String> = self.resources.keys().collect();
        resources.sort();
        let mut actions: Vec<String> = self
            .actions
            .keys()
            .map(|(resource_type, action)| format!("{}/{}", resource_type, action))
            .collect();
        actions.sort();
        f.debug_struct("HandlerRegistry")
            .field("resources", &resources)
            .field("actions", &actions)
            .finish()
    }
}

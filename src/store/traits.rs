use crate::model::{Id, NewResource, Resource};
use anyhow::Result;

/// A store that can open exclusive atomic scopes. Every batch runs inside
/// exactly one transaction obtained from `begin`.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

/// Reads and writes within one open transaction. Dropping a transaction
/// without calling `commit` discards its effects.
#[async_trait::async_trait]
pub trait StoreTransaction: Send {
    /// Get a resource by type and id
    async fn get(&mut self, resource_type: &str, id: &str) -> Result<Option<Resource>>;
    /// Insert a single resource, generating its id when absent
    async fn insert(&mut self, resource: NewResource) -> Result<Resource>;
    /// Insert many resources of one type in a single persistence call
    async fn insert_many(&mut self, resources: Vec<NewResource>) -> Result<Vec<Resource>>;
    /// Replace attributes and relationships of an existing resource
    async fn update(&mut self, resource: Resource) -> Result<Resource>;
    async fn delete(&mut self, resource_type: &str, id: &str) -> Result<bool>;
    /// Delete many resources of one type with a single filtered delete
    async fn delete_many(&mut self, resource_type: &str, ids: &[Id]) -> Result<u64>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

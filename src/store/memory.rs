use anyhow::{anyhow, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::{Id, NewResource, Resource};
use crate::store::traits::{ResourceStore, StoreTransaction};

type Table = HashMap<(String, Id), Resource>;

/// In-memory store. A transaction holds the table lock for its whole
/// lifetime and works on a copy that replaces the table on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    resources: Arc<Mutex<Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a committed resource outside of any batch
    pub async fn get(&self, resource_type: &str, id: &str) -> Option<Resource> {
        let resources = self.resources.lock().await;
        resources
            .get(&(resource_type.to_string(), id.to_string()))
            .cloned()
    }

    /// Committed resources of one type, oldest first
    pub async fn list(&self, resource_type: &str) -> Vec<Resource> {
        let resources = self.resources.lock().await;
        let mut listed: Vec<Resource> = resources
            .values()
            .filter(|r| r.resource_type == resource_type)
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        listed
    }

    pub async fn len(&self) -> usize {
        self.resources.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl ResourceStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = Arc::clone(&self.resources).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Table>,
    working: Table,
}

impl MemoryTransaction {
    fn key(resource_type: &str, id: &str) -> (String, Id) {
        (resource_type.to_string(), id.to_string())
    }

    fn insert_one(&mut self, resource: NewResource) -> Result<Resource> {
        let resource = Resource::from_new(resource);
        let key = Self::key(&resource.resource_type, &resource.id);
        if self.working.contains_key(&key) {
            return Err(anyhow!(
                "Resource {}/{} already exists",
                resource.resource_type,
                resource.id
            ));
        }
        self.working.insert(key, resource.clone());
        Ok(resource)
    }
}

#[async_trait::async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, resource_type: &str, id: &str) -> Result<Option<Resource>> {
        Ok(self.working.get(&Self::key(resource_type, id)).cloned())
    }

    async fn insert(&mut self, resource: NewResource) -> Result<Resource> {
        self.insert_one(resource)
    }

    async fn insert_many(&mut self, resources: Vec<NewResource>) -> Result<Vec<Resource>> {
        resources
            .into_iter()
            .map(|resource| self.insert_one(resource))
            .collect()
    }

    async fn update(&mut self, mut resource: Resource) -> Result<Resource> {
        let key = Self::key(&resource.resource_type, &resource.id);
        if !self.working.contains_key(&key) {
            return Err(anyhow!(
                "Resource {}/{} not found",
                resource.resource_type,
                resource.id
            ));
        }
        resource.updated_at = Utc::now();
        self.working.insert(key, resource.clone());
        Ok(resource)
    }

    async fn delete(&mut self, resource_type: &str, id: &str) -> Result<bool> {
        Ok(self.working.remove(&Self::key(resource_type, id)).is_some())
    }

    async fn delete_many(&mut self, resource_type: &str, ids: &[Id]) -> Result<u64> {
        let mut deleted = 0;
        for id in ids {
            if self.working.remove(&Self::key(resource_type, id)).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

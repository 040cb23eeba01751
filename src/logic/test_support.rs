//! Store double and handler registry shared by the logic tests.

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};

use crate::logic::handler::HandlerRegistry;
use crate::logic::schema_handler::SchemaHandler;
use crate::model::{DataType, Id, NewResource, OpCode, Resource, ResourceSchema};
use crate::store::{MemoryStore, ResourceStore, StoreTransaction};

pub fn registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register_resource(Arc::new(SchemaHandler::new(
            ResourceSchema::new("articles")
                .attribute("title", DataType::String, true)
                .attribute("views", DataType::Number, false)
                .to_one("author", "people", false)
                .to_many("comments", "comments"),
        )))
        .register_resource(Arc::new(SchemaHandler::new(
            ResourceSchema::new("people")
                .attribute("name", DataType::String, true)
                .to_one("manager", "people", false),
        )))
        .register_resource(Arc::new(SchemaHandler::new(
            ResourceSchema::new("comments")
                .attribute("body", DataType::String, true)
                .with_operations(&[OpCode::Add]),
        )));
    registry
}

/// Memory store that records every transaction call and can fail the
/// n-th write.
#[derive(Clone, Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub calls: Arc<Mutex<Vec<String>>>,
    fail_on_write: Option<usize>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the write with this zero-based position across all transactions.
    pub fn failing_on_write(position: usize) -> Self {
        Self {
            fail_on_write: Some(position),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }
}

#[async_trait::async_trait]
impl ResourceStore for RecordingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        self.calls.lock().unwrap().push("begin".to_string());
        Ok(Box::new(RecordingTransaction {
            inner: self.inner.begin().await?,
            calls: self.calls.clone(),
            fail_on_write: self.fail_on_write,
        }))
    }
}

struct RecordingTransaction {
    inner: Box<dyn StoreTransaction>,
    calls: Arc<Mutex<Vec<String>>>,
    fail_on_write: Option<usize>,
}

impl RecordingTransaction {
    fn write(&self, call: &str) -> Result<()> {
        let mut calls = self.calls.lock().unwrap();
        let writes = calls
            .iter()
            .filter(|c| !matches!(c.as_str(), "begin" | "get" | "commit" | "rollback"))
            .count();
        calls.push(call.to_string());
        if self.fail_on_write == Some(writes) {
            return Err(anyhow!("induced failure on {}", call));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StoreTransaction for RecordingTransaction {
    async fn get(&mut self, resource_type: &str, id: &str) -> Result<Option<Resource>> {
        self.calls.lock().unwrap().push("get".to_string());
        self.inner.get(resource_type, id).await
    }

    async fn insert(&mut self, resource: NewResource) -> Result<Resource> {
        self.write("insert")?;
        self.inner.insert(resource).await
    }

    async fn insert_many(&mut self, resources: Vec<NewResource>) -> Result<Vec<Resource>> {
        self.write("insert_many")?;
        self.inner.insert_many(resources).await
    }

    async fn update(&mut self, resource: Resource) -> Result<Resource> {
        self.write("update")?;
        self.inner.update(resource).await
    }

    async fn delete(&mut self, resource_type: &str, id: &str) -> Result<bool> {
        self.write("delete")?;
        self.inner.delete(resource_type, id).await
    }

    async fn delete_many(&mut self, resource_type: &str, ids: &[Id]) -> Result<u64> {
        self.write("delete_many")?;
        self.inner.delete_many(resource_type, ids).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.calls.lock().unwrap().push("commit".to_string());
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.calls.lock().unwrap().push("rollback".to_string());
        self.inner.rollback().await
    }
}

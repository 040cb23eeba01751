//! Walks the canonical operation list and dispatches every operation to its
//! handler, in sequential or bulk mode.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::logic::aggregate::{AtomicOutcome, ResultAggregator};
use crate::logic::bulk::{lookahead_keys, BulkRun};
use crate::logic::handler::{
    FieldLocation, HandlerError, HandlerRegistry, ResourceHandler, Validated,
};
use crate::logic::include::{self, IncludePath};
use crate::logic::lid::{lid_references, LidRegistry};
use crate::model::{
    AtomicError, BulkKey, ErrorKind, OpCode, Operation, Resource, ResourceIdentifier,
    ResourceObject,
};
use crate::store::traits::StoreTransaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Every operation is persisted on its own
    #[default]
    Sequential,
    /// Contiguous add/remove runs on one type are persisted together
    Bulk,
}

/// Per-request state of a batch walk.
#[derive(Debug, Default)]
pub struct BatchContext {
    pub lids: LidRegistry,
    pub results: ResultAggregator,
}

/// A bulk-eligible operation that passed resolution and validation and waits
/// for its run to flush.
enum Pending {
    Create {
        operation: Operation,
        validated: Validated,
        includes: Vec<IncludePath>,
    },
    Delete {
        operation: Operation,
        instance: Resource,
        document: Value,
    },
}

pub struct BatchExecutor<'a> {
    registry: &'a HandlerRegistry,
    mode: ExecutionMode,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(registry: &'a HandlerRegistry, mode: ExecutionMode) -> Self {
        Self { registry, mode }
    }

    /// Executes all operations inside `tx`, stopping at the first failure.
    /// Committing or rolling back `tx` is left to the caller.
    pub async fn execute(
        &self,
        tx: &mut dyn StoreTransaction,
        operations: Vec<Operation>,
    ) -> Result<AtomicOutcome, AtomicError> {
        let mut context = BatchContext::default();
        let lookahead = lookahead_keys(&operations);
        let mut run: BulkRun<Pending> = BulkRun::new();

        for (operation, next_key) in operations.into_iter().zip(lookahead) {
            let key = match self.mode {
                ExecutionMode::Bulk => operation.bulk_key(),
                ExecutionMode::Sequential => None,
            };

            let Some(key) = key else {
                self.run_one(tx, &mut context, operation).await?;
                continue;
            };

            // A lid declared inside the current run is only registered on flush
            if declares_referenced_lid(run.pending(), &operation) {
                if let Some((key, items)) = run.take() {
                    self.flush(tx, &mut context, key, items).await?;
                }
            }

            let pending = self.prepare(tx, &context, operation).await?;
            if let Pending::Delete {
                operation,
                instance,
                ..
            } = &pending
            {
                if removal_pending(run.pending(), instance) {
                    return Err(does_not_exist(operation, &instance.id));
                }
            }
            if let Some((previous_key, items)) = run.push(key, pending) {
                self.flush(tx, &mut context, previous_key, items).await?;
            }
            if run.should_flush(next_key.as_ref()) {
                if let Some((key, items)) = run.take() {
                    self.flush(tx, &mut context, key, items).await?;
                }
            }
        }

        if let Some((key, items)) = run.take() {
            self.flush(tx, &mut context, key, items).await?;
        }

        Ok(context.results.finish())
    }

    async fn run_one(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut BatchContext,
        mut operation: Operation,
    ) -> Result<(), AtomicError> {
        context.lids.resolve_operation(&mut operation)?;
        let includes = include::check_paths(self.registry, &operation)?;
        log::debug!(
            "Executing operation {} ({} {})",
            operation.index,
            operation.code,
            operation.resource_type
        );

        let document = match operation.code {
            OpCode::Add => {
                let handler = self.resource_handler(&operation)?;
                let payload = ResourceObject::from_value(&operation.payload);
                let validated = handler
                    .validate(&payload, None, false)
                    .map_err(|e| handler_failure(&operation, e))?;
                let resource = handler
                    .apply(tx, validated)
                    .await
                    .map_err(|e| handler_failure(&operation, e))?;
                register_lid(&mut context.lids, &operation, &resource);
                self.render(tx, &operation, handler.as_ref(), &resource, &includes)
                    .await?
            }
            OpCode::Update | OpCode::UpdateRelationship => {
                let handler = self.resource_handler(&operation)?;
                let instance = self.locate(tx, &operation, handler.as_ref()).await?;
                let payload = ResourceObject::from_value(&operation.payload);
                let validated = handler
                    .validate(&payload, Some(&instance), true)
                    .map_err(|e| handler_failure(&operation, e))?;
                let resource = handler
                    .apply(tx, validated)
                    .await
                    .map_err(|e| handler_failure(&operation, e))?;
                self.render(tx, &operation, handler.as_ref(), &resource, &includes)
                    .await?
            }
            OpCode::Remove => {
                let handler = self.resource_handler(&operation)?;
                let instance = self.locate(tx, &operation, handler.as_ref()).await?;
                let document = self
                    .render(tx, &operation, handler.as_ref(), &instance, &includes)
                    .await?;
                handler
                    .delete(tx, &instance)
                    .await
                    .map_err(|e| handler_failure(&operation, e))?;
                document
            }
            OpCode::Invoke => {
                let action = operation.action().unwrap_or_default();
                let handler = self
                    .registry
                    .action_handler(&operation.resource_type, action)
                    .ok_or_else(|| {
                        AtomicError::new(
                            ErrorKind::UnsupportedOperation,
                            format!(
                                "No action '{}' is available for type '{}'",
                                action, operation.resource_type
                            ),
                            operation.pointer(),
                        )
                    })?;
                let data = handler
                    .invoke(tx, &operation.payload)
                    .await
                    .map_err(|e| handler_failure(&operation, e))?;
                let included = self.invoke_includes(tx, &operation, &data, &includes).await?;
                include::document(data, included)
            }
        };

        context.results.record(&operation, document);
        Ok(())
    }

    /// Resolves and validates a bulk-eligible operation without persisting it.
    async fn prepare(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &BatchContext,
        mut operation: Operation,
    ) -> Result<Pending, AtomicError> {
        context.lids.resolve_operation(&mut operation)?;
        let includes = include::check_paths(self.registry, &operation)?;
        log::debug!(
            "Buffering operation {} ({} {})",
            operation.index,
            operation.code,
            operation.resource_type
        );

        let handler = self.resource_handler(&operation)?;
        match operation.code {
            OpCode::Add => {
                let payload = ResourceObject::from_value(&operation.payload);
                let validated = handler
                    .validate(&payload, None, false)
                    .map_err(|e| handler_failure(&operation, e))?;
                Ok(Pending::Create {
                    operation,
                    validated,
                    includes,
                })
            }
            OpCode::Remove => {
                let instance = self.locate(tx, &operation, handler.as_ref()).await?;
                let document = self
                    .render(tx, &operation, handler.as_ref(), &instance, &includes)
                    .await?;
                Ok(Pending::Delete {
                    operation,
                    instance,
                    document,
                })
            }
            OpCode::Update | OpCode::UpdateRelationship | OpCode::Invoke => Err(AtomicError::new(
                ErrorKind::InternalError,
                format!("Operation code '{}' cannot be buffered", operation.code),
                operation.pointer(),
            )),
        }
    }

    async fn flush(
        &self,
        tx: &mut dyn StoreTransaction,
        context: &mut BatchContext,
        key: BulkKey,
        items: Vec<Pending>,
    ) -> Result<(), AtomicError> {
        log::debug!(
            "Flushing {} buffered {} operation(s) on {}",
            items.len(),
            key.code,
            key.resource_type
        );

        let mut creates = Vec::new();
        let mut deletes = Vec::new();
        for item in items {
            match item {
                Pending::Create {
                    operation,
                    validated,
                    includes,
                } => creates.push((operation, validated, includes)),
                Pending::Delete {
                    operation,
                    instance,
                    document,
                } => deletes.push((operation, instance, document)),
            }
        }

        let Some(first) = creates
            .first()
            .map(|(operation, _, _)| operation)
            .or_else(|| deletes.first().map(|(operation, _, _)| operation))
        else {
            return Ok(());
        };
        let handler = self.resource_handler(first)?;
        let run_pointer = first.clone();

        if !creates.is_empty() {
            let (operations, validated, includes): (Vec<_>, Vec<_>, Vec<_>) =
                itertools::multiunzip(creates);
            let resources = handler
                .apply_many(tx, validated)
                .await
                .map_err(|e| handler_failure(&run_pointer, e))?;

            if resources.len() != operations.len() {
                return Err(AtomicError::new(
                    ErrorKind::InternalError,
                    format!(
                        "Bulk insert returned {} resource(s) for {} operation(s)",
                        resources.len(),
                        operations.len()
                    ),
                    run_pointer.pointer(),
                ));
            }

            for ((operation, resource), includes) in operations.iter().zip(&resources).zip(&includes) {
                register_lid(&mut context.lids, operation, resource);
                let document = self
                    .render(tx, operation, handler.as_ref(), resource, includes)
                    .await?;
                context.results.record(operation, document);
            }
        }

        if !deletes.is_empty() {
            let mut instances = Vec::with_capacity(deletes.len());
            for (operation, instance, document) in deletes {
                context.results.record(&operation, document);
                instances.push(instance);
            }
            handler
                .delete_many(tx, &instances)
                .await
                .map_err(|e| handler_failure(&run_pointer, e))?;
        }

        Ok(())
    }

    fn resource_handler(&self, operation: &Operation) -> Result<Arc<dyn ResourceHandler>, AtomicError> {
        self.registry
            .resource_handler(operation.code.dispatch_code(), &operation.resource_type)
            .cloned()
            .ok_or_else(|| {
                AtomicError::new(
                    ErrorKind::UnsupportedOperation,
                    format!(
                        "Operation '{}' is not supported for type '{}'",
                        operation.code.dispatch_code(),
                        operation.resource_type
                    ),
                    operation.pointer(),
                )
            })
    }

    async fn locate(
        &self,
        tx: &mut dyn StoreTransaction,
        operation: &Operation,
        handler: &dyn ResourceHandler,
    ) -> Result<Resource, AtomicError> {
        let id = operation.id.as_deref().unwrap_or_default();
        handler
            .locate(tx, id)
            .await
            .map_err(|e| handler_failure(operation, e))?
            .ok_or_else(|| does_not_exist(operation, id))
    }

    /// Included resources for the resource objects an action returned.
    /// Results that are not resource objects include nothing.
    async fn invoke_includes(
        &self,
        tx: &mut dyn StoreTransaction,
        operation: &Operation,
        data: &Value,
        includes: &[IncludePath],
    ) -> Result<Vec<Value>, AtomicError> {
        if includes.is_empty() {
            return Ok(Vec::new());
        }

        let returned: Vec<&Value> = match data {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![data],
            _ => Vec::new(),
        };
        let mut primaries = Vec::with_capacity(returned.len());
        for identifier in returned.into_iter().filter_map(ResourceIdentifier::from_value) {
            let Some(id) = identifier.id.as_deref() else {
                continue;
            };
            let found = tx
                .get(&identifier.resource_type, id)
                .await
                .map_err(|e| handler_failure(operation, HandlerError::Store(e)))?;
            primaries.extend(found);
        }

        include::collect_many(self.registry, tx, &primaries, includes)
            .await
            .map_err(|e| handler_failure(operation, HandlerError::Store(e)))
    }

    async fn render(
        &self,
        tx: &mut dyn StoreTransaction,
        operation: &Operation,
        handler: &dyn ResourceHandler,
        resource: &Resource,
        includes: &[IncludePath],
    ) -> Result<Value, AtomicError> {
        let included = include::collect(self.registry, tx, resource, includes)
            .await
            .map_err(|e| handler_failure(operation, HandlerError::Store(e)))?;
        Ok(include::document(handler.render(resource), included))
    }
}

fn declares_referenced_lid(pending: &[Pending], operation: &Operation) -> bool {
    let declared: Vec<(&str, &str)> = pending
        .iter()
        .filter_map(|item| match item {
            Pending::Create { operation, .. } if !operation.bulk_collection => operation
                .lid
                .as_deref()
                .map(|lid| (operation.resource_type.as_str(), lid)),
            _ => None,
        })
        .collect();
    if declared.is_empty() {
        return false;
    }

    lid_references(&operation.payload, operation.code == OpCode::Add)
        .iter()
        .any(|(resource_type, lid)| {
            declared
                .iter()
                .any(|(declared_type, declared_lid)| declared_type == resource_type && declared_lid == lid)
        })
}

fn removal_pending(pending: &[Pending], instance: &Resource) -> bool {
    pending.iter().any(|item| match item {
        Pending::Delete { instance: queued, .. } => {
            queued.resource_type == instance.resource_type && queued.id == instance.id
        }
        Pending::Create { .. } => false,
    })
}

/// A successful add that declared a lid makes it resolvable for later
/// operations. Bulk collections do not create addressable resources.
fn register_lid(lids: &mut LidRegistry, operation: &Operation, resource: &Resource) {
    if operation.bulk_collection {
        return;
    }
    if let Some(lid) = &operation.lid {
        lids.register(&operation.resource_type, lid, &resource.id);
    }
}

fn does_not_exist(operation: &Operation, id: &str) -> AtomicError {
    AtomicError::new(
        ErrorKind::ObjectDoesNotExist,
        format!(
            "Object with id `{}` received for operation with index `{}` does not exist",
            id, operation.index
        ),
        operation.source_pointer(&["id"]),
    )
}

/// Maps a handler failure to the protocol error of its operation.
pub fn handler_failure(operation: &Operation, error: HandlerError) -> AtomicError {
    match error {
        HandlerError::Invalid(errors) => {
            let Some(first) = errors.into_iter().next() else {
                return AtomicError::new(
                    ErrorKind::InvalidAttribute,
                    "Validation failed",
                    operation.source_pointer::<&str>(&[]),
                );
            };
            match &first.location {
                FieldLocation::Attribute(name) => AtomicError::new(
                    ErrorKind::InvalidAttribute,
                    first.detail,
                    operation.source_pointer(&["attributes", name.as_str()]),
                ),
                FieldLocation::Relationship(name) => {
                    let pointer = match operation.code {
                        OpCode::UpdateRelationship => {
                            operation.source_pointer(&["relationships", name.as_str(), "data"])
                        }
                        _ => operation.source_pointer(&["relationships", name.as_str()]),
                    };
                    AtomicError::new(ErrorKind::InvalidRelationship, first.detail, pointer)
                }
                FieldLocation::Resource => AtomicError::new(
                    ErrorKind::InvalidAttribute,
                    first.detail,
                    operation.source_pointer(&["type"]),
                ),
            }
        }
        HandlerError::NotFound { id, .. } => does_not_exist(operation, &id),
        HandlerError::Unsupported(detail) => {
            AtomicError::new(ErrorKind::UnsupportedOperation, detail, operation.pointer())
        }
        HandlerError::Store(error) => {
            log::error!("Store failure in operation {}: {:#}", operation.index, error);
            AtomicError::new(
                ErrorKind::InternalError,
                format!("Operation with index `{}` could not be persisted", operation.index),
                operation.pointer(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::normalize::normalize_request;
    use serde_json::json;
    use crate::logic::test_support::{registry, RecordingStore};
    use crate::store::ResourceStore;

    async fn execute(
        store: &RecordingStore,
        mode: ExecutionMode,
        request: Value,
    ) -> Result<AtomicOutcome, AtomicError> {
        let registry = registry();
        let operations = normalize_request(&request).unwrap();
        let mut tx = store.begin().await.unwrap();
        let outcome = BatchExecutor::new(&registry, mode)
            .execute(tx.as_mut(), operations)
            .await;
        if outcome.is_ok() {
            tx.commit().await.unwrap();
        }
        outcome
    }

    fn documents(outcome: AtomicOutcome) -> Vec<Value> {
        match outcome {
            AtomicOutcome::Results(results) => results.into_iter().map(|r| r.document).collect(),
            AtomicOutcome::NoContent => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_lid_add_then_update() {
        let store = RecordingStore::new();
        let outcome = execute(
            &store,
            ExecutionMode::Sequential,
            json!({"atomic:operations": [
                {"op": "add", "data": {"type": "articles", "lid": "a", "attributes": {"title": "T"}}},
                {"op": "update", "data": {"type": "articles", "lid": "a", "attributes": {"title": "T2"}}}
            ]}),
        )
        .await
        .unwrap();

        let documents = documents(outcome);
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0]["data"]["attributes"]["title"], json!("T"));
        assert_eq!(documents[1]["data"]["attributes"]["title"], json!("T2"));
        assert_eq!(documents[0]["data"]["id"], documents[1]["data"]["id"]);
    }

    #[tokio::test]
    async fn test_backward_lid_reference_fails() {
        let store = RecordingStore::new();
        let error = execute(
            &store,
            ExecutionMode::Sequential,
            json!({"atomic:operations": [
                {"op": "add", "data": {"type": "articles", "attributes": {"title": "T"},
                    "relationships": {"author": {"data": {"type": "people", "lid": "p"}}}}},
                {"op": "add", "data": {"type": "people", "lid": "p", "attributes": {"name": "N"}}}
            ]}),
        )
        .await
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnknownLid);
        assert_eq!(
            error.pointer,
            "/atomic:operations/0/data/relationships/author/data/lid"
        );
    }

    #[tokio::test]
    async fn test_remove_missing_object() {
        let store = RecordingStore::new();
        let error = execute(
            &store,
            ExecutionMode::Sequential,
            json!({"atomic:operations": [{"op": "remove", "ref": {"type": "articles", "id": "9"}}]}),
        )
        .await
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::ObjectDoesNotExist);
        assert_eq!(error.pointer, "/atomic:operations/0/ref/id");
        assert_eq!(
            error.detail,
            "Object with id `9` received for operation with index `0` does not exist"
        );
        assert_eq!(error.status(), 422);
    }

    #[tokio::test]
    async fn test_relationship_update_has_no_entry() {
        let store = RecordingStore::new();
        let outcome = execute(
            &store,
            ExecutionMode::Sequential,
            json!({"atomic:operations": [
                {"op": "add", "data": {"type": "people", "lid": "p", "attributes": {"name": "N"}}},
                {"op": "add", "data": {"type": "articles", "lid": "a", "attributes": {"title": "T"}}},
                {"op": "update", "ref": {"type": "articles", "lid": "a", "relationship": "author"},
                    "data": {"type": "people", "lid": "p"}}
            ]}),
        )
        .await
        .unwrap();

        let documents = documents(outcome);
        assert_eq!(documents.len(), 2);
        let article_id = documents[1]["data"]["id"].as_str().unwrap().to_string();
        let person_id = documents[0]["data"]["id"].as_str().unwrap().to_string();
        let article = store.inner.get("articles", &article_id).await.unwrap();
        assert_eq!(article.relationships["author"], json!({"type": "people", "id": person_id}));
    }

    #[tokio::test]
    async fn test_validation_and_support_failures() {
        let store = RecordingStore::new();
        let error = execute(
            &store,
            ExecutionMode::Sequential,
            json!({"atomic:operations": [{"op": "add", "data": {"type": "articles", "attributes": {"title": 3}}}]}),
        )
        .await
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidAttribute);
        assert_eq!(error.pointer, "/atomic:operations/0/data/attributes/title");

        let error = execute(
            &store,
            ExecutionMode::Sequential,
            json!({"atomic:operations": [{"op": "remove", "ref": {"type": "comments", "id": "1"}}]}),
        )
        .await
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnsupportedOperation);

        let error = execute(
            &store,
            ExecutionMode::Sequential,
            json!({"atomic:operations": [{"op": "invoke", "ref": {"type": "articles", "href": "/articles/archive"}}]}),
        )
        .await
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnsupportedOperation);
        assert_eq!(error.pointer, "/atomic:operations/0");
    }

    #[tokio::test]
    async fn test_store_failure_is_internal_error() {
        let store = RecordingStore::failing_on_write(1);
        let error = execute(
            &store,
            ExecutionMode::Sequential,
            json!({"atomic:operations": [
                {"op": "add", "data": {"type": "people", "attributes": {"name": "A"}}},
                {"op": "add", "data": {"type": "people", "attributes": {"name": "B"}}}
            ]}),
        )
        .await
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::InternalError);
        assert_eq!(error.pointer, "/atomic:operations/1");
        assert_eq!(error.status(), 500);
    }

    #[tokio::test]
    async fn test_bulk_mode_groups_runs() {
        let store = RecordingStore::new();
        let outcome = execute(
            &store,
            ExecutionMode::Bulk,
            json!({"atomic:operations": [
                {"op": "add", "data": {"type": "people", "id": "1", "attributes": {"name": "A"}}},
                {"op": "add", "data": {"type": "people", "id": "2", "attributes": {"name": "B"}}},
                {"op": "add", "data": {"type": "people", "id": "3", "attributes": {"name": "C"}}},
                {"op": "update", "data": {"type": "people", "id": "2", "attributes": {"name": "B2"}}},
                {"op": "remove", "ref": {"type": "people", "id": "1"}},
                {"op": "remove", "ref": {"type": "people", "id": "3"}}
            ]}),
        )
        .await
        .unwrap();

        let documents = documents(outcome);
        let ids: Vec<&str> = documents
            .iter()
            .map(|d| d["data"]["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3", "2", "1", "3"]);
        assert_eq!(documents[4]["data"]["attributes"]["name"], json!("A"));

        assert_eq!(store.count("insert_many"), 1);
        assert_eq!(store.count("insert"), 0);
        assert_eq!(store.count("update"), 1);
        assert_eq!(store.count("delete_many"), 1);
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_bulk_lids_resolve_after_flush() {
        let store = RecordingStore::new();
        let error = execute(
            &store,
            ExecutionMode::Bulk,
            json!({"atomic:operations": [
                {"op": "add", "data": {"type": "articles", "lid": "a", "attributes": {"title": "T"}}},
                {"op": "remove", "ref": {"type": "articles", "lid": "a"}},
                {"op": "remove", "ref": {"type": "articles", "lid": "b"}}
            ]}),
        )
        .await;
        // `a` was registered when the add run flushed
        assert_eq!(error.unwrap_err().pointer, "/atomic:operations/2/ref/lid");
    }

    #[tokio::test]
    async fn test_include_renders_related() {
        let store = RecordingStore::new();
        let outcome = execute(
            &store,
            ExecutionMode::Sequential,
            json!({"atomic:operations": [
                {"op": "add", "data": {"type": "people", "lid": "p", "attributes": {"name": "N"}}},
                {"op": "add", "data": {"type": "articles", "attributes": {"title": "T"},
                    "relationships": {"author": {"data": {"type": "people", "lid": "p"}}}},
                    "meta": {"include": ["author"]}}
            ]}),
        )
        .await
        .unwrap();

        let documents = documents(outcome);
        assert!(documents[0].get("included").is_none());
        assert_eq!(documents[1]["included"][0]["type"], json!("people"));
        assert_eq!(documents[1]["included"][0]["attributes"]["name"], json!("N"));
    }

    #[tokio::test]
    async fn test_numeric_lid_is_resolved() {
        let store = RecordingStore::new();
        let outcome = execute(
            &store,
            ExecutionMode::Sequential,
            json!({"atomic:operations": [
                {"op": "add", "data": {"type": "people", "lid": 5, "attributes": {"name": "A"}}},
                {"op": "update", "data": {"type": "people", "lid": 5, "attributes": {"name": "B"}}}
            ]}),
        )
        .await
        .unwrap();
        let documents = documents(outcome);
        assert_eq!(documents[0]["data"]["id"], documents[1]["data"]["id"]);
        assert_eq!(documents[1]["data"]["attributes"]["name"], json!("B"));

        let error = execute(
            &store,
            ExecutionMode::Sequential,
            json!({"atomic:operations": [
                {"op": "update", "data": {"type": "people", "lid": 5, "attributes": {"name": "B"}}}
            ]}),
        )
        .await
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::UnknownLid);
        assert_eq!(error.pointer, "/atomic:operations/0/data/lid");
    }

    #[tokio::test]
    async fn test_lid_declared_in_same_bulk_run() {
        let request = json!({"atomic:operations": [
            {"op": "add", "data": {"type": "people", "lid": "boss", "attributes": {"name": "Boss"}}},
            {"op": "add", "data": {"type": "people", "attributes": {"name": "Report"},
                "relationships": {"manager": {"data": {"type": "people", "lid": "boss"}}}}}
        ]});

        for mode in [ExecutionMode::Sequential, ExecutionMode::Bulk] {
            let store = RecordingStore::new();
            let documents = documents(execute(&store, mode, request.clone()).await.unwrap());
            assert_eq!(documents.len(), 2);

            let report_id = documents[1]["data"]["id"].as_str().unwrap().to_string();
            let report = store.inner.get("people", &report_id).await.unwrap();
            assert_eq!(report.relationships["manager"]["id"], documents[0]["data"]["id"]);
        }
    }

    #[tokio::test]
    async fn test_duplicate_remove_fails_in_both_modes() {
        let request = json!({"atomic:operations": [
            {"op": "add", "data": {"type": "people", "id": "1", "attributes": {"name": "A"}}},
            {"op": "update", "data": {"type": "people", "id": "1", "attributes": {"name": "B"}}},
            {"op": "remove", "ref": {"type": "people", "id": "1"}},
            {"op": "remove", "ref": {"type": "people", "id": "1"}}
        ]});

        for mode in [ExecutionMode::Sequential, ExecutionMode::Bulk] {
            let store = RecordingStore::new();
            let error = execute(&store, mode, request.clone()).await.unwrap_err();
            assert_eq!(error.kind, ErrorKind::ObjectDoesNotExist);
            assert_eq!(error.pointer, "/atomic:operations/3/ref/id");
            assert!(store.inner.is_empty().await);
        }
    }

    struct Echo;

    #[async_trait::async_trait]
    impl crate::logic::handler::ActionHandler for Echo {
        async fn invoke(
            &self,
            _tx: &mut dyn StoreTransaction,
            data: &Value,
        ) -> Result<Value, HandlerError> {
            Ok(data.clone())
        }
    }

    #[tokio::test]
    async fn test_invoke_renders_includes() {
        let store = RecordingStore::new();
        let mut registry = registry();
        registry.register_action("articles", "echo", Arc::new(Echo));
        let operations = normalize_request(&json!({"atomic:operations": [
            {"op": "add", "data": {"type": "people", "lid": "p", "attributes": {"name": "N"}}},
            {"op": "add", "data": {"type": "articles", "lid": "a", "attributes": {"title": "T"},
                "relationships": {"author": {"data": {"type": "people", "lid": "p"}}}}},
            {"op": "invoke", "ref": {"type": "articles", "href": "/articles/echo"},
                "data": {"type": "articles", "lid": "a"}, "meta": {"include": ["author"]}},
            {"op": "invoke", "ref": {"type": "articles", "href": "/articles/echo"},
                "data": {"count": 1}, "meta": {"include": ["author"]}}
        ]}))
        .unwrap();

        let mut tx = store.begin().await.unwrap();
        let outcome = BatchExecutor::new(&registry, ExecutionMode::Sequential)
            .execute(tx.as_mut(), operations)
            .await
            .unwrap();

        let documents = documents(outcome);
        assert_eq!(documents[2]["included"][0]["attributes"]["name"], json!("N"));
        assert!(documents[3].get("included").is_none());
    }
}

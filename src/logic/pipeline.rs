use serde_json::Value;
use std::sync::Arc;

use crate::logic::aggregate::AtomicOutcome;
use crate::logic::executor::{BatchExecutor, ExecutionMode};
use crate::logic::handler::HandlerRegistry;
use crate::logic::normalize::normalize_request;
use crate::logic::transaction::TransactionCoordinator;
use crate::model::{operations_pointer, AtomicError, ErrorKind};
use crate::store::traits::ResourceStore;

/// Runs one atomic operations request: validate and normalize everything up
/// front, then execute inside a single transaction.
pub struct AtomicPipeline<S: ResourceStore> {
    coordinator: TransactionCoordinator<S>,
    registry: Arc<HandlerRegistry>,
    mode: ExecutionMode,
}

impl<S: ResourceStore> AtomicPipeline<S> {
    pub fn new(store: Arc<S>, registry: Arc<HandlerRegistry>, mode: ExecutionMode) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store),
            registry,
            mode,
        }
    }

    pub async fn run(&self, body: &Value) -> Result<AtomicOutcome, AtomicError> {
        let operations = normalize_request(body)?;
        if operations.is_empty() {
            return Ok(AtomicOutcome::NoContent);
        }
        log::debug!("Running atomic batch of {} operation(s)", operations.len());

        let mut scope = self
            .coordinator
            .begin()
            .await
            .map_err(|e| internal_error("Could not open a transaction", e))?;

        let executor = BatchExecutor::new(&self.registry, self.mode);
        let outcome = match scope.transaction() {
            Ok(tx) => executor.execute(tx, operations).await,
            Err(e) => Err(internal_error("Transaction is not open", e)),
        };

        match outcome {
            Ok(outcome) => {
                scope
                    .commit()
                    .await
                    .map_err(|e| internal_error("Could not commit the transaction", e))?;
                Ok(outcome)
            }
            Err(error) => {
                log::warn!("Atomic batch failed: {}", error);
                if let Err(e) = scope.abort().await {
                    log::error!("Rollback failed: {:#}", e);
                }
                Err(error)
            }
        }
    }
}

fn internal_error(detail: &str, error: anyhow::Error) -> AtomicError {
    log::error!("{}: {:#}", detail, error);
    AtomicError::new(ErrorKind::InternalError, detail, operations_pointer())
}

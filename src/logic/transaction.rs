//! All-or-nothing scope around one batch.

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::store::traits::{ResourceStore, StoreTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Open,
    Committed,
    Aborted,
}

pub struct TransactionCoordinator<S: ResourceStore> {
    store: Arc<S>,
}

impl<S: ResourceStore> TransactionCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Opens the scope for one batch.
    pub async fn begin(&self) -> Result<AtomicScope> {
        let transaction = self.store.begin().await?;
        Ok(AtomicScope {
            transaction: Some(transaction),
            state: ScopeState::Open,
        })
    }
}

/// The open store transaction of a batch. Dropping an open scope discards
/// its effects.
pub struct AtomicScope {
    transaction: Option<Box<dyn StoreTransaction>>,
    state: ScopeState,
}

impl AtomicScope {
    pub fn state(&self) -> ScopeState {
        self.state
    }

    pub fn transaction(&mut self) -> Result<&mut dyn StoreTransaction> {
        match self.transaction.as_mut() {
            Some(transaction) => Ok(transaction.as_mut()),
            None => Err(anyhow!("transaction scope is already {:?}", self.state)),
        }
    }

    pub async fn commit(&mut self) -> Result<()> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| anyhow!("transaction scope is already {:?}", self.state))?;
        transaction.commit().await?;
        self.state = ScopeState::Committed;
        log::info!("Committed atomic batch");
        Ok(())
    }

    pub async fn abort(&mut self) -> Result<()> {
        let Some(transaction) = self.transaction.take() else {
            return Ok(());
        };
        self.state = ScopeState::Aborted;
        transaction.rollback().await?;
        log::warn!("Rolled back atomic batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewResource;
    use crate::store::MemoryStore;
    use serde_json::Map;

    fn article(id: &str) -> NewResource {
        NewResource {
            id: Some(id.to_string()),
            resource_type: "articles".to_string(),
            attributes: Map::new(),
            relationships: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_effects() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = TransactionCoordinator::new(store.clone());

        let mut scope = coordinator.begin().await.unwrap();
        scope.transaction().unwrap().insert(article("1")).await.unwrap();
        scope.commit().await.unwrap();

        assert_eq!(scope.state(), ScopeState::Committed);
        assert!(scope.transaction().is_err());
        assert!(scope.commit().await.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_abort_discards_effects() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = TransactionCoordinator::new(store.clone());

        let mut scope = coordinator.begin().await.unwrap();
        scope.transaction().unwrap().insert(article("1")).await.unwrap();
        scope.abort().await.unwrap();
        scope.abort().await.unwrap();

        assert_eq!(scope.state(), ScopeState::Aborted);
        assert!(store.is_empty().await);

        // Dropping an open scope behaves like an abort
        {
            let mut scope = coordinator.begin().await.unwrap();
            scope.transaction().unwrap().insert(article("2")).await.unwrap();
        }
        assert!(store.is_empty().await);
    }
}

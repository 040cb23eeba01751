use serde_json::{json, Value};

use crate::model::{Operation, ATOMIC_RESULTS};

/// Result document of one operation, tagged with its index in the request.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub index: usize,
    pub document: Value,
}

/// Outcome of a batch that committed.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicOutcome {
    Results(Vec<OperationResult>),
    /// Nothing to report: HTTP 204
    NoContent,
}

impl AtomicOutcome {
    /// `{"atomic:results": [...]}`, `None` for no content.
    pub fn to_body(&self) -> Option<Value> {
        match self {
            AtomicOutcome::Results(results) => {
                let documents: Vec<&Value> = results.iter().map(|r| &r.document).collect();
                Some(json!({ ATOMIC_RESULTS: documents }))
            }
            AtomicOutcome::NoContent => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AtomicOutcome::Results(results) => results.len(),
            AtomicOutcome::NoContent => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collects result documents in execution order.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    results: Vec<OperationResult>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the document of a successful operation. Side-effect only
    /// operations leave no entry.
    pub fn record(&mut self, operation: &Operation, document: Value) {
        if operation.code.produces_result() {
            self.results.push(OperationResult {
                index: operation.index,
                document,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn finish(self) -> AtomicOutcome {
        if self.results.is_empty() {
            AtomicOutcome::NoContent
        } else {
            AtomicOutcome::Results(self.results)
        }
    }
}

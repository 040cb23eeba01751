pub mod aggregate;
pub mod bulk;
pub mod envelope;
pub mod executor;
pub mod handler;
pub mod include;
pub mod lid;
pub mod normalize;
pub mod pipeline;
pub mod schema_handler;
pub mod transaction;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregate::{AtomicOutcome, OperationResult, ResultAggregator};
pub use executor::{BatchContext, BatchExecutor, ExecutionMode};
pub use handler::*;
pub use lid::LidRegistry;
pub use normalize::{normalize, normalize_request};
pub use pipeline::AtomicPipeline;
pub use schema_handler::SchemaHandler;
pub use transaction::{AtomicScope, ScopeState, TransactionCoordinator};

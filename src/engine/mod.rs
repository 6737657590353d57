// Persistence engine capability contract
//
// The engine is an external collaborator. This layer only ever asks it to run a
// named action against a named model, or to fetch rows for diffing.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::EngineError;
use crate::types::{Operation, Row};

#[async_trait]
pub trait Engine: Send + Sync {
    /// Execute `operation` against `model` with engine-shaped arguments
    async fn execute(&self, model: &str, operation: Operation, args: Value) -> Result<Value, EngineError>;

    /// Fetch rows matching `filter`, restricted to `projection` when given
    async fn find_many(
        &self,
        model: &str,
        filter: &Value,
        projection: Option<&[String]>,
    ) -> Result<Vec<Row>, EngineError>;
}

/// Shared engine handle passed to hooks
pub type EngineHandle = Arc<dyn Engine>;

pub use memory::MemoryEngine;

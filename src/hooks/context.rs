use serde_json::Value;

use crate::engine::EngineHandle;
use crate::types::{Operation, Row};

/// Pending call handed to before hooks
///
/// `args` is the exact argument object that will be sent to the engine once
/// every before hook has returned; hooks may rewrite it in place.
pub struct BeforeContext {
    pub model: String,
    pub operation: Operation,
    pub args: Value,
    pub engine: EngineHandle,
}

impl BeforeContext {
    pub fn new(model: &str, operation: Operation, args: Value, engine: EngineHandle) -> Self {
        Self {
            model: model.to_string(),
            operation,
            args,
            engine,
        }
    }

    /// Mutable access to the `data` payload, if the action carries one
    pub fn data_mut(&mut self) -> Option<&mut Value> {
        self.args.get_mut("data")
    }
}

/// Completed call handed to after hooks
#[derive(Clone)]
pub struct AfterContext {
    pub model: String,
    pub operation: Operation,
    pub args: Value,
    pub result: Value,
    pub engine: EngineHandle,
}

/// One column whose value differs between pre- and post-image
#[derive(Clone)]
pub struct ColumnChange {
    pub model: String,
    pub column: String,
    pub previous: Value,
    pub current: Value,
    pub row: Row,
    pub engine: EngineHandle,
}

impl std::fmt::Debug for ColumnChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnChange")
            .field("model", &self.model)
            .field("column", &self.column)
            .field("previous", &self.previous)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

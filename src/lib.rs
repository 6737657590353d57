pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod types;

pub use database::{Client, FluentQuery, ModelDef, ModelRegistry, QueryScope};
pub use engine::{Engine, EngineHandle, MemoryEngine};
pub use error::{EngineError, Error, HookError, ObservationError, Result};
pub use hooks::{HookRegistry, Interceptor};
pub use types::{Operation, Phase, Row, Timing};

#[cfg(test)]
pub mod testing;

pub mod client;
pub mod models;
pub mod query_builder;

pub use client::Client;
pub use models::{ModelDef, ModelRegistry, QueryScope};
pub use query_builder::FluentQuery;

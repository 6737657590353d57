use serde_json::Value;
use std::sync::Arc;

use crate::config::QueryConfig;
use crate::database::models::{ModelDef, QueryScope};
use crate::error::Result;
use crate::filter::descriptor::TerminalData;
use crate::filter::{FilterError, QueryDescriptor};
use crate::hooks::Interceptor;
use crate::types::Operation;

/// Fluent query bound to one model
///
/// Chain methods mutate the builder in place and return it for chaining; they
/// never fail. Invalid input is held and returned by the next terminal call,
/// which then issues no engine call. Terminals borrow the builder, so the
/// accumulated state is still there afterwards: a second terminal call reuses
/// it, and further chain calls build on it. Start from `Client::from` again for
/// an independent query.
pub struct FluentQuery {
    model: Arc<ModelDef>,
    interceptor: Arc<Interceptor>,
    descriptor: QueryDescriptor,
    config: QueryConfig,
}

impl FluentQuery {
    pub fn new(model: Arc<ModelDef>, interceptor: Arc<Interceptor>, config: QueryConfig) -> Self {
        Self {
            model,
            interceptor,
            descriptor: QueryDescriptor::new(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        self.model.name()
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    // === Chain ===

    /// Merge filter conditions; a key given again overrides the earlier value
    pub fn where_clause(&mut self, conditions: Value) -> &mut Self {
        self.descriptor.merge_where(conditions);
        self
    }

    /// Replace the ordering: `"name"`, `{"name": "asc"}` or an array of either
    pub fn order(&mut self, order_spec: Value) -> &mut Self {
        self.descriptor.set_order(order_spec);
        self
    }

    pub fn limit(&mut self, limit: u32) -> &mut Self {
        self.descriptor.set_limit(limit, self.config.max_limit);
        self
    }

    pub fn skip(&mut self, offset: u32) -> &mut Self {
        self.descriptor.set_offset(offset);
        self
    }

    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor.set_select(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn include<I, S>(&mut self, relations: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor.set_include(relations.into_iter().map(Into::into).collect());
        self
    }

    /// Apply a named scope registered on the model
    pub fn scope(&mut self, name: &str) -> &mut Self {
        match self.model.get_scope(name) {
            Some(scope) => scope.apply(&mut self.descriptor),
            None => {
                self.descriptor
                    .fail(FilterError::UnknownScope(format!("{}.{}", self.model.name(), name)));
            }
        }
        self
    }

    /// Apply an ad-hoc scope
    pub fn apply(&mut self, scope: impl QueryScope) -> &mut Self {
        scope.apply(&mut self.descriptor);
        self
    }

    // === Terminals ===

    pub async fn find_many(&self) -> Result<Value> {
        self.dispatch(Operation::FindMany, TerminalData::None).await
    }

    pub async fn find_first(&self) -> Result<Value> {
        self.dispatch(Operation::FindFirst, TerminalData::None).await
    }

    pub async fn find_unique(&self) -> Result<Value> {
        self.dispatch(Operation::FindUnique, TerminalData::None).await
    }

    pub async fn count(&self) -> Result<Value> {
        self.dispatch(Operation::Count, TerminalData::None).await
    }

    pub async fn create(&self, data: Value) -> Result<Value> {
        self.dispatch(Operation::Create, TerminalData::Data(data)).await
    }

    pub async fn create_many(&self, data: Vec<Value>) -> Result<Value> {
        self.dispatch(Operation::CreateMany, TerminalData::Data(Value::Array(data)))
            .await
    }

    pub async fn update(&self, data: Value) -> Result<Value> {
        self.dispatch(Operation::Update, TerminalData::Data(data)).await
    }

    pub async fn update_many(&self, data: Value) -> Result<Value> {
        self.dispatch(Operation::UpdateMany, TerminalData::Data(data)).await
    }

    pub async fn upsert(&self, create: Value, update: Value) -> Result<Value> {
        self.dispatch(Operation::Upsert, TerminalData::Upsert { create, update })
            .await
    }

    pub async fn delete(&self) -> Result<Value> {
        self.dispatch(Operation::Delete, TerminalData::None).await
    }

    pub async fn delete_many(&self) -> Result<Value> {
        self.dispatch(Operation::DeleteMany, TerminalData::None).await
    }

    async fn dispatch(&self, operation: Operation, data: TerminalData) -> Result<Value> {
        let args = self.descriptor.to_args(operation, data)?;
        if self.config.debug_logging {
            tracing::debug!("Query {}:{} args: {}", self.model.name(), operation, args);
        }
        self.interceptor.execute(self.model.name(), operation, args).await
    }
}

impl std::fmt::Debug for FluentQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FluentQuery")
            .field("model", &self.model.name())
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

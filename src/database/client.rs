use serde_json::Value;
use std::sync::Arc;

use crate::config::{AppConfig, QueryConfig};
use crate::database::models::ModelRegistry;
use crate::database::query_builder::FluentQuery;
use crate::engine::EngineHandle;
use crate::error::{Error, Result};
use crate::hooks::{ErrorReporter, HookRegistry, Interceptor};
use crate::types::Operation;

/// Hooked entry point: every call goes through the shared [`Interceptor`]
#[derive(Clone)]
pub struct Client {
    interceptor: Arc<Interceptor>,
    models: Arc<ModelRegistry>,
    query_config: QueryConfig,
}

impl Client {
    /// Client over `engine` using the global config and a tracing reporter
    pub fn new(engine: EngineHandle, models: ModelRegistry) -> Self {
        Self::with_config(engine, models, crate::config::config())
    }

    pub fn with_config(engine: EngineHandle, models: ModelRegistry, config: &AppConfig) -> Self {
        let registry = Arc::new(HookRegistry::with_config(config.hooks.clone()));
        Self::from_parts(
            Interceptor::new(engine, registry),
            models,
            config.query.clone(),
        )
    }

    pub fn from_parts(interceptor: Interceptor, models: ModelRegistry, query_config: QueryConfig) -> Self {
        Self {
            interceptor: Arc::new(interceptor),
            models: Arc::new(models),
            query_config,
        }
    }

    /// Swap the destination for detached hook failures
    ///
    /// Only valid before the client is cloned or any query is built.
    pub fn with_reporter(self, reporter: Arc<dyn ErrorReporter>) -> Self {
        let Self {
            interceptor,
            models,
            query_config,
        } = self;
        let interceptor = match Arc::try_unwrap(interceptor) {
            Ok(interceptor) => Arc::new(interceptor.with_reporter(reporter)),
            Err(shared) => {
                tracing::warn!("Client already shared, reporter not replaced");
                shared
            }
        };
        Self {
            interceptor,
            models,
            query_config,
        }
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        self.interceptor.registry()
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn interceptor(&self) -> &Arc<Interceptor> {
        &self.interceptor
    }

    pub fn engine(&self) -> &EngineHandle {
        self.interceptor.engine()
    }

    /// Start a fluent query on `model` (name, delegate name or plural alias)
    pub fn from(&self, model: &str) -> Result<FluentQuery> {
        let def = self
            .models
            .resolve(model)
            .ok_or_else(|| Error::UnknownModel(model.to_string()))?;
        Ok(FluentQuery::new(def, self.interceptor.clone(), self.query_config.clone()))
    }

    /// Issue a raw engine call through the hook pipeline
    pub async fn execute(&self, model: &str, operation: Operation, args: Value) -> Result<Value> {
        let def = self
            .models
            .resolve(model)
            .ok_or_else(|| Error::UnknownModel(model.to_string()))?;
        self.interceptor.execute(def.name(), operation, args).await
    }

    /// Clear all hook registrations
    pub fn reset(&self) {
        self.hooks().reset();
    }

    /// Wait for detached hook work to finish
    pub async fn drain(&self) {
        self.interceptor.drain().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::traits::after_fn;
    use crate::testing::TestContext;
    use serde_json::json;

    #[tokio::test]
    async fn test_from_resolves_aliases() {
        let ctx = TestContext::new();
        assert_eq!(ctx.client.from("posts").unwrap().model(), "Post");
        assert!(matches!(ctx.client.from("Comment"), Err(Error::UnknownModel(_))));
    }

    #[tokio::test]
    async fn test_reporter_is_installed() {
        let ctx = TestContext::with_users().unwrap();
        ctx.client.hooks().after_update(
            "User",
            after_fn(|_| async { Err(crate::error::HookError::rejected("boom")) }),
        );

        ctx.client
            .execute("users", Operation::Update, json!({ "where": { "id": 3 }, "data": { "active": true } }))
            .await
            .unwrap();
        ctx.client.drain().await;

        assert_eq!(ctx.reporter.len(), 1);
        assert_eq!(ctx.engine.calls()[0].model, "User");
    }

    #[tokio::test]
    async fn test_with_reporter_on_shared_client_keeps_original() {
        let ctx = TestContext::new();
        let shared = ctx.client.clone();
        let replaced = shared.with_reporter(Arc::new(crate::hooks::TracingReporter));
        assert!(Arc::ptr_eq(replaced.interceptor(), ctx.client.interceptor()));
    }

    #[tokio::test]
    async fn test_scope_from_context_models() {
        let ctx = TestContext::with_users().unwrap();
        let email = ctx.unique_email();
        ctx.client
            .from("User")
            .unwrap()
            .create(json!({ "id": 7, "email": email, "active": true }))
            .await
            .unwrap();

        let active = ctx.client.from("User").unwrap().scope("active").count().await.unwrap();
        assert_eq!(active, json!(3));
    }
}

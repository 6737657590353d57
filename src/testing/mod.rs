use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::database::{Client, ModelDef, ModelRegistry};
use crate::engine::MemoryEngine;
use crate::filter::QueryDescriptor;
use crate::hooks::MemoryReporter;

/// Client wired to an in-memory engine, with failures captured for assertions
pub struct TestContext {
    pub engine: Arc<MemoryEngine>,
    pub reporter: MemoryReporter,
    pub client: Client,
}

impl TestContext {
    /// Context with `User` and `Post` models and no rows
    pub fn new() -> Self {
        let engine = Arc::new(MemoryEngine::new());
        let reporter = MemoryReporter::new();
        let models = ModelRegistry::new()
            .with(ModelDef::new("User").scope("active", |q: &mut QueryDescriptor| {
                q.merge_where(json!({ "active": true }));
            }))
            .with(ModelDef::new("Post"));

        let client = Client::with_config(engine.clone(), models, &AppConfig::development())
            .with_reporter(Arc::new(reporter.clone()));

        Self {
            engine,
            reporter,
            client,
        }
    }

    /// Context with three users already stored
    pub fn with_users() -> anyhow::Result<Self> {
        let ctx = Self::new();
        ctx.engine
            .insert(
                "User",
                vec![
                    json!({ "id": 1, "name": "Carol", "email": "carol@example.com", "active": true }),
                    json!({ "id": 2, "name": "Alice", "email": "alice@example.com", "active": true }),
                    json!({ "id": 3, "name": "Bob", "email": "bob@example.com", "active": false }),
                ],
            )
            .map_err(|e| anyhow::anyhow!("Failed to seed users: {}", e))?;
        Ok(ctx)
    }

    /// Unique email for rows created by a test
    pub fn unique_email(&self) -> String {
        format!("test_{}@example.com", Uuid::new_v4().simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() -> anyhow::Result<()> {
        let ctx = TestContext::with_users()?;
        assert_eq!(ctx.engine.rows("User").len(), 3);
        assert!(ctx.reporter.is_empty());
        Ok(())
    }

    #[test]
    fn test_unique_email_generation() {
        let ctx = TestContext::new();
        let email1 = ctx.unique_email();
        let email2 = ctx.unique_email();

        assert_ne!(email1, email2);
        assert!(email1.starts_with("test_"));
    }
}

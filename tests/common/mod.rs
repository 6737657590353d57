#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use monk_hooks::config::AppConfig;
use monk_hooks::filter::QueryDescriptor;
use monk_hooks::hooks::MemoryReporter;
use monk_hooks::{Client, MemoryEngine, ModelDef, ModelRegistry};
use serde_json::{json, Value};

/// Client over a fresh in-memory engine with a capturing reporter
pub struct Harness {
    pub engine: Arc<MemoryEngine>,
    pub reporter: MemoryReporter,
    pub client: Client,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&AppConfig::development())
    }

    pub fn with_config(config: &AppConfig) -> Self {
        // Tests share one process; only the first init wins
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let engine = Arc::new(MemoryEngine::new());
        let reporter = MemoryReporter::new();
        let models = ModelRegistry::new()
            .with(ModelDef::new("User").scope("active", |q: &mut QueryDescriptor| {
                q.merge_where(json!({ "active": true }));
            }))
            .with(ModelDef::new("Person").plural("people"));

        let client = Client::with_config(engine.clone(), models, config)
            .with_reporter(Arc::new(reporter.clone()));

        Self {
            engine,
            reporter,
            client,
        }
    }

    /// Harness seeded with three users
    pub fn with_users() -> Result<Self> {
        let harness = Self::new();
        harness.seed_users()?;
        Ok(harness)
    }

    pub fn seed_users(&self) -> Result<()> {
        self.engine
            .insert(
                "User",
                vec![
                    json!({ "id": 1, "name": "Carol", "email": "carol@example.com", "active": true, "tier": "basic" }),
                    json!({ "id": 2, "name": "Alice", "email": "alice@example.com", "active": true, "tier": "basic" }),
                    json!({ "id": 3, "name": "Bob", "email": "bob@example.com", "active": false, "tier": "basic" }),
                ],
            )
            .context("failed to seed users")
    }

    /// Wait for detached hook work, bounded so a stuck hook fails the test
    pub async fn settle(&self) -> Result<()> {
        tokio::time::timeout(Duration::from_secs(5), self.client.drain())
            .await
            .context("detached hooks did not finish within 5s")
    }

    pub fn user(&self, id: i64) -> Option<Value> {
        self.engine
            .rows("User")
            .into_iter()
            .find(|row| row.get("id") == Some(&json!(id)))
            .map(Value::Object)
    }
}

/// Shared, ordered event log for hooks to write into
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().expect("event log poisoned").push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().expect("event log poisoned").clone()
    }
}

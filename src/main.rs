use serde_json::json;
use std::sync::Arc;

use monk_hooks::config::config;
use monk_hooks::filter::QueryDescriptor;
use monk_hooks::hooks::{after_fn, before_fn, column_fn};
use monk_hooks::{Client, HookError, MemoryEngine, ModelDef, ModelRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so APP_ENV, HOOKS_* and QUERY_* overrides apply
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config();
    tracing::info!("Starting monk-hooks demo in {:?} mode", config.environment);

    let engine = Arc::new(MemoryEngine::new());
    engine.insert(
        "User",
        vec![
            json!({ "id": 1, "name": "Carol", "email": "carol@example.com", "active": true }),
            json!({ "id": 2, "name": "Alice", "email": "alice@example.com", "active": true }),
            json!({ "id": 3, "name": "Bob", "email": "bob@example.com", "active": false }),
        ],
    )?;

    let models = ModelRegistry::new().with(ModelDef::new("User").scope(
        "active",
        |q: &mut QueryDescriptor| {
            q.merge_where(json!({ "active": true }));
        },
    ));
    let client = Client::new(engine.clone(), models);
    let hooks = client.hooks();

    hooks.before_create(
        "User",
        before_fn(|ctx| {
            let data = ctx
                .data_mut()
                .and_then(|d| d.as_object_mut())
                .ok_or_else(|| HookError::rejected("create without data"))?;
            match data.get("email").and_then(|e| e.as_str()) {
                Some(email) if email.contains('@') => {
                    let lowered = email.to_lowercase();
                    data.insert("email".to_string(), json!(lowered));
                    Ok(())
                }
                _ => Err(HookError::rejected("email is required")),
            }
        }),
    );

    hooks.after_update(
        "User",
        after_fn(|ctx| async move {
            tracing::info!("User updated: {}", ctx.result);
            Ok(())
        }),
    );

    hooks.on_column_change(
        "User",
        "email",
        column_fn(|change| async move {
            tracing::info!(
                "User {} email changed from {} to {}",
                change.row.get("id").cloned().unwrap_or_default(),
                change.previous,
                change.current
            );
            Ok(())
        }),
    );

    let created = client
        .from("users")?
        .create(json!({ "id": 4, "name": "Dave", "email": "DAVE@Example.com", "active": true }))
        .await?;
    tracing::info!("Created: {}", created);

    if let Err(e) = client.from("User")?.create(json!({ "name": "Eve" })).await {
        tracing::info!("Create rejected as expected: {}", e);
    }

    client
        .from("user")?
        .where_clause(json!({ "id": 2 }))
        .update(json!({ "email": "alice@new.example.com" }))
        .await?;

    let active = client
        .from("User")?
        .scope("active")
        .order(json!({ "name": "asc" }))
        .limit(2)
        .select(["id", "name"])
        .find_many()
        .await?;
    tracing::info!("First two active users: {}", active);

    client.drain().await;
    Ok(())
}

mod common;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use common::Harness;
use monk_hooks::hooks::{column_fn, BeforeContext, BeforeHook, ColumnChange, HookBox};
use monk_hooks::{HookError, Operation, Phase};
use serde_json::{json, Value};

/// Column hook that records every change it sees
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<ColumnChange>>>);

impl Recorder {
    fn watch(&self, harness: &Harness, column: &str) {
        let seen = self.0.clone();
        harness.client.hooks().on_column_change(
            "User",
            column,
            column_fn(move |change| {
                let seen = seen.clone();
                async move {
                    seen.lock().expect("recorder poisoned").push(change);
                    Ok(())
                }
            }),
        );
    }

    fn changes(&self) -> Vec<ColumnChange> {
        self.0.lock().expect("recorder poisoned").clone()
    }
}

#[tokio::test]
async fn column_hook_sees_previous_and_current_value() -> Result<()> {
    let harness = Harness::with_users()?;
    let recorder = Recorder::default();
    recorder.watch(&harness, "name");

    harness
        .client
        .from("User")?
        .where_clause(json!({ "id": 1 }))
        .update(json!({ "name": "Caroline" }))
        .await?;
    harness.settle().await?;

    let changes = recorder.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].column, "name");
    assert_eq!(changes[0].previous, json!("Carol"));
    assert_eq!(changes[0].current, json!("Caroline"));
    assert_eq!(changes[0].row.get("email"), Some(&json!("carol@example.com")));
    assert!(harness.reporter.is_empty());
    Ok(())
}

#[tokio::test]
async fn unchanged_value_does_not_notify() -> Result<()> {
    let harness = Harness::with_users()?;
    let recorder = Recorder::default();
    recorder.watch(&harness, "name");

    let mut query = harness.client.from("User")?;
    query.where_clause(json!({ "id": 1 }));
    query.update(json!({ "name": "Carol" })).await?;
    query.update(json!({ "tier": "gold" })).await?;
    harness.settle().await?;

    assert!(recorder.changes().is_empty());
    Ok(())
}

#[tokio::test]
async fn pre_image_uses_minimal_projection() -> Result<()> {
    let harness = Harness::with_users()?;
    Recorder::default().watch(&harness, "name");

    harness
        .client
        .from("User")?
        .where_clause(json!({ "id": 2 }))
        .update(json!({ "name": "Alicia" }))
        .await?;
    harness.settle().await?;

    let fetches = harness.engine.fetches();
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].filter, json!({ "id": 2 }));
    assert_eq!(
        fetches[0].projection,
        Some(vec!["id".to_string(), "name".to_string()])
    );
    Ok(())
}

#[tokio::test]
async fn no_pre_image_without_column_hooks_or_for_creates() -> Result<()> {
    let harness = Harness::with_users()?;

    harness
        .client
        .from("User")?
        .where_clause(json!({ "id": 1 }))
        .update(json!({ "name": "Caroline" }))
        .await?;
    assert!(harness.engine.fetches().is_empty());

    Recorder::default().watch(&harness, "name");
    harness
        .client
        .from("User")?
        .create(json!({ "id": 4, "name": "Dave" }))
        .await?;
    harness.settle().await?;
    assert!(harness.engine.fetches().is_empty());
    Ok(())
}

/// Deletes user 2 right before the bulk update executes
struct DeleteUserTwo;

#[async_trait]
impl BeforeHook for DeleteUserTwo {
    async fn before(&self, ctx: &mut BeforeContext) -> Result<(), HookError> {
        ctx.engine
            .execute("User", Operation::Delete, json!({ "where": { "id": 2 } }))
            .await?;
        Ok(())
    }
}

#[tokio::test]
async fn bulk_update_notifies_rows_present_in_both_images() -> Result<()> {
    let harness = Harness::with_users()?;
    let recorder = Recorder::default();
    recorder.watch(&harness, "tier");
    harness
        .client
        .hooks()
        .register("User", Operation::UpdateMany, HookBox::before(DeleteUserTwo));

    let result = harness
        .client
        .from("User")?
        .scope("active")
        .update_many(json!({ "tier": "gold" }))
        .await?;
    assert_eq!(result, json!({ "count": 1 }));
    harness.settle().await?;

    let changes = recorder.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].row.get("id"), Some(&json!(1)));
    assert_eq!(changes[0].previous, json!("basic"));
    assert_eq!(changes[0].current, json!("gold"));

    // Pre-image and post-image both read by the original filter
    let fetches = harness.engine.fetches();
    assert_eq!(fetches.len(), 2);
    assert!(fetches.iter().all(|f| f.filter == json!({ "active": true })));
    assert_eq!(fetches[1].projection, None);
    Ok(())
}

#[tokio::test]
async fn bulk_update_post_image_reuses_original_filter() -> Result<()> {
    let harness = Harness::with_users()?;
    let recorder = Recorder::default();
    recorder.watch(&harness, "tier");

    harness
        .client
        .from("User")?
        .where_clause(json!({ "tier": "basic", "id": { "$lte": 2 } }))
        .update_many(json!({ "tier": "gold" }))
        .await?;
    harness.settle().await?;

    // The post-image query filters on the column that changed, so it finds nothing
    assert!(recorder.changes().is_empty());

    harness
        .client
        .from("User")?
        .where_clause(json!({ "id": { "$in": [1, 2, 3] } }))
        .update_many(json!({ "tier": "platinum" }))
        .await?;
    harness.settle().await?;

    let mut ids: Vec<Value> = recorder
        .changes()
        .iter()
        .filter_map(|change| change.row.get("id").cloned())
        .collect();
    ids.sort_by_key(|id| id.as_i64());
    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    Ok(())
}

#[tokio::test]
async fn upsert_diffs_existing_row() -> Result<()> {
    let harness = Harness::with_users()?;
    let recorder = Recorder::default();
    recorder.watch(&harness, "email");

    harness
        .client
        .from("User")?
        .where_clause(json!({ "id": 3 }))
        .upsert(
            json!({ "id": 3, "name": "Bob", "email": "bob@new.example.com" }),
            json!({ "email": "bob@new.example.com" }),
        )
        .await?;
    harness
        .client
        .from("User")?
        .where_clause(json!({ "id": 9 }))
        .upsert(json!({ "id": 9, "email": "new@example.com" }), json!({}))
        .await?;
    harness.settle().await?;

    let changes = recorder.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].previous, json!("bob@example.com"));
    assert!(harness.user(9).is_some());
    Ok(())
}

#[tokio::test]
async fn failing_column_hook_is_reported_with_its_column() -> Result<()> {
    let harness = Harness::with_users()?;
    harness.client.hooks().on_column_change(
        "User",
        "name",
        column_fn(|_change| async { Err(HookError::rejected("search index offline")) }),
    );

    let updated = harness
        .client
        .from("User")?
        .where_clause(json!({ "id": 1 }))
        .update(json!({ "name": "Caroline" }))
        .await?;
    assert_eq!(updated["name"], json!("Caroline"));
    harness.settle().await?;

    let errors = harness.reporter.take();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].phase, Phase::ColumnDiff);
    assert_eq!(errors[0].column.as_deref(), Some("name"));
    assert_eq!(errors[0].operation, Operation::Update);
    Ok(())
}

#[tokio::test]
async fn late_column_hook_registration_stays_stale() -> Result<()> {
    let harness = Harness::with_users()?;
    let names = Recorder::default();
    names.watch(&harness, "name");

    harness
        .client
        .from("User")?
        .where_clause(json!({ "id": 1 }))
        .update(json!({ "name": "Caroline" }))
        .await?;
    harness.settle().await?;

    let emails = Recorder::default();
    emails.watch(&harness, "email");

    harness
        .client
        .from("User")?
        .where_clause(json!({ "id": 1 }))
        .update(json!({ "name": "Caro", "email": "caro@example.com" }))
        .await?;
    harness.settle().await?;

    assert_eq!(names.changes().len(), 2);
    assert!(emails.changes().is_empty(), "relevance set was cached before the email hook");
    assert_eq!(
        harness.client.hooks().relevant_fields("User").as_slice(),
        ["id".to_string(), "name".to_string()]
    );

    // A reset clears the cache along with the hooks
    harness.client.reset();
    emails.watch(&harness, "email");
    harness
        .client
        .from("User")?
        .where_clause(json!({ "id": 1 }))
        .update(json!({ "email": "carol@example.com" }))
        .await?;
    harness.settle().await?;
    assert_eq!(emails.changes().len(), 1);
    Ok(())
}

// Hook registry: operation hooks, column hooks and the per-model relevance cache

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::HookConfig;
use crate::engine::EngineHandle;
use crate::error::HookError;
use crate::hooks::context::{AfterContext, BeforeContext, ColumnChange};
use crate::hooks::diff::changed_columns;
use crate::hooks::traits::{AfterHook, BeforeHook, ColumnHook, HookBox};
use crate::types::{Operation, Row, Timing};

#[derive(Default)]
struct RegistryState {
    before: HashMap<String, Vec<Arc<dyn BeforeHook>>>,
    after: HashMap<String, Vec<Arc<dyn AfterHook>>>,
    columns: HashMap<String, Vec<Arc<dyn ColumnHook>>>,
    // Columns with hooks per model, in registration order
    hooked_columns: HashMap<String, Vec<String>>,
    column_models: HashSet<String>,
    relevant_fields: HashMap<String, Arc<Vec<String>>>,
}

/// Process-scoped hook registry
///
/// Construct once at startup, share as `Arc<HookRegistry>` with the
/// interceptor, and call [`HookRegistry::reset`] between tests. Registration is
/// expected during setup; registering while operations are in flight is not
/// supported.
pub struct HookRegistry {
    config: HookConfig,
    state: RwLock<RegistryState>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::with_config(crate::config::config().hooks.clone())
    }

    pub fn with_config(config: HookConfig) -> Self {
        Self {
            config,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    pub fn id_field(&self) -> &str {
        &self.config.id_field
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(model: &str, suffix: &str) -> String {
        format!("{}:{}", model, suffix)
    }

    // === Registration ===

    /// Append a hook at `model:operation`; timing comes from the hook variant
    pub fn register(&self, model: &str, operation: Operation, hook: HookBox) {
        let key = Self::key(model, operation.as_str());
        let name = hook.name().to_string();
        let timing = hook.timing();
        let mut state = self.write();
        match hook {
            HookBox::Before(h) => state.before.entry(key.clone()).or_default().push(h),
            HookBox::After(h) => state.after.entry(key.clone()).or_default().push(h),
        }
        tracing::debug!("Registered {:?} hook '{}' for {}", timing, name, key);
    }

    pub fn before(&self, model: &str, operation: Operation, hook: impl BeforeHook + 'static) {
        self.register(model, operation, HookBox::before(hook));
    }

    pub fn after(&self, model: &str, operation: Operation, hook: impl AfterHook + 'static) {
        self.register(model, operation, HookBox::after(hook));
    }

    pub fn before_create(&self, model: &str, hook: impl BeforeHook + 'static) {
        self.before(model, Operation::Create, hook);
    }

    pub fn after_create(&self, model: &str, hook: impl AfterHook + 'static) {
        self.after(model, Operation::Create, hook);
    }

    pub fn before_update(&self, model: &str, hook: impl BeforeHook + 'static) {
        self.before(model, Operation::Update, hook);
    }

    pub fn after_update(&self, model: &str, hook: impl AfterHook + 'static) {
        self.after(model, Operation::Update, hook);
    }

    pub fn before_delete(&self, model: &str, hook: impl BeforeHook + 'static) {
        self.before(model, Operation::Delete, hook);
    }

    pub fn after_delete(&self, model: &str, hook: impl AfterHook + 'static) {
        self.after(model, Operation::Delete, hook);
    }

    /// Append a column hook at `model:column` and mark the model as column-hook-bearing
    ///
    /// If the model's relevance set was already computed it is NOT recomputed,
    /// so the new column is missing from future pre-images and the hook will
    /// not fire for it until [`HookRegistry::reset`].
    pub fn register_column_hook(&self, model: &str, column: &str, hook: Arc<dyn ColumnHook>) {
        let key = Self::key(model, column);
        let name = hook.name().to_string();
        let mut state = self.write();

        if self.config.warn_on_stale_relevance {
            if let Some(cached) = state.relevant_fields.get(model) {
                if !cached.iter().any(|c| c == column) {
                    tracing::warn!(
                        "Column hook for {} registered after relevance set for {} was cached; it will not see changes",
                        key, model
                    );
                }
            }
        }

        state.columns.entry(key.clone()).or_default().push(hook);
        let columns = state.hooked_columns.entry(model.to_string()).or_default();
        if !columns.iter().any(|c| c == column) {
            columns.push(column.to_string());
        }
        state.column_models.insert(model.to_string());
        tracing::debug!("Registered column hook '{}' for {}", name, key);
    }

    pub fn on_column_change(&self, model: &str, column: &str, hook: impl ColumnHook + 'static) {
        self.register_column_hook(model, column, Arc::new(hook));
    }

    // === Lookup ===

    pub fn has_column_hooks(&self, model: &str) -> bool {
        self.read().column_models.contains(model)
    }

    /// Hooked columns for `model` plus the id column, computed once per model
    pub fn relevant_fields(&self, model: &str) -> Arc<Vec<String>> {
        if let Some(cached) = self.read().relevant_fields.get(model) {
            return cached.clone();
        }

        let mut state = self.write();
        // Another caller may have filled it between the two locks
        if let Some(cached) = state.relevant_fields.get(model) {
            return cached.clone();
        }

        let mut fields: BTreeSet<String> = state
            .hooked_columns
            .get(model)
            .map(|cols| cols.iter().cloned().collect())
            .unwrap_or_default();
        fields.insert(self.config.id_field.clone());

        let fields = Arc::new(fields.into_iter().collect::<Vec<_>>());
        state.relevant_fields.insert(model.to_string(), fields.clone());
        tracing::debug!("Cached relevant fields for {}: {:?}", model, fields);
        fields
    }

    pub fn hook_count(&self, model: &str, operation: Operation, timing: Timing) -> usize {
        let key = Self::key(model, operation.as_str());
        let state = self.read();
        match timing {
            Timing::Before => state.before.get(&key).map_or(0, Vec::len),
            Timing::After => state.after.get(&key).map_or(0, Vec::len),
        }
    }

    pub fn has_hooks(&self, model: &str, operation: Operation, timing: Timing) -> bool {
        self.hook_count(model, operation, timing) > 0
    }

    fn before_hooks(&self, model: &str, operation: Operation) -> Vec<Arc<dyn BeforeHook>> {
        self.read()
            .before
            .get(&Self::key(model, operation.as_str()))
            .cloned()
            .unwrap_or_default()
    }

    fn after_hooks(&self, model: &str, operation: Operation) -> Vec<Arc<dyn AfterHook>> {
        self.read()
            .after
            .get(&Self::key(model, operation.as_str()))
            .cloned()
            .unwrap_or_default()
    }

    fn column_hooks(&self, model: &str, column: &str) -> Vec<Arc<dyn ColumnHook>> {
        self.read()
            .columns
            .get(&Self::key(model, column))
            .cloned()
            .unwrap_or_default()
    }

    // === Dispatch ===

    /// Run before hooks one at a time; the first failure stops the sequence
    pub async fn run_before_hooks(&self, ctx: &mut BeforeContext) -> Result<(), HookError> {
        let hooks = self.before_hooks(&ctx.model, ctx.operation);
        if hooks.is_empty() {
            return Ok(());
        }

        tracing::debug!("Running {} before hooks for {}:{}", hooks.len(), ctx.model, ctx.operation);

        for hook in hooks {
            if let Err(error) = guarded(hook.name(), hook.before(ctx)).await {
                tracing::warn!(
                    "Before hook '{}' rejected {}:{}: {}",
                    hook.name(), ctx.model, ctx.operation, error
                );
                return Err(error);
            }
        }
        Ok(())
    }

    /// Run after hooks concurrently and wait for all of them; returns every failure
    pub async fn run_after_hooks(&self, ctx: &AfterContext) -> Vec<HookError> {
        let hooks = self.after_hooks(&ctx.model, ctx.operation);
        if hooks.is_empty() {
            return Vec::new();
        }

        tracing::debug!("Running {} after hooks for {}:{}", hooks.len(), ctx.model, ctx.operation);

        join_all(hooks.iter().map(|hook| guarded(hook.name(), hook.after(ctx))))
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect()
    }

    /// Fire column hooks for every column of `new_row` that differs from `prev_row`
    ///
    /// All callbacks for all changed columns run concurrently. Returns the
    /// failures tagged with their column.
    pub async fn run_column_hooks(
        &self,
        model: &str,
        new_row: &Row,
        prev_row: &Row,
        engine: &EngineHandle,
    ) -> Vec<(String, HookError)> {
        let mut dispatch = Vec::new();
        for (column, previous, current) in changed_columns(new_row, prev_row) {
            let hooks = self.column_hooks(model, column);
            if hooks.is_empty() {
                continue;
            }
            let change = ColumnChange {
                model: model.to_string(),
                column: column.to_string(),
                previous: previous.clone(),
                current: current.clone(),
                row: new_row.clone(),
                engine: engine.clone(),
            };
            for hook in hooks {
                dispatch.push((hook, change.clone()));
            }
        }

        if dispatch.is_empty() {
            return Vec::new();
        }

        tracing::debug!("Dispatching {} column hook calls for {}", dispatch.len(), model);

        join_all(dispatch.iter().map(|(hook, change)| async move {
            guarded(hook.name(), hook.changed(change))
                .await
                .map_err(|e| (change.column.clone(), e))
        }))
        .await
        .into_iter()
        .filter_map(Result::err)
        .collect()
    }

    /// Drop every registration and cached relevance set; in-flight work is not cancelled
    pub fn reset(&self) {
        *self.write() = RegistryState::default();
        tracing::debug!("Hook registry reset");
    }
}

/// Await one hook callback, turning a panic into [`HookError::TaskFailed`]
async fn guarded<F>(name: &str, callback: F) -> Result<(), HookError>
where
    F: Future<Output = Result<(), HookError>>,
{
    match AssertUnwindSafe(callback).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!("Hook '{}' panicked: {}", name, message);
            Err(HookError::TaskFailed(format!("hook '{}' panicked: {}", name, message)))
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

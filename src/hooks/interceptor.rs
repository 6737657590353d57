// Mutation interceptor: pre-image, before hooks, execution, then detached diff and after hooks

use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::task::JoinSet;

use crate::engine::EngineHandle;
use crate::error::{Error, HookError, ObservationError, Result};
use crate::hooks::context::{AfterContext, BeforeContext};
use crate::hooks::diff::ColumnDiff;
use crate::hooks::registry::{panic_message, HookRegistry};
use crate::hooks::reporter::{ErrorReporter, TracingReporter};
use crate::types::{Operation, Phase, Row, Timing};

/// Wraps every engine call and runs the hook phases around mutations
///
/// The caller waits on the pre-image read, the before hooks and the engine
/// call. Column diffing and after hooks run on a supervised task; their
/// failures go to the [`ErrorReporter`] and never reach the caller. A panic
/// inside one hook is reported against that hook alone. Dropping the
/// interceptor aborts observation work that has not finished; each aborted
/// task is reported as [`HookError::TaskFailed`], so call
/// [`Interceptor::drain`] on shutdown.
pub struct Interceptor {
    engine: EngineHandle,
    registry: Arc<HookRegistry>,
    reporter: Arc<dyn ErrorReporter>,
    tasks: Mutex<JoinSet<()>>,
}

/// Everything the detached phases need, owned so it can move onto a task
struct Observation {
    model: String,
    operation: Operation,
    args: Value,
    result: Value,
    original_filter: Value,
    prev_rows: Option<Vec<Row>>,
    run_after: bool,
}

impl Interceptor {
    pub fn new(engine: EngineHandle, registry: Arc<HookRegistry>) -> Self {
        Self {
            engine,
            registry,
            reporter: Arc::new(TracingReporter),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    /// Route one engine call through the hook pipeline
    pub async fn execute(&self, model: &str, operation: Operation, args: Value) -> Result<Value> {
        if !operation.is_mutating() {
            return Ok(self.engine.execute(model, operation, args).await?);
        }

        let start_time = Instant::now();
        let diff_columns = operation.is_update() && self.registry.has_column_hooks(model);
        let original_filter = args
            .get("where")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));

        tracing::debug!(
            "Hook pipeline starting: operation={}, model={}, column_diff={}",
            operation, model, diff_columns
        );

        if self.registry.config().debug_logging {
            tracing::debug!("Hook pipeline args for {}:{}: {}", model, operation, args);
        }

        // Pre-image: only the columns column hooks care about
        let prev_rows = if diff_columns {
            let fields = self.registry.relevant_fields(model);
            let rows = ColumnDiff::fetch_rows(
                &self.engine,
                model,
                &original_filter,
                Some(fields.as_slice()),
                self.registry.id_field(),
            )
            .await?;
            Some(rows)
        } else {
            None
        };

        // Before hooks: sequential veto gate
        let mut ctx = BeforeContext::new(model, operation, args, self.engine.clone());
        if let Err(source) = self.registry.run_before_hooks(&mut ctx).await {
            tracing::info!(
                "Hook pipeline aborted in {:?}: operation={}, model={}",
                start_time.elapsed(), operation, model
            );
            return Err(Error::Abort {
                model: model.to_string(),
                operation,
                source,
            });
        }
        let args = ctx.args;

        // The real call; its error is the caller's error
        let result = self.engine.execute(model, operation, args.clone()).await?;

        let run_after = self.registry.has_hooks(model, operation, Timing::After);
        let has_prev = prev_rows.as_ref().is_some_and(|rows| !rows.is_empty());
        if run_after || has_prev {
            self.spawn_observation(Observation {
                model: model.to_string(),
                operation,
                args,
                result: result.clone(),
                original_filter,
                prev_rows: prev_rows.filter(|rows| !rows.is_empty()),
                run_after,
            });
        }

        tracing::info!(
            "Hook pipeline completed in {:?}: operation={}, model={}, detached={}",
            start_time.elapsed(), operation, model, run_after || has_prev
        );

        Ok(result)
    }

    /// Wait for every outstanding observation task
    pub async fn drain(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.lock_tasks());
            if tasks.is_empty() {
                return;
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::warn!("Observation task did not complete: {}", e);
                }
            }
        }
    }

    /// Observation tasks spawned and not yet reaped
    pub fn pending(&self) -> usize {
        let mut tasks = self.lock_tasks();
        Self::reap(&mut tasks);
        tasks.len()
    }

    fn lock_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reap(tasks: &mut JoinSet<()>) {
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                tracing::warn!("Observation task did not complete: {}", e);
            }
        }
    }

    fn spawn_observation(&self, observation: Observation) {
        let engine = self.engine.clone();
        let registry = self.registry.clone();
        let mut pending = PendingObservation {
            model: observation.model.clone(),
            operation: observation.operation,
            reporter: self.reporter.clone(),
            finished: false,
        };
        let work = Self::observe(engine, registry, self.reporter.clone(), observation);

        let mut tasks = self.lock_tasks();
        Self::reap(&mut tasks);
        tasks.spawn(async move {
            work.await;
            pending.finished = true;
        });
    }

    /// Column diff and after hooks, concurrently; every failure is reported
    async fn observe(
        engine: EngineHandle,
        registry: Arc<HookRegistry>,
        reporter: Arc<dyn ErrorReporter>,
        observation: Observation,
    ) {
        let Observation {
            model,
            operation,
            args,
            result,
            original_filter,
            prev_rows,
            run_after,
        } = observation;

        let diff_phase = async {
            let Some(prev_rows) = prev_rows else {
                return;
            };

            let new_rows = if operation.is_bulk() {
                // Bulk results are counts, so the affected rows are read back
                match ColumnDiff::fetch_rows(&engine, &model, &original_filter, None, registry.id_field()).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        reporter.report(ObservationError::new(
                            &model,
                            operation,
                            Phase::ColumnDiff,
                            HookError::Engine(e),
                        ));
                        return;
                    }
                }
            } else {
                match &result {
                    Value::Object(row) => vec![row.clone()],
                    _ => Vec::new(),
                }
            };

            let report = ColumnDiff::diff(&registry, &model, &new_rows, &prev_rows, &engine).await;
            for (column, error) in report.failures {
                reporter.report(
                    ObservationError::new(&model, operation, Phase::ColumnDiff, error).with_column(&column),
                );
            }
        };

        let after_phase = async {
            if !run_after {
                return;
            }
            let ctx = AfterContext {
                model: model.clone(),
                operation,
                args: args.clone(),
                result: result.clone(),
                engine: engine.clone(),
            };
            for error in registry.run_after_hooks(&ctx).await {
                reporter.report(ObservationError::new(&model, operation, Phase::After, error));
            }
        };

        // Hook callbacks are guarded one by one; this catches the diff machinery itself
        let (diffed, observed) = tokio::join!(
            AssertUnwindSafe(diff_phase).catch_unwind(),
            AssertUnwindSafe(after_phase).catch_unwind(),
        );
        for (phase, outcome) in [(Phase::ColumnDiff, diffed), (Phase::After, observed)] {
            if let Err(panic) = outcome {
                reporter.report(ObservationError::new(
                    &model,
                    operation,
                    phase,
                    HookError::TaskFailed(panic_message(panic.as_ref())),
                ));
            }
        }
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        Self::reap(tasks);
        if !tasks.is_empty() {
            tracing::warn!(
                "Interceptor dropped with {} observation tasks pending; aborting them",
                tasks.len()
            );
        }
    }
}

/// Reports an observation task that was dropped before it finished
struct PendingObservation {
    model: String,
    operation: Operation,
    reporter: Arc<dyn ErrorReporter>,
    finished: bool,
}

impl Drop for PendingObservation {
    fn drop(&mut self) {
        if !self.finished {
            self.reporter.report(ObservationError::new(
                &self.model,
                self.operation,
                Phase::After,
                HookError::TaskFailed("observation aborted before completion".to_string()),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HookConfig;
    use crate::engine::MemoryEngine;
    use crate::hooks::reporter::MemoryReporter;
    use crate::error::EngineError;
    use crate::hooks::traits::{after_fn, before_fn, column_fn};
    use serde_json::json;
    use std::time::Duration;

    fn setup() -> (Arc<MemoryEngine>, Interceptor, MemoryReporter) {
        let memory = Arc::new(MemoryEngine::new());
        let registry = Arc::new(HookRegistry::with_config(HookConfig::default()));
        let reporter = MemoryReporter::new();
        let interceptor = Interceptor::new(memory.clone(), registry).with_reporter(Arc::new(reporter.clone()));
        (memory, interceptor, reporter)
    }

    #[tokio::test]
    async fn test_reads_pass_through() {
        let (memory, interceptor, _) = setup();
        memory.insert("User", vec![json!({ "id": 1 })]).unwrap();
        interceptor
            .registry()
            .before("User", Operation::Count, before_fn(|_| Err(HookError::rejected("nope"))));

        let count = interceptor
            .execute("User", Operation::Count, json!({ "where": {} }))
            .await
            .unwrap();
        assert_eq!(count, json!(1));
        assert_eq!(interceptor.pending(), 0);
    }

    #[tokio::test]
    async fn test_no_task_without_observers() {
        let (_, interceptor, _) = setup();
        interceptor
            .execute("User", Operation::Create, json!({ "data": { "id": 1 } }))
            .await
            .unwrap();
        assert_eq!(interceptor.pending(), 0);
    }

    #[tokio::test]
    async fn test_drain_waits_for_detached_work() {
        let (_, interceptor, reporter) = setup();
        interceptor.registry().after_create(
            "User",
            after_fn(|_| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err(HookError::rejected("late failure"))
            }),
        );

        interceptor
            .execute("User", Operation::Create, json!({ "data": { "id": 1 } }))
            .await
            .unwrap();
        assert_eq!(interceptor.pending(), 1);
        assert!(reporter.is_empty());

        interceptor.drain().await;
        assert_eq!(interceptor.pending(), 0);
        assert_eq!(reporter.len(), 1);
    }

    #[tokio::test]
    async fn test_pre_image_failure_is_an_execution_error() {
        let memory = Arc::new(MemoryEngine::new().with_models(["Post"]));
        let registry = Arc::new(HookRegistry::with_config(HookConfig::default()));
        registry.on_column_change("User", "name", column_fn(|_| async { Ok(()) }));
        let interceptor = Interceptor::new(memory.clone(), registry);

        let err = interceptor
            .execute("User", Operation::Update, json!({ "where": { "id": 1 }, "data": { "name": "B" } }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution(EngineError::UnknownModel(_))));
        assert!(memory.calls().is_empty());
        assert_eq!(memory.fetches().len(), 1);
    }
}

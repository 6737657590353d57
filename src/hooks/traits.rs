use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::engine::EngineHandle;
use crate::error::HookError;
use crate::hooks::context::{AfterContext, BeforeContext, ColumnChange};
use crate::types::Timing;

/// Before-phase hook: awaited in registration order, an error vetoes the call
#[async_trait]
pub trait BeforeHook: Send + Sync {
    /// Hook name for logging and debugging
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn before(&self, ctx: &mut BeforeContext) -> Result<(), HookError>;
}

/// After-phase hook: runs detached and concurrently with its siblings
#[async_trait]
pub trait AfterHook: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn after(&self, ctx: &AfterContext) -> Result<(), HookError>;
}

/// Column-change hook: runs detached once per changed column per row
#[async_trait]
pub trait ColumnHook: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn changed(&self, change: &ColumnChange) -> Result<(), HookError>;
}

/// Operation hook with its timing, for type-erased registration
#[derive(Clone)]
pub enum HookBox {
    Before(Arc<dyn BeforeHook>),
    After(Arc<dyn AfterHook>),
}

impl HookBox {
    pub fn before(hook: impl BeforeHook + 'static) -> Self {
        HookBox::Before(Arc::new(hook))
    }

    pub fn after(hook: impl AfterHook + 'static) -> Self {
        HookBox::After(Arc::new(hook))
    }

    pub fn timing(&self) -> Timing {
        match self {
            HookBox::Before(_) => Timing::Before,
            HookBox::After(_) => Timing::After,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            HookBox::Before(h) => h.name(),
            HookBox::After(h) => h.name(),
        }
    }
}

// === Closure adapters ===

/// Synchronous before hook over `&mut BeforeContext`
pub struct BeforeFn<F>(F);

pub fn before_fn<F>(f: F) -> BeforeFn<F>
where
    F: Fn(&mut BeforeContext) -> Result<(), HookError> + Send + Sync,
{
    BeforeFn(f)
}

#[async_trait]
impl<F> BeforeHook for BeforeFn<F>
where
    F: Fn(&mut BeforeContext) -> Result<(), HookError> + Send + Sync,
{
    fn name(&self) -> &str {
        "before_fn"
    }

    async fn before(&self, ctx: &mut BeforeContext) -> Result<(), HookError> {
        (self.0)(ctx)
    }
}

/// Async before hook: receives the pending args by value and returns the args to execute
pub struct BeforeAsyncFn<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

pub fn before_async_fn<F, Fut>(f: F) -> BeforeAsyncFn<F, Fut>
where
    F: Fn(Value, EngineHandle) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HookError>> + Send,
{
    BeforeAsyncFn { f, _fut: PhantomData }
}

#[async_trait]
impl<F, Fut> BeforeHook for BeforeAsyncFn<F, Fut>
where
    F: Fn(Value, EngineHandle) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HookError>> + Send,
{
    fn name(&self) -> &str {
        "before_async_fn"
    }

    async fn before(&self, ctx: &mut BeforeContext) -> Result<(), HookError> {
        let args = std::mem::take(&mut ctx.args);
        ctx.args = (self.f)(args, ctx.engine.clone()).await?;
        Ok(())
    }
}

pub struct AfterFn<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

pub fn after_fn<F, Fut>(f: F) -> AfterFn<F, Fut>
where
    F: Fn(AfterContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HookError>> + Send,
{
    AfterFn { f, _fut: PhantomData }
}

#[async_trait]
impl<F, Fut> AfterHook for AfterFn<F, Fut>
where
    F: Fn(AfterContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HookError>> + Send,
{
    fn name(&self) -> &str {
        "after_fn"
    }

    async fn after(&self, ctx: &AfterContext) -> Result<(), HookError> {
        (self.f)(ctx.clone()).await
    }
}

pub struct ColumnFn<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

pub fn column_fn<F, Fut>(f: F) -> ColumnFn<F, Fut>
where
    F: Fn(ColumnChange) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HookError>> + Send,
{
    ColumnFn { f, _fut: PhantomData }
}

#[async_trait]
impl<F, Fut> ColumnHook for ColumnFn<F, Fut>
where
    F: Fn(ColumnChange) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HookError>> + Send,
{
    fn name(&self) -> &str {
        "column_fn"
    }

    async fn changed(&self, change: &ColumnChange) -> Result<(), HookError> {
        (self.f)(change.clone()).await
    }
}

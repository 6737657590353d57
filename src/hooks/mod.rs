// Lifecycle hooks around engine mutations

pub mod context;
pub mod diff;
pub mod interceptor;
pub mod registry;
pub mod reporter;
pub mod traits;

pub use context::{AfterContext, BeforeContext, ColumnChange};
pub use diff::{changed_columns, ColumnDiff, DiffReport};
pub use interceptor::Interceptor;
pub use registry::HookRegistry;
pub use reporter::{ErrorReporter, MemoryReporter, TracingReporter};
pub use traits::{
    after_fn, before_async_fn, before_fn, column_fn, AfterHook, BeforeHook, ColumnHook, HookBox,
};

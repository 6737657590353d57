use std::sync::{Arc, Mutex};

use crate::error::ObservationError;

/// Destination for failures of detached hook phases
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: ObservationError);
}

/// Default reporter: logs through tracing and drops the error
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: ObservationError) {
        log_observation(&error);
    }
}

fn log_observation(error: &ObservationError) {
    tracing::error!(
        model = %error.model,
        operation = %error.operation,
        phase = %error.phase,
        column = error.column.as_deref().unwrap_or("-"),
        "Observation hook failed: {}",
        error.error
    );
}

/// Keeps reported failures in memory; also logs them like [`TracingReporter`]
#[derive(Debug, Default, Clone)]
pub struct MemoryReporter {
    errors: Arc<Mutex<Vec<ObservationError>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain collected failures
    pub fn take(&self) -> Vec<ObservationError> {
        self.errors
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl ErrorReporter for MemoryReporter {
    fn report(&self, error: ObservationError) {
        log_observation(&error);
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(error);
        }
    }
}

// In-process engine holding JSON rows per model
//
// Implements the engine contract closely enough to drive the hook pipeline and
// the query builder in tests and the demo binary. No persistence, no
// transactions.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::Engine;
use crate::error::EngineError;
use crate::filter::{FilterOrder, FilterWhere};
use crate::types::{Operation, Row};

/// One `execute` call as seen by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCall {
    pub model: String,
    pub operation: Operation,
    pub args: Value,
}

/// One `find_many` read as seen by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineFetch {
    pub model: String,
    pub filter: Value,
    pub projection: Option<Vec<String>>,
}

pub struct MemoryEngine {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    calls: Mutex<Vec<EngineCall>>,
    fetches: Mutex<Vec<EngineFetch>>,
    failures: Mutex<HashMap<(String, Operation), EngineError>>,
    models: Option<HashSet<String>>,
    id_field: String,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::with_id_field("id")
    }

    pub fn with_id_field(id_field: impl Into<String>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            models: None,
            id_field: id_field.into(),
        }
    }

    /// Restrict the engine to a known set of models; others fail with UnknownModel
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    /// Seed rows directly, bypassing the call log
    pub fn insert(&self, model: &str, rows: Vec<Value>) -> Result<(), EngineError> {
        let mut tables = self.tables_write()?;
        let table = tables.entry(model.to_string()).or_default();
        for row in rows {
            table.push(self.prepare_row(row)?);
        }
        Ok(())
    }

    /// Snapshot of a model's rows in insertion order
    pub fn rows(&self, model: &str) -> Vec<Row> {
        self.tables_read()
            .map(|tables| tables.get(model).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn fetches(&self) -> Vec<EngineFetch> {
        self.fetches.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Make the next `execute` of `operation` on `model` fail with `error`
    pub fn fail_next(&self, model: &str, operation: Operation, error: EngineError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert((model.to_string(), operation), error);
        }
    }

    pub fn clear_log(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
        if let Ok(mut fetches) = self.fetches.lock() {
            fetches.clear();
        }
    }

    fn tables_read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Vec<Row>>>, EngineError> {
        self.tables
            .read()
            .map_err(|_| EngineError::Backend("table lock poisoned".to_string()))
    }

    fn tables_write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Vec<Row>>>, EngineError> {
        self.tables
            .write()
            .map_err(|_| EngineError::Backend("table lock poisoned".to_string()))
    }

    fn check_model(&self, model: &str) -> Result<(), EngineError> {
        match &self.models {
            Some(models) if !models.contains(model) => Err(EngineError::UnknownModel(model.to_string())),
            _ => Ok(()),
        }
    }

    fn prepare_row(&self, value: Value) -> Result<Row, EngineError> {
        let mut row = match value {
            Value::Object(map) => map,
            other => {
                return Err(EngineError::InvalidArguments(format!("row must be an object, got {}", other)))
            }
        };
        if !row.contains_key(&self.id_field) {
            row.insert(self.id_field.clone(), Value::String(Uuid::new_v4().to_string()));
        }
        Ok(row)
    }

    fn execute_sync(&self, model: &str, operation: Operation, args: &Value) -> Result<Value, EngineError> {
        self.check_model(model)?;

        let where_data = args.get("where").cloned().unwrap_or(Value::Null);
        let filter = FilterWhere::parse(&where_data).map_err(|e| EngineError::InvalidArguments(e.to_string()))?;
        let select = Self::projection_from_args(args);

        let mut tables = self.tables_write()?;
        let table = tables.entry(model.to_string()).or_default();

        match operation {
            Operation::Create => {
                let row = self.prepare_row(Self::data(args, "data")?)?;
                self.ensure_unique(table, &row)?;
                table.push(row.clone());
                Ok(Self::project(row, select.as_deref()))
            }
            Operation::CreateMany => {
                let items = match Self::data(args, "data")? {
                    Value::Array(items) => items,
                    single => vec![single],
                };
                let mut count = 0u64;
                for item in items {
                    let row = self.prepare_row(item)?;
                    self.ensure_unique(table, &row)?;
                    table.push(row);
                    count += 1;
                }
                Ok(serde_json::json!({ "count": count }))
            }
            Operation::Update => {
                let changes = Self::object(Self::data(args, "data")?)?;
                let row = table
                    .iter_mut()
                    .find(|row| filter.matches(row))
                    .ok_or_else(|| EngineError::NotFound(format!("No {} record matches {}", model, where_data)))?;
                row.extend(changes);
                Ok(Self::project(row.clone(), select.as_deref()))
            }
            Operation::UpdateMany => {
                let changes = Self::object(Self::data(args, "data")?)?;
                let mut count = 0u64;
                for row in table.iter_mut().filter(|row| filter.matches(row)) {
                    row.extend(changes.clone());
                    count += 1;
                }
                Ok(serde_json::json!({ "count": count }))
            }
            Operation::Upsert => {
                if let Some(row) = table.iter_mut().find(|row| filter.matches(row)) {
                    row.extend(Self::object(Self::data(args, "update")?)?);
                    return Ok(Self::project(row.clone(), select.as_deref()));
                }
                let row = self.prepare_row(Self::data(args, "create")?)?;
                self.ensure_unique(table, &row)?;
                table.push(row.clone());
                Ok(Self::project(row, select.as_deref()))
            }
            Operation::Delete => {
                let index = table
                    .iter()
                    .position(|row| filter.matches(row))
                    .ok_or_else(|| EngineError::NotFound(format!("No {} record matches {}", model, where_data)))?;
                Ok(Self::project(table.remove(index), select.as_deref()))
            }
            Operation::DeleteMany => {
                let before = table.len();
                table.retain(|row| !filter.matches(row));
                Ok(serde_json::json!({ "count": (before - table.len()) as u64 }))
            }
            Operation::FindMany | Operation::FindFirst | Operation::FindUnique | Operation::Count => {
                let mut rows: Vec<Row> = table.iter().filter(|row| filter.matches(row)).cloned().collect();

                if let Some(order) = args.get("orderBy") {
                    let infos = FilterOrder::validate_and_parse(order)
                        .map_err(|e| EngineError::InvalidArguments(e.to_string()))?;
                    FilterOrder::sort_rows(&mut rows, &infos);
                }

                let skip = Self::paging(args, "skip");
                let take = Self::paging(args, "take");
                let rows = rows.into_iter().skip(skip.unwrap_or(0)).take(take.unwrap_or(usize::MAX));

                match operation {
                    Operation::Count => Ok(Value::from(rows.count() as u64)),
                    Operation::FindMany => Ok(Value::Array(
                        rows.map(|row| Self::project(row, select.as_deref())).collect(),
                    )),
                    _ => Ok(rows
                        .map(|row| Self::project(row, select.as_deref()))
                        .next()
                        .unwrap_or(Value::Null)),
                }
            }
        }
    }

    fn ensure_unique(&self, table: &[Row], row: &Row) -> Result<(), EngineError> {
        let id = row.get(&self.id_field);
        if table.iter().any(|existing| existing.get(&self.id_field) == id) {
            return Err(EngineError::InvalidArguments(format!(
                "duplicate {}: {}",
                self.id_field,
                id.unwrap_or(&Value::Null)
            )));
        }
        Ok(())
    }

    fn data(args: &Value, key: &str) -> Result<Value, EngineError> {
        args.get(key)
            .cloned()
            .ok_or_else(|| EngineError::InvalidArguments(format!("missing '{}'", key)))
    }

    fn object(value: Value) -> Result<Map<String, Value>, EngineError> {
        match value {
            Value::Object(map) => Ok(map),
            other => Err(EngineError::InvalidArguments(format!("expected object, got {}", other))),
        }
    }

    fn paging(args: &Value, key: &str) -> Option<usize> {
        args.get(key).and_then(Value::as_u64).map(|n| n as usize)
    }

    fn projection_from_args(args: &Value) -> Option<Vec<String>> {
        args.get("select").and_then(Value::as_object).map(|select| {
            select
                .iter()
                .filter(|(_, flag)| flag.as_bool().unwrap_or(false))
                .map(|(name, _)| name.clone())
                .collect()
        })
    }

    fn project_row(row: Row, projection: Option<&[String]>) -> Row {
        match projection {
            Some(columns) => row.into_iter().filter(|(k, _)| columns.contains(k)).collect(),
            None => row,
        }
    }

    fn project(row: Row, projection: Option<&[String]>) -> Value {
        Value::Object(Self::project_row(row, projection))
    }

    fn take_failure(&self, model: &str, operation: Operation) -> Option<EngineError> {
        self.failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.remove(&(model.to_string(), operation)))
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn execute(&self, model: &str, operation: Operation, args: Value) -> Result<Value, EngineError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(EngineCall {
                model: model.to_string(),
                operation,
                args: args.clone(),
            });
        }

        if let Some(error) = self.take_failure(model, operation) {
            tracing::debug!("MemoryEngine: injected failure for {}.{}: {}", model, operation, error);
            return Err(error);
        }

        self.execute_sync(model, operation, &args)
    }

    async fn find_many(
        &self,
        model: &str,
        filter: &Value,
        projection: Option<&[String]>,
    ) -> Result<Vec<Row>, EngineError> {
        if let Ok(mut fetches) = self.fetches.lock() {
            fetches.push(EngineFetch {
                model: model.to_string(),
                filter: filter.clone(),
                projection: projection.map(<[String]>::to_vec),
            });
        }

        self.check_model(model)?;
        let parsed = FilterWhere::parse(filter).map_err(|e| EngineError::InvalidArguments(e.to_string()))?;
        let tables = self.tables_read()?;
        Ok(tables
            .get(model)
            .map(|rows| {
                rows.iter()
                    .filter(|row| parsed.matches(row))
                    .map(|row| Self::project_row(row.clone(), projection))
                    .collect()
            })
            .unwrap_or_default())
    }
}

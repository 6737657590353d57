use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{is_identifier, FilterOrderInfo};
use crate::types::Operation;

/// Mutable accumulator behind a fluent query
///
/// Filter predicates merge shallowly by key; ordering, projection, paging and
/// includes replace whatever was there. The first validation failure is kept
/// and surfaces when the descriptor is serialized.
#[derive(Debug, Clone, Default)]
pub struct QueryDescriptor {
    where_data: Map<String, Value>,
    order_data: Vec<FilterOrderInfo>,
    select_columns: Option<Vec<String>>,
    include_relations: Option<Vec<String>>,
    limit: Option<u32>,
    offset: Option<u32>,
    error: Option<FilterError>,
}

/// Per-action payload that does not live in the descriptor
#[derive(Debug, Clone)]
pub enum TerminalData {
    None,
    Data(Value),
    Upsert { create: Value, update: Value },
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_where(&mut self, conditions: Value) -> &mut Self {
        if let Err(e) = FilterWhere::validate(&conditions) {
            return self.fail(e);
        }
        // validate() admits only objects and null
        if let Value::Object(obj) = conditions {
            self.where_data.extend(obj);
        }
        self
    }

    pub fn set_order(&mut self, order_spec: Value) -> &mut Self {
        match FilterOrder::validate_and_parse(&order_spec) {
            Ok(order_info) => self.order_data = order_info,
            Err(e) => return self.fail(e),
        }
        self
    }

    pub fn set_select(&mut self, columns: Vec<String>) -> &mut Self {
        if let Err(e) = Self::validate_columns(&columns) {
            return self.fail(e);
        }
        self.select_columns = Some(columns);
        self
    }

    pub fn set_include(&mut self, relations: Vec<String>) -> &mut Self {
        if let Err(e) = Self::validate_columns(&relations) {
            return self.fail(e);
        }
        self.include_relations = Some(relations);
        self
    }

    pub fn set_limit(&mut self, limit: u32, max_limit: Option<u32>) -> &mut Self {
        let max_limit = max_limit.unwrap_or(u32::MAX);
        let applied_limit = if limit > max_limit {
            tracing::warn!("Limit {} exceeds max {}, capping to max", limit, max_limit);
            max_limit
        } else {
            limit
        };
        self.limit = Some(applied_limit);
        self
    }

    pub fn set_offset(&mut self, offset: u32) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    pub fn where_data(&self) -> &Map<String, Value> {
        &self.where_data
    }

    pub fn order_data(&self) -> &[FilterOrderInfo] {
        &self.order_data
    }

    pub fn select_columns(&self) -> Option<&[String]> {
        self.select_columns.as_deref()
    }

    pub fn include_relations(&self) -> Option<&[String]> {
        self.include_relations.as_deref()
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn offset(&self) -> Option<u32> {
        self.offset
    }

    pub fn error(&self) -> Option<&FilterError> {
        self.error.as_ref()
    }

    /// Serialize into the argument object the engine expects for `operation`
    pub fn to_args(&self, operation: Operation, data: TerminalData) -> Result<Value, FilterError> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }

        let mut args = Map::new();

        if !matches!(operation, Operation::Create | Operation::CreateMany) {
            args.insert("where".to_string(), Value::Object(self.where_data.clone()));
        }

        if matches!(operation, Operation::FindMany | Operation::FindFirst | Operation::Count) {
            if let Some(order_by) = FilterOrder::to_value(&self.order_data) {
                args.insert("orderBy".to_string(), order_by);
            }
            if let Some(limit) = self.limit {
                args.insert("take".to_string(), Value::from(limit));
            }
            if let Some(offset) = self.offset {
                args.insert("skip".to_string(), Value::from(offset));
            }
        }

        // Bulk writes and count return counts, so projection does not apply
        if !operation.is_bulk() && operation != Operation::Count {
            if let Some(columns) = &self.select_columns {
                args.insert("select".to_string(), Self::flag_map(columns));
            }
            if let Some(relations) = &self.include_relations {
                args.insert("include".to_string(), Self::flag_map(relations));
            }
        }

        match data {
            TerminalData::None => {}
            TerminalData::Data(value) => {
                args.insert("data".to_string(), value);
            }
            TerminalData::Upsert { create, update } => {
                args.insert("create".to_string(), create);
                args.insert("update".to_string(), update);
            }
        }

        Ok(Value::Object(args))
    }

    /// Record a failure; the first one is kept and returned by [`Self::to_args`]
    pub fn fail(&mut self, error: FilterError) -> &mut Self {
        tracing::debug!("Query descriptor rejected input: {}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    fn validate_columns(columns: &[String]) -> Result<(), FilterError> {
        match columns.iter().find(|c| !is_identifier(c)) {
            Some(bad) => Err(FilterError::InvalidColumn(format!("Invalid column name format: {}", bad))),
            None => Ok(()),
        }
    }

    fn flag_map(names: &[String]) -> Value {
        Value::Object(names.iter().map(|n| (n.clone(), Value::Bool(true))).collect())
    }
}

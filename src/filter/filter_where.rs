use serde_json::Value;
use std::cmp::Ordering;

use super::error::FilterError;
use super::types::{compare_values, FilterOp, FilterWhereInfo};
use crate::types::Row;

/// Evaluates `where` objects against in-memory rows
///
/// Accepts `{ field: value }` implicit equality, `{ field: { "$op": data } }`
/// comparisons and the `$and` / `$or` / `$not` combinators.
pub struct FilterWhere {
    conditions: Vec<FilterWhereInfo>,
    groups: Vec<(String, Vec<FilterWhere>)>,
}

impl FilterWhere {
    pub fn parse(where_data: &Value) -> Result<Self, FilterError> {
        let mut filter_where = Self {
            conditions: vec![],
            groups: vec![],
        };
        match where_data {
            Value::Null => {}
            Value::Object(obj) => {
                for (key, value) in obj {
                    if key.starts_with('$') {
                        filter_where.parse_logical_operator(key, value)?;
                    } else {
                        filter_where.parse_field_condition(key, value)?;
                    }
                }
            }
            _ => {
                return Err(FilterError::InvalidWhereClause(
                    "WHERE must be an object".to_string(),
                ))
            }
        }
        Ok(filter_where)
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        Self::parse(where_data).map(|_| ())
    }

    /// Parse and evaluate in one step
    pub fn matches_value(where_data: &Value, row: &Row) -> Result<bool, FilterError> {
        Ok(Self::parse(where_data)?.matches(row))
    }

    pub fn matches(&self, row: &Row) -> bool {
        let conditions_hold = self
            .conditions
            .iter()
            .all(|condition| Self::evaluate(condition, row.get(&condition.column)));

        conditions_hold
            && self.groups.iter().all(|(op, parts)| match op.as_str() {
                "$and" => parts.iter().all(|p| p.matches(row)),
                "$or" => parts.iter().any(|p| p.matches(row)),
                "$not" => !parts.iter().all(|p| p.matches(row)),
                _ => false,
            })
    }

    fn parse_logical_operator(&mut self, op: &str, value: &Value) -> Result<(), FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                let parts = arr.iter().map(Self::parse).collect::<Result<Vec<_>, _>>()?;
                self.groups.push((op.to_string(), parts));
                Ok(())
            }
            "$not" => {
                let inner = Self::parse(value)?;
                self.groups.push((op.to_string(), vec![inner]));
                Ok(())
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(&mut self, field: &str, value: &Value) -> Result<(), FilterError> {
        match value {
            Value::Object(obj) if obj.keys().all(|k| k.starts_with('$')) && !obj.is_empty() => {
                for (op_key, op_val) in obj {
                    let operator = FilterOp::parse(op_key)
                        .ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                    if operator == FilterOp::Between
                        && op_val.as_array().map(|a| a.len()) != Some(2)
                    {
                        return Err(FilterError::InvalidOperatorData(
                            "$between requires exactly 2 values".to_string(),
                        ));
                    }
                    self.conditions.push(FilterWhereInfo {
                        column: field.to_string(),
                        operator,
                        data: op_val.clone(),
                    });
                }
            }
            // Implicit equality: { field: value }
            _ => self.conditions.push(FilterWhereInfo {
                column: field.to_string(),
                operator: FilterOp::Eq,
                data: value.clone(),
            }),
        }
        Ok(())
    }

    fn evaluate(condition: &FilterWhereInfo, actual: Option<&Value>) -> bool {
        let actual_or_null = actual.unwrap_or(&Value::Null);
        let data = &condition.data;
        match condition.operator {
            FilterOp::Eq => actual_or_null == data,
            FilterOp::Ne => actual_or_null != data,
            FilterOp::Gt => compare_values(actual_or_null, data) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare_values(actual_or_null, data),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare_values(actual_or_null, data) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare_values(actual_or_null, data),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::In => match data {
                Value::Array(values) => values.contains(actual_or_null),
                other => actual_or_null == other,
            },
            FilterOp::NIn => match data {
                Value::Array(values) => !values.contains(actual_or_null),
                other => actual_or_null != other,
            },
            FilterOp::Between => match data.as_array().map(Vec::as_slice) {
                Some([low, high]) => {
                    matches!(
                        compare_values(actual_or_null, low),
                        Some(Ordering::Greater | Ordering::Equal)
                    ) && matches!(
                        compare_values(actual_or_null, high),
                        Some(Ordering::Less | Ordering::Equal)
                    )
                }
                _ => false,
            },
            FilterOp::Exists => actual.is_some() == data.as_bool().unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_implicit_equality_and_operators() {
        let r = row(json!({ "id": 1, "name": "ada", "age": 36, "active": true }));
        assert!(FilterWhere::matches_value(&json!({ "active": true }), &r).unwrap());
        assert!(FilterWhere::matches_value(&json!({ "age": { "$gte": 36, "$lt": 40 } }), &r).unwrap());
        assert!(!FilterWhere::matches_value(&json!({ "name": { "$in": ["bob", "eve"] } }), &r).unwrap());
        assert!(FilterWhere::matches_value(&json!({ "age": { "$between": [30, 40] } }), &r).unwrap());
        assert!(FilterWhere::matches_value(&json!({ "email": { "$exists": false } }), &r).unwrap());
    }

    #[test]
    fn test_logical_groups() {
        let r = row(json!({ "id": 1, "name": "ada", "age": 36 }));
        let clause = json!({ "$or": [{ "name": "bob" }, { "age": { "$gt": 30 } }] });
        assert!(FilterWhere::matches_value(&clause, &r).unwrap());
        let negated = json!({ "$not": { "name": "ada" } });
        assert!(!FilterWhere::matches_value(&negated, &r).unwrap());
    }

    #[test]
    fn test_nested_object_value_is_equality() {
        let r = row(json!({ "id": 1, "meta": { "tier": "gold" } }));
        assert!(FilterWhere::matches_value(&json!({ "meta": { "tier": "gold" } }), &r).unwrap());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            FilterWhere::validate(&json!(["not", "an", "object"])),
            Err(FilterError::InvalidWhereClause(_))
        ));
        assert!(matches!(
            FilterWhere::validate(&json!({ "age": { "$regex": "x" } })),
            Err(FilterError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            FilterWhere::validate(&json!({ "age": { "$between": [1] } })),
            Err(FilterError::InvalidOperatorData(_))
        ));
    }
}

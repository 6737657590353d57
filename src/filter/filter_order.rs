use serde_json::Value;
use std::cmp::Ordering;

use super::error::FilterError;
use super::types::{compare_values, is_identifier, FilterOrderInfo, SortDirection};
use crate::types::Row;

pub struct FilterOrder;

impl FilterOrder {
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        match order {
            Value::Null => Ok(vec![]),
            Value::String(s) => Self::parse_order_string(s),
            Value::Array(arr) => {
                // ["created_at desc", { "name": "asc" }]
                let mut out = Vec::new();
                for v in arr {
                    out.extend(Self::validate_and_parse(v)?);
                }
                Ok(out)
            }
            Value::Object(obj) => {
                // { "created_at": "desc", "name": "asc" } - keys come back sorted, use an array for precedence
                let mut out = Vec::new();
                for (k, v) in obj {
                    let dir = v
                        .as_str()
                        .ok_or_else(|| FilterError::InvalidOrder(format!("direction for {} must be a string", k)))?;
                    out.push(Self::order_info(k, dir)?);
                }
                Ok(out)
            }
            other => Err(FilterError::InvalidOrder(format!("unsupported order spec: {}", other))),
        }
    }

    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        // split on commas, then each token into column and direction
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() { continue; }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                out.push(Self::order_info(col, it.next().unwrap_or("asc"))?);
            }
        }
        Ok(out)
    }

    fn order_info(column: &str, direction: &str) -> Result<FilterOrderInfo, FilterError> {
        if !is_identifier(column) {
            return Err(FilterError::InvalidColumn(format!("Invalid order column: {}", column)));
        }
        let sort = match direction.to_ascii_lowercase().as_str() {
            "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            other => return Err(FilterError::InvalidOrder(format!("unknown direction '{}' for {}", other, column))),
        };
        Ok(FilterOrderInfo { column: column.to_string(), sort })
    }

    /// Engine `orderBy` shape: one object for a single column, an array otherwise
    pub fn to_value(infos: &[FilterOrderInfo]) -> Option<Value> {
        match infos {
            [] => None,
            [single] => Some(Self::entry(single)),
            many => Some(Value::Array(many.iter().map(Self::entry).collect())),
        }
    }

    fn entry(info: &FilterOrderInfo) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(info.column.clone(), Value::String(info.sort.as_str().to_string()));
        Value::Object(map)
    }

    /// Stable sort; missing columns and incomparable values keep their relative order
    pub fn sort_rows(rows: &mut [Row], infos: &[FilterOrderInfo]) {
        if infos.is_empty() { return; }
        rows.sort_by(|a, b| {
            for info in infos {
                let left = a.get(&info.column).unwrap_or(&Value::Null);
                let right = b.get(&info.column).unwrap_or(&Value::Null);
                let ord = compare_values(left, right).unwrap_or(Ordering::Equal);
                let ord = match info.sort {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_forms() {
        let from_str = FilterOrder::validate_and_parse(&json!("created_at desc, name")).unwrap();
        assert_eq!(from_str.len(), 2);
        assert_eq!(from_str[0].sort, SortDirection::Desc);
        assert_eq!(from_str[1].sort, SortDirection::Asc);

        let from_obj = FilterOrder::validate_and_parse(&json!({ "name": "asc" })).unwrap();
        assert_eq!(from_obj, vec![FilterOrderInfo { column: "name".to_string(), sort: SortDirection::Asc }]);
    }

    #[test]
    fn test_rejects_unknown_direction() {
        assert!(matches!(
            FilterOrder::validate_and_parse(&json!({ "name": "sideways" })),
            Err(FilterError::InvalidOrder(_))
        ));
    }

    #[test]
    fn test_to_value_shapes() {
        let one = FilterOrder::validate_and_parse(&json!({ "name": "asc" })).unwrap();
        assert_eq!(FilterOrder::to_value(&one), Some(json!({ "name": "asc" })));

        let two = FilterOrder::validate_and_parse(&json!(["age desc", "name"])).unwrap();
        assert_eq!(
            FilterOrder::to_value(&two),
            Some(json!([{ "age": "desc" }, { "name": "asc" }]))
        );
    }
}

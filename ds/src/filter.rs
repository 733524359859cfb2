//! Query filters over JSON document fields

use rusqlite::types::Value as SqlValue;

/// A scalar value compared against a document field
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    String(String),
    Int(i64),
    Bool(bool),
}

impl IndexValue {
    fn to_sql(&self) -> SqlValue {
        match self {
            Self::String(s) => SqlValue::Text(s.clone()),
            Self::Int(i) => SqlValue::Integer(*i),
            // json_extract yields 1/0 for JSON booleans
            Self::Bool(b) => SqlValue::Integer(i64::from(*b)),
        }
    }
}

impl From<&str> for IndexValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for IndexValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for IndexValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Filter operation
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq,
    In(Vec<IndexValue>),
    IsNull,
}

/// A condition on one top-level document field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Option<IndexValue>,
}

impl Filter {
    /// `field == value`
    pub fn eq(field: impl Into<String>, value: impl Into<IndexValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: Some(value.into()),
        }
    }

    /// `field` is one of `values`
    pub fn any_of(field: impl Into<String>, values: Vec<IndexValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::In(values),
            value: None,
        }
    }

    /// `field` is null or missing
    pub fn is_null(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::IsNull,
            value: None,
        }
    }

    /// Render as an SQL predicate, pushing bound parameters onto `params`.
    ///
    /// The JSON path is bound too, so field names never end up in the SQL text.
    pub(crate) fn to_sql(&self, params: &mut Vec<SqlValue>) -> String {
        params.push(SqlValue::Text(format!("$.{}", self.field)));
        let column = "json_extract(data, ?)";

        match &self.op {
            FilterOp::Eq => match &self.value {
                Some(value) => {
                    params.push(value.to_sql());
                    format!("{} = ?", column)
                }
                None => format!("{} IS NULL", column),
            },
            FilterOp::In(values) => {
                if values.is_empty() {
                    // Keep the path parameter consumed; an empty set matches nothing
                    return format!("({} IS NULL AND 0)", column);
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                params.extend(values.iter().map(IndexValue::to_sql));
                format!("{} IN ({})", column, placeholders)
            }
            FilterOp::IsNull => format!("{} IS NULL", column),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_renders_bound_path_and_value() {
        let mut params = Vec::new();
        let sql = Filter::eq("state", "pending").to_sql(&mut params);
        assert_eq!(sql, "json_extract(data, ?) = ?");
        assert_eq!(
            params,
            vec![
                SqlValue::Text("$.state".to_string()),
                SqlValue::Text("pending".to_string())
            ]
        );
    }

    #[test]
    fn test_bool_binds_as_integer() {
        let mut params = Vec::new();
        Filter::eq("reachable", true).to_sql(&mut params);
        assert_eq!(params[1], SqlValue::Integer(1));
    }

    #[test]
    fn test_in_renders_placeholders() {
        let mut params = Vec::new();
        let sql = Filter::any_of("state", vec!["waiting".into(), "active".into()]).to_sql(&mut params);
        assert_eq!(sql, "json_extract(data, ?) IN (?, ?)");
        assert_eq!(params.len(), 3);
    }
}

//! Query row representation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result, TypeError};
use crate::value::Value;

/// Column names shared across all rows in a result set.
///
/// Wrapped in `Arc` so rows from the same query share one lookup table.
#[derive(Debug, Clone)]
pub struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    /// Create column metadata from an ordered list of names.
    pub fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, index }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a column by name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// All column names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single row of raw column data returned from a query.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<Columns>,
}

impl Row {
    /// Create a row with its own column metadata.
    ///
    /// For multiple rows from one result set, prefer `shared` so the
    /// metadata is built once.
    pub fn new(names: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            values,
            columns: Arc::new(Columns::new(names)),
        }
    }

    /// Create a row against shared column metadata.
    pub fn shared(columns: Arc<Columns>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// The shared column metadata.
    pub fn columns(&self) -> Arc<Columns> {
        Arc::clone(&self.columns)
    }

    /// Number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if this row carries no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.position(name).and_then(|i| self.values.get(i))
    }

    /// Get a value by position.
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a typed value by column name.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("column '{}' not found", name),
                column: Some(name.to_string()),
            })
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    /// Iterate over (column name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Conversion from a borrowed `Value` to a typed value.
pub trait FromValue: Sized {
    /// Convert from a value, failing on a type mismatch.
    fn from_value(value: &Value) -> Result<Self>;
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| type_error("bool", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| type_error("i64", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| type_error("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            _ => Err(type_error("String", value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(type_error("Vec<u8>", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

fn type_error(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_row() -> Row {
        Row::new(
            vec!["id".to_string(), "email".to_string(), "age".to_string()],
            vec![
                Value::Int(1),
                Value::Text("hello@world.com".to_string()),
                Value::Null,
            ],
        )
    }

    #[test]
    fn access_by_name_and_index() {
        let row = user_row();
        assert_eq!(row.len(), 3);
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.at(0), Some(&Value::Int(1)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.at(9), None);
    }

    #[test]
    fn typed_access() {
        let row = user_row();
        assert_eq!(row.get_as::<i64>("id").unwrap(), 1);
        assert_eq!(row.get_as::<String>("email").unwrap(), "hello@world.com");
        assert_eq!(row.get_as::<Option<i64>>("age").unwrap(), None);
    }

    #[test]
    fn typed_access_errors_carry_column() {
        let row = user_row();
        let err = row.get_as::<i64>("email").unwrap_err();
        assert!(err.to_string().contains("column 'email'"));

        assert!(row.get_as::<i64>("missing").is_err());
        assert!(row.get_as::<i64>("age").is_err());
    }

    #[test]
    fn shared_columns_reuse_metadata() {
        let columns = Arc::new(Columns::new(vec!["id".to_string()]));
        let a = Row::shared(Arc::clone(&columns), vec![Value::Int(1)]);
        let b = Row::shared(Arc::clone(&columns), vec![Value::Int(2)]);

        assert!(Arc::ptr_eq(&a.columns(), &b.columns()));
        assert_eq!(a.get_as::<i64>("id").unwrap(), 1);
        assert_eq!(b.get_as::<i64>("id").unwrap(), 2);
    }

    #[test]
    fn pair_iteration() {
        let row = user_row();
        let names: Vec<_> = row.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["id", "email", "age"]);
    }

    #[test]
    fn empty_row() {
        let row = Row::new(vec![], vec![]);
        assert!(row.is_empty());
        assert!(row.get_as::<i64>("id").is_err());
    }
}

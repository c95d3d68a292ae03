//! Semantic data types declared by operation inputs and graph ports.

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::table::{Table, Tabular};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a port, driving coercion at the dispatch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    Any,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    Geometry,
    /// A plain or geo table.
    Table,
    /// A table with a geometry column.
    GeoTable,
    /// Name of a variable (e.g. a table column).
    VarName,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Any => "any",
            DataType::Bool => "bool",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Str => "str",
            DataType::List => "list",
            DataType::Map => "map",
            DataType::Geometry => "geometry",
            DataType::Table => "table",
            DataType::GeoTable => "geo_table",
            DataType::VarName => "var_name",
        }
    }

    /// Convert `value` to this type or fail with a validation error.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        let mismatch = |value: &Value| {
            Error::Validation(format!(
                "expected {}, got {} '{}'",
                self.name(),
                value.kind(),
                truncate(&value.to_string())
            ))
        };

        match (self, value) {
            (DataType::Any, v) => Ok(v),

            (DataType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (DataType::Bool, Value::String(s)) => {
                let lowered = s.trim().to_ascii_lowercase();
                match lowered.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(mismatch(&Value::String(s))),
                }
            }

            (DataType::Int, Value::Int(n)) => Ok(Value::Int(n)),
            // `i64::MAX as f64` rounds up to 2^63, hence the half-open range.
            (DataType::Int, Value::Float(f))
                if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&f) =>
            {
                Ok(Value::Int(f as i64))
            }
            (DataType::Int, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| mismatch(&Value::String(s))),

            (DataType::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (DataType::Float, Value::Int(n)) => Ok(Value::Float(n as f64)),
            (DataType::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| mismatch(&Value::String(s))),

            (DataType::Str, Value::String(s)) => Ok(Value::String(s)),

            (DataType::List, Value::List(items)) => Ok(Value::List(items)),
            (DataType::Map, Value::Map(map)) => Ok(Value::Map(map)),

            (DataType::Geometry, Value::Geometry(g)) => Ok(Value::Geometry(g)),
            (DataType::Geometry, Value::String(s)) => Geometry::parse(&s)
                .map(Value::Geometry)
                .map_err(|e| Error::Validation(format!("invalid geometry '{s}': {e}"))),
            (DataType::Geometry, Value::List(items)) => {
                let coords: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
                let coords = coords.ok_or_else(|| {
                    Error::Validation("geometry coordinates must be numbers".into())
                })?;
                Geometry::from_coords(&coords)
                    .map(Value::Geometry)
                    .map_err(|e| Error::Validation(format!("invalid geometry: {e}")))
            }

            (DataType::Table, Value::Table(t)) => Ok(Value::Table(t)),
            (DataType::GeoTable, Value::Table(Table::Geo(t))) => Ok(Value::Table(Table::Geo(t))),
            (DataType::GeoTable, Value::Table(Table::Frame(_))) => Err(Error::Validation(
                "expected geo_table, got a table without a geometry column".into(),
            )),

            (DataType::VarName, Value::String(s)) => {
                validate_var_name(&s)?;
                Ok(Value::String(s))
            }

            (_, v) => Err(mismatch(&v)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check that a variable name is usable as a column/variable identifier.
pub fn validate_var_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("variable name must not be empty".into()));
    }
    if name.trim() != name {
        return Err(Error::Validation(format!(
            "variable name '{name}' has surrounding whitespace"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| c.is_control() || matches!(c, ',' | ';' | '"' | '\''))
    {
        return Err(Error::Validation(format!(
            "variable name '{name}' contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

/// The set of valid values derived from a value-set source.
///
/// Tables yield their column names, lists their elements and maps their keys.
pub fn value_set(source: &Value) -> Result<Vec<Value>> {
    match source {
        Value::Table(table) => Ok(table.columns().iter().map(|c| Value::from(c.as_str())).collect()),
        Value::List(items) => Ok(items.clone()),
        Value::Map(map) => Ok(map.keys().map(|k| Value::from(k.as_str())).collect()),
        other => Err(Error::Validation(format!(
            "cannot derive a value set from {}",
            other.kind()
        ))),
    }
}

fn truncate(text: &str) -> String {
    const MAX: usize = 40;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

//! Operation signatures and callables.

use crate::error::OpError;
use crate::geometry::Geometry;
use crate::monitor::Monitor;
use crate::table::Table;
use crate::types::DataType;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Name of the implicit output of an operation that declares none.
pub const RETURN: &str = "return";

/// Declaration of an operation input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(rename = "type", default)]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Value used when the input is not bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Unbound resolves to `Null` instead of failing.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
    /// Another input whose value defines the valid domain of this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_set_source: Option<String>,
}

impl InputSpec {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            ..Self::default()
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn value_set_source(mut self, input: impl Into<String>) -> Self {
        self.value_set_source = Some(input.into());
        self
    }

    /// Whether dispatch can resolve this input without a binding.
    pub fn is_optional(&self) -> bool {
        self.default.is_some() || self.nullable
    }
}

/// Declaration of an operation output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(rename = "type", default)]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl OutputSpec {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            description: String::new(),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }
}

/// Declaration of an operation's interface.
///
/// Built once at registration and immutable afterwards. Two signatures are
/// identical when every field compares equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpSignature {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub inputs: IndexMap<String, InputSpec>,
    #[serde(default)]
    pub outputs: IndexMap<String, OutputSpec>,
    /// Set from the callable at registration.
    #[serde(default)]
    pub accepts_monitor: bool,
}

impl OpSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            description: String::new(),
            tags: BTreeSet::new(),
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            accepts_monitor: false,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn input(mut self, name: impl Into<String>, spec: InputSpec) -> Self {
        self.inputs.insert(name.into(), spec);
        self
    }

    pub fn output(mut self, name: impl Into<String>, spec: OutputSpec) -> Self {
        self.outputs.insert(name.into(), spec);
        self
    }

    /// Output ports as seen by callers: the declared ones, or `return`.
    pub fn output_ports(&self) -> Vec<(&str, DataType)> {
        if self.outputs.is_empty() {
            vec![(RETURN, DataType::Any)]
        } else {
            self.outputs
                .iter()
                .map(|(name, spec)| (name.as_str(), spec.data_type))
                .collect()
        }
    }

    pub fn output_type(&self, name: &str) -> Option<DataType> {
        self.output_ports()
            .into_iter()
            .find(|(port, _)| *port == name)
            .map(|(_, data_type)| data_type)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Check structural consistency.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("operation name must not be empty".into());
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(format!("operation name '{}' contains whitespace", self.name));
        }
        for (name, spec) in &self.inputs {
            if let Some(source) = &spec.value_set_source {
                if source == name {
                    return Err(format!(
                        "input '{name}' of '{}' uses itself as value set source",
                        self.name
                    ));
                }
                if !self.inputs.contains_key(source) {
                    return Err(format!(
                        "input '{name}' of '{}' has unknown value set source '{source}'",
                        self.name
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Validated arguments handed to an operation body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(IndexMap<String, Value>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.0
    }

    /// A required, non-null argument.
    pub fn value(&self, name: &str) -> Result<&Value, OpError> {
        match self.0.get(name) {
            Some(Value::Null) | None => Err(OpError::MissingInput(name.to_string())),
            Some(value) => Ok(value),
        }
    }

    pub fn str(&self, name: &str) -> Result<&str, OpError> {
        let value = self.value(name)?;
        value.as_str().ok_or_else(|| wrong_kind(name, "string", value))
    }

    /// A string argument that may be null.
    pub fn opt_str(&self, name: &str) -> Result<Option<&str>, OpError> {
        match self.0.get(name) {
            Some(Value::Null) | None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| wrong_kind(name, "string", value)),
        }
    }

    pub fn i64(&self, name: &str) -> Result<i64, OpError> {
        let value = self.value(name)?;
        value.as_i64().ok_or_else(|| wrong_kind(name, "int", value))
    }

    pub fn f64(&self, name: &str) -> Result<f64, OpError> {
        let value = self.value(name)?;
        value.as_f64().ok_or_else(|| wrong_kind(name, "number", value))
    }

    pub fn bool(&self, name: &str) -> Result<bool, OpError> {
        let value = self.value(name)?;
        value.as_bool().ok_or_else(|| wrong_kind(name, "bool", value))
    }

    pub fn table(&self, name: &str) -> Result<&Table, OpError> {
        let value = self.value(name)?;
        value.as_table().ok_or_else(|| wrong_kind(name, "table", value))
    }

    pub fn geometry(&self, name: &str) -> Result<&Geometry, OpError> {
        let value = self.value(name)?;
        value
            .as_geometry()
            .ok_or_else(|| wrong_kind(name, "geometry", value))
    }
}

fn wrong_kind(name: &str, expected: &str, got: &Value) -> OpError {
    OpError::InvalidInput(format!("'{name}' must be a {expected}, got {}", got.kind()))
}

impl FromIterator<(String, Value)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of an operation body.
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutput {
    /// One value, assigned to the sole declared output (or `return`).
    Single(Value),
    /// Values keyed by output name.
    Named(IndexMap<String, Value>),
}

impl OpOutput {
    pub fn named<K: Into<String>>(values: impl IntoIterator<Item = (K, Value)>) -> Self {
        OpOutput::Named(values.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<Value> for OpOutput {
    fn from(value: Value) -> Self {
        OpOutput::Single(value)
    }
}

type PlainFn = dyn Fn(&Arguments) -> Result<OpOutput, OpError> + Send + Sync;
type MonitoredFn =
    dyn Fn(&Arguments, &mut dyn Monitor) -> Result<OpOutput, OpError> + Send + Sync;

/// The body of an operation.
///
/// Only `Monitored` callables receive the invocation's monitor.
#[derive(Clone)]
pub enum Callable {
    Plain(Arc<PlainFn>),
    Monitored(Arc<MonitoredFn>),
}

impl Callable {
    pub fn new(
        f: impl Fn(&Arguments) -> Result<OpOutput, OpError> + Send + Sync + 'static,
    ) -> Self {
        Callable::Plain(Arc::new(f))
    }

    pub fn with_monitor(
        f: impl Fn(&Arguments, &mut dyn Monitor) -> Result<OpOutput, OpError> + Send + Sync + 'static,
    ) -> Self {
        Callable::Monitored(Arc::new(f))
    }

    pub fn accepts_monitor(&self) -> bool {
        matches!(self, Callable::Monitored(_))
    }

    pub(crate) fn call(
        &self,
        args: &Arguments,
        monitor: &mut dyn Monitor,
    ) -> Result<OpOutput, OpError> {
        match self {
            Callable::Plain(f) => f(args),
            Callable::Monitored(f) => f(args, monitor),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Plain(_) => f.write_str("Callable::Plain"),
            Callable::Monitored(_) => f.write_str("Callable::Monitored"),
        }
    }
}

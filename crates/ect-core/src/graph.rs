//! Graph definition documents.
//!
//! A [`GraphDef`] is the serializable form of a workflow graph: declared
//! inputs, outputs that point at step outputs, and an ordered list of steps
//! whose inputs are bound to literals or references. It carries no
//! validation of its own; [`Graph::load`](crate::Graph::load) resolves it
//! against a registry.

use crate::error::{Error, Result};
use crate::types::DataType;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A graph definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Graph-level inputs, bound by the caller before invocation.
    #[serde(default)]
    pub inputs: IndexMap<String, InputDef>,

    /// Graph-level outputs, each referencing `<step>.<output>`.
    #[serde(default)]
    pub outputs: IndexMap<String, OutputDef>,

    /// Steps in declaration order.
    #[serde(default)]
    pub steps: Vec<StepDef>,
}

/// Declaration of a graph-level input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InputDef {
    #[serde(rename = "type", default)]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Source of a graph-level output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputDef {
    Source(SourceDef),
    Reference(String),
}

/// Explicit reference form `{ "source": "<ref>" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceDef {
    pub source: String,
}

/// Explicit literal form `{ "value": <json> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueDef {
    pub value: Value,
}

impl OutputDef {
    pub fn reference(&self) -> &str {
        match self {
            OutputDef::Source(SourceDef { source }) => source,
            OutputDef::Reference(reference) => reference,
        }
    }
}

/// A step: an operation (or inline graph) and its input bindings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepDef {
    pub id: String,

    /// Registry name of the operation to run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,

    /// Inline nested graph, used instead of `op`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<Box<GraphDef>>,

    #[serde(default)]
    pub inputs: IndexMap<String, BindingDef>,
}

/// Binding of a step input.
///
/// Bare strings are references; every other JSON value is a literal. The
/// `source`/`value` object forms make either explicit. An object with any
/// other key is a literal map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindingDef {
    Source(SourceDef),
    Value(ValueDef),
    Reference(String),
    Literal(Value),
}

impl BindingDef {
    pub fn reference(reference: impl Into<String>) -> Self {
        BindingDef::Reference(reference.into())
    }

    pub fn value(value: impl Into<Value>) -> Self {
        BindingDef::Value(ValueDef {
            value: value.into(),
        })
    }
}

impl StepDef {
    /// A step running a registered operation.
    pub fn op(id: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            op: Some(op.into()),
            ..Self::default()
        }
    }

    /// A step running an inline graph.
    pub fn graph(id: impl Into<String>, graph: GraphDef) -> Self {
        Self {
            id: id.into(),
            graph: Some(Box::new(graph)),
            ..Self::default()
        }
    }

    /// Bind an input.
    pub fn bind(mut self, input: impl Into<String>, binding: BindingDef) -> Self {
        self.inputs.insert(input.into(), binding);
        self
    }
}

impl GraphDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declare a graph-level input.
    pub fn input(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.inputs.insert(
            name.into(),
            InputDef {
                data_type,
                ..InputDef::default()
            },
        );
        self
    }

    /// Declare a graph-level input with a default value.
    pub fn input_with_default(
        mut self,
        name: impl Into<String>,
        data_type: DataType,
        default: impl Into<Value>,
    ) -> Self {
        self.inputs.insert(
            name.into(),
            InputDef {
                data_type,
                default: Some(default.into()),
                description: String::new(),
            },
        );
        self
    }

    /// Declare a graph-level output reading `reference` (`<step>.<output>`).
    pub fn output(mut self, name: impl Into<String>, reference: impl Into<String>) -> Self {
        self.outputs
            .insert(name.into(), OutputDef::Reference(reference.into()));
        self
    }

    pub fn step(mut self, step: StepDef) -> Self {
        self.steps.push(step);
        self
    }

    /// Parse a definition, choosing the format from `path`'s extension.
    ///
    /// In-memory text without a path is read as JSON.
    pub fn from_bytes(data: &[u8], path: Option<&str>) -> Result<Self> {
        let format = path.and_then(detect_format).unwrap_or("json");
        Self::from_bytes_format(data, format)
    }

    /// Parse a definition in an explicit format.
    pub fn from_bytes_format(data: &[u8], format: &str) -> Result<Self> {
        let parse_err = |e: String| Error::GraphFormat(format!("cannot parse {format}: {e}"));
        match format {
            "json" => serde_json::from_slice(data).map_err(|e| parse_err(e.to_string())),
            "yaml" | "yml" => serde_yaml::from_slice(data).map_err(|e| parse_err(e.to_string())),
            "toml" => {
                let s = std::str::from_utf8(data)
                    .map_err(|e| parse_err(format!("invalid UTF-8: {e}")))?;
                toml::from_str(s).map_err(|e| parse_err(e.to_string()))
            }
            _ => Err(Error::GraphFormat(format!(
                "unsupported graph format: {format}"
            ))),
        }
    }

    /// Read and parse a definition file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            Error::GraphFormat(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_bytes(&data, path.to_str())
    }

    /// Serialize the definition.
    pub fn to_bytes(&self, format: &str) -> Result<Vec<u8>> {
        let write_err = |e: String| Error::GraphFormat(format!("cannot write {format}: {e}"));
        match format {
            "json" => serde_json::to_vec_pretty(self).map_err(|e| write_err(e.to_string())),
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map(String::into_bytes)
                .map_err(|e| write_err(e.to_string())),
            "toml" => toml::to_string_pretty(self)
                .map(String::into_bytes)
                .map_err(|e| write_err(e.to_string())),
            _ => Err(Error::GraphFormat(format!(
                "unsupported graph format: {format}"
            ))),
        }
    }
}

/// Graph document format for a file path, by extension.
pub fn detect_format(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?;
    match ext.to_ascii_lowercase().as_str() {
        "json" => Some("json"),
        "yaml" | "yml" => Some("yaml"),
        "toml" => Some("toml"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"{
        "name": "example",
        "inputs": {
            "table": { "type": "table" },
            "limit": { "type": "int", "default": 10 }
        },
        "outputs": { "lowest": "min.return", "again": { "source": "min.return" } },
        "steps": [
            { "id": "min", "op": "data_frame_min",
              "inputs": { "df": "table", "var": { "value": "population" }, "n": 3, "opts": { "a": 1 } } }
        ]
    }"#;

    #[test]
    fn test_parse_bindings() {
        let def = GraphDef::from_bytes(EXAMPLE.as_bytes(), None).unwrap();
        assert_eq!(def.name.as_deref(), Some("example"));
        assert_eq!(def.inputs["limit"].default, Some(Value::Int(10)));
        assert_eq!(def.inputs["table"].data_type, DataType::Table);
        assert_eq!(def.outputs["lowest"].reference(), "min.return");
        assert_eq!(def.outputs["again"].reference(), "min.return");

        let step = &def.steps[0];
        assert_eq!(step.inputs["df"], BindingDef::Reference("table".into()));
        assert_eq!(step.inputs["var"], BindingDef::value("population"));
        assert_eq!(step.inputs["n"], BindingDef::Literal(Value::Int(3)));
        assert!(matches!(step.inputs["opts"], BindingDef::Literal(Value::Map(_))));
    }

    #[test]
    fn test_objects_with_extra_keys_are_literals() {
        let def = GraphDef::from_bytes(
            br#"{ "steps": [ { "id": "a", "op": "noop", "inputs": {
                "x": { "source": "b.y", "k": 1 },
                "z": { "value": 2, "k": 1 },
                "w": { "source": "b.y" }
            } } ] }"#,
            None,
        )
        .unwrap();

        let inputs = &def.steps[0].inputs;
        let BindingDef::Literal(Value::Map(map)) = &inputs["x"] else {
            panic!("expected a literal map, got {:?}", inputs["x"]);
        };
        assert_eq!(map["source"], Value::String("b.y".into()));
        assert_eq!(map["k"], Value::Int(1));
        assert!(matches!(inputs["z"], BindingDef::Literal(Value::Map(_))));
        assert_eq!(
            inputs["w"],
            BindingDef::Source(SourceDef {
                source: "b.y".into()
            })
        );
    }

    #[test]
    fn test_yaml_and_toml() {
        let yaml = r#"
inputs:
  x: { type: float }
outputs:
  y: double.return
steps:
  - id: double
    op: scale
    inputs:
      x: x
      factor: { value: 2 }
"#;
        let def = GraphDef::from_bytes(yaml.as_bytes(), Some("g.yaml")).unwrap();
        assert_eq!(def.steps[0].op.as_deref(), Some("scale"));

        let toml_text = r#"
[inputs.x]
type = "float"

[outputs]
y = "double.return"

[[steps]]
id = "double"
op = "scale"
inputs = { x = "x", factor = { value = 2 } }
"#;
        let from_toml = GraphDef::from_bytes(toml_text.as_bytes(), Some("g.toml")).unwrap();
        assert_eq!(from_toml, def);
    }

    #[test]
    fn test_builder_roundtrips_through_json() {
        let def = GraphDef::new()
            .name("pipeline")
            .input("x", DataType::Int)
            .output("z", "b.return")
            .step(StepDef::op("a", "produce"))
            .step(StepDef::op("b", "consume").bind("y", BindingDef::reference("a.return")));

        let bytes = def.to_bytes("json").unwrap();
        let parsed = GraphDef::from_bytes_format(&bytes, "json").unwrap();
        assert_eq!(parsed, def);
    }

    #[test]
    fn test_parse_errors() {
        let err = GraphDef::from_bytes(b"{ not json", None).unwrap_err();
        assert!(matches!(err, Error::GraphFormat(_)));
        assert!(GraphDef::from_bytes_format(b"", "xml").is_err());
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format("a/b.JSON"), Some("json"));
        assert_eq!(detect_format("g.yml"), Some("yaml"));
        assert_eq!(detect_format("g.csv"), None);
        assert_eq!(detect_format("noext"), None);
    }
}

//! Loaded workflow graphs.
//!
//! [`Graph::load`] resolves a [`GraphDef`] against a [`Registry`]: every
//! reference is checked, every required step input is accounted for, and the
//! execution order is fixed. A loaded graph is structurally frozen; only its
//! input values change before invocation.

use crate::error::{Error, Result};
use crate::graph::{BindingDef, GraphDef, SourceDef, StepDef, ValueDef};
use crate::registry::Registry;
use crate::signature::{Callable, InputSpec, OpSignature, OutputSpec};
use crate::types::DataType;
use crate::value::Value;
use indexmap::IndexMap;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::path::Path;
use tracing::debug;

/// A typed value slot.
///
/// Unresolved (`value == None`) until binding or invocation fills it.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub data_type: DataType,
    pub default: Option<Value>,
    pub value: Option<Value>,
}

impl Port {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            default: None,
            value: None,
        }
    }

    /// The bound value, falling back to the default.
    pub fn resolved(&self) -> Option<&Value> {
        self.value.as_ref().or(self.default.as_ref())
    }
}

/// Where a step input takes its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Literal(Value),
    GraphInput(String),
    StepOutput { step: String, port: String },
}

/// A step output referenced by a graph-level output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRef {
    pub step: String,
    pub port: String,
}

/// One node of a loaded graph.
#[derive(Debug, Clone)]
pub struct Step {
    pub(crate) id: String,
    pub(crate) signature: OpSignature,
    pub(crate) callable: Callable,
    pub(crate) inputs: IndexMap<String, Binding>,
    pub(crate) outputs: IndexMap<String, Port>,
}

impl Step {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Signature of the operation (or nested graph) the step runs.
    pub fn signature(&self) -> &OpSignature {
        &self.signature
    }

    pub fn bindings(&self) -> &IndexMap<String, Binding> {
        &self.inputs
    }

    /// Value produced on an output port by the last invocation.
    pub fn output(&self, port: &str) -> Option<&Value> {
        self.outputs.get(port).and_then(|p| p.value.as_ref())
    }

    /// Steps this step depends on, deduplicated, in binding order.
    fn dependencies(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.inputs
            .values()
            .filter_map(|binding| match binding {
                Binding::StepOutput { step, .. } => Some(step.as_str()),
                _ => None,
            })
            .filter(|step| seen.insert(*step))
            .collect()
    }
}

/// A loaded, validated workflow graph.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) name: Option<String>,
    pub(crate) inputs: IndexMap<String, Port>,
    pub(crate) outputs: IndexMap<String, PortRef>,
    pub(crate) steps: Vec<Step>,
    /// Indices into `steps`, in execution order.
    pub(crate) order: Vec<usize>,
    pub(crate) results: IndexMap<String, Value>,
}

impl Graph {
    /// Resolve and validate a definition.
    pub fn load(def: &GraphDef, registry: &Registry) -> Result<Self> {
        let inputs = load_inputs(def)?;

        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut steps = Vec::with_capacity(def.steps.len());
        for (i, step_def) in def.steps.iter().enumerate() {
            check_step_id(&step_def.id)?;
            if index.insert(step_def.id.as_str(), i).is_some() {
                return Err(Error::GraphFormat(format!(
                    "duplicate step id '{}'",
                    step_def.id
                )));
            }
            let (signature, callable) = resolve_step_kind(step_def, registry)?;
            let outputs = signature
                .output_ports()
                .into_iter()
                .map(|(name, data_type)| (name.to_string(), Port::new(data_type)))
                .collect();
            steps.push(Step {
                id: step_def.id.clone(),
                signature,
                callable,
                inputs: IndexMap::new(),
                outputs,
            });
        }

        for (i, step_def) in def.steps.iter().enumerate() {
            let mut bindings = IndexMap::new();
            for (port, binding) in &step_def.inputs {
                if !steps[i].signature.inputs.contains_key(port) {
                    return Err(Error::GraphFormat(format!(
                        "step '{}': '{}' has no input '{port}'",
                        step_def.id, steps[i].signature.name
                    )));
                }
                let binding = resolve_binding(binding, &inputs, &index, &steps).map_err(|e| {
                    Error::GraphFormat(format!("step '{}', input '{port}': {e}", step_def.id))
                })?;
                bindings.insert(port.clone(), binding);
            }

            for (name, spec) in &steps[i].signature.inputs {
                if !bindings.contains_key(name) && !spec.is_optional() {
                    return Err(Error::GraphFormat(format!(
                        "step '{}': required input '{name}' is not bound",
                        step_def.id
                    )));
                }
            }
            steps[i].inputs = bindings;
        }

        let mut outputs = IndexMap::new();
        for (name, output) in &def.outputs {
            let reference = output.reference();
            let port_ref = match split_reference(reference) {
                Some((step, port)) => match index.get(step) {
                    Some(&i) if steps[i].outputs.contains_key(port) => PortRef {
                        step: step.to_string(),
                        port: port.to_string(),
                    },
                    Some(_) => {
                        return Err(Error::GraphFormat(format!(
                            "output '{name}': step '{step}' has no output '{port}'"
                        )));
                    }
                    None => {
                        return Err(Error::GraphFormat(format!(
                            "output '{name}': unknown step '{step}'"
                        )));
                    }
                },
                None => {
                    return Err(Error::GraphFormat(format!(
                        "output '{name}': expected '<step>.<output>', got '{reference}'"
                    )));
                }
            };
            outputs.insert(name.clone(), port_ref);
        }

        let order = execution_order(&steps, &index)?;
        debug!(
            graph = def.name.as_deref().unwrap_or("<anonymous>"),
            steps = steps.len(),
            "graph loaded"
        );

        Ok(Self {
            name: def.name.clone(),
            inputs,
            outputs,
            steps,
            order,
            results: IndexMap::new(),
        })
    }

    /// Parse and load a definition held in memory.
    pub fn from_bytes(data: &[u8], format: &str, registry: &Registry) -> Result<Self> {
        Self::load(&GraphDef::from_bytes_format(data, format)?, registry)
    }

    /// Read, parse and load a definition file.
    pub fn from_path(path: impl AsRef<Path>, registry: &Registry) -> Result<Self> {
        Self::load(&GraphDef::from_path(path)?, registry)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.get(name)
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Step ids in execution order.
    pub fn execution_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.steps[i].id.as_str()).collect()
    }

    /// The interface of this graph when used as an operation.
    pub fn signature(&self) -> OpSignature {
        let name = self.name.clone().unwrap_or_else(|| "graph".to_string());
        let mut signature = OpSignature::new(name).tag("graph");
        for (name, port) in &self.inputs {
            let mut spec = InputSpec::new(port.data_type);
            spec.default = port.default.clone();
            signature = signature.input(name.clone(), spec);
        }
        for (name, port_ref) in &self.outputs {
            let data_type = self
                .step(&port_ref.step)
                .and_then(|s| s.outputs.get(&port_ref.port))
                .map_or(DataType::Any, |p| p.data_type);
            signature = signature.output(name.clone(), OutputSpec::new(data_type));
        }
        signature.accepts_monitor = true;
        signature
    }
}

fn load_inputs(def: &GraphDef) -> Result<IndexMap<String, Port>> {
    let mut inputs = IndexMap::new();
    for (name, input) in &def.inputs {
        if name.is_empty() || name.contains('.') {
            return Err(Error::GraphFormat(format!("invalid input name '{name}'")));
        }
        let default = input
            .default
            .clone()
            .map(|v| input.data_type.coerce(v))
            .transpose()
            .map_err(|e| Error::GraphFormat(format!("default of input '{name}': {e}")))?;
        inputs.insert(
            name.clone(),
            Port {
                data_type: input.data_type,
                default,
                value: None,
            },
        );
    }
    Ok(inputs)
}

fn check_step_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::GraphFormat("step id must not be empty".into()));
    }
    if id.contains('.') || id.chars().any(char::is_whitespace) {
        return Err(Error::GraphFormat(format!("invalid step id '{id}'")));
    }
    Ok(())
}

fn resolve_step_kind(step: &StepDef, registry: &Registry) -> Result<(OpSignature, Callable)> {
    match (&step.op, &step.graph) {
        (Some(op), None) => {
            let operation = registry.get(op).map_err(|_| {
                Error::GraphFormat(format!("step '{}': unknown operation '{op}'", step.id))
            })?;
            Ok((operation.signature().clone(), operation.callable().clone()))
        }
        (None, Some(nested)) => {
            let graph = Graph::load(nested, registry).map_err(|e| match e {
                Error::GraphFormat(msg) => {
                    Error::GraphFormat(format!("in nested graph of step '{}': {msg}", step.id))
                }
                other => other,
            })?;
            let mut signature = graph.signature();
            if graph.name.is_none() {
                signature.name = step.id.clone();
            }
            Ok((signature, graph.into_callable()))
        }
        (Some(_), Some(_)) => Err(Error::GraphFormat(format!(
            "step '{}' has both 'op' and 'graph'",
            step.id
        ))),
        (None, None) => Err(Error::GraphFormat(format!(
            "step '{}' has neither 'op' nor 'graph'",
            step.id
        ))),
    }
}

fn split_reference(reference: &str) -> Option<(&str, &str)> {
    let (step, port) = reference.split_once('.')?;
    (!step.is_empty() && !port.is_empty()).then_some((step, port))
}

fn resolve_binding(
    binding: &BindingDef,
    inputs: &IndexMap<String, Port>,
    index: &HashMap<&str, usize>,
    steps: &[Step],
) -> std::result::Result<Binding, String> {
    let reference = match binding {
        BindingDef::Value(ValueDef { value }) | BindingDef::Literal(value) => {
            return Ok(Binding::Literal(value.clone()));
        }
        BindingDef::Source(SourceDef { source }) | BindingDef::Reference(source) => source.as_str(),
    };

    if reference.contains('.') {
        let (step, port) = split_reference(reference)
            .ok_or_else(|| format!("malformed reference '{reference}'"))?;
        let &i = index
            .get(step)
            .ok_or_else(|| format!("unknown step '{step}'"))?;
        if !steps[i].outputs.contains_key(port) {
            return Err(format!("step '{step}' has no output '{port}'"));
        }
        Ok(Binding::StepOutput {
            step: step.to_string(),
            port: port.to_string(),
        })
    } else if inputs.contains_key(reference) {
        Ok(Binding::GraphInput(reference.to_string()))
    } else {
        Err(format!("unknown graph input '{reference}'"))
    }
}

/// Topological order with declaration order breaking ties.
fn execution_order(steps: &[Step], index: &HashMap<&str, usize>) -> Result<Vec<usize>> {
    let mut in_degree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];

    for (i, step) in steps.iter().enumerate() {
        for dependency in step.dependencies() {
            let d = index[dependency];
            in_degree[i] += 1;
            dependents[d].push(i);
            predecessors[i].push(d);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(steps.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() != steps.len() {
        let remaining: Vec<bool> = in_degree.iter().map(|d| *d > 0).collect();
        let cycle = find_cycle(&predecessors, &remaining);
        let path: Vec<&str> = cycle
            .iter()
            .chain(cycle.first())
            .map(|&i| steps[i].id.as_str())
            .collect();
        return Err(Error::GraphFormat(format!(
            "cycle detected: {}",
            path.join(" -> ")
        )));
    }

    Ok(order)
}

/// Walk predecessors among unfinished steps until one repeats.
///
/// Every unfinished step has an unfinished predecessor, so the walk always
/// closes a cycle. Returned in edge direction, starting at its lowest index.
fn find_cycle(predecessors: &[Vec<usize>], remaining: &[bool]) -> Vec<usize> {
    let Some(start) = remaining.iter().position(|r| *r) else {
        return Vec::new();
    };

    let mut position: HashMap<usize, usize> = HashMap::new();
    let mut walk = Vec::new();
    let mut node = start;
    while !position.contains_key(&node) {
        position.insert(node, walk.len());
        walk.push(node);
        node = predecessors[node]
            .iter()
            .copied()
            .filter(|p| remaining[*p])
            .min()
            .unwrap_or(node);
    }

    let mut cycle = walk.split_off(position[&node]);
    cycle.reverse();
    if let Some(lowest) = cycle.iter().enumerate().min_by_key(|(_, i)| **i).map(|(pos, _)| pos) {
        cycle.rotate_left(lowest);
    }
    cycle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                OpSignature::new("produce"),
                Callable::new(|_| Ok(Value::Int(1).into())),
            )
            .unwrap();
        registry
            .register(
                OpSignature::new("consume").input("y", InputSpec::new(DataType::Int)),
                Callable::new(|args| Ok(Value::Int(args.i64("y")? + 1).into())),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_order_follows_dependencies() {
        let def = GraphDef::new()
            .step(StepDef::op("b", "consume").bind("y", BindingDef::reference("a.return")))
            .step(StepDef::op("c", "produce"))
            .step(StepDef::op("a", "produce"));

        let graph = Graph::load(&def, &registry()).unwrap();
        assert_eq!(graph.execution_order(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_cycle_is_rejected_with_path() {
        let def = GraphDef::new()
            .step(StepDef::op("a", "consume").bind("y", BindingDef::reference("b.return")))
            .step(StepDef::op("b", "consume").bind("y", BindingDef::reference("a.return")));

        let err = Graph::load(&def, &registry()).unwrap_err();
        assert!(matches!(err, Error::GraphFormat(_)));
        assert_eq!(err.to_string(), "invalid graph: cycle detected: a -> b -> a");
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let def = GraphDef::new()
            .step(StepDef::op("a", "consume").bind("y", BindingDef::reference("a.return")));
        let err = Graph::load(&def, &registry()).unwrap_err();
        assert!(err.to_string().ends_with("cycle detected: a -> a"));
    }

    #[test]
    fn test_cycle_behind_a_downstream_step() {
        let def = GraphDef::new()
            .step(StepDef::op("tail", "consume").bind("y", BindingDef::reference("b.return")))
            .step(StepDef::op("a", "consume").bind("y", BindingDef::reference("b.return")))
            .step(StepDef::op("b", "consume").bind("y", BindingDef::reference("a.return")));
        let err = Graph::load(&def, &registry()).unwrap_err();
        assert!(err.to_string().ends_with("cycle detected: a -> b -> a"), "{err}");
    }

    #[test]
    fn test_unknown_references() {
        let registry = registry();
        let cases = [
            (
                GraphDef::new().step(StepDef::op("a", "nope")),
                "unknown operation 'nope'",
            ),
            (
                GraphDef::new()
                    .step(StepDef::op("b", "consume").bind("y", BindingDef::reference("x.return"))),
                "unknown step 'x'",
            ),
            (
                GraphDef::new()
                    .step(StepDef::op("a", "produce"))
                    .step(StepDef::op("b", "consume").bind("y", BindingDef::reference("a.out"))),
                "has no output 'out'",
            ),
            (
                GraphDef::new()
                    .step(StepDef::op("b", "consume").bind("y", BindingDef::reference("missing"))),
                "unknown graph input 'missing'",
            ),
            (
                GraphDef::new().step(StepDef::op("a", "produce").bind("q", BindingDef::value(1))),
                "has no input 'q'",
            ),
            (
                GraphDef::new().step(StepDef::op("b", "consume")),
                "required input 'y' is not bound",
            ),
            (
                GraphDef::new().step(StepDef::op("a", "produce")).output("z", "a"),
                "expected '<step>.<output>'",
            ),
            (
                GraphDef::new()
                    .step(StepDef::op("a", "produce"))
                    .step(StepDef::op("a", "produce")),
                "duplicate step id 'a'",
            ),
            (
                GraphDef::new().step(StepDef::op("a.b", "produce")),
                "invalid step id 'a.b'",
            ),
        ];

        for (def, expected) in cases {
            let err = Graph::load(&def, &registry).unwrap_err();
            assert!(matches!(err, Error::GraphFormat(_)), "{err}");
            assert!(err.to_string().contains(expected), "{err} should mention {expected}");
        }
    }

    #[test]
    fn test_input_defaults_are_coerced() {
        let def = GraphDef::new().input_with_default("n", DataType::Float, 2);
        let graph = Graph::load(&def, &registry()).unwrap();
        assert_eq!(graph.input("n").unwrap().resolved(), Some(&Value::Float(2.0)));

        let bad = GraphDef::new().input_with_default("n", DataType::Int, "two");
        assert!(matches!(Graph::load(&bad, &registry()), Err(Error::GraphFormat(_))));
    }

    #[test]
    fn test_graph_signature() {
        let def = GraphDef::new()
            .name("inc")
            .input("y", DataType::Int)
            .output("z", "b.return")
            .step(StepDef::op("b", "consume").bind("y", BindingDef::reference("y")));
        let signature = Graph::load(&def, &registry()).unwrap().signature();
        assert_eq!(signature.name, "inc");
        assert!(signature.inputs.contains_key("y"));
        assert_eq!(signature.output_type("z"), Some(DataType::Any));
    }
}

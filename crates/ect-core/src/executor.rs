//! Graph binding and invocation.
//!
//! Steps run strictly in the order fixed at load, one at a time, on the
//! calling thread. The first failure ends the invocation; nothing is rolled
//! back and no graph-level output is published.

use crate::dispatch::dispatch;
use crate::error::{Error, OpError, Result};
use crate::monitor::Monitor;
use crate::signature::{Callable, OpOutput, OpSignature};
use crate::value::Value;
use crate::workflow::{Binding, Graph};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

impl Graph {
    /// Set a graph-level input, coercing it to the declared type.
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let port = self
            .inputs
            .get_mut(name)
            .ok_or_else(|| Error::not_found("graph input", name))?;
        port.value = Some(port.data_type.coerce(value.into())?);
        Ok(())
    }

    /// Outputs of the last successful invocation.
    ///
    /// Empty before the first invocation and after a failed one.
    pub fn outputs(&self) -> &IndexMap<String, Value> {
        &self.results
    }

    pub fn output(&self, name: &str) -> Option<&Value> {
        self.results.get(name)
    }

    /// Run every step and collect the graph-level outputs.
    ///
    /// The monitor receives one unit of work per step.
    pub fn invoke(&mut self, monitor: &mut dyn Monitor) -> Result<IndexMap<String, Value>> {
        self.check_bound()?;

        self.results.clear();
        for step in &mut self.steps {
            for port in step.outputs.values_mut() {
                port.value = None;
            }
        }

        let label = self.name.clone().unwrap_or_else(|| "graph".to_string());
        info!(graph = %label, step_count = self.steps.len(), "graph invocation started");
        monitor.begin(self.steps.len() as f64, &label);

        let order = self.order.clone();
        for i in order {
            if monitor.is_cancelled() {
                info!(graph = %label, step = %self.steps[i].id, "graph invocation cancelled");
                return Err(Error::Cancelled);
            }
            if let Err(err) = self.run_step(i, monitor) {
                let step = &self.steps[i].id;
                let err = err.in_step(step);
                warn!(graph = %label, step = %step, error = %err, "step failed");
                return Err(err);
            }
        }

        let mut results = IndexMap::new();
        for (name, port_ref) in &self.outputs {
            let value = self
                .step(&port_ref.step)
                .and_then(|step| step.output(&port_ref.port))
                .cloned()
                .ok_or_else(|| {
                    Error::not_found("step output", format!("{}.{}", port_ref.step, port_ref.port))
                })?;
            results.insert(name.clone(), value);
        }

        monitor.done();
        info!(graph = %label, outputs = results.len(), "graph invocation finished");
        self.results = results.clone();
        Ok(results)
    }

    /// Fail on the first step, in execution order, reading an unset input.
    fn check_bound(&self) -> Result<()> {
        for &i in &self.order {
            let step = &self.steps[i];
            for binding in step.inputs.values() {
                if let Binding::GraphInput(name) = binding {
                    let bound = self.inputs.get(name).and_then(|p| p.resolved());
                    if bound.is_none() {
                        return Err(Error::UnboundInput {
                            input: name.clone(),
                            step: step.id.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, step_id: &str, binding: &Binding) -> Result<Value> {
        let value = match binding {
            Binding::Literal(value) => Some(value),
            Binding::GraphInput(name) => self.inputs.get(name).and_then(|p| p.resolved()),
            Binding::StepOutput { step, port } => self.step(step).and_then(|s| s.output(port)),
        };
        value.cloned().ok_or_else(|| Error::UnboundInput {
            input: match binding {
                Binding::StepOutput { step, port } => format!("{step}.{port}"),
                Binding::GraphInput(name) => name.clone(),
                Binding::Literal(_) => String::new(),
            },
            step: step_id.to_string(),
        })
    }

    fn run_step(&mut self, i: usize, monitor: &mut dyn Monitor) -> Result<()> {
        let step = &self.steps[i];
        let mut keyword = IndexMap::new();
        for (name, binding) in &step.inputs {
            keyword.insert(name.clone(), self.resolve(&step.id, binding)?);
        }

        debug!(step = %step.id, operation = %step.signature.name, "running step");
        let outputs = {
            let mut child = monitor.child(1.0);
            let outputs = dispatch(&step.signature, &step.callable, Vec::new(), keyword, &mut child)?;
            child.done();
            outputs
        };

        let step = &mut self.steps[i];
        for (name, value) in outputs {
            if let Some(port) = step.outputs.get_mut(&name) {
                port.value = Some(value);
            }
        }
        Ok(())
    }

    /// Wrap the graph as an operation.
    ///
    /// Each call runs a fresh copy, so the wrapped graph is never mutated.
    pub fn into_operation(self) -> (OpSignature, Callable) {
        let signature = self.signature();
        (signature, self.into_callable())
    }

    pub(crate) fn into_callable(self) -> Callable {
        Callable::with_monitor(move |args, monitor| {
            let mut graph = self.clone();
            for (name, value) in args.iter() {
                graph
                    .bind(name, value.clone())
                    .map_err(|e| OpError::InvalidInput(e.to_string()))?;
            }
            match graph.invoke(monitor) {
                Ok(outputs) => Ok(OpOutput::Named(outputs)),
                Err(Error::Cancelled) => Err(OpError::Cancelled),
                Err(err) => Err(OpError::Other(Box::new(err))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BindingDef, GraphDef, StepDef};
    use crate::monitor::{CancelFlag, ConsoleMonitor, NullMonitor};
    use crate::registry::Registry;
    use crate::signature::InputSpec;
    use crate::types::DataType;
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry(calls: Arc<AtomicUsize>) -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                OpSignature::new("add")
                    .input("a", InputSpec::new(DataType::Int))
                    .input("b", InputSpec::new(DataType::Int).default_value(1)),
                Callable::new(move |args| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Int(args.i64("a")? + args.i64("b")?).into())
                }),
            )
            .unwrap();
        registry
            .register(
                OpSignature::new("boom").input("a", InputSpec::new(DataType::Any)),
                Callable::new(|_| Err(OpError::failed("kaput"))),
            )
            .unwrap();
        registry
    }

    fn chain() -> GraphDef {
        GraphDef::new()
            .name("chain")
            .input("x", DataType::Int)
            .output("z", "second.return")
            .step(StepDef::op("first", "add").bind("a", BindingDef::reference("x")))
            .step(
                StepDef::op("second", "add")
                    .bind("a", BindingDef::reference("first.return"))
                    .bind("b", BindingDef::value(10)),
            )
    }

    #[test]
    fn test_bind_and_invoke() {
        let mut graph = Graph::load(&chain(), &registry(Arc::default())).unwrap();
        graph.bind("x", "4").unwrap();
        let outputs = graph.invoke(&mut NullMonitor).unwrap();
        assert_eq!(outputs.get("z"), Some(&Value::Int(15)));
        assert_eq!(graph.output("z"), Some(&Value::Int(15)));
        assert_eq!(graph.step("first").unwrap().output("return"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_bind_errors() {
        let mut graph = Graph::load(&chain(), &registry(Arc::default())).unwrap();
        assert!(matches!(graph.bind("nope", 1), Err(Error::NotFound { .. })));
        assert!(matches!(graph.bind("x", "four"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_unbound_input_fails_before_any_step() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut graph = Graph::load(&chain(), &registry(calls.clone())).unwrap();

        let err = graph.invoke(&mut NullMonitor).unwrap_err();
        match err {
            Error::UnboundInput { input, step } => {
                assert_eq!(input, "x");
                assert_eq!(step, "first");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_stops_and_publishes_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let def = GraphDef::new()
            .output("z", "after.return")
            .step(StepDef::op("fails", "boom").bind("a", BindingDef::value(1)))
            .step(StepDef::op("after", "add").bind("a", BindingDef::reference("fails.return")));
        let mut graph = Graph::load(&def, &registry(calls.clone())).unwrap();

        let err = graph.invoke(&mut NullMonitor).unwrap_err();
        assert_eq!(err.step(), Some("fails"));
        assert!(matches!(err, Error::Execution { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(graph.outputs().is_empty());
    }

    #[test]
    fn test_previous_outputs_are_cleared() {
        let mut graph = Graph::load(&chain(), &registry(Arc::default())).unwrap();
        graph.bind("x", 1).unwrap();
        graph.invoke(&mut NullMonitor).unwrap();
        assert!(!graph.outputs().is_empty());

        let flag = CancelFlag::new();
        flag.cancel();
        let mut monitor = ConsoleMonitor::new(io::sink()).with_cancel_flag(flag);
        assert!(matches!(graph.invoke(&mut monitor), Err(Error::Cancelled)));
        assert!(graph.outputs().is_empty());
        assert!(graph.step("first").unwrap().output("return").is_none());
    }

    #[test]
    fn test_progress_sums_to_step_count() {
        let mut graph = Graph::load(&chain(), &registry(Arc::default())).unwrap();
        graph.bind("x", 1).unwrap();
        let mut monitor = ConsoleMonitor::new(io::sink());
        graph.invoke(&mut monitor).unwrap();
        assert_eq!(monitor.total(), Some(2.0));
        assert_eq!(monitor.worked(), 2.0);
    }

    #[test]
    fn test_nested_graph_step() {
        let registry = registry(Arc::default());
        let outer = GraphDef::new()
            .input("x", DataType::Int)
            .output("y", "inner.z")
            .step(StepDef::graph("inner", chain()).bind("x", BindingDef::reference("x")));

        let mut graph = Graph::load(&outer, &registry).unwrap();
        graph.bind("x", 0).unwrap();
        let mut monitor = ConsoleMonitor::new(io::sink());
        let outputs = graph.invoke(&mut monitor).unwrap();
        assert_eq!(outputs.get("y"), Some(&Value::Int(11)));
        assert_eq!(monitor.worked(), 1.0);
    }

    #[test]
    fn test_graph_as_registered_operation() {
        let mut registry = registry(Arc::default());
        let graph = Graph::load(&chain(), &registry).unwrap();
        let (signature, callable) = graph.into_operation();
        registry.register(signature, callable).unwrap();

        let outputs = registry
            .call("chain", vec![Value::Int(2)], IndexMap::new(), &mut NullMonitor)
            .unwrap();
        assert_eq!(outputs.get("z"), Some(&Value::Int(13)));
    }

    #[test]
    fn test_nested_failure_names_outer_step() {
        let registry = registry(Arc::default());
        let inner = GraphDef::new()
            .name("inner")
            .output("r", "fails.return")
            .step(StepDef::op("fails", "boom").bind("a", BindingDef::value(1)));
        let outer = GraphDef::new()
            .output("r", "wrapped.r")
            .step(StepDef::graph("wrapped", inner));

        let mut graph = Graph::load(&outer, &registry).unwrap();
        let err = graph.invoke(&mut NullMonitor).unwrap_err();
        assert_eq!(err.step(), Some("wrapped"));
        assert!(err.to_string().contains("step 'fails' (operation 'boom') failed: kaput"));
    }
}

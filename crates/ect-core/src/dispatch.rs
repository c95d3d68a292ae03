//! Argument binding, coercion and invocation of a single operation.
//!
//! Everything that can be rejected is rejected before the operation body
//! runs. The body is then called exactly once.

use crate::error::{Error, OpError, Result};
use crate::monitor::Monitor;
use crate::signature::{Arguments, Callable, OpOutput, OpSignature, RETURN};
use crate::types::value_set;
use crate::value::Value;
use indexmap::IndexMap;
use std::cmp::Ordering;
use tracing::debug;

/// Match positional and keyword arguments to the declared inputs.
///
/// Positional values bind in declaration order, keywords by name. Unbound
/// inputs take their default, or `Null` when nullable. Every value is then
/// coerced to its declared type and checked against its value set.
pub fn bind_arguments(
    signature: &OpSignature,
    positional: Vec<Value>,
    keyword: IndexMap<String, Value>,
) -> Result<Arguments> {
    if positional.len() > signature.inputs.len() {
        return Err(Error::Argument(format!(
            "'{}' takes {} argument(s) but {} positional were given",
            signature.name,
            signature.inputs.len(),
            positional.len()
        )));
    }

    let mut bound: IndexMap<&str, Value> = IndexMap::new();
    for ((name, _), value) in signature.inputs.iter().zip(positional) {
        bound.insert(name, value);
    }
    for (name, value) in keyword {
        let Some((_, key, _)) = signature.inputs.get_full(name.as_str()) else {
            return Err(Error::Argument(format!(
                "'{}' has no input named '{name}'",
                signature.name
            )));
        };
        if bound.insert(key.as_str(), value).is_some() {
            return Err(Error::Argument(format!(
                "input '{name}' of '{}' is bound more than once",
                signature.name
            )));
        }
    }

    let mut args = Arguments::new();
    for (name, spec) in &signature.inputs {
        let value = match bound.swap_remove(name.as_str()) {
            Some(value) => value,
            None => match (&spec.default, spec.nullable) {
                (Some(default), _) => default.clone(),
                (None, true) => Value::Null,
                (None, false) => {
                    return Err(Error::Argument(format!(
                        "missing required input '{name}' of '{}'",
                        signature.name
                    )));
                }
            },
        };

        let value = if value.is_null() && spec.nullable {
            value
        } else {
            spec.data_type.coerce(value).map_err(|e| match e {
                Error::Validation(msg) => Error::Validation(format!("input '{name}': {msg}")),
                other => other,
            })?
        };
        args.insert(name.clone(), value);
    }

    check_value_sets(signature, &args)?;
    Ok(args)
}

fn check_value_sets(signature: &OpSignature, args: &Arguments) -> Result<()> {
    for (name, spec) in &signature.inputs {
        let Some(source) = &spec.value_set_source else {
            continue;
        };
        let Some(value) = args.get(name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let domain = match args.get(source) {
            Some(Value::Null) | None => {
                return Err(Error::Validation(format!(
                    "input '{name}' cannot be validated: '{source}' is not set"
                )));
            }
            Some(source_value) => value_set(source_value)?,
        };
        if !domain.iter().any(|member| same_value(member, value)) {
            let choices: Vec<String> = domain.iter().map(ToString::to_string).collect();
            return Err(Error::Validation(format!(
                "input '{name}': '{value}' is not one of [{}]",
                choices.join(", ")
            )));
        }
    }
    Ok(())
}

/// Equality across number kinds, so `2.0` is a member of `[1, 2, 3]`.
fn same_value(a: &Value, b: &Value) -> bool {
    match a.compare(b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Validate the arguments, then run the callable once.
pub fn dispatch(
    signature: &OpSignature,
    callable: &Callable,
    positional: Vec<Value>,
    keyword: IndexMap<String, Value>,
    monitor: &mut dyn Monitor,
) -> Result<IndexMap<String, Value>> {
    let args = bind_arguments(signature, positional, keyword)?;
    debug!(operation = %signature.name, args = args.len(), "dispatching operation");

    let output = callable.call(&args, monitor).map_err(|source| match source {
        OpError::Cancelled => Error::Cancelled,
        source => Error::Execution {
            operation: signature.name.clone(),
            step: None,
            source,
        },
    })?;

    collect_outputs(signature, output)
}

/// Map a body's result onto the signature's output ports.
fn collect_outputs(
    signature: &OpSignature,
    output: OpOutput,
) -> Result<IndexMap<String, Value>> {
    let failed = |msg: String| Error::Execution {
        operation: signature.name.clone(),
        step: None,
        source: OpError::Failed(msg),
    };

    match output {
        OpOutput::Single(value) => {
            if signature.outputs.len() > 1 {
                return Err(failed(format!(
                    "returned a single value but declares {} outputs",
                    signature.outputs.len()
                )));
            }
            let name = signature
                .outputs
                .keys()
                .next()
                .map_or(RETURN, String::as_str);
            Ok(IndexMap::from([(name.to_string(), value)]))
        }
        OpOutput::Named(mut values) => {
            let mut outputs = IndexMap::new();
            for (name, _) in signature.output_ports() {
                let value = values
                    .swap_remove(name)
                    .ok_or_else(|| failed(format!("did not produce output '{name}'")))?;
                outputs.insert(name.to_string(), value);
            }
            Ok(outputs)
        }
    }
}

//! Record selection on attribute tables.

use crate::query::Query;
use ect_core::{
    Arguments, Callable, DataType, InputSpec, Monitor, OpError, OpOutput, OpSignature, OutputSpec,
    Registry, Result, Table, Tabular, Value,
};
use std::cmp::Ordering;
use tracing::debug;

pub(crate) fn register(registry: &mut Registry) -> Result<()> {
    registry.register(
        extreme_signature("data_frame_min", "minimal"),
        Callable::new(|args| select_extreme(args, Ordering::Less)),
    )?;
    registry.register(
        extreme_signature("data_frame_max", "maximal"),
        Callable::new(|args| select_extreme(args, Ordering::Greater)),
    )?;
    registry.register(
        OpSignature::new("data_frame_query")
            .version("1.0")
            .tag("filter")
            .description(
                "Select records for which a conditional expression holds. On tables with a \
                 geometry column the expression may use @within, @contains, @intersects, \
                 @disjoint, @touches, @crosses and @almost_equals with a quoted geometry.",
            )
            .input("df", InputSpec::new(DataType::Table).description("The data frame."))
            .input(
                "query_expr",
                InputSpec::new(DataType::Str).description("The conditional query expression."),
            )
            .output("return", OutputSpec::new(DataType::Table)),
        Callable::with_monitor(query),
    )?;
    Ok(())
}

fn extreme_signature(name: &str, which: &str) -> OpSignature {
    OpSignature::new(name)
        .version("1.0")
        .tag("filter")
        .description(format!(
            "Select the first record of a data frame for which the given variable value is {which}."
        ))
        .input("df", InputSpec::new(DataType::Table).description("The data frame."))
        .input(
            "var",
            InputSpec::new(DataType::VarName)
                .value_set_source("df")
                .description("The variable."),
        )
        .output(
            "return",
            OutputSpec::new(DataType::Table).description("A new, one-record data frame."),
        )
}

/// The first row whose `var` value is extreme in the direction of `wanted`.
///
/// Null and NaN cells are skipped.
fn select_extreme(args: &Arguments, wanted: Ordering) -> std::result::Result<OpOutput, OpError> {
    let table = args.table("df")?;
    let var = args.str("var")?;
    let values = table
        .column(var)
        .ok_or_else(|| OpError::InvalidInput(format!("no column named '{var}'")))?;

    let mut best: Option<(usize, &Value)> = None;
    for (index, value) in values.into_iter().enumerate() {
        if value.is_null() || value.as_f64().is_some_and(f64::is_nan) {
            continue;
        }
        let Some((_, current)) = best else {
            best = Some((index, value));
            continue;
        };
        match value.compare(current) {
            Some(ordering) if ordering == wanted => best = Some((index, value)),
            Some(_) => {}
            None => {
                return Err(OpError::InvalidInput(format!(
                    "column '{var}' mixes {} and {} values",
                    current.kind(),
                    value.kind()
                )));
            }
        }
    }

    let (index, _) =
        best.ok_or_else(|| OpError::InvalidInput(format!("column '{var}' has no values")))?;
    debug!(var, row = index, "selected record");
    Ok(Value::Table(table.take(&[index])).into())
}

fn query(args: &Arguments, monitor: &mut dyn Monitor) -> std::result::Result<OpOutput, OpError> {
    let table: &Table = args.table("df")?;
    let expr = Query::parse(args.str("query_expr")?)?;
    expr.check(table)?;

    let geo = table.as_geo();
    monitor.begin(table.num_rows() as f64, "data_frame_query");
    let mut keep = Vec::new();
    for row in table.frame().rows() {
        monitor.check_cancelled()?;
        if expr.matches(row, geo) {
            keep.push(row.index());
        }
        monitor.progress(1.0, None);
    }
    monitor.done();

    debug!(matched = keep.len(), rows = table.num_rows(), "query evaluated");
    Ok(Value::Table(table.take(&keep)).into())
}

//! Table readers and geometry conversion.

use ect_core::{
    Arguments, Callable, DataFrame, DataType, GeoDataFrame, InputSpec, OpError, OpOutput,
    OpSignature, OutputSpec, Registry, Result, Table, Tabular, Value,
};
use tracing::debug;

pub(crate) fn register(registry: &mut Registry) -> Result<()> {
    #[cfg(feature = "csv")]
    registry.register(
        OpSignature::new("read_csv")
            .version("1.0")
            .tag("io")
            .description("Read a table from a comma-separated file.")
            .input("file", InputSpec::new(DataType::Str).description("Path of the CSV file."))
            .input(
                "geometry",
                InputSpec::new(DataType::Str)
                    .nullable()
                    .description("Column holding geometry text. Yields a geo table when given."),
            )
            .output("return", OutputSpec::new(DataType::Table)),
        Callable::new(read_csv),
    )?;

    registry.register(
        OpSignature::new("to_geo_data_frame")
            .version("1.0")
            .tag("filter")
            .description("Turn a data frame into a geo data frame using one of its columns.")
            .input("df", InputSpec::new(DataType::Table).description("The data frame."))
            .input(
                "column",
                InputSpec::new(DataType::VarName)
                    .value_set_source("df")
                    .description("The column holding the geometries."),
            )
            .input(
                "crs",
                InputSpec::new(DataType::Str)
                    .nullable()
                    .description("Coordinate reference system, e.g. 'EPSG:4326'."),
            )
            .output("return", OutputSpec::new(DataType::GeoTable)),
        Callable::new(to_geo_data_frame),
    )?;
    Ok(())
}

#[cfg(feature = "csv")]
fn read_csv(args: &Arguments) -> std::result::Result<OpOutput, OpError> {
    let file = args.str("file")?;
    let geometry = args.opt_str("geometry")?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(file)
        .map_err(|e| OpError::Failed(format!("cannot open '{file}': {e}")))?;

    let headers = reader
        .headers()
        .map_err(|e| OpError::Failed(format!("{file}: {e}")))?
        .clone();
    let mut frame =
        DataFrame::new(headers.iter()).map_err(|e| OpError::Failed(format!("{file}: {e}")))?;

    for record in reader.records() {
        let record = record.map_err(|e| OpError::Failed(format!("{file}: {e}")))?;
        frame
            .push_row(record.iter().map(infer_cell).collect())
            .map_err(|e| OpError::Failed(format!("{file}: {e}")))?;
    }
    debug!(file, rows = frame.num_rows(), columns = frame.columns().len(), "read csv");

    let table = match geometry {
        Some(column) => Table::Geo(
            GeoDataFrame::from_frame(frame, column)
                .map_err(|e| OpError::InvalidInput(format!("{file}: {e}")))?,
        ),
        None => Table::Frame(frame),
    };
    Ok(Value::Table(table).into())
}

/// Cell type inference: empty is null, then bool, int, float, text.
#[cfg(feature = "csv")]
fn infer_cell(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    match text {
        "true" | "True" => return Value::Bool(true),
        "false" | "False" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = text.parse::<i64>() {
        return Value::Int(n);
    }
    if let Ok(x) = text.parse::<f64>() {
        return Value::Float(x);
    }
    Value::from(text)
}

fn to_geo_data_frame(args: &Arguments) -> std::result::Result<OpOutput, OpError> {
    let table = args.table("df")?;
    let column = args.str("column")?;

    let mut geo = GeoDataFrame::from_frame(table.frame().clone(), column)
        .map_err(OpError::InvalidInput)?;
    let crs = match args.opt_str("crs")? {
        Some(crs) => Some(crs),
        None => table.as_geo().and_then(GeoDataFrame::crs),
    };
    if let Some(crs) = crs {
        geo = geo.with_crs(crs);
    }
    Ok(Value::from(geo).into())
}

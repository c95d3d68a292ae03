//! Tabular values.
//!
//! `DataFrame` is a plain attribute table; `GeoDataFrame` adds a geometry
//! column. Both implement [`Tabular`], so operations written against the
//! capability work for either. Turning a plain frame into a geo frame is an
//! explicit, checked conversion.

use crate::geometry::Geometry;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;

/// A row-major table of values with named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataFrame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// A borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    frame: &'a DataFrame,
    index: usize,
}

impl<'a> Row<'a> {
    /// Position of the row in its table.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.frame.get(self.index, column)
    }

    pub fn values(&self) -> &'a [Value] {
        &self.frame.rows[self.index]
    }
}

impl DataFrame {
    /// Create an empty table with the given columns.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Result<Self, String> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(format!("duplicate column name '{column}'"));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Create a table and fill it with rows.
    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Result<Self, String> {
        let mut frame = Self::new(columns)?;
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), String> {
        if row.len() != self.columns.len() {
            return Err(format!(
                "row {} has {} values, expected {}",
                self.rows.len(),
                row.len(),
                self.columns.len()
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[col])
    }

    /// All values of a column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let col = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[col]).collect())
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.rows.len()).map(move |index| Row { frame: self, index })
    }

    /// Rows as column-name keyed records.
    pub fn records(&self) -> impl Iterator<Item = IndexMap<&str, &Value>> {
        self.rows.iter().map(move |row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect()
        })
    }

    /// A new table holding the rows at `indices`, in that order.
    ///
    /// Out-of-range indices are skipped.
    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    pub fn filter(&self, mut predicate: impl FnMut(Row<'_>) -> bool) -> Self {
        let indices: Vec<usize> = self
            .rows()
            .filter(|row| predicate(*row))
            .map(|row| row.index)
            .collect();
        self.take(&indices)
    }

    fn replace_column(&mut self, col: usize, values: Vec<Value>) {
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[col] = value;
        }
    }
}

/// A table with a designated geometry column.
///
/// Every cell of the geometry column holds a [`Value::Geometry`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeoDataFrame {
    frame: DataFrame,
    geometry_column: String,
    crs: Option<String>,
}

impl GeoDataFrame {
    /// Convert a plain table, parsing the geometry column.
    ///
    /// Cells may already be geometries or geometry text (coordinate list or
    /// WKT). Any other cell fails the conversion.
    pub fn from_frame(mut frame: DataFrame, geometry_column: &str) -> Result<Self, String> {
        let col = frame
            .column_index(geometry_column)
            .ok_or_else(|| format!("no column named '{geometry_column}'"))?;

        let mut geometries = Vec::with_capacity(frame.num_rows());
        for (i, row) in frame.rows.iter().enumerate() {
            let geometry = match &row[col] {
                Value::Geometry(g) => g.clone(),
                Value::String(s) => {
                    Geometry::parse(s).map_err(|e| format!("row {i}, '{geometry_column}': {e}"))?
                }
                other => {
                    return Err(format!(
                        "row {i}, '{geometry_column}': expected a geometry, got {}",
                        other.kind()
                    ));
                }
            };
            geometries.push(Value::Geometry(geometry));
        }
        frame.replace_column(col, geometries);

        Ok(Self {
            frame,
            geometry_column: geometry_column.to_string(),
            crs: None,
        })
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    pub fn geometry_column(&self) -> &str {
        &self.geometry_column
    }

    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    /// Geometry of a row.
    pub fn geometry(&self, row: usize) -> Option<&Geometry> {
        self.frame
            .get(row, &self.geometry_column)
            .and_then(Value::as_geometry)
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }
}

/// Capabilities shared by plain and geo tables.
pub trait Tabular: Sized {
    fn frame(&self) -> &DataFrame;

    /// Rebuild `self` around a frame with the same columns.
    fn with_frame(&self, frame: DataFrame) -> Self;

    fn columns(&self) -> &[String] {
        self.frame().columns()
    }

    fn num_rows(&self) -> usize {
        self.frame().num_rows()
    }

    fn column(&self, name: &str) -> Option<Vec<&Value>> {
        self.frame().column(name)
    }

    fn take(&self, indices: &[usize]) -> Self {
        self.with_frame(self.frame().take(indices))
    }

    fn filter<F: FnMut(Row<'_>) -> bool>(&self, predicate: F) -> Self {
        self.with_frame(self.frame().filter(predicate))
    }
}

impl Tabular for DataFrame {
    fn frame(&self) -> &DataFrame {
        self
    }

    fn with_frame(&self, frame: DataFrame) -> Self {
        frame
    }
}

impl Tabular for GeoDataFrame {
    fn frame(&self) -> &DataFrame {
        &self.frame
    }

    fn with_frame(&self, frame: DataFrame) -> Self {
        Self {
            frame,
            geometry_column: self.geometry_column.clone(),
            crs: self.crs.clone(),
        }
    }
}

/// Either kind of table, as carried by [`Value::Table`].
#[derive(Debug, Clone, PartialEq)]
pub enum Table {
    Frame(DataFrame),
    Geo(GeoDataFrame),
}

impl Table {
    pub fn is_geo(&self) -> bool {
        matches!(self, Table::Geo(_))
    }

    pub fn as_geo(&self) -> Option<&GeoDataFrame> {
        match self {
            Table::Geo(geo) => Some(geo),
            Table::Frame(_) => None,
        }
    }
}

impl Tabular for Table {
    fn frame(&self) -> &DataFrame {
        match self {
            Table::Frame(frame) => frame,
            Table::Geo(geo) => geo.frame(),
        }
    }

    fn with_frame(&self, frame: DataFrame) -> Self {
        match self {
            Table::Frame(_) => Table::Frame(frame),
            Table::Geo(geo) => Table::Geo(geo.with_frame(frame)),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.frame();
        writeln!(f, "{}", frame.columns().join("\t"))?;
        for row in frame.rows() {
            let cells: Vec<String> = row.values().iter().map(ToString::to_string).collect();
            writeln!(f, "{}", cells.join("\t"))?;
        }
        write!(f, "({} rows)", frame.num_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cities() -> DataFrame {
        DataFrame::from_rows(
            ["name", "population", "location"],
            [
                vec!["Hamburg".into(), 1_800_000i64.into(), "10.0, 53.5".into()],
                vec!["Rome".into(), 2_800_000i64.into(), "12.5, 41.9".into()],
                vec!["Bergen".into(), 285_000i64.into(), "5.3, 60.4".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_checks_width() {
        let err = DataFrame::from_rows(["a", "b"], [vec![Value::Int(1)]]).unwrap_err();
        assert!(err.contains("expected 2"));
        assert!(DataFrame::new(["a", "a"]).is_err());
    }

    #[test]
    fn test_filter_keeps_order() {
        let frame = cities();
        let big = frame.filter(|row| {
            row.get("population")
                .and_then(Value::as_i64)
                .is_some_and(|p| p > 1_000_000)
        });
        assert_eq!(big.num_rows(), 2);
        assert_eq!(big.get(0, "name"), Some(&Value::from("Hamburg")));
        assert_eq!(big.get(1, "name"), Some(&Value::from("Rome")));
    }

    #[test]
    fn test_geo_conversion_is_checked() {
        let geo = GeoDataFrame::from_frame(cities(), "location").unwrap();
        assert_eq!(geo.geometry(2), Some(&Geometry::point(5.3, 60.4)));

        let err = GeoDataFrame::from_frame(cities(), "population").unwrap_err();
        assert!(err.contains("expected a geometry"));
        assert!(GeoDataFrame::from_frame(cities(), "nope").is_err());
    }

    #[test]
    fn test_take_preserves_geo() {
        let table = Table::Geo(GeoDataFrame::from_frame(cities(), "location").unwrap());
        let one = table.take(&[1]);
        assert!(one.is_geo());
        assert_eq!(one.num_rows(), 1);
        assert_eq!(
            one.as_geo().unwrap().geometry(0),
            Some(&Geometry::point(12.5, 41.9))
        );
    }

    #[test]
    fn test_records() {
        let frame = cities();
        let first = frame.records().next().unwrap();
        assert_eq!(first.get("name"), Some(&&Value::from("Hamburg")));
    }
}

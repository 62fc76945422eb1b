//! Tabular frames for structured scoring
//!
//! A [`Frame`] is an ordered list of named columns with equal row counts.
//! It is the unit of exchange between the input parser, the user hooks and
//! the scoring adapter. Serialization covers delimited text on the way in
//! and out, and row-wise JSON for prediction responses.

use serde_json::Value;

use crate::error::{Result, RunnerError};

/// Reserved column name for single-valued prediction output
pub const PREDICTIONS_COLUMN: &str = "Predictions";

/// Column payload: numeric or free text
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn float<S: Into<String>>(name: S, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Float(values),
        }
    }

    pub fn text<S: Into<String>>(name: S, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.data, ColumnData::Float(_))
    }

    /// Numeric values, or None for a text column
    pub fn as_floats(&self) -> Option<&[f64]> {
        match &self.data {
            ColumnData::Float(v) => Some(v),
            ColumnData::Text(_) => None,
        }
    }

    fn cell_to_string(&self, row: usize) -> String {
        match &self.data {
            ColumnData::Float(v) => {
                let value = v[row];
                if value.is_nan() {
                    String::new()
                } else {
                    format!("{value}")
                }
            }
            ColumnData::Text(v) => v[row].clone(),
        }
    }

    fn cell_to_json(&self, row: usize) -> Value {
        match &self.data {
            ColumnData::Float(v) => serde_json::Number::from_f64(v[row])
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ColumnData::Text(v) => Value::String(v[row].clone()),
        }
    }
}

/// Ordered named columns, all the same length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a frame, rejecting ragged columns
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut frame = Self::new();
        for column in columns {
            frame.push_column(column)?;
        }
        Ok(frame)
    }

    /// Append a column, rejecting a row-count mismatch
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if let Some(first) = self.columns.first() {
            if first.len() != column.len() {
                return Err(RunnerError::internal(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.len(),
                    first.len()
                )));
            }
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when the frame holds no data at all
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.n_rows() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Remove and return a column by name
    pub fn take_column(&mut self, name: &str) -> Option<Column> {
        let index = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(index))
    }

    /// Parse delimited text with a header row.
    ///
    /// Column types are inferred: a column where every cell parses as a
    /// number (empty cells count as missing) becomes numeric, anything else
    /// stays text.
    pub fn from_csv(raw: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(raw);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| RunnerError::invalid_input(format!("cannot parse header row: {e}")))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record =
                record.map_err(|e| RunnerError::invalid_input(format!("cannot parse row: {e}")))?;
            for (index, field) in record.iter().enumerate() {
                cells[index].push(field.to_string());
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, values)| infer_column(name, values))
            .collect();
        Self::from_columns(columns)
    }

    /// Serialize as delimited text with a header row
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        writer
            .write_record(self.columns.iter().map(|c| c.name.as_str()))
            .map_err(|e| RunnerError::internal(format!("cannot write header row: {e}")))?;

        for row in 0..self.n_rows() {
            let fields: Vec<String> = self.columns.iter().map(|c| c.cell_to_string(row)).collect();
            writer
                .write_record(&fields)
                .map_err(|e| RunnerError::internal(format!("cannot write row {row}: {e}")))?;
        }

        writer
            .into_inner()
            .map_err(|e| RunnerError::internal(format!("cannot flush output: {e}")))
    }

    /// Row-wise JSON for prediction responses.
    ///
    /// A single column serializes as a flat list of values; multiple columns
    /// serialize as one object per row.
    pub fn to_rows_json(&self) -> Value {
        if self.columns.len() == 1 {
            let column = &self.columns[0];
            let values = (0..column.len()).map(|row| column.cell_to_json(row)).collect();
            return Value::Array(values);
        }

        let rows = (0..self.n_rows())
            .map(|row| {
                let mut object = serde_json::Map::new();
                for column in &self.columns {
                    object.insert(column.name.clone(), column.cell_to_json(row));
                }
                Value::Object(object)
            })
            .collect();
        Value::Array(rows)
    }
}

fn infer_column(name: String, values: Vec<String>) -> Column {
    let mut floats = Vec::with_capacity(values.len());
    for value in &values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            floats.push(f64::NAN);
            continue;
        }
        match trimmed.parse::<f64>() {
            Ok(parsed) => floats.push(parsed),
            Err(_) => return Column::text(name, values),
        }
    }
    Column::float(name, floats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_parse_and_type_inference() {
        let raw = b"age,name,score\n34,alice,0.9\n28,bob,0.1\n,carol,0.5\n";
        let frame = Frame::from_csv(raw).unwrap();

        assert_eq!(frame.n_rows(), 3);
        assert_eq!(frame.n_columns(), 3);

        let age = frame.column("age").unwrap();
        assert!(age.is_numeric());
        let values = age.as_floats().unwrap();
        assert_eq!(values[0], 34.0);
        assert!(values[2].is_nan());

        let name = frame.column("name").unwrap();
        assert!(!name.is_numeric());
    }

    #[test]
    fn test_csv_ragged_row_rejected() {
        let raw = b"a,b\n1,2\n3\n";
        let err = Frame::from_csv(raw).unwrap_err();
        assert!(matches!(err, RunnerError::InvalidInput { .. }));
    }

    #[test]
    fn test_csv_empty_input_is_empty_frame() {
        let frame = Frame::from_csv(b"").unwrap();
        assert!(frame.is_empty());

        // A lone header row has columns but no rows.
        let frame = Frame::from_csv(b"a,b\n").unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.n_columns(), 2);
    }

    #[test]
    fn test_csv_round_trip() {
        let frame = Frame::from_columns(vec![
            Column::float("x", vec![1.5, 2.0]),
            Column::text("label", vec!["a".to_string(), "b".to_string()]),
        ])
        .unwrap();

        let bytes = frame.to_csv().unwrap();
        let parsed = Frame::from_csv(&bytes).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_push_column_rejects_length_mismatch() {
        let mut frame = Frame::new();
        frame.push_column(Column::float("a", vec![1.0, 2.0])).unwrap();
        let err = frame
            .push_column(Column::float("b", vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, RunnerError::Internal { .. }));
    }

    #[test]
    fn test_take_column() {
        let mut frame = Frame::from_columns(vec![
            Column::float("a", vec![1.0]),
            Column::float("b", vec![2.0]),
        ])
        .unwrap();

        let taken = frame.take_column("a").unwrap();
        assert_eq!(taken.name, "a");
        assert_eq!(frame.n_columns(), 1);
        assert!(frame.take_column("missing").is_none());
    }

    #[test]
    fn test_rows_json_single_column_is_flat() {
        let frame =
            Frame::from_columns(vec![Column::float(PREDICTIONS_COLUMN, vec![1.0, 2.5])]).unwrap();
        let json = frame.to_rows_json();
        assert_eq!(json, serde_json::json!([1.0, 2.5]));
    }

    #[test]
    fn test_rows_json_two_columns_are_objects() {
        let frame = Frame::from_columns(vec![
            Column::float("yes", vec![0.75, 0.2]),
            Column::float("no", vec![0.25, 0.8]),
        ])
        .unwrap();
        let json = frame.to_rows_json();
        assert_eq!(
            json,
            serde_json::json!([{"yes": 0.75, "no": 0.25}, {"yes": 0.2, "no": 0.8}])
        );
    }
}

//! Row sources: ordered sequences of string cells.
//!
//! The transformation and assembly engines only depend on this shape, not on
//! the file format behind it. CSV is built in; Excel is available behind the
//! `excel` cargo feature.

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;

use chrono::{NaiveDateTime, TimeZone};

pub use self::csv::{detect_delimiter, detect_encoding, CsvRowSource};

// =============================================================================
// Cells and Rows
// =============================================================================

/// One cell of a flat row.
///
/// Spreadsheet sources can yield native date cells; everything else is text.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Text content; native dates render with the default date-time format.
    pub fn text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    pub fn as_datetime(&self) -> Option<&NaiveDateTime> {
        match self {
            Cell::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.is_empty(),
            Cell::DateTime(_) => false,
        }
    }
}

/// One flat row with its 1-based source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    line: usize,
    cells: Vec<Cell>,
}

impl Row {
    pub fn new(line: usize, cells: Vec<Cell>) -> Self {
        Self { line, cells }
    }

    /// Convenience constructor for all-text rows.
    pub fn from_strings(line: usize, cells: Vec<String>) -> Self {
        Self {
            line,
            cells: cells.into_iter().map(Cell::Text).collect(),
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    /// Text of a cell; `None` when out of range or empty-kind.
    pub fn text(&self, index: usize) -> Option<String> {
        self.cells.get(index).and_then(Cell::text)
    }
}

// =============================================================================
// Row reader
// =============================================================================

use std::sync::Arc;

use tracing::warn;

use crate::error::RowError;
use crate::schema::convert::CellParser;
use crate::schema::record::{Record, Value};
use crate::schema::Schema;

/// Maps flat rows onto records of one schema.
///
/// Column layout is either positional (scalar fields in declared order) or
/// named (a header row decides which column feeds which field). Unmatched
/// header columns and unmatched schema fields are skipped with a warning.
pub struct RowReader {
    schema: Arc<Schema>,
    bindings: Vec<Binding>,
}

struct Binding {
    column: usize,
    field: usize,
    name: String,
    parser: CellParser,
}

impl RowReader {
    /// Positional layout: scalar fields in declared order, starting at
    /// column `offset`.
    pub fn positional(schema: &Arc<Schema>, offset: usize) -> Self {
        let bindings = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.kind.is_scalar())
            .enumerate()
            .map(|(position, (field, f))| Binding {
                column: offset + position,
                field,
                name: f.name.clone(),
                parser: CellParser::for_field(f),
            })
            .collect();
        Self {
            schema: Arc::clone(schema),
            bindings,
        }
    }

    /// Named layout: `headers[i]` names the column at `offset + i`.
    pub fn named(schema: &Arc<Schema>, headers: &[String], offset: usize) -> Self {
        let mut bindings = Vec::new();
        let mut matched = vec![false; schema.len()];
        for (position, header) in headers.iter().enumerate() {
            match schema.find_by_header(header) {
                Some(field) => {
                    matched[field] = true;
                    let f = schema.field(field);
                    bindings.push(Binding {
                        column: offset + position,
                        field,
                        name: f.name.clone(),
                        parser: CellParser::for_field(f),
                    });
                }
                None => {
                    warn!(
                        column = header.as_str(),
                        schema = schema.name(),
                        "header column not used"
                    );
                }
            }
        }
        for (index, was_matched) in matched.iter().enumerate() {
            if !was_matched && schema.field(index).kind.is_scalar() {
                warn!(
                    field = schema.field(index).name.as_str(),
                    schema = schema.name(),
                    "field not found in header, skipped"
                );
            }
        }
        Self {
            schema: Arc::clone(schema),
            bindings,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Read one row into a record; empty cells leave their field unset.
    pub fn read(&self, row: &Row) -> Result<Record, RowError> {
        let mut record = Record::new(Arc::clone(&self.schema));
        for binding in &self.bindings {
            let Some(cell) = row.get(binding.column) else {
                continue;
            };
            // Native spreadsheet dates bypass text parsing.
            if let Some(naive) = cell.as_datetime() {
                match &binding.parser {
                    CellParser::Date { .. } => {
                        record.set(binding.field, Value::Date(naive.date()));
                        continue;
                    }
                    CellParser::DateTime { zone, .. } => {
                        if let Some(dt) = zone.from_local_datetime(naive).single() {
                            record.set(binding.field, Value::DateTime(dt));
                            continue;
                        }
                    }
                    _ => {}
                }
            }
            let Some(text) = cell.text() else { continue };
            let value = binding.parser.parse(&text).map_err(|message| {
                RowError::new(message)
                    .at_line(row.line())
                    .with_column(binding.name.clone())
                    .with_value(text.clone())
            })?;
            if let Some(value) = value {
                record.set(binding.field, value);
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text() {
        assert_eq!(Cell::Empty.text(), None);
        assert_eq!(Cell::Text("x".into()).text(), Some("x".to_string()));
        assert!(Cell::Text(String::new()).is_empty());
    }

    #[test]
    fn test_row_access() {
        let row = Row::from_strings(3, vec!["a".into(), "".into()]);
        assert_eq!(row.line(), 3);
        assert_eq!(row.text(0), Some("a".to_string()));
        assert_eq!(row.text(1), Some(String::new()));
        assert_eq!(row.text(9), None);
    }

    use crate::schema::{FieldKind, FieldMeta};

    #[test]
    fn test_positional_reader_with_offset() {
        let schema = Schema::builder("section")
            .field("x", FieldKind::String)
            .field("n", FieldKind::Integer)
            .build()
            .unwrap();
        let reader = RowReader::positional(&schema, 1);
        let record = reader
            .read(&Row::from_strings(1, vec!["MARK".into(), "v".into(), "7".into()]))
            .unwrap();
        assert_eq!(record.string("x"), Some("v"));
        assert_eq!(record.by_name("n"), Some(&Value::Integer(7)));
    }

    #[test]
    fn test_named_reader_with_rename() {
        let schema = Schema::builder("product")
            .field_with("id", FieldKind::Integer, FieldMeta::new().with_header("PRODUCT_ID"))
            .field("sku", FieldKind::String)
            .build()
            .unwrap();
        let headers = vec!["PRODUCT_ID".to_string(), "sku".to_string(), "unused".to_string()];
        let reader = RowReader::named(&schema, &headers, 0);
        let record = reader
            .read(&Row::from_strings(2, vec![" 2 ".into(), "REF_2".into(), "x".into()]))
            .unwrap();
        assert_eq!(record.by_name("id"), Some(&Value::Integer(2)));
        assert_eq!(record.string("sku"), Some("REF_2"));
    }

    #[test]
    fn test_reader_error_carries_row_context() {
        let schema = Schema::builder("t")
            .field("n", FieldKind::Integer)
            .build()
            .unwrap();
        let reader = RowReader::positional(&schema, 0);
        let err = reader
            .read(&Row::from_strings(9, vec!["abc".into()]))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 9"));
        assert!(msg.contains("'n'"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn test_native_date_cell() {
        let schema = Schema::builder("t")
            .field("d", FieldKind::Date)
            .build()
            .unwrap();
        let reader = RowReader::positional(&schema, 0);
        let naive = chrono::NaiveDate::from_ymd_opt(2020, 11, 30)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let record = reader
            .read(&Row::new(1, vec![Cell::DateTime(naive)]))
            .unwrap();
        assert_eq!(
            record.by_name("d"),
            Some(&Value::Date(
                chrono::NaiveDate::from_ymd_opt(2020, 11, 30).unwrap()
            ))
        );
    }
}

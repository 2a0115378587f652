//! Excel row source (feature `excel`).
//!
//! Reads the first sheet of a workbook into [`Row`]s. Formula cells arrive
//! already evaluated by calamine; numeric cells render without a trailing
//! `.0` so they read back like their CSV counterparts; date cells stay
//! native and reach the readers as date-time values.

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Reader};

use crate::error::{CsvError, CsvResult};

use super::{Cell, Row};

/// Read all rows of the first sheet of a workbook file.
pub fn read_first_sheet(path: impl AsRef<Path>) -> CsvResult<Vec<Row>> {
    let mut workbook = open_workbook_auto(path).map_err(calamine::Error::from)?;
    first_sheet_rows(&mut workbook)
}

/// Read all rows of the first sheet from an in-memory workbook.
pub fn read_first_sheet_from(reader: impl Read) -> CsvResult<Vec<Row>> {
    let mut bytes = Vec::new();
    let mut reader = reader;
    reader.read_to_end(&mut bytes)?;
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(calamine::Error::from)?;
    first_sheet_rows(&mut workbook)
}

fn first_sheet_rows<RS: Read + Seek>(
    workbook: &mut calamine::Sheets<RS>,
) -> CsvResult<Vec<Row>> {
    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        return Err(CsvError::EmptyInput);
    };
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(calamine::Error::from)?;

    let mut rows = Vec::new();
    for (index, row) in range.rows().enumerate() {
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        let cells = row.iter().map(convert_cell).collect();
        rows.push(Row::new(index + 1, cells));
    }
    Ok(rows)
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Text(i.to_string()),
        Data::Float(f) => Cell::Text(render_number(*f)),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Cell::DateTime(naive),
            None => Cell::Text(render_number(dt.as_f64())),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(format!("{e:?}")),
    }
}

/// Spreadsheets store integers as floats; render `400.0` as `"400"` and keep
/// large identifiers out of scientific notation.
fn render_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

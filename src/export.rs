//! Delimited and fixed-width record writers.
//!
//! [`Exporter`] renders records either with a cell separator or padded to
//! each field's declared column size. [`Exporter::export_sections`] writes
//! multi-section streams back out with their markers, round-tripping what the
//! section dispatcher reads.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use tracing::warn;

use crate::error::{ExportError, ExportResult};
use crate::schema::convert::{NumberPattern, DEFAULT_DATE_FORMAT, DEFAULT_DATETIME_FORMAT};
use crate::schema::record::{render_double, Record, Value};
use crate::schema::{Field, FieldKind, Schema};

const DEFAULT_DOUBLE_FORMAT: &str = "###.#########";

// =============================================================================
// Exporter
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum PaddingMode {
    Left,
    Right,
}

/// Writer configuration; compiled per-schema writers are built lazily inside
/// each export call.
pub struct Exporter {
    separator: Option<char>,
    padding: PaddingConfig,
    quote: char,
    array_separator: char,
    default_date_format: Option<String>,
    default_double_format: Option<String>,
    boolean_values: Option<(String, String)>,
    excluded: Vec<String>,
}

type PaddingConfig = Option<PaddingMode>;

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter {
    pub fn new() -> Self {
        Self {
            separator: None,
            padding: None,
            quote: '"',
            array_separator: ',',
            default_date_format: None,
            default_double_format: None,
            boolean_values: None,
            excluded: Vec::new(),
        }
    }

    /// Write cells separated by `separator`, quoting where needed.
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = Some(separator);
        self
    }

    /// Fixed-width mode, values flush right in their column.
    pub fn with_left_padding(mut self) -> Self {
        self.padding = Some(PaddingMode::Left);
        self
    }

    /// Fixed-width mode, values flush left in their column.
    pub fn with_right_padding(mut self) -> Self {
        self.padding = Some(PaddingMode::Right);
        self
    }

    pub fn with_array_separator(mut self, separator: char) -> Self {
        self.array_separator = separator;
        self
    }

    /// Fallback date/date-time render pattern for fields without one.
    pub fn with_default_date_format(mut self, format: impl Into<String>) -> Self {
        self.default_date_format = Some(format.into());
        self
    }

    /// Fallback double render pattern for fields without one.
    pub fn with_default_double_format(mut self, format: impl Into<String>) -> Self {
        self.default_double_format = Some(format.into());
        self
    }

    /// Rendered literals for booleans (default `1` / `0`).
    pub fn with_boolean_values(
        mut self,
        true_value: impl Into<String>,
        false_value: impl Into<String>,
    ) -> Self {
        self.boolean_values = Some((true_value.into(), false_value.into()));
        self
    }

    /// Leave a field out of the output.
    pub fn exclude_field(mut self, name: impl Into<String>) -> Self {
        self.excluded.push(name.into());
        self
    }

    /// Write one line per record.
    pub fn export<'a>(
        &self,
        records: impl IntoIterator<Item = &'a Record>,
        out: &mut impl Write,
    ) -> ExportResult<()> {
        let mut writers: HashMap<String, LineWriter> = HashMap::new();
        for record in records {
            let writer = writers
                .entry(record.schema().name().to_string())
                .or_insert_with(|| LineWriter::compile(self, record.schema()));
            writer.write(record, out)?;
        }
        Ok(())
    }

    /// Write the header line for a schema.
    pub fn export_header(&self, schema: &Arc<Schema>, out: &mut impl Write) -> ExportResult<()> {
        let writer = LineWriter::compile(self, schema);
        writer.write_header(out)
    }

    /// Write marker-tagged lines for every populated section of each record,
    /// in section declaration order.
    pub fn export_sections<'a>(
        &self,
        records: impl IntoIterator<Item = &'a Record>,
        out: &mut impl Write,
    ) -> ExportResult<()> {
        let mut writers: HashMap<String, LineWriter> = HashMap::new();
        for record in records {
            for (index, field) in record.schema().fields().iter().enumerate() {
                let Some(section) = &field.meta.section else {
                    continue;
                };
                let mut write_one = |nested: &Record| -> ExportResult<()> {
                    let writer = writers
                        .entry(nested.schema().name().to_string())
                        .or_insert_with(|| LineWriter::compile(self, nested.schema()));
                    out.write_all(section.marker.as_bytes())?;
                    if let Some(separator) = self.separator {
                        write_char(out, separator)?;
                    }
                    writer.write(nested, out)
                };
                match record.get(index) {
                    Some(Value::Record(nested)) => write_one(nested)?,
                    Some(Value::RecordArray(items)) => {
                        for nested in items {
                            write_one(nested)?;
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Compiled per-schema writer
// =============================================================================

struct LineWriter {
    separator: Option<char>,
    cells: Vec<CellWriter>,
}

struct CellWriter {
    field_index: usize,
    header: String,
    render: Render,
    pad: Option<Pad>,
}

struct Pad {
    size: usize,
    mode: PaddingMode,
    field: String,
}

enum Render {
    Text {
        quote: char,
        separator: Option<char>,
    },
    TextArray {
        quote: char,
        separator: Option<char>,
        array_separator: char,
    },
    Number,
    Double {
        pattern: NumberPattern,
        decimal_separator: char,
    },
    Boolean {
        true_value: String,
        false_value: String,
    },
    Date {
        format: String,
    },
    DateTime {
        format: String,
    },
}

impl LineWriter {
    fn compile(config: &Exporter, schema: &Arc<Schema>) -> Self {
        let mut cells = Vec::new();
        for (index, field) in schema.fields().iter().enumerate() {
            if config.excluded.iter().any(|name| *name == field.name) {
                continue;
            }
            if !field.kind.is_scalar() {
                // nested fields only ever leave through export_sections
                continue;
            }
            let pad = match config.padding {
                None => None,
                Some(mode) => match field.meta.column_size {
                    Some(size) => Some(Pad {
                        size,
                        mode,
                        field: field.name.clone(),
                    }),
                    None => {
                        warn!(field = field.name.as_str(), "no column size defined, field skipped");
                        continue;
                    }
                },
            };
            cells.push(CellWriter {
                field_index: index,
                header: field.header_name().to_string(),
                render: Render::compile(config, field),
                pad,
            });
        }
        Self {
            separator: config.separator,
            cells,
        }
    }

    fn write(&self, record: &Record, out: &mut impl Write) -> ExportResult<()> {
        let mut first = true;
        for cell in &self.cells {
            if !first {
                if let Some(separator) = self.separator {
                    write_char(out, separator)?;
                }
            }
            first = false;
            let rendered = record.get(cell.field_index).map(|v| cell.render.apply(v));
            let padded = apply_padding(rendered, &cell.pad)?;
            out.write_all(padded.as_bytes())?;
        }
        out.write_all(b"\n")?;
        Ok(())
    }

    fn write_header(&self, out: &mut impl Write) -> ExportResult<()> {
        let mut first = true;
        for cell in &self.cells {
            if !first {
                if let Some(separator) = self.separator {
                    write_char(out, separator)?;
                }
            }
            first = false;
            let padded = apply_padding(Some(cell.header.clone()), &cell.pad)?;
            out.write_all(padded.as_bytes())?;
        }
        out.write_all(b"\n")?;
        Ok(())
    }
}

fn apply_padding(value: Option<String>, pad: &Option<Pad>) -> ExportResult<String> {
    let Some(pad) = pad else {
        return Ok(value.unwrap_or_default());
    };
    let value = value.unwrap_or_default();
    if value.len() > pad.size {
        return Err(ExportError::TooWide {
            field: pad.field.clone(),
            value,
            size: pad.size,
        });
    }
    let blank = " ".repeat(pad.size - value.len());
    Ok(match pad.mode {
        PaddingMode::Left => format!("{}{}", blank, value),
        PaddingMode::Right => format!("{}{}", value, blank),
    })
}

fn write_char(out: &mut impl Write, c: char) -> ExportResult<()> {
    let mut buffer = [0u8; 4];
    out.write_all(c.encode_utf8(&mut buffer).as_bytes())?;
    Ok(())
}

impl Render {
    fn compile(config: &Exporter, field: &Field) -> Self {
        match &field.kind {
            FieldKind::String => Render::Text {
                quote: config.quote,
                separator: config.separator,
            },
            FieldKind::StringArray => Render::TextArray {
                quote: config.quote,
                separator: config.separator,
                array_separator: field.meta.array_separator.unwrap_or(config.array_separator),
            },
            FieldKind::Integer | FieldKind::Long => Render::Number,
            FieldKind::Double => {
                let pattern = field
                    .meta
                    .double_format
                    .as_deref()
                    .or(config.default_double_format.as_deref())
                    .unwrap_or(DEFAULT_DOUBLE_FORMAT);
                match NumberPattern::parse(pattern) {
                    Ok(pattern) => Render::Double {
                        pattern,
                        decimal_separator: field.meta.decimal_separator.unwrap_or('.'),
                    },
                    Err(message) => {
                        warn!(
                            field = field.name.as_str(),
                            pattern, message, "bad double format, using the default"
                        );
                        Render::Double {
                            pattern: NumberPattern::parse(DEFAULT_DOUBLE_FORMAT)
                                .expect("default double format is valid"),
                            decimal_separator: '.',
                        }
                    }
                }
            }
            FieldKind::Boolean => {
                let (true_value, false_value) = field
                    .meta
                    .boolean_format
                    .clone()
                    .or_else(|| config.boolean_values.clone())
                    .unwrap_or_else(|| ("1".to_string(), "0".to_string()));
                Render::Boolean {
                    true_value,
                    false_value,
                }
            }
            FieldKind::Date => Render::Date {
                format: field
                    .meta
                    .date_format
                    .clone()
                    .or_else(|| config.default_date_format.clone())
                    .unwrap_or_else(|| {
                        warn!(field = field.name.as_str(), "no date format, using {}", DEFAULT_DATE_FORMAT);
                        DEFAULT_DATE_FORMAT.to_string()
                    }),
            },
            FieldKind::DateTime => Render::DateTime {
                format: field
                    .meta
                    .date_format
                    .clone()
                    .or_else(|| config.default_date_format.clone())
                    .unwrap_or_else(|| {
                        warn!(field = field.name.as_str(), "no date format, using {}", DEFAULT_DATETIME_FORMAT);
                        DEFAULT_DATETIME_FORMAT.to_string()
                    }),
            },
            FieldKind::Record(_) | FieldKind::RecordArray(_) => Render::Text {
                quote: config.quote,
                separator: config.separator,
            },
        }
    }

    fn apply(&self, value: &Value) -> String {
        match (self, value) {
            (Render::Text { quote, separator }, Value::String(s)) => {
                escape_text(s, *quote, *separator)
            }
            (
                Render::TextArray {
                    quote,
                    separator,
                    array_separator,
                },
                Value::StringArray(items),
            ) => items
                .iter()
                .map(|s| escape_text(s, *quote, *separator))
                .collect::<Vec<_>>()
                .join(&array_separator.to_string()),
            (Render::Number, Value::Integer(i)) => i.to_string(),
            (Render::Number, Value::Long(l)) => l.to_string(),
            (
                Render::Double {
                    pattern,
                    decimal_separator,
                },
                Value::Double(d),
            ) => pattern.format(*d, *decimal_separator),
            (
                Render::Boolean {
                    true_value,
                    false_value,
                },
                Value::Boolean(b),
            ) => if *b { true_value } else { false_value }.clone(),
            (Render::Date { format }, Value::Date(d)) => d.format(format).to_string(),
            (Render::DateTime { format }, Value::DateTime(dt)) => dt.format(format).to_string(),
            // value drifted from the schema kind; render generically
            (_, Value::Double(d)) => render_double(*d),
            (_, other) => other.render(),
        }
    }
}

/// Quote a value containing the separator or the quote char, doubling inner
/// quotes; embedded newlines render as `\n`.
fn escape_text(value: &str, quote: char, separator: Option<char>) -> String {
    let has_quote = value.contains(quote);
    let needs_quoting = has_quote || separator.map(|s| value.contains(s)).unwrap_or(false);
    let mut out = if has_quote {
        value.replace(quote, &format!("{quote}{quote}"))
    } else {
        value.to_string()
    };
    if needs_quoting {
        out = format!("{quote}{out}{quote}");
    }
    out.replace('\n', "\\n")
}

//! Error types for the restruct import/export pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ConfigError`] - construction-time configuration errors (fatal)
//! - [`RowError`] - per-row conversion errors (fatal to the whole stream)
//! - [`AssembleError`] - structural errors raised by the assemblers
//! - [`CsvError`] - row-source errors (I/O, encoding, malformed CSV)
//! - [`ExportError`] - writer errors
//! - [`ImportError`] - top-level import errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Configuration Errors (construction time)
// =============================================================================

/// Errors raised while building a schema, a `Reformater` or an assembler.
///
/// These are always programming/configuration mistakes; they are raised
/// before any row is processed and are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two fields with the same name declared on one schema.
    #[error("duplicate field '{field}' on schema '{schema}'")]
    DuplicateField { schema: String, field: String },

    /// A mapping rule references a field the source schema does not have.
    #[error("field '{field}' not found on schema '{schema}'")]
    UnknownField { schema: String, field: String },

    /// A template placeholder resolves to nothing.
    #[error("placeholder '{name}' in template '{template}' matches no extraction, source field or variable")]
    UnresolvedPlaceholder { template: String, name: String },

    /// A formatter or number pattern failed to compile.
    #[error("invalid pattern '{pattern}': {message}")]
    BadPattern { pattern: String, message: String },

    /// A schema handed to the section dispatcher has no section-marked field.
    #[error("schema '{schema}' declares no section markers")]
    NoSections { schema: String },

    /// Two section fields declare the same marker value.
    #[error("marker '{marker}' declared twice on schema '{schema}'")]
    DuplicateMarker { schema: String, marker: String },

    /// A section-marked field is not a nested record or record array.
    #[error("field '{field}' carries a section marker but is not a nested record")]
    BadSectionField { field: String },
}

// =============================================================================
// Per-Row Errors
// =============================================================================

/// A fatal per-row error, carrying as much row context as the source knew.
///
/// Raised on numeric/date parse failures and on apply-time resolver lookups.
/// The stream aborts; skipping bad rows silently is deliberately not offered.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: Option<usize>,
    pub column: Option<String>,
    pub value: Option<String>,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(line) = self.line {
            write!(f, "line {}: ", line)?;
        }
        match (&self.column, &self.value) {
            (Some(col), Some(val)) => write!(f, "column '{}' (value '{}'): ", col, val)?,
            (Some(col), None) => write!(f, "column '{}': ", col)?,
            (None, Some(val)) => write!(f, "value '{}': ", val)?,
            _ => {}
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RowError {}

impl RowError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            line: None,
            column: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

// =============================================================================
// Structural Errors (assemblers)
// =============================================================================

/// Structural errors raised by the section dispatcher.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// A singleton section received a second row before the composite was reset.
    #[error("section '{marker}' already set{}", fmt_line(.line))]
    AlreadySet { marker: String, line: Option<usize> },

    /// Per-row conversion failure inside an assembler.
    #[error(transparent)]
    Row(#[from] RowError),
}

fn fmt_line(line: &Option<usize>) -> String {
    match line {
        Some(l) => format!(" (line {})", l),
        None => String::new(),
    }
}

// =============================================================================
// Row-Source Errors
// =============================================================================

/// Errors from the CSV/Excel row source.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read input.
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode bytes with the detected encoding.
    #[error("failed to decode input: {0}")]
    Encoding(String),

    /// Malformed CSV content.
    #[error("invalid CSV at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Empty input.
    #[error("input is empty")]
    EmptyInput,

    /// No header row found.
    #[error("no header row found")]
    NoHeaders,

    #[cfg(feature = "excel")]
    /// Excel workbook error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors from the delimited / fixed-width writer.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Write failure on the underlying sink.
    #[error("write error: {0}")]
    Io(#[from] std::io::Error),

    /// A value does not fit the field's declared column size.
    #[error("value '{value}' exceeds the {size} character column of field '{field}'")]
    TooWide {
        field: String,
        value: String,
        size: usize,
    },
}

// =============================================================================
// Import Errors (top-level)
// =============================================================================

/// Top-level import errors.
///
/// This is the error type returned by the [`crate::import::Importer`] entry
/// points. It wraps all lower-level errors.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Row-source error.
    #[error("source error: {0}")]
    Csv(#[from] CsvError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Per-row conversion error.
    #[error("row error: {0}")]
    Row(#[from] RowError),

    /// Structural assembly error.
    #[error("assembly error: {0}")]
    Assemble(#[from] AssembleError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration/build operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for row-source operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_error_format() {
        let err = RowError::new("not a number")
            .at_line(5)
            .with_column("age")
            .with_value("abc");
        let msg = err.to_string();
        assert!(msg.contains("line 5"));
        assert!(msg.contains("column 'age'"));
        assert!(msg.contains("value 'abc'"));
        assert!(msg.contains("not a number"));
    }

    #[test]
    fn test_error_conversion_chain() {
        let row_err = RowError::new("bad value");
        let import_err: ImportError = row_err.into();
        assert!(import_err.to_string().contains("bad value"));

        let config_err = ConfigError::UnknownField {
            schema: "order".into(),
            field: "total".into(),
        };
        let import_err: ImportError = config_err.into();
        assert!(import_err.to_string().contains("total"));
    }
}

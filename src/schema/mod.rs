//! Schema and typed record model.
//!
//! A [`Schema`] is an ordered set of uniquely-named, typed [`Field`]s built
//! through [`SchemaBuilder`]. A [`Record`](record::Record) holds one value
//! slot per field; "unset" and "empty string" are distinct states and stay
//! distinct through every transformation.
//!
//! Field behavior that the import/export layers need (header renames, date
//! and number formats, column sizes, section markers) is carried as explicit
//! per-field metadata in [`FieldMeta`], attached at schema-build time.

pub mod convert;
pub mod record;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::FixedOffset;

use crate::error::ConfigError;

// =============================================================================
// Field Kinds
// =============================================================================

/// The closed union of supported field types.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// UTF-8 string.
    String,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    /// 64-bit floating point number.
    Double,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Date-time with a fixed offset.
    DateTime,
    /// Array of strings, one CSV cell split on the array separator.
    StringArray,
    /// Single nested record.
    Record(Arc<Schema>),
    /// Repeated nested records.
    RecordArray(Arc<Schema>),
}

impl FieldKind {
    /// True for the scalar kinds (everything except nested records).
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FieldKind::Record(_) | FieldKind::RecordArray(_))
    }

    /// The nested schema, for `Record` and `RecordArray` kinds.
    pub fn nested(&self) -> Option<&Arc<Schema>> {
        match self {
            FieldKind::Record(s) | FieldKind::RecordArray(s) => Some(s),
            _ => None,
        }
    }
}

// =============================================================================
// Field Metadata
// =============================================================================

/// Section-marker metadata for multi-section streams.
///
/// A nested field carrying this is fed by rows whose first column equals
/// `marker`. When `first_row_is_header` is set, the first matched row names
/// the section's columns instead of carrying data.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionMeta {
    pub marker: String,
    pub first_row_is_header: bool,
}

impl SectionMeta {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            first_row_is_header: false,
        }
    }

    pub fn with_header_row(mut self) -> Self {
        self.first_row_is_header = true;
        self
    }
}

/// Explicit per-field metadata, attached at schema-build time.
///
/// Every consumer reads plain struct fields; nothing is looked up
/// dynamically at row time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMeta {
    /// Header name used for import matching and export headers, when it
    /// differs from the field name.
    pub header: Option<String>,
    /// chrono strftime pattern for date / date-time parsing and rendering.
    pub date_format: Option<String>,
    /// Fixed offset applied to date-times parsed without zone information.
    pub zone: Option<FixedOffset>,
    /// `#`/`0` fraction pattern for doubles, e.g. `###.##`.
    pub double_format: Option<String>,
    /// Decimal separator for rendered doubles (default `.`).
    pub decimal_separator: Option<char>,
    /// Rendered literals for `true` / `false`.
    pub boolean_format: Option<(String, String)>,
    /// Fixed-width column size for the padded writer.
    pub column_size: Option<usize>,
    /// Separator splitting / joining string-array cells (default `,`).
    pub array_separator: Option<char>,
    /// An empty cell yields an empty string instead of leaving the field unset.
    pub empty_is_value: bool,
    /// Section marker for multi-section streams (nested fields only).
    pub section: Option<SectionMeta>,
}

impl FieldMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }

    pub fn with_zone(mut self, zone: FixedOffset) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn with_double_format(mut self, format: impl Into<String>) -> Self {
        self.double_format = Some(format.into());
        self
    }

    pub fn with_decimal_separator(mut self, separator: char) -> Self {
        self.decimal_separator = Some(separator);
        self
    }

    pub fn with_boolean_format(
        mut self,
        true_value: impl Into<String>,
        false_value: impl Into<String>,
    ) -> Self {
        self.boolean_format = Some((true_value.into(), false_value.into()));
        self
    }

    pub fn with_column_size(mut self, size: usize) -> Self {
        self.column_size = Some(size);
        self
    }

    pub fn with_array_separator(mut self, separator: char) -> Self {
        self.array_separator = Some(separator);
        self
    }

    pub fn empty_is_value(mut self) -> Self {
        self.empty_is_value = true;
        self
    }

    pub fn with_section(mut self, section: SectionMeta) -> Self {
        self.section = Some(section);
        self
    }
}

// =============================================================================
// Fields and Schemas
// =============================================================================

/// A named, typed field with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub meta: FieldMeta,
}

impl Field {
    /// The name this field answers to in a header row.
    pub fn header_name(&self) -> &str {
        self.meta.header.as_deref().unwrap_or(&self.name)
    }
}

/// An ordered set of uniquely-named fields.
#[derive(Debug, PartialEq)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    /// Index of a field by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Look up a field by name.
    pub fn find(&self, name: &str) -> Option<&Field> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    /// Look up a field by header name (rename metadata wins over the name).
    pub fn find_by_header(&self, header: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.header_name() == header)
    }

    /// Require a field by name, as construction-time validation.
    pub fn require(&self, name: &str) -> Result<usize, ConfigError> {
        self.index_of(name).ok_or_else(|| ConfigError::UnknownField {
            schema: self.name.clone(),
            field: name.to_string(),
        })
    }
}

/// Builder for [`Schema`]; declaration order is preserved.
pub struct SchemaBuilder {
    name: String,
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    error: Option<ConfigError>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            index: HashMap::new(),
            error: None,
        }
    }

    /// Declare a field with default metadata.
    pub fn field(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field_with(name, kind, FieldMeta::default())
    }

    /// Declare a field with explicit metadata.
    pub fn field_with(mut self, name: impl Into<String>, kind: FieldKind, meta: FieldMeta) -> Self {
        if self.error.is_some() {
            return self;
        }
        let name = name.into();
        if self.index.contains_key(&name) {
            self.error = Some(ConfigError::DuplicateField {
                schema: self.name.clone(),
                field: name,
            });
            return self;
        }
        self.index.insert(name.clone(), self.fields.len());
        self.fields.push(Field { name, kind, meta });
        self
    }

    pub fn build(self) -> Result<Arc<Schema>, ConfigError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(Arc::new(Schema {
            name: self.name,
            fields: self.fields,
            index: self.index,
        }))
    }
}

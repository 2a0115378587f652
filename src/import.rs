//! High-level import entry points.
//!
//! [`Importer`] combines a row source, an optional reformater stage and one
//! of the assembly engines behind a small builder:
//!
//! ```ignore
//! use restruct::import::Importer;
//!
//! let mut orders = Vec::new();
//! Importer::new()
//!     .with_separator(';')
//!     .with_transformer(rules, false)
//!     .import_grouped(file, &order_schema, |record| orders.push(record))?;
//! ```
//!
//! Everything runs push-based and synchronously: each row is fully processed
//! (transformed, dispatched, possibly completing a composite handed to the
//! consumer) before the next row is read.

use std::io::Read;
use std::sync::Arc;

use crate::assemble::{BreakAssembler, SectionDispatcher};
use crate::error::{CsvError, ImportResult, RowError};
use crate::schema::{FieldKind, Schema};
use crate::source::csv::split_header_line;
use crate::source::{CsvRowSource, Row, RowReader};
use crate::schema::record::Record;
use crate::transform::{MappingRule, Reformater};

// =============================================================================
// Importer
// =============================================================================

/// Builder for CSV/Excel imports.
///
/// The configured instance is reusable; each `import_*` call processes one
/// stream with its own per-stream state.
pub struct Importer {
    delimiter: char,
    quote: Option<char>,
    provided_header: Option<String>,
    type_name: String,
    transformer: Option<(Vec<MappingRule>, bool)>,
}

/// Detected source characteristics, returned by the byte-level entry points.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
}

impl Default for Importer {
    fn default() -> Self {
        Self::new()
    }
}

impl Importer {
    pub fn new() -> Self {
        Self {
            delimiter: ',',
            quote: Some('"'),
            provided_header: None,
            type_name: "csv".to_string(),
            transformer: None,
        }
    }

    /// Cell separator (default `,`).
    pub fn with_separator(mut self, separator: char) -> Self {
        self.delimiter = separator;
        self
    }

    /// Quote character (default `"`).
    pub fn with_quote(mut self, quote: char) -> Self {
        self.quote = Some(quote);
        self
    }

    /// Disable quote handling entirely.
    pub fn without_quotes(mut self) -> Self {
        self.quote = None;
        self
    }

    /// Header line for header-less files; split on the separator.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.provided_header = Some(header.into());
        self
    }

    /// Name given to inferred schemas (default `csv`).
    pub fn with_type_name(mut self, name: impl Into<String>) -> Self {
        self.type_name = name.into();
        self
    }

    /// Insert a reformater stage between the source and the assembler.
    ///
    /// With `carry_source`, every source field is copied into the
    /// transformed records alongside the mapped ones.
    pub fn with_transformer(mut self, rules: Vec<MappingRule>, carry_source: bool) -> Self {
        self.transformer = Some((rules, carry_source));
        self
    }

    // -------------------------------------------------------------------------
    // Schema inference
    // -------------------------------------------------------------------------

    /// Build an all-string schema out of the header row.
    pub fn infer_schema(&self, reader: impl Read) -> ImportResult<Arc<Schema>> {
        let mut rows = self.rows(reader);
        let headers = self.headers(&mut rows)?;
        self.schema_from_headers(&headers)
    }

    /// [`infer_schema`](Self::infer_schema) over raw bytes, with encoding and
    /// delimiter detection.
    pub fn infer_schema_auto(&self, bytes: &[u8]) -> ImportResult<(Arc<Schema>, SourceInfo)> {
        let (mut rows, encoding, delimiter) = CsvRowSource::from_bytes_auto(bytes)?;
        let headers = self.headers_with(&mut rows, delimiter)?;
        let schema = self.schema_from_headers(&headers)?;
        Ok((
            schema,
            SourceInfo {
                encoding,
                delimiter,
                headers,
            },
        ))
    }

    // -------------------------------------------------------------------------
    // Flat import
    // -------------------------------------------------------------------------

    /// Read one record per row, matching header columns to `schema` fields
    /// by name or header rename.
    pub fn import_flat(
        &self,
        reader: impl Read,
        schema: &Arc<Schema>,
        consumer: impl FnMut(Record),
    ) -> ImportResult<()> {
        let mut rows = self.rows(reader);
        let headers = self.headers(&mut rows)?;
        self.run_flat(rows, &headers, schema, consumer)
    }

    /// [`import_flat`](Self::import_flat) over raw bytes, with encoding and
    /// delimiter detection.
    pub fn import_flat_auto(
        &self,
        bytes: &[u8],
        schema: &Arc<Schema>,
        consumer: impl FnMut(Record),
    ) -> ImportResult<SourceInfo> {
        let (mut rows, encoding, delimiter) = CsvRowSource::from_bytes_auto(bytes)?;
        let headers = self.headers_with(&mut rows, delimiter)?;
        self.run_flat(rows, &headers, schema, consumer)?;
        Ok(SourceInfo {
            encoding,
            delimiter,
            headers,
        })
    }

    // -------------------------------------------------------------------------
    // Grouped import (control break)
    // -------------------------------------------------------------------------

    /// Rebuild nested `target` records out of consecutive flat rows, breaking
    /// groups on the target's scalar fields.
    pub fn import_grouped(
        &self,
        reader: impl Read,
        target: &Arc<Schema>,
        consumer: impl FnMut(Record),
    ) -> ImportResult<()> {
        let mut rows = self.rows(reader);
        let headers = self.headers(&mut rows)?;
        self.run_grouped(rows, &headers, target, consumer)
    }

    // -------------------------------------------------------------------------
    // Section import (marker column)
    // -------------------------------------------------------------------------

    /// Dispatch marker-tagged rows to the sections declared on `root`.
    ///
    /// The stream has no global header row; section layouts are positional or
    /// use their own header rows per the section metadata.
    pub fn import_sections(
        &self,
        reader: impl Read,
        root: &Arc<Schema>,
        consumer: impl FnMut(Record),
    ) -> ImportResult<()> {
        let rows = self.rows(reader);
        self.run_sections(rows, root, consumer)
    }

    // -------------------------------------------------------------------------
    // Excel entry points (feature `excel`)
    // -------------------------------------------------------------------------

    /// Flat import of the first sheet of a workbook.
    #[cfg(feature = "excel")]
    pub fn import_flat_excel(
        &self,
        reader: impl Read,
        schema: &Arc<Schema>,
        consumer: impl FnMut(Record),
    ) -> ImportResult<()> {
        let mut rows = crate::source::excel::read_first_sheet_from(reader)?.into_iter();
        let headers = match &self.provided_header {
            Some(line) => split_header_line(line, self.delimiter),
            None => row_texts(&rows.next().ok_or(CsvError::NoHeaders)?),
        };
        self.run_flat(rows.map(Ok), &headers, schema, consumer)
    }

    /// Grouped import of the first sheet of a workbook.
    #[cfg(feature = "excel")]
    pub fn import_grouped_excel(
        &self,
        reader: impl Read,
        target: &Arc<Schema>,
        consumer: impl FnMut(Record),
    ) -> ImportResult<()> {
        let mut rows = crate::source::excel::read_first_sheet_from(reader)?.into_iter();
        let headers = match &self.provided_header {
            Some(line) => split_header_line(line, self.delimiter),
            None => row_texts(&rows.next().ok_or(CsvError::NoHeaders)?),
        };
        self.run_grouped(rows.map(Ok), &headers, target, consumer)
    }

    /// Section import of the first sheet of a workbook.
    #[cfg(feature = "excel")]
    pub fn import_sections_excel(
        &self,
        reader: impl Read,
        root: &Arc<Schema>,
        consumer: impl FnMut(Record),
    ) -> ImportResult<()> {
        let rows = crate::source::excel::read_first_sheet_from(reader)?;
        self.run_sections(rows.into_iter().map(Ok), root, consumer)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn rows(&self, reader: impl Read) -> impl Iterator<Item = Result<Row, CsvError>> {
        CsvRowSource::from_reader(reader, self.delimiter as u8, self.quote.map(|q| q as u8))
    }

    fn headers(
        &self,
        rows: &mut impl Iterator<Item = Result<Row, CsvError>>,
    ) -> ImportResult<Vec<String>> {
        self.headers_with(rows, self.delimiter)
    }

    fn headers_with(
        &self,
        rows: &mut impl Iterator<Item = Result<Row, CsvError>>,
        delimiter: char,
    ) -> ImportResult<Vec<String>> {
        if let Some(line) = &self.provided_header {
            return Ok(split_header_line(line, delimiter));
        }
        let row = rows.next().ok_or(CsvError::NoHeaders)??;
        Ok((0..row.len())
            .map(|i| row.text(i).unwrap_or_default().trim().to_string())
            .collect())
    }

    fn schema_from_headers(&self, headers: &[String]) -> ImportResult<Arc<Schema>> {
        let mut builder = Schema::builder(self.type_name.clone());
        for header in headers {
            builder = builder.field(header.clone(), FieldKind::String);
        }
        Ok(builder.build()?)
    }

    fn run_flat(
        &self,
        rows: impl Iterator<Item = Result<Row, CsvError>>,
        headers: &[String],
        schema: &Arc<Schema>,
        mut consumer: impl FnMut(Record),
    ) -> ImportResult<()> {
        let reader = RowReader::named(schema, headers, 0);
        let transformer = self.build_transformer(schema)?;
        for row in rows {
            let row = row?;
            let mut record = reader.read(&row)?;
            if let Some(reformater) = &transformer {
                record = reformater
                    .transform(&record)
                    .map_err(|e| at_line(e, row.line()))?;
            }
            consumer(record);
        }
        Ok(())
    }

    fn run_grouped(
        &self,
        rows: impl Iterator<Item = Result<Row, CsvError>>,
        headers: &[String],
        target: &Arc<Schema>,
        mut consumer: impl FnMut(Record),
    ) -> ImportResult<()> {
        let base = self.schema_from_headers(headers)?;
        let reader = RowReader::positional(&base, 0);
        let transformer = self.build_transformer(&base)?;
        let flat_schema = transformer
            .as_ref()
            .map(|t| Arc::clone(t.output_schema()))
            .unwrap_or(base);

        let mut assembler = BreakAssembler::new(target, &flat_schema)?;
        for row in rows {
            let row = row?;
            let mut record = reader.read(&row)?;
            if let Some(reformater) = &transformer {
                record = reformater
                    .transform(&record)
                    .map_err(|e| at_line(e, row.line()))?;
            }
            if let Some(done) = assembler
                .push(&record)
                .map_err(|e| at_line(e, row.line()))?
            {
                consumer(done);
            }
        }
        if let Some(done) = assembler.finish() {
            consumer(done);
        }
        Ok(())
    }

    fn run_sections(
        &self,
        rows: impl Iterator<Item = Result<Row, CsvError>>,
        root: &Arc<Schema>,
        mut consumer: impl FnMut(Record),
    ) -> ImportResult<()> {
        let mut dispatcher = SectionDispatcher::new(root)?;
        for row in rows {
            let row = row?;
            if let Some(done) = dispatcher.push(&row)? {
                consumer(done);
            }
        }
        if let Some(done) = dispatcher.finish() {
            consumer(done);
        }
        Ok(())
    }

    fn build_transformer(&self, source: &Arc<Schema>) -> ImportResult<Option<Reformater>> {
        match &self.transformer {
            None => Ok(None),
            Some((rules, carry_source)) => Ok(Some(
                Reformater::builder(Arc::clone(source), rules.clone())
                    .carry_source(*carry_source)
                    .build()?,
            )),
        }
    }
}

fn at_line(mut error: RowError, line: usize) -> RowError {
    error.line.get_or_insert(line);
    error
}

#[cfg(feature = "excel")]
fn row_texts(row: &Row) -> Vec<String> {
    (0..row.len())
        .map(|i| row.text(i).unwrap_or_default().trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldMeta, SectionMeta};
    use crate::transform::{FieldRef, MappingRule};

    fn product_schema() -> Arc<Schema> {
        Schema::builder("product")
            .field_with(
                "id",
                FieldKind::Integer,
                FieldMeta::new().with_header("PRODUCT_ID"),
            )
            .field_with("sku", FieldKind::String, FieldMeta::new().empty_is_value())
            .build()
            .unwrap()
    }

    #[test]
    fn test_flat_import() {
        let content = concat!(
            "PRODUCT_ID,sku\n",
            "1,\"REF_1\"\n",
            " 2 ,\"REF_2\"\n",
            "\"3\",\"REF_3\"\n",
            "\"4  \",\"REF_4\"\n",
            "\"5  \",\"\"\n",
            "\"7  \",\n",
            "\n",
        );
        let mut got = Vec::new();
        Importer::new()
            .import_flat(content.as_bytes(), &product_schema(), |r| got.push(r))
            .unwrap();

        assert_eq!(got.len(), 6);
        assert_eq!(got[0].by_name("id"), Some(&crate::schema::record::Value::Integer(1)));
        assert_eq!(got[0].string("sku"), Some("REF_1"));
        assert_eq!(got[1].by_name("id"), Some(&crate::schema::record::Value::Integer(2)));
        assert_eq!(got[3].by_name("id"), Some(&crate::schema::record::Value::Integer(4)));
        // empty cells stay empty strings, not unset, per the field metadata
        assert_eq!(got[4].string("sku"), Some(""));
        assert_eq!(got[5].string("sku"), Some(""));
    }

    #[test]
    fn test_flat_import_without_header_row() {
        let mut got = Vec::new();
        Importer::new()
            .with_header("PRODUCT_ID,sku")
            .import_flat("1,REF_1\n".as_bytes(), &product_schema(), |r| got.push(r))
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].string("sku"), Some("REF_1"));
    }

    #[test]
    fn test_flat_import_bad_number_aborts_with_line() {
        let err = Importer::new()
            .import_flat(
                "PRODUCT_ID,sku\n1,REF\nnope,REF\n".as_bytes(),
                &product_schema(),
                |_| {},
            )
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 3"), "got: {msg}");
        assert!(msg.contains("nope"));
    }

    #[test]
    fn test_infer_schema() {
        let schema = Importer::new()
            .infer_schema("PRODUCT_ID,sku\n1,REF_1\n".as_bytes())
            .unwrap();
        assert_eq!(schema.name(), "csv");
        assert_eq!(schema.len(), 2);
        assert!(schema.fields().iter().all(|f| f.kind == FieldKind::String));

        let named = Importer::new()
            .with_type_name("Test")
            .infer_schema("a,b\n".as_bytes())
            .unwrap();
        assert_eq!(named.name(), "Test");
    }

    #[test]
    fn test_grouped_import_with_transformer() {
        // columns a..dd renamed to aa..dd, then grouped into three levels
        let content = "a;b;c;dd\n\
                       aa;bb;aa;d\n\
                       aa;cc;\n\
                       bbb;bb;\n";

        let l3 = Schema::builder("l3")
            .field("aa", FieldKind::String)
            .field("bb", FieldKind::String)
            .field("cc", FieldKind::String)
            .field("dd", FieldKind::String)
            .build()
            .unwrap();
        let l2 = Schema::builder("l2")
            .field("bb", FieldKind::String)
            .field("cc", FieldKind::String)
            .field("l3", FieldKind::RecordArray(l3))
            .build()
            .unwrap();
        let l1 = Schema::builder("l1")
            .field("aa", FieldKind::String)
            .field("l2", FieldKind::RecordArray(l2))
            .build()
            .unwrap();

        let rules = vec![
            MappingRule::field("aa", FieldRef::new("a")),
            MappingRule::field("bb", FieldRef::new("b")),
            MappingRule::field("cc", FieldRef::new("c")),
            MappingRule::field("dd", FieldRef::new("dd")),
        ];

        let mut got = Vec::new();
        Importer::new()
            .with_separator(';')
            .with_transformer(rules, false)
            .import_grouped(content.as_bytes(), &l1, |r| got.push(r))
            .unwrap();

        assert_eq!(got.len(), 2);
        let first = &got[0];
        assert_eq!(first.string("aa"), Some("aa"));
        assert_eq!(got[1].string("aa"), Some("bbb"));
        assert_eq!(first.records("l2").len(), 2);
        assert_eq!(first.records("l2")[0].records("l3").len(), 1);
        let leaf = &first.records("l2")[0].records("l3")[0];
        assert_eq!(leaf.string("aa"), Some("aa"));
        assert_eq!(leaf.string("bb"), Some("bb"));
        assert_eq!(leaf.string("cc"), Some("aa"));
        assert_eq!(leaf.string("dd"), Some("d"));
    }

    #[test]
    fn test_grouped_import_single_nested() {
        let content = "a;b;c;d;e\n\
                       aa;bb;aa;d;1\n\
                       aa;cc;2\n\
                       bbb;bb;;3\n";

        let l4 = Schema::builder("l4")
            .field("c", FieldKind::String)
            .field("d", FieldKind::String)
            .field("e", FieldKind::Integer)
            .build()
            .unwrap();
        let root = Schema::builder("simple")
            .field("a", FieldKind::String)
            .field("b", FieldKind::String)
            .field("l4", FieldKind::Record(l4))
            .build()
            .unwrap();

        let mut got = Vec::new();
        Importer::new()
            .with_separator(';')
            .import_grouped(content.as_bytes(), &root, |r| got.push(r))
            .unwrap();

        assert_eq!(got.len(), 3);
        let nested = got[0].record("l4").unwrap();
        assert_eq!(nested.string("c"), Some("aa"));
        assert_eq!(nested.string("d"), Some("d"));
    }

    #[test]
    fn test_section_import() {
        let pair = |name: &str| {
            Schema::builder(name)
                .field("val1", FieldKind::String)
                .field("val2", FieldKind::String)
                .build()
                .unwrap()
        };
        let root = Schema::builder("root")
            .field_with(
                "type_a",
                FieldKind::Record(pair("type_a")),
                FieldMeta::new().with_section(SectionMeta::new("TYPE_A")),
            )
            .field_with(
                "type_b",
                FieldKind::RecordArray(pair("type_b")),
                FieldMeta::new().with_section(SectionMeta::new("TYPE_B")),
            )
            .build()
            .unwrap();

        let content = "TYPE_A;va1;va2\n\
                       TYPE_B;vb11;vb12\n\
                       TYPE_B;vb21;vb22\n\
                       TYPE_A;a1;a2\n";
        let mut got = Vec::new();
        Importer::new()
            .with_separator(';')
            .import_sections(content.as_bytes(), &root, |r| got.push(r))
            .unwrap();

        assert_eq!(got.len(), 2);
        assert_eq!(got[0].records("type_b").len(), 2);
        assert_eq!(
            got[1].record("type_a").unwrap().string("val1"),
            Some("a1")
        );
    }

    #[test]
    fn test_quote_disabled() {
        let schema = Schema::builder("t")
            .field("id", FieldKind::String)
            .field("sku", FieldKind::String)
            .build()
            .unwrap();
        let mut got = Vec::new();
        Importer::new()
            .without_quotes()
            .import_flat("id,sku\n1,\"REF_1\"\n".as_bytes(), &schema, |r| got.push(r))
            .unwrap();
        assert_eq!(got[0].string("sku"), Some("\"REF_1\""));
    }

    #[test]
    fn test_string_array_field() {
        let schema = Schema::builder("t")
            .field("f1", FieldKind::StringArray)
            .build()
            .unwrap();
        let mut got = Vec::new();
        Importer::new()
            .with_separator(';')
            .import_flat("f1\na,b,c\n".as_bytes(), &schema, |r| got.push(r))
            .unwrap();
        let Some(crate::schema::record::Value::StringArray(values)) = got[0].by_name("f1") else {
            panic!("expected a string array");
        };
        assert_eq!(values, &["a", "b", "c"]);
    }
}

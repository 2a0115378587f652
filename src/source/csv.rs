//! CSV row source with encoding and delimiter auto-detection.

use std::io::{Cursor, Read};

use crate::error::{CsvError, CsvResult};

use super::{Cell, Row};

// =============================================================================
// Auto-detection
// =============================================================================

/// Detect the character encoding of raw bytes.
///
/// chardet's guess is folded onto the canonical names [`decode`] understands
/// (`utf-8`, `iso-8859-1`, `windows-1252`); any other charset passes through
/// under the name chardet reported.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let (charset, _, _) = chardet::detect(bytes);
    canonical_charset(&charset).unwrap_or(charset)
}

fn canonical_charset(charset: &str) -> Option<String> {
    let lower = charset.to_ascii_lowercase();
    let families: [(&str, &[&str]); 3] = [
        ("utf-8", &["ascii", "utf-8", "utf8"]),
        ("iso-8859-1", &["iso-8859-1", "iso-8859-15", "latin-1", "latin1"]),
        ("windows-1252", &["windows-1252", "cp1252"]),
    ];
    families
        .iter()
        .find(|(_, aliases)| aliases.contains(&lower.as_str()))
        .map(|(canonical, _)| canonical.to_string())
}

/// Decode bytes to a string using the given encoding; strips a UTF-8 BOM.
pub fn decode(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8_lossy(bytes).to_string(),
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.to_string(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.to_string(),
        _ => String::from_utf8_lossy(bytes).to_string(),
    };
    Ok(decoded)
}

/// Pick the candidate delimiter occurring most often in the first line.
///
/// Ties keep the earlier candidate, so an empty or delimiter-free line
/// falls back to `;`.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");
    [';', ',', '\t', '|']
        .into_iter()
        .map(|sep| (sep, first_line.matches(sep).count()))
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
        .map(|(sep, _)| sep)
        .unwrap_or(';')
}

// =============================================================================
// Row source
// =============================================================================

/// Streams [`Row`]s out of CSV content.
///
/// Quoting and embedded newlines are handled by the `csv` crate; rows may
/// have uneven cell counts. The source does not interpret header rows; the
/// import layer decides whether the first row names columns.
pub struct CsvRowSource<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    fallback_line: usize,
}

impl CsvRowSource<Cursor<Vec<u8>>> {
    /// Build a source over raw bytes with encoding and delimiter detection.
    ///
    /// Returns the source plus the detected `(encoding, delimiter)`.
    pub fn from_bytes_auto(bytes: &[u8]) -> CsvResult<(Self, String, char)> {
        if bytes.is_empty() {
            return Err(CsvError::EmptyInput);
        }
        let encoding = detect_encoding(bytes);
        let content = decode(bytes, &encoding)?;
        let delimiter = detect_delimiter(&content);
        let source = CsvRowSource::from_reader(
            Cursor::new(content.into_bytes()),
            delimiter as u8,
            Some(b'"'),
        );
        Ok((source, encoding, delimiter))
    }
}

impl<R: Read> CsvRowSource<R> {
    /// Build a source with an explicit delimiter; `quote: None` disables
    /// quote handling entirely.
    pub fn from_reader(reader: R, delimiter: u8, quote: Option<u8>) -> Self {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true);
        match quote {
            Some(q) => {
                builder.quote(q).double_quote(true);
            }
            None => {
                builder.quoting(false);
            }
        }
        Self {
            records: builder.from_reader(reader).into_records(),
            fallback_line: 0,
        }
    }
}

impl<R: Read> Iterator for CsvRowSource<R> {
    type Item = CsvResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(self.fallback_line + 1);
                return Some(Err(CsvError::Parse {
                    line,
                    message: e.to_string(),
                }));
            }
        };
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(self.fallback_line + 1);
        self.fallback_line = line;

        // Blank lines come through as a single empty cell; skip them.
        if record.len() == 1 && record.get(0).map(str::is_empty).unwrap_or(true) {
            return self.next();
        }

        let cells = record
            .iter()
            .map(|s| Cell::Text(s.to_string()))
            .collect();
        Some(Ok(Row::new(line, cells)))
    }
}

/// Split a caller-provided header line on the delimiter.
pub(crate) fn split_header_line(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter)
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect()
}

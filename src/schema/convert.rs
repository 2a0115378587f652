//! Cell-to-value conversion, one match per field kind.
//!
//! This is the single place where raw string cells become typed [`Value`]s;
//! both the flat row readers and the break assembler go through it. The
//! reverse direction (value to text) lives in the export writer.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};

use super::record::Value;
use super::{Field, FieldKind};

/// Default parse/render pattern for dates.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
/// Default parse/render pattern for date-times.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Compiled string-to-value parser for one scalar field.
///
/// Empty input never fails: it yields `None`, or an empty string when the
/// field opted into `empty_is_value`. A non-empty cell that does not parse
/// is an error carrying only the message; callers attach line/column context.
#[derive(Debug, Clone)]
pub(crate) enum CellParser {
    String { empty_is_value: bool },
    Integer,
    Long,
    Double,
    Boolean,
    Date { format: String },
    DateTime { format: String, zone: FixedOffset },
    StringArray { separator: char },
}

impl CellParser {
    /// Build the parser for a scalar field, honoring its metadata.
    ///
    /// Nested kinds have no cell representation; callers split those out
    /// before reaching for a parser.
    pub fn for_field(field: &Field) -> Self {
        match &field.kind {
            FieldKind::String => CellParser::String {
                empty_is_value: field.meta.empty_is_value,
            },
            FieldKind::Integer => CellParser::Integer,
            FieldKind::Long => CellParser::Long,
            FieldKind::Double => CellParser::Double,
            FieldKind::Boolean => CellParser::Boolean,
            FieldKind::Date => CellParser::Date {
                format: field
                    .meta
                    .date_format
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string()),
            },
            FieldKind::DateTime => CellParser::DateTime {
                format: field
                    .meta
                    .date_format
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DATETIME_FORMAT.to_string()),
                zone: field.meta.zone.unwrap_or_else(utc_offset),
            },
            FieldKind::StringArray => CellParser::StringArray {
                separator: field.meta.array_separator.unwrap_or(','),
            },
            FieldKind::Record(_) | FieldKind::RecordArray(_) => CellParser::String {
                empty_is_value: false,
            },
        }
    }

    pub fn parse(&self, raw: &str) -> Result<Option<Value>, String> {
        if raw.is_empty() {
            return Ok(match self {
                CellParser::String {
                    empty_is_value: true,
                } => Some(Value::String(String::new())),
                _ => None,
            });
        }
        match self {
            CellParser::String { .. } => Ok(Some(Value::String(raw.to_string()))),
            CellParser::Integer => strip_zero_fraction(raw.trim())
                .parse::<i32>()
                .map(|v| Some(Value::Integer(v)))
                .map_err(|e| e.to_string()),
            CellParser::Long => strip_zero_fraction(raw.trim())
                .parse::<i64>()
                .map(|v| Some(Value::Long(v)))
                .map_err(|e| e.to_string()),
            CellParser::Double => raw
                .trim()
                .parse::<f64>()
                .map(|v| Some(Value::Double(v)))
                .map_err(|e| e.to_string()),
            CellParser::Boolean => {
                let v = raw.trim();
                Ok(Some(Value::Boolean(
                    v.eq_ignore_ascii_case("true") || v == "1",
                )))
            }
            CellParser::Date { format } => NaiveDate::parse_from_str(raw.trim(), format)
                .map(|d| Some(Value::Date(d)))
                .map_err(|e| e.to_string()),
            CellParser::DateTime { format, zone } => parse_datetime(raw.trim(), format, *zone)
                .map(|dt| Some(Value::DateTime(dt))),
            CellParser::StringArray { separator } => Ok(Some(Value::StringArray(
                raw.split(*separator).map(|s| s.trim().to_string()).collect(),
            ))),
        }
    }
}

/// Spreadsheet exports commonly render integers as `123.0`; accept that.
fn strip_zero_fraction(raw: &str) -> &str {
    match raw.find('.') {
        Some(dot) if raw[dot + 1..].chars().all(|c| c == '0') => &raw[..dot],
        _ => raw,
    }
}

/// Parse a date-time, accepting progressively less precise inputs: a zoned
/// date-time, a local date-time in `zone`, or a bare date at midnight.
fn parse_datetime(
    raw: &str,
    format: &str,
    zone: FixedOffset,
) -> Result<DateTime<FixedOffset>, String> {
    if let Ok(dt) = DateTime::parse_from_str(raw, format) {
        return Ok(dt);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
        return zone
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| format!("ambiguous local time '{}'", raw));
    }
    match NaiveDate::parse_from_str(raw, format) {
        Ok(date) => {
            let naive = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
            zone.from_local_datetime(&naive)
                .single()
                .ok_or_else(|| format!("ambiguous local time '{}'", raw))
        }
        Err(e) => Err(e.to_string()),
    }
}

pub(crate) fn utc_offset() -> FixedOffset {
    FixedOffset::east_opt(0).expect("zero offset is valid")
}

// =============================================================================
// Number patterns
// =============================================================================

/// A `#`/`0` fraction pattern such as `###.#########`.
///
/// `#` digits after the dot are emitted only when needed, `0` digits always.
/// The integer part is rendered plainly (no grouping).
#[derive(Debug, Clone)]
pub(crate) struct NumberPattern {
    min_frac: usize,
    max_frac: usize,
}

impl NumberPattern {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let frac = match pattern.find('.') {
            Some(dot) => &pattern[dot + 1..],
            None => "",
        };
        if frac.chars().any(|c| c != '#' && c != '0') {
            return Err(format!("unsupported fraction pattern '{}'", pattern));
        }
        Ok(Self {
            min_frac: frac.chars().filter(|c| *c == '0').count(),
            max_frac: frac.len(),
        })
    }

    pub fn format(&self, value: f64, decimal_separator: char) -> String {
        let mut out = format!("{:.*}", self.max_frac, value);
        if self.max_frac > 0 {
            // trim the optional ('#') fraction digits when they are zero
            let dot = out.find('.').expect("fractional format always has a dot");
            let min_len = if self.min_frac == 0 {
                dot
            } else {
                dot + 1 + self.min_frac
            };
            while out.len() > min_len && out.ends_with('0') {
                out.pop();
            }
            if out.ends_with('.') {
                out.pop();
            }
        }
        if decimal_separator != '.' {
            out = out.replace('.', &decimal_separator.to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldMeta, Schema};
    use chrono::Utc;

    fn parser(kind: FieldKind, meta: FieldMeta) -> CellParser {
        let schema = Schema::builder("t").field_with("f", kind, meta).build().unwrap();
        CellParser::for_field(schema.field(0))
    }

    #[test]
    fn test_integer_strips_zero_fraction() {
        let p = parser(FieldKind::Integer, FieldMeta::default());
        assert_eq!(p.parse("42").unwrap(), Some(Value::Integer(42)));
        assert_eq!(p.parse(" 2 ").unwrap(), Some(Value::Integer(2)));
        assert_eq!(p.parse("7.000").unwrap(), Some(Value::Integer(7)));
        assert!(p.parse("7.5").is_err());
        assert!(p.parse("abc").is_err());
    }

    #[test]
    fn test_empty_cell_behavior() {
        let unset = parser(FieldKind::String, FieldMeta::default());
        assert_eq!(unset.parse("").unwrap(), None);

        let empty = parser(FieldKind::String, FieldMeta::new().empty_is_value());
        assert_eq!(empty.parse("").unwrap(), Some(Value::String(String::new())));

        let int = parser(FieldKind::Integer, FieldMeta::default());
        assert_eq!(int.parse("").unwrap(), None);
    }

    #[test]
    fn test_boolean() {
        let p = parser(FieldKind::Boolean, FieldMeta::default());
        assert_eq!(p.parse("TRUE").unwrap(), Some(Value::Boolean(true)));
        assert_eq!(p.parse("1").unwrap(), Some(Value::Boolean(true)));
        assert_eq!(p.parse("0").unwrap(), Some(Value::Boolean(false)));
        assert_eq!(p.parse("anything").unwrap(), Some(Value::Boolean(false)));
    }

    #[test]
    fn test_date_with_pattern() {
        let p = parser(
            FieldKind::Date,
            FieldMeta::new().with_date_format("%Y%m%d"),
        );
        assert_eq!(
            p.parse("20201130").unwrap(),
            Some(Value::Date(NaiveDate::from_ymd_opt(2020, 11, 30).unwrap()))
        );
    }

    #[test]
    fn test_datetime_accepts_bare_date() {
        let zone = FixedOffset::east_opt(3600).unwrap();
        let p = parser(
            FieldKind::DateTime,
            FieldMeta::new().with_date_format("%Y%m%d").with_zone(zone),
        );
        let Some(Value::DateTime(dt)) = p.parse("20201130").unwrap() else {
            panic!("expected a date-time");
        };
        assert_eq!(dt.offset(), &zone);
        // Midnight in +01:00 is still the previous day in UTC.
        assert_eq!(dt.with_timezone(&Utc).format("%Y-%m-%d").to_string(), "2020-11-29");
    }

    #[test]
    fn test_datetime_with_time() {
        let p = parser(
            FieldKind::DateTime,
            FieldMeta::new().with_date_format("%Y%m%d %H%M%S"),
        );
        let Some(Value::DateTime(dt)) = p.parse("20201130 223200").unwrap() else {
            panic!("expected a date-time");
        };
        assert_eq!(dt.format("%H:%M").to_string(), "22:32");
    }

    #[test]
    fn test_string_array_split() {
        let p = parser(FieldKind::StringArray, FieldMeta::default());
        assert_eq!(
            p.parse("a,b,c").unwrap(),
            Some(Value::StringArray(vec!["a".into(), "b".into(), "c".into()]))
        );
    }

    #[test]
    fn test_number_pattern() {
        let p = NumberPattern::parse("###.#########").unwrap();
        assert_eq!(p.format(3.14, '.'), "3.14");
        assert_eq!(p.format(3.0, '.'), "3");
        assert_eq!(p.format(0.123456789123, '.'), "0.123456789");

        let two = NumberPattern::parse("###.00").unwrap();
        assert_eq!(two.format(3.0, '.'), "3.00");
        assert_eq!(two.format(1.5, ','), "1,50");

        let plain = NumberPattern::parse("###").unwrap();
        assert_eq!(plain.format(3.7, '.'), "4");
    }
}

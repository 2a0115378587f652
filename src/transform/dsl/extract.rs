//! Compiled extraction: one source field to a formatted string.

use std::sync::Arc;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::convert::{NumberPattern, DEFAULT_DATETIME_FORMAT, DEFAULT_DATE_FORMAT};
use crate::schema::record::{render_double, Record, Value};
use crate::schema::{FieldKind, Schema};

use super::{FieldRef, FormatRule};

// =============================================================================
// Formatter chain
// =============================================================================

/// Ordered regex rewrite steps.
///
/// Each step runs a global substitution on the current string; a value the
/// pattern does not match passes through that step unchanged.
#[derive(Debug)]
pub(crate) struct FormatterChain {
    steps: Vec<(Regex, String)>,
}

impl FormatterChain {
    pub fn compile(rules: &[FormatRule]) -> Result<Self, ConfigError> {
        let mut steps = Vec::with_capacity(rules.len());
        for rule in rules {
            let regex = Regex::new(&rule.pattern).map_err(|e| ConfigError::BadPattern {
                pattern: rule.pattern.clone(),
                message: e.to_string(),
            })?;
            steps.push((regex, rule.replace.clone()));
        }
        Ok(Self { steps })
    }

    pub fn apply(&self, mut value: String) -> String {
        for (regex, replace) in &self.steps {
            value = regex.replace_all(&value, replace.as_str()).into_owned();
        }
        value
    }
}

// =============================================================================
// Extractor
// =============================================================================

/// Stringification strategy, resolved once from the source field's kind.
#[derive(Debug)]
enum Stringify {
    Text,
    Integer { pattern: Option<NumberPattern> },
    Double { pattern: Option<NumberPattern>, separator: char },
    Boolean,
    Date { format: String },
    DateTime { format: String },
    Array { separator: char },
}

/// Compiled extraction of one source field.
#[derive(Debug)]
pub(crate) struct Extractor {
    index: usize,
    field_name: String,
    stringify: Stringify,
    default_if_empty: Option<String>,
    chain: FormatterChain,
}

impl Extractor {
    /// Resolve the source field and compile the output formatting.
    pub fn compile(source: &Arc<Schema>, spec: &FieldRef) -> Result<Self, ConfigError> {
        let index = source.require(&spec.from)?;
        let field = source.field(index);
        let stringify = match &field.kind {
            FieldKind::String => Stringify::Text,
            FieldKind::Integer | FieldKind::Long => Stringify::Integer {
                pattern: compile_number(spec.format.as_deref())?,
            },
            FieldKind::Double => Stringify::Double {
                pattern: compile_number(spec.format.as_deref())?,
                separator: field.meta.decimal_separator.unwrap_or('.'),
            },
            FieldKind::Boolean => Stringify::Boolean,
            FieldKind::Date => Stringify::Date {
                format: spec
                    .format
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string()),
            },
            FieldKind::DateTime => Stringify::DateTime {
                format: spec
                    .format
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DATETIME_FORMAT.to_string()),
            },
            FieldKind::StringArray => Stringify::Array {
                separator: field.meta.array_separator.unwrap_or(','),
            },
            FieldKind::Record(_) | FieldKind::RecordArray(_) => {
                return Err(ConfigError::UnknownField {
                    schema: source.name().to_string(),
                    field: spec.from.clone(),
                })
            }
        };
        Ok(Self {
            index,
            field_name: spec.from.clone(),
            stringify,
            default_if_empty: spec.default_if_empty.clone(),
            chain: FormatterChain::compile(&spec.formatters)?,
        })
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Extract the formatted string; `None` when the value is absent and no
    /// default is configured.
    pub fn extract(&self, record: &Record) -> Option<String> {
        let value = record.get(self.index);
        let raw = match (value, &self.stringify) {
            (None, _) => return self.default_if_empty.clone(),
            // an empty string counts as absent
            (Some(Value::String(s)), Stringify::Text) if s.is_empty() => {
                return self.default_if_empty.clone()
            }
            (Some(Value::String(s)), Stringify::Text) => s.clone(),
            (Some(Value::Integer(i)), Stringify::Integer { pattern }) => match pattern {
                Some(p) => p.format(f64::from(*i), '.'),
                None => i.to_string(),
            },
            (Some(Value::Long(l)), Stringify::Integer { pattern }) => match pattern {
                Some(p) => p.format(*l as f64, '.'),
                None => l.to_string(),
            },
            (Some(Value::Double(d)), Stringify::Double { pattern, separator }) => match pattern {
                Some(p) => p.format(*d, *separator),
                None => render_double(*d),
            },
            (Some(Value::Boolean(b)), Stringify::Boolean) => b.to_string(),
            (Some(Value::Date(d)), Stringify::Date { format }) => d.format(format).to_string(),
            (Some(Value::DateTime(dt)), Stringify::DateTime { format }) => {
                dt.format(format).to_string()
            }
            (Some(Value::StringArray(items)), Stringify::Array { separator }) => {
                items.join(&separator.to_string())
            }
            // Kind drifted from the compile-time schema; render generically.
            (Some(other), _) => other.render(),
        };
        Some(self.chain.apply(raw))
    }
}

fn compile_number(format: Option<&str>) -> Result<Option<NumberPattern>, ConfigError> {
    match format {
        None => Ok(None),
        Some(pattern) => NumberPattern::parse(pattern)
            .map(Some)
            .map_err(|message| ConfigError::BadPattern {
                pattern: pattern.to_string(),
                message,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::record::Record;
    use crate::schema::{FieldKind, Schema};
    use chrono::NaiveDate;

    fn source() -> Arc<Schema> {
        Schema::builder("line")
            .field("a", FieldKind::String)
            .field("n", FieldKind::Double)
            .field("d", FieldKind::Date)
            .build()
            .unwrap()
    }

    #[test]
    fn test_formatter_chain_rewrites() {
        let extractor = Extractor::compile(
            &source(),
            &FieldRef::new("a").with_formatter("^(.*)-(.*)", "$1_$2"),
        )
        .unwrap();

        let mut record = Record::new(source());
        record.set_string("a", "aa-xx");
        assert_eq!(extractor.extract(&record), Some("aa_xx".to_string()));
    }

    #[test]
    fn test_formatter_chain_passes_through_non_match() {
        let extractor = Extractor::compile(
            &source(),
            &FieldRef::new("a").with_formatter("^[0-9]+$", "N"),
        )
        .unwrap();

        let mut record = Record::new(source());
        record.set_string("a", "not a number");
        assert_eq!(extractor.extract(&record), Some("not a number".to_string()));
    }

    #[test]
    fn test_empty_uses_default() {
        let extractor =
            Extractor::compile(&source(), &FieldRef::new("a").with_default("missing")).unwrap();

        let mut record = Record::new(source());
        assert_eq!(extractor.extract(&record), Some("missing".to_string()));

        record.set_string("a", "");
        assert_eq!(extractor.extract(&record), Some("missing".to_string()));

        record.set_string("a", "present");
        assert_eq!(extractor.extract(&record), Some("present".to_string()));
    }

    #[test]
    fn test_absent_without_default_is_none() {
        let extractor = Extractor::compile(&source(), &FieldRef::new("a")).unwrap();
        let record = Record::new(source());
        assert_eq!(extractor.extract(&record), None);
    }

    #[test]
    fn test_double_pattern() {
        let extractor = Extractor::compile(
            &source(),
            &FieldRef::new("n").with_format("###.##"),
        )
        .unwrap();

        let mut record = Record::new(source());
        record.set_by_name("n", Value::Double(1.456));
        assert_eq!(extractor.extract(&record), Some("1.46".to_string()));
    }

    #[test]
    fn test_date_format() {
        let extractor = Extractor::compile(
            &source(),
            &FieldRef::new("d").with_format("%d/%m/%Y"),
        )
        .unwrap();

        let mut record = Record::new(source());
        record.set_by_name("d", Value::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()));
        assert_eq!(extractor.extract(&record), Some("15/03/2024".to_string()));
    }

    #[test]
    fn test_unknown_field_is_config_error() {
        let result = Extractor::compile(&source(), &FieldRef::new("nope"));
        assert!(matches!(result, Err(ConfigError::UnknownField { .. })));
    }

    #[test]
    fn test_bad_regex_is_config_error() {
        let result = Extractor::compile(&source(), &FieldRef::new("a").with_formatter("(", ""));
        assert!(matches!(result, Err(ConfigError::BadPattern { .. })));
    }
}

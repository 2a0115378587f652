//! Compiled merger variants.
//!
//! A merger produces one output field's string value from zero or more
//! extractions. Compilation happens once, at reformater build time; merging
//! is pure and holds no per-stream state.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ConfigError, RowError};
use crate::schema::record::{render_double, Record};
use crate::schema::Schema;
use crate::transform::reformat::{OverrideResolver, VariableResolver};

use super::extract::Extractor;

/// `{name}` placeholders in templates.
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[^{}]*\}").expect("placeholder pattern is valid"));

// =============================================================================
// Mergers
// =============================================================================

pub(crate) enum Merger {
    Field(Extractor),
    Template {
        tokens: Vec<Token>,
        no_value_if_missing: bool,
    },
    Lookup {
        extractor: Extractor,
        mapping: HashMap<String, String>,
        copy_if_no_match: bool,
        default_if_no_match: Option<String>,
    },
    Join {
        extractors: Vec<Extractor>,
        separator: String,
        first: String,
        add_first_if_empty: bool,
        last: String,
        add_last_if_empty: bool,
    },
    Sum {
        extractors: Vec<Extractor>,
    },
    Override {
        field: String,
        extractors: Vec<Extractor>,
        resolver: Arc<dyn OverrideResolver>,
    },
}

/// One segment of a compiled template.
pub(crate) enum Token {
    Literal(String),
    Extract(Arc<Extractor>),
    RawField(usize),
    Variable {
        name: String,
        resolver: Arc<dyn VariableResolver>,
    },
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            Token::Extract(e) => f.debug_tuple("Extract").field(e).finish(),
            Token::RawField(i) => f.debug_tuple("RawField").field(i).finish(),
            Token::Variable { name, .. } => {
                f.debug_struct("Variable").field("name", name).finish()
            }
        }
    }
}

impl Token {
    fn resolve(&self, record: &Record) -> String {
        match self {
            Token::Literal(text) => text.clone(),
            Token::Extract(extractor) => extractor.extract(record).unwrap_or_default(),
            Token::RawField(index) => record
                .get(*index)
                .map(|v| v.render())
                .unwrap_or_default(),
            Token::Variable { name, resolver } => {
                resolver.get(name, record).unwrap_or_default()
            }
        }
    }
}

impl Merger {
    pub fn merge(&self, record: &Record) -> Result<Option<String>, RowError> {
        match self {
            Merger::Field(extractor) => Ok(extractor.extract(record)),

            Merger::Template {
                tokens,
                no_value_if_missing,
            } => {
                let mut out = String::new();
                for token in tokens {
                    let segment = token.resolve(record);
                    if segment.is_empty() && *no_value_if_missing {
                        return Ok(None);
                    }
                    out.push_str(&segment);
                }
                Ok(Some(out))
            }

            Merger::Lookup {
                extractor,
                mapping,
                copy_if_no_match,
                default_if_no_match,
            } => {
                let Some(key) = extractor.extract(record) else {
                    return Ok(None);
                };
                match mapping.get(&key) {
                    Some(mapped) => Ok(Some(mapped.clone())),
                    None if *copy_if_no_match => Ok(Some(key)),
                    None => Ok(default_if_no_match
                        .as_ref()
                        .filter(|d| !d.is_empty())
                        .cloned()),
                }
            }

            Merger::Join {
                extractors,
                separator,
                first,
                add_first_if_empty,
                last,
                add_last_if_empty,
            } => {
                let mut out = String::new();
                for extractor in extractors {
                    let Some(value) = extractor.extract(record) else {
                        continue;
                    };
                    if value.is_empty() {
                        continue;
                    }
                    if out.is_empty() {
                        out.push_str(first);
                    } else {
                        out.push_str(separator);
                    }
                    out.push_str(&value);
                }
                if out.is_empty() {
                    if *add_first_if_empty {
                        out.push_str(first);
                    }
                    if *add_last_if_empty {
                        out.push_str(last);
                    }
                } else {
                    out.push_str(last);
                }
                Ok(if out.is_empty() { None } else { Some(out) })
            }

            Merger::Sum { extractors } => {
                let mut total = 0.0;
                for extractor in extractors {
                    let Some(value) = extractor.extract(record) else {
                        continue;
                    };
                    if value.is_empty() {
                        continue;
                    }
                    total += value.parse::<f64>().map_err(|e| {
                        RowError::new(format!("not a number in sum: {}", e))
                            .with_column(extractor.field_name().to_string())
                            .with_value(value.clone())
                    })?;
                }
                Ok(Some(render_double(total)))
            }

            Merger::Override {
                field,
                extractors,
                resolver,
            } => {
                let inputs: Vec<Option<String>> =
                    extractors.iter().map(|e| e.extract(record)).collect();
                resolver.get(field, &inputs, record)
            }
        }
    }
}

// =============================================================================
// Template compilation
// =============================================================================

/// Split a template into literal and placeholder tokens.
///
/// Placeholder resolution priority: renamed local extraction, then raw source
/// field, then external variable. An unresolved name fails construction.
pub(crate) fn compile_template(
    source: &Arc<Schema>,
    template: &str,
    extractions: HashMap<String, Arc<Extractor>>,
    variables: &HashMap<String, Arc<dyn VariableResolver>>,
) -> Result<Vec<Token>, ConfigError> {
    let mut tokens = Vec::new();
    let mut cursor = 0;
    for found in PLACEHOLDER.find_iter(template) {
        if found.start() > cursor {
            tokens.push(Token::Literal(template[cursor..found.start()].to_string()));
        }
        let name = &template[found.start() + 1..found.end() - 1];
        if let Some(extractor) = extractions.get(name) {
            tokens.push(Token::Extract(Arc::clone(extractor)));
        } else if let Some(index) = source.index_of(name) {
            tokens.push(Token::RawField(index));
        } else if let Some(resolver) = variables.get(name) {
            tokens.push(Token::Variable {
                name: name.to_string(),
                resolver: Arc::clone(resolver),
            });
        } else {
            return Err(ConfigError::UnresolvedPlaceholder {
                template: template.to_string(),
                name: name.to_string(),
            });
        }
        cursor = found.end();
    }
    if cursor < template.len() {
        tokens.push(Token::Literal(template[cursor..].to_string()));
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, Schema};
    use crate::transform::dsl::FieldRef;

    fn source() -> Arc<Schema> {
        Schema::builder("line")
            .field("a", FieldKind::String)
            .field("b", FieldKind::String)
            .field("value1", FieldKind::String)
            .field("value2", FieldKind::String)
            .build()
            .unwrap()
    }

    fn record(pairs: &[(&str, &str)]) -> Record {
        let mut record = Record::new(source());
        for (name, value) in pairs {
            record.set_string(name, *value);
        }
        record
    }

    fn extractor(name: &str) -> Extractor {
        Extractor::compile(&source(), &FieldRef::new(name)).unwrap()
    }

    #[test]
    fn test_sum() {
        let merger = Merger::Sum {
            extractors: vec![extractor("value1"), extractor("value2")],
        };
        let got = merger.merge(&record(&[("value1", "1.1"), ("value2", "2.04")])).unwrap();
        assert_eq!(got, Some("3.14".to_string()));
    }

    #[test]
    fn test_sum_of_nothing_is_zero() {
        let merger = Merger::Sum {
            extractors: vec![extractor("value1"), extractor("value2")],
        };
        assert_eq!(merger.merge(&record(&[])).unwrap(), Some("0.0".to_string()));
    }

    #[test]
    fn test_sum_rejects_garbage() {
        let merger = Merger::Sum {
            extractors: vec![extractor("value1")],
        };
        let err = merger.merge(&record(&[("value1", "abc")])).unwrap_err();
        assert!(err.to_string().contains("value1"));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_join_skips_empty() {
        let merger = Merger::Join {
            extractors: vec![extractor("a"), extractor("value1"), extractor("b")],
            separator: "-".to_string(),
            first: String::new(),
            add_first_if_empty: false,
            last: String::new(),
            add_last_if_empty: false,
        };
        let got = merger.merge(&record(&[("a", "A"), ("b", "B")])).unwrap();
        assert_eq!(got, Some("A-B".to_string()));
    }

    #[test]
    fn test_join_first_literal_when_all_empty() {
        let merger = Merger::Join {
            extractors: vec![extractor("a"), extractor("b")],
            separator: "-".to_string(),
            first: "X".to_string(),
            add_first_if_empty: true,
            last: String::new(),
            add_last_if_empty: false,
        };
        assert_eq!(merger.merge(&record(&[])).unwrap(), Some("X".to_string()));

        let silent = Merger::Join {
            extractors: vec![extractor("a"), extractor("b")],
            separator: "-".to_string(),
            first: "X".to_string(),
            add_first_if_empty: false,
            last: String::new(),
            add_last_if_empty: false,
        };
        assert_eq!(silent.merge(&record(&[])).unwrap(), None);
    }

    #[test]
    fn test_join_wraps_values() {
        let merger = Merger::Join {
            extractors: vec![extractor("a"), extractor("b")],
            separator: ", ".to_string(),
            first: "[".to_string(),
            add_first_if_empty: false,
            last: "]".to_string(),
            add_last_if_empty: false,
        };
        let got = merger.merge(&record(&[("a", "x"), ("b", "y")])).unwrap();
        assert_eq!(got, Some("[x, y]".to_string()));
    }

    #[test]
    fn test_lookup_pass_through() {
        let merger = Merger::Lookup {
            extractor: extractor("a"),
            mapping: HashMap::from([("toto".to_string(), "titi".to_string())]),
            copy_if_no_match: true,
            default_if_no_match: None,
        };
        assert_eq!(
            merger.merge(&record(&[("a", "toto")])).unwrap(),
            Some("titi".to_string())
        );
        assert_eq!(
            merger.merge(&record(&[("a", "other")])).unwrap(),
            Some("other".to_string())
        );
    }

    #[test]
    fn test_lookup_fallback_mode() {
        let merger = Merger::Lookup {
            extractor: extractor("a"),
            mapping: HashMap::from([("toto".to_string(), "titi".to_string())]),
            copy_if_no_match: false,
            default_if_no_match: Some("unknown".to_string()),
        };
        assert_eq!(
            merger.merge(&record(&[("a", "other")])).unwrap(),
            Some("unknown".to_string())
        );

        let no_default = Merger::Lookup {
            extractor: extractor("a"),
            mapping: HashMap::new(),
            copy_if_no_match: false,
            default_if_no_match: None,
        };
        assert_eq!(no_default.merge(&record(&[("a", "other")])).unwrap(), None);
    }

    #[test]
    fn test_template_tokens() {
        let extractions = HashMap::from([("d".to_string(), Arc::new(extractor("b")))]);
        let tokens = compile_template(&source(), "{d}_{b} and {a}", extractions, &HashMap::new())
            .unwrap();
        let merger = Merger::Template {
            tokens,
            no_value_if_missing: false,
        };
        let got = merger
            .merge(&record(&[("a", "c"), ("b", "bb")]))
            .unwrap();
        assert_eq!(got, Some("bb_bb and c".to_string()));
    }

    #[test]
    fn test_template_short_circuit() {
        let tokens =
            compile_template(&source(), "{a}-{b}", HashMap::new(), &HashMap::new()).unwrap();
        let merger = Merger::Template {
            tokens,
            no_value_if_missing: true,
        };
        assert_eq!(merger.merge(&record(&[("a", "x")])).unwrap(), None);

        let tokens =
            compile_template(&source(), "{a}-{b}", HashMap::new(), &HashMap::new()).unwrap();
        let merger = Merger::Template {
            tokens,
            no_value_if_missing: false,
        };
        assert_eq!(
            merger.merge(&record(&[("a", "x")])).unwrap(),
            Some("x-".to_string())
        );
    }

    #[test]
    fn test_template_unresolved_placeholder() {
        let err = compile_template(&source(), "{nope}", HashMap::new(), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedPlaceholder { .. }));
    }

    #[test]
    fn test_template_equivalent_tokenizations() {
        // Same literal content split differently across segments.
        let one = compile_template(&source(), "x{a}y{b}z", HashMap::new(), &HashMap::new())
            .unwrap();
        let record = record(&[("a", "1"), ("b", "2")]);
        let merged = Merger::Template {
            tokens: one,
            no_value_if_missing: false,
        }
        .merge(&record)
        .unwrap();
        assert_eq!(merged, Some("x1y2z".to_string()));
    }
}

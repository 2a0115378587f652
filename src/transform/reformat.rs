//! The reformater: output schema derivation plus per-record transformation.
//!
//! Built once from a source schema and an ordered rule list; the compiled
//! rule list is immutable afterwards, so one instance can serve any number
//! of independent record streams.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ConfigError, RowError};
use crate::schema::record::{Record, Value};
use crate::schema::{FieldKind, Schema};

use super::dsl::extract::Extractor;
use super::dsl::merge::{compile_template, Merger};
use super::dsl::{MappingRule, MappingSource};

// =============================================================================
// External resolvers
// =============================================================================

/// Supplies values for template placeholders that are neither local
/// extractions nor source-schema fields.
pub trait VariableResolver: Send + Sync {
    fn get(&self, name: &str, record: &Record) -> Option<String>;
}

impl<F> VariableResolver for F
where
    F: Fn(&str, &Record) -> Option<String> + Send + Sync,
{
    fn get(&self, name: &str, record: &Record) -> Option<String> {
        self(name, record)
    }
}

/// Pluggable resolver behind [`MappingSource::Override`] rules.
pub trait OverrideResolver: Send + Sync {
    fn get(
        &self,
        field: &str,
        inputs: &[Option<String>],
        record: &Record,
    ) -> Result<Option<String>, RowError>;
}

/// Creates [`OverrideResolver`]s at build time, by name plus parameters.
pub trait OverrideResolverFactory: Send + Sync {
    fn create(
        &self,
        field: &str,
        source: &Arc<Schema>,
        name: &str,
        params: &serde_json::Value,
    ) -> Arc<dyn OverrideResolver>;
}

/// Fallback factory: resolution is deferred, so the error surfaces on the
/// first record that reaches the override rule, with the record rendered in
/// the message.
struct NoResolverFactory;

struct NoResolver {
    name: String,
}

impl OverrideResolverFactory for NoResolverFactory {
    fn create(
        &self,
        _field: &str,
        _source: &Arc<Schema>,
        name: &str,
        _params: &serde_json::Value,
    ) -> Arc<dyn OverrideResolver> {
        Arc::new(NoResolver {
            name: name.to_string(),
        })
    }
}

impl OverrideResolver for NoResolver {
    fn get(
        &self,
        field: &str,
        _inputs: &[Option<String>],
        record: &Record,
    ) -> Result<Option<String>, RowError> {
        Err(RowError::new(format!(
            "no resolver registered for '{}' on field '{}', record {}",
            self.name,
            field,
            record.to_json()
        ))
        .with_column(field.to_string()))
    }
}

// =============================================================================
// Reformater
// =============================================================================

enum Step {
    Copy { from: usize, to: usize },
    Merge { to: usize, merger: Merger },
}

/// Applies an ordered list of compiled mapping rules to records.
pub struct Reformater {
    output: Arc<Schema>,
    steps: Vec<Step>,
}

/// Builder carrying the optional collaborators.
pub struct ReformaterBuilder {
    source: Arc<Schema>,
    rules: Vec<MappingRule>,
    carry_source: bool,
    variables: HashMap<String, Arc<dyn VariableResolver>>,
    override_factory: Arc<dyn OverrideResolverFactory>,
}

impl Reformater {
    /// Compile a rule list against a source schema.
    pub fn new(source: Arc<Schema>, rules: Vec<MappingRule>) -> Result<Self, ConfigError> {
        Self::builder(source, rules).build()
    }

    pub fn builder(source: Arc<Schema>, rules: Vec<MappingRule>) -> ReformaterBuilder {
        ReformaterBuilder {
            source,
            rules,
            carry_source: false,
            variables: HashMap::new(),
            override_factory: Arc::new(NoResolverFactory),
        }
    }

    /// The derived output schema.
    pub fn output_schema(&self) -> &Arc<Schema> {
        &self.output
    }

    /// Transform one record.
    ///
    /// Sets exactly the output fields whose merger produced a value; a `None`
    /// merge result leaves its field unset, which is observably different
    /// from an empty string downstream.
    pub fn transform(&self, from: &Record) -> Result<Record, RowError> {
        let mut out = Record::new(Arc::clone(&self.output));
        for step in &self.steps {
            match step {
                Step::Copy { from: src, to } => {
                    if let Some(value) = from.get(*src) {
                        out.set(*to, value.clone());
                    }
                }
                Step::Merge { to, merger } => {
                    if let Some(value) = merger.merge(from)? {
                        out.set(*to, Value::String(value));
                    }
                }
            }
        }
        Ok(out)
    }
}

impl ReformaterBuilder {
    /// Copy every source field, unchanged, into the output schema first.
    pub fn carry_source(mut self, carry: bool) -> Self {
        self.carry_source = carry;
        self
    }

    /// Register an external variable for template placeholders.
    pub fn variable(mut self, name: impl Into<String>, resolver: Arc<dyn VariableResolver>) -> Self {
        self.variables.insert(name.into(), resolver);
        self
    }

    /// Register the factory backing override rules.
    pub fn override_factory(mut self, factory: Arc<dyn OverrideResolverFactory>) -> Self {
        self.override_factory = factory;
        self
    }

    pub fn build(self) -> Result<Reformater, ConfigError> {
        let source = &self.source;
        let mut builder = Schema::builder("adapted");
        let mut steps = Vec::new();

        if self.carry_source {
            for (index, field) in source.fields().iter().enumerate() {
                builder = builder.field_with(field.name.clone(), field.kind.clone(), field.meta.clone());
                steps.push(Step::Copy {
                    from: index,
                    to: index,
                });
            }
        }

        let carried = if self.carry_source { source.len() } else { 0 };
        for (offset, rule) in self.rules.iter().enumerate() {
            builder = builder.field(rule.to.clone(), FieldKind::String);
            let to = carried + offset;
            let merger = self.compile_merger(rule)?;
            steps.push(Step::Merge { to, merger });
        }

        Ok(Reformater {
            output: builder.build()?,
            steps,
        })
    }

    fn compile_merger(&self, rule: &MappingRule) -> Result<Merger, ConfigError> {
        let source = &self.source;
        Ok(match &rule.from {
            MappingSource::Field { from } => Merger::Field(Extractor::compile(source, from)?),

            MappingSource::Template {
                template,
                from,
                no_value_if_missing,
            } => {
                let mut extractions = HashMap::new();
                for renamed in from {
                    extractions.insert(
                        renamed.placeholder().to_string(),
                        Arc::new(Extractor::compile(source, &renamed.from)?),
                    );
                }
                Merger::Template {
                    tokens: compile_template(source, template, extractions, &self.variables)?,
                    no_value_if_missing: *no_value_if_missing,
                }
            }

            MappingSource::Lookup {
                from,
                mapping,
                copy_if_no_match,
                default_if_no_match,
            } => Merger::Lookup {
                extractor: Extractor::compile(source, from)?,
                mapping: mapping
                    .iter()
                    .map(|kv| (kv.key.clone(), kv.value.clone()))
                    .collect(),
                copy_if_no_match: *copy_if_no_match,
                default_if_no_match: default_if_no_match.clone(),
            },

            MappingSource::Join {
                from,
                separator,
                first,
                add_first_if_empty,
                last,
                add_last_if_empty,
            } => Merger::Join {
                extractors: from
                    .iter()
                    .map(|f| Extractor::compile(source, f))
                    .collect::<Result<_, _>>()?,
                separator: separator.clone(),
                first: first.clone(),
                add_first_if_empty: *add_first_if_empty,
                last: last.clone(),
                add_last_if_empty: *add_last_if_empty,
            },

            MappingSource::Sum { from } => Merger::Sum {
                extractors: from
                    .iter()
                    .map(|f| Extractor::compile(source, f))
                    .collect::<Result<_, _>>()?,
            },

            MappingSource::Override {
                name,
                inputs,
                params,
            } => Merger::Override {
                field: rule.to.clone(),
                extractors: inputs
                    .iter()
                    .map(|f| Extractor::compile(source, f))
                    .collect::<Result<_, _>>()?,
                resolver: self
                    .override_factory
                    .create(&rule.to, source, name, params),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, Schema};
    use crate::transform::dsl::{FieldRef, KeyValue, MappingRule, MappingSource, RenamedRef};

    fn source() -> Arc<Schema> {
        Schema::builder("line")
            .field("a", FieldKind::String)
            .field("b", FieldKind::String)
            .field("c", FieldKind::String)
            .field("value1", FieldKind::String)
            .field("value2", FieldKind::String)
            .field("name", FieldKind::String)
            .build()
            .unwrap()
    }

    fn input() -> Record {
        let mut record = Record::new(source());
        record.set_string("a", "aa-xx");
        record.set_string("b", "bb");
        record.set_string("name", "toto");
        record.set_string("c", "c");
        record.set_string("value1", "1.1");
        record.set_string("value2", "2.04");
        record
    }

    #[test]
    fn test_transform_all_merger_kinds() {
        let reformater = Reformater::builder(
            source(),
            vec![
                MappingRule::field(
                    "aa",
                    FieldRef::new("a").with_formatter("^(.*)-(.*)", "$1_$2"),
                ),
                MappingRule::template(
                    "ac",
                    "{d}_{b}_{c}",
                    vec![
                        RenamedRef::renamed(FieldRef::new("b"), "d"),
                        RenamedRef::new(FieldRef::new("b")),
                    ],
                ),
                MappingRule::sum(
                    "compute",
                    vec![FieldRef::new("value1"), FieldRef::new("value2")],
                ),
                MappingRule {
                    to: "maps".to_string(),
                    from: MappingSource::Lookup {
                        from: FieldRef::new("name"),
                        mapping: vec![KeyValue::new("toto", "titi")],
                        copy_if_no_match: true,
                        default_if_no_match: None,
                    },
                },
            ],
        )
        .carry_source(true)
        .build()
        .unwrap();

        let got = reformater.transform(&input()).unwrap();
        assert_eq!(got.string("aa"), Some("aa_xx"));
        assert_eq!(got.string("ac"), Some("bb_bb_c"));
        assert_eq!(got.string("compute"), Some("3.14"));
        assert_eq!(got.string("maps"), Some("titi"));
        // carried source field, unchanged
        assert_eq!(got.string("a"), Some("aa-xx"));
    }

    #[test]
    fn test_unset_result_leaves_field_unset() {
        let reformater = Reformater::new(
            source(),
            vec![MappingRule::field("aa", FieldRef::new("a"))],
        )
        .unwrap();

        let empty = Record::new(source());
        let got = reformater.transform(&empty).unwrap();
        let index = got.schema().index_of("aa").unwrap();
        assert!(!got.is_set(index));
    }

    #[test]
    fn test_duplicate_output_field_rejected() {
        let result = Reformater::new(
            source(),
            vec![
                MappingRule::field("x", FieldRef::new("a")),
                MappingRule::field("x", FieldRef::new("b")),
            ],
        );
        assert!(matches!(result, Err(ConfigError::DuplicateField { .. })));
    }

    #[test]
    fn test_unresolved_placeholder_rejected() {
        let result = Reformater::new(
            source(),
            vec![MappingRule::template("t", "{missing}", vec![])],
        );
        assert!(matches!(
            result,
            Err(ConfigError::UnresolvedPlaceholder { .. })
        ));
    }

    #[test]
    fn test_external_variable_placeholder() {
        let resolver: Arc<dyn VariableResolver> =
            Arc::new(|_: &str, _: &Record| Some("v1".to_string()));
        let reformater = Reformater::builder(
            source(),
            vec![MappingRule::template("t", "{a}/{version}", vec![])],
        )
        .variable("version", resolver)
        .build()
        .unwrap();

        let got = reformater.transform(&input()).unwrap();
        assert_eq!(got.string("t"), Some("aa-xx/v1"));
    }

    #[test]
    fn test_missing_override_resolver_fails_at_apply_time() {
        let reformater = Reformater::new(
            source(),
            vec![MappingRule {
                to: "x".to_string(),
                from: MappingSource::Override {
                    name: "custom".to_string(),
                    inputs: vec![FieldRef::new("a")],
                    params: serde_json::Value::Null,
                },
            }],
        )
        .unwrap();

        let err = reformater.transform(&input()).unwrap_err();
        assert!(err.to_string().contains("custom"));
        assert!(err.to_string().contains("aa-xx"), "diagnostic includes the record");
    }

    #[test]
    fn test_registered_override_resolver() {
        struct UpperFactory;
        struct Upper;
        impl OverrideResolverFactory for UpperFactory {
            fn create(
                &self,
                _field: &str,
                _source: &Arc<Schema>,
                _name: &str,
                _params: &serde_json::Value,
            ) -> Arc<dyn OverrideResolver> {
                Arc::new(Upper)
            }
        }
        impl OverrideResolver for Upper {
            fn get(
                &self,
                _field: &str,
                inputs: &[Option<String>],
                _record: &Record,
            ) -> Result<Option<String>, RowError> {
                Ok(inputs[0].as_ref().map(|s| s.to_uppercase()))
            }
        }

        let reformater = Reformater::builder(
            source(),
            vec![MappingRule {
                to: "x".to_string(),
                from: MappingSource::Override {
                    name: "upper".to_string(),
                    inputs: vec![FieldRef::new("b")],
                    params: serde_json::Value::Null,
                },
            }],
        )
        .override_factory(Arc::new(UpperFactory))
        .build()
        .unwrap();

        let got = reformater.transform(&input()).unwrap();
        assert_eq!(got.string("x"), Some("BB"));
    }
}

//! Mapping-rule DSL.
//!
//! A rule set is an ordered list of [`MappingRule`]s, each deriving one
//! output field from one or more source fields. The model is plain serde
//! data, so rule sets load from JSON files:
//!
//! ```json
//! [
//!   {"to": "sku", "from": {"type": "field", "from": "SKU"}},
//!   {"to": "label", "from": {"type": "template", "template": "{name} ({ref})",
//!     "from": [{"from": {"from": "NAME"}}, {"from": {"from": "REF"}, "rename_to": "ref"}]}},
//!   {"to": "total", "from": {"type": "sum", "from": [{"from": "NET"}, {"from": "TAX"}]}}
//! ]
//! ```

pub(crate) mod extract;
pub(crate) mod merge;

use serde::{Deserialize, Serialize};

// =============================================================================
// Rules
// =============================================================================

/// One output field and the strategy producing its value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRule {
    /// Output field name; unique within one rule set.
    pub to: String,
    /// Value strategy.
    pub from: MappingSource,
}

/// The merger variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MappingSource {
    /// Copy one extracted source field.
    Field {
        #[serde(flatten)]
        from: FieldRef,
    },

    /// Literal text with `{name}` placeholders.
    ///
    /// A placeholder resolves, in priority order, to a renamed local
    /// extraction, a raw source-schema field, or an externally supplied
    /// variable; anything else fails at construction time.
    Template {
        template: String,
        #[serde(default)]
        from: Vec<RenamedRef>,
        /// Return no value when any resolved segment is empty.
        #[serde(default)]
        no_value_if_missing: bool,
    },

    /// Static key-to-value lookup on one extracted field.
    Lookup {
        from: FieldRef,
        #[serde(default)]
        mapping: Vec<KeyValue>,
        /// Pass the extracted value through when no key matches.
        #[serde(default)]
        copy_if_no_match: bool,
        /// Fallback when no key matches (ignored in pass-through mode).
        #[serde(default)]
        default_if_no_match: Option<String>,
    },

    /// Join the non-empty extractions with a separator, with optional
    /// first/last literals.
    Join {
        from: Vec<FieldRef>,
        #[serde(default)]
        separator: String,
        #[serde(default)]
        first: String,
        #[serde(default)]
        add_first_if_empty: bool,
        #[serde(default)]
        last: String,
        #[serde(default)]
        add_last_if_empty: bool,
    },

    /// Decimal total of the extractions parsed as numbers.
    Sum { from: Vec<FieldRef> },

    /// Delegate to a named external resolver.
    Override {
        name: String,
        #[serde(default)]
        inputs: Vec<FieldRef>,
        /// Free-form parameters handed to the resolver factory.
        #[serde(default)]
        params: serde_json::Value,
    },
}

impl MappingRule {
    /// Rule copying one source field.
    pub fn field(to: impl Into<String>, from: FieldRef) -> Self {
        Self {
            to: to.into(),
            from: MappingSource::Field { from },
        }
    }

    /// Template rule over renamed extractions.
    pub fn template(to: impl Into<String>, template: impl Into<String>, from: Vec<RenamedRef>) -> Self {
        Self {
            to: to.into(),
            from: MappingSource::Template {
                template: template.into(),
                from,
                no_value_if_missing: false,
            },
        }
    }

    /// Dictionary-lookup rule in fallback mode (`default_if_no_match` optional).
    pub fn lookup(to: impl Into<String>, from: FieldRef, mapping: Vec<KeyValue>) -> Self {
        Self {
            to: to.into(),
            from: MappingSource::Lookup {
                from,
                mapping,
                copy_if_no_match: false,
                default_if_no_match: None,
            },
        }
    }

    /// Sum rule over the given extractions.
    pub fn sum(to: impl Into<String>, from: Vec<FieldRef>) -> Self {
        Self {
            to: to.into(),
            from: MappingSource::Sum { from },
        }
    }

    /// Join rule with a separator and no first/last literals.
    pub fn join(to: impl Into<String>, from: Vec<FieldRef>, separator: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: MappingSource::Join {
                from,
                separator: separator.into(),
                first: String::new(),
                add_first_if_empty: false,
                last: String::new(),
                add_last_if_empty: false,
            },
        }
    }
}

// =============================================================================
// Extraction references
// =============================================================================

/// Reference to one source field, with extraction options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRef {
    /// Source field name.
    pub from: String,
    /// Value used when the source field is unset or empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_if_empty: Option<String>,
    /// Output pattern for numeric / date fields (number pattern or chrono
    /// strftime, by field kind).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Regex rewrite chain applied to the extracted string, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formatters: Vec<FormatRule>,
}

impl FieldRef {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            default_if_empty: None,
            format: None,
            formatters: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_if_empty = Some(default.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_formatter(mut self, pattern: impl Into<String>, replace: impl Into<String>) -> Self {
        self.formatters.push(FormatRule {
            pattern: pattern.into(),
            replace: replace.into(),
        });
        self
    }
}

/// A template extraction, optionally renamed for placeholder matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenamedRef {
    pub from: FieldRef,
    /// Placeholder name; defaults to the source field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename_to: Option<String>,
}

impl RenamedRef {
    pub fn new(from: FieldRef) -> Self {
        Self {
            from,
            rename_to: None,
        }
    }

    pub fn renamed(from: FieldRef, rename_to: impl Into<String>) -> Self {
        Self {
            from,
            rename_to: Some(rename_to.into()),
        }
    }

    pub(crate) fn placeholder(&self) -> &str {
        self.rename_to.as_deref().unwrap_or(&self.from.from)
    }
}

/// One regex rewrite step: global substitution, pass-through when nothing
/// matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatRule {
    pub pattern: String,
    pub replace: String,
}

/// One dictionary entry for [`MappingSource::Lookup`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_roundtrip_json() {
        let rules = vec![
            MappingRule::field("sku", FieldRef::new("SKU").with_formatter("^(.*)-(.*)", "$1_$2")),
            MappingRule::sum("total", vec![FieldRef::new("NET"), FieldRef::new("TAX")]),
        ];
        let json = serde_json::to_string(&rules).unwrap();
        let parsed: Vec<MappingRule> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(matches!(parsed[0].from, MappingSource::Field { .. }));
        assert!(matches!(parsed[1].from, MappingSource::Sum { .. }));
    }

    #[test]
    fn test_rules_parse_from_plain_json() {
        let json = r#"[
            {"to": "aa", "from": {"type": "field", "from": "a"}},
            {"to": "maps", "from": {"type": "lookup", "from": {"from": "name"},
                "mapping": [{"key": "toto", "value": "titi"}], "copy_if_no_match": true}}
        ]"#;
        let parsed: Vec<MappingRule> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed[0].to, "aa");
        let MappingSource::Lookup { mapping, copy_if_no_match, .. } = &parsed[1].from else {
            panic!("expected a lookup rule");
        };
        assert!(*copy_if_no_match);
        assert_eq!(mapping[0].key, "toto");
    }

    #[test]
    fn test_placeholder_defaults_to_field_name() {
        let renamed = RenamedRef::renamed(FieldRef::new("b"), "d");
        assert_eq!(renamed.placeholder(), "d");
        let plain = RenamedRef::new(FieldRef::new("b"));
        assert_eq!(plain.placeholder(), "b");
    }
}

//! Typed values and records.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::json;

use super::Schema;

// =============================================================================
// Values
// =============================================================================

/// A single typed value held by a [`Record`] slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    StringArray(Vec<String>),
    Record(Record),
    RecordArray(Vec<Record>),
}

impl Value {
    /// Borrow the string content, for `String` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render a scalar value with the default formats.
    ///
    /// Doubles keep one fractional digit for integral values (`3` renders as
    /// `"3.0"`), so a rendered double is always recognizable as one.
    pub fn render(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Long(l) => l.to_string(),
            Value::Double(d) => render_double(*d),
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::StringArray(items) => items.join(","),
            Value::Record(_) | Value::RecordArray(_) => String::new(),
        }
    }
}

/// Default double rendering: shortest representation, except integral values
/// keep a `.0` suffix.
pub fn render_double(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

// =============================================================================
// Records
// =============================================================================

/// An instance of a [`Schema`], holding one optional value per field.
///
/// Unset slots are observably different from empty strings: a transformation
/// that produced no value leaves the slot unset, and JSON rendering omits it.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<Option<Value>>,
}

impl Record {
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = vec![None; schema.len()];
        Self { schema, values }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn set(&mut self, index: usize, value: Value) {
        self.values[index] = Some(value);
    }

    /// Set a field by name; silently ignores unknown names.
    pub fn set_by_name(&mut self, name: &str, value: Value) -> &mut Self {
        if let Some(index) = self.schema.index_of(name) {
            self.values[index] = Some(value);
        }
        self
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values[index].as_ref()
    }

    pub fn by_name(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).and_then(|i| self.get(i))
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.values[index].is_some()
    }

    /// String content of a field, when set and a string.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.by_name(name).and_then(Value::as_str)
    }

    /// Nested records of a `RecordArray` field; empty when unset.
    pub fn records(&self, name: &str) -> &[Record] {
        match self.by_name(name) {
            Some(Value::RecordArray(items)) => items,
            _ => &[],
        }
    }

    /// Nested record of a `Record` field.
    pub fn record(&self, name: &str) -> Option<&Record> {
        match self.by_name(name) {
            Some(Value::Record(r)) => Some(r),
            _ => None,
        }
    }

    /// Append to a `RecordArray` slot, creating it when unset.
    pub fn push_record(&mut self, index: usize, record: Record) {
        match &mut self.values[index] {
            Some(Value::RecordArray(items)) => items.push(record),
            slot => *slot = Some(Value::RecordArray(vec![record])),
        }
    }

    /// True when at least one field is set.
    pub fn has_any_set(&self) -> bool {
        self.values.iter().any(Option::is_some)
    }

    /// Render as JSON, omitting unset fields.
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for (field, value) in self.schema.fields().iter().zip(&self.values) {
            let Some(value) = value else { continue };
            let rendered = match value {
                Value::String(s) => json!(s),
                Value::Integer(i) => json!(i),
                Value::Long(l) => json!(l),
                Value::Double(d) => json!(d),
                Value::Boolean(b) => json!(b),
                Value::Date(_) | Value::DateTime(_) => json!(value.render()),
                Value::StringArray(items) => json!(items),
                Value::Record(r) => r.to_json(),
                Value::RecordArray(items) => {
                    json!(items.iter().map(Record::to_json).collect::<Vec<_>>())
                }
            };
            out.insert(field.name.clone(), rendered);
        }
        serde_json::Value::Object(out)
    }
}

// Convenience used by tests and the CLI when the kind is statically known.
impl Record {
    /// Set a string field by name.
    pub fn set_string(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.set_by_name(name, Value::String(value.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;

    fn schema() -> Arc<Schema> {
        Schema::builder("line")
            .field("name", FieldKind::String)
            .field("count", FieldKind::Integer)
            .field("ratio", FieldKind::Double)
            .build()
            .unwrap()
    }

    #[test]
    fn test_unset_and_empty_are_distinct() {
        let mut record = Record::new(schema());
        record.set_string("name", "");

        assert!(record.is_set(0));
        assert_eq!(record.string("name"), Some(""));
        assert!(!record.is_set(1));
        assert_eq!(record.by_name("count"), None);
    }

    #[test]
    fn test_to_json_omits_unset() {
        let mut record = Record::new(schema());
        record.set_string("name", "a");
        record.set_by_name("count", Value::Integer(2));

        let json = record.to_json();
        assert_eq!(json["name"], "a");
        assert_eq!(json["count"], 2);
        assert!(json.get("ratio").is_none());
    }

    #[test]
    fn test_render_double() {
        assert_eq!(render_double(3.0), "3.0");
        assert_eq!(render_double(0.0), "0.0");
        assert_eq!(render_double(3.14), "3.14");
        assert_eq!(render_double(-2.5), "-2.5");
    }

    #[test]
    fn test_push_record_creates_array() {
        let child = Schema::builder("child")
            .field("v", FieldKind::String)
            .build()
            .unwrap();
        let parent = Schema::builder("parent")
            .field("items", FieldKind::RecordArray(child.clone()))
            .build()
            .unwrap();

        let mut record = Record::new(parent);
        record.push_record(0, Record::new(child.clone()));
        record.push_record(0, Record::new(child));
        assert_eq!(record.records("items").len(), 2);
    }
}

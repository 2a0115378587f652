//! Control-break assembly for a single target schema.
//!
//! The state tree is built once, depth-first, from the target schema's
//! structure; per-row work is pure index arithmetic, with no schema
//! introspection. Each node compares the incoming row's projection onto its
//! scalar fields against the composite under construction; on mismatch the
//! finished composite travels up and a fresh one starts.
//!
//! ```text
//! flat rows                     composites
//! ┌──────────────────────┐      ┌─────────────────────┐
//! │ key: K1, item: a     │      │ key: K1             │
//! │ key: K1, item: b     │  →   │ items: [a, b]       │
//! │ key: K2, item: c     │      ├─────────────────────┤
//! └──────────────────────┘      │ key: K2, items: [c] │
//!                               └─────────────────────┘
//! ```

use std::sync::Arc;

use tracing::warn;

use crate::error::{ConfigError, RowError};
use crate::schema::convert::CellParser;
use crate::schema::record::{Record, Value};
use crate::schema::{FieldKind, Schema};

// =============================================================================
// Assembler
// =============================================================================

/// Rebuilds nested records out of an ordered stream of flat records.
///
/// [`push`](Self::push) returns a composite exactly when one completes; call
/// [`finish`](Self::finish) once at end of input to flush the last one.
/// Holds per-stream state: one instance per stream.
pub struct BreakAssembler {
    root: NodeState,
}

impl BreakAssembler {
    /// Build the state tree for `target`, matching scalar fields of each node
    /// against `source` by name. Unmatched target fields are skipped with a
    /// warning.
    pub fn new(target: &Arc<Schema>, source: &Arc<Schema>) -> Result<Self, ConfigError> {
        Ok(Self {
            root: NodeState::build(target, source)?,
        })
    }

    /// Feed one flat record; returns the previous composite when the group
    /// key changed.
    pub fn push(&mut self, row: &Record) -> Result<Option<Record>, RowError> {
        self.root.on_row(row)
    }

    /// Flush the still-accumulating composite, if any.
    pub fn finish(&mut self) -> Option<Record> {
        self.root.finish()
    }
}

// =============================================================================
// State tree
// =============================================================================

struct KeyBinding {
    from: usize,
    to: usize,
    column: String,
    parser: CellParser,
}

struct ChildState {
    field_index: usize,
    is_array: bool,
    state: NodeState,
    /// Completed groups awaiting attachment (array children).
    done: Vec<Record>,
    /// Last completed group (singleton children; last one wins).
    single: Option<Record>,
}

struct NodeState {
    schema: Arc<Schema>,
    keys: Vec<KeyBinding>,
    children: Vec<ChildState>,
    current: Option<Record>,
}

impl NodeState {
    fn build(target: &Arc<Schema>, source: &Arc<Schema>) -> Result<Self, ConfigError> {
        let mut keys = Vec::new();
        let mut children = Vec::new();
        for (index, field) in target.fields().iter().enumerate() {
            match &field.kind {
                FieldKind::Record(nested) => children.push(ChildState {
                    field_index: index,
                    is_array: false,
                    state: NodeState::build(nested, source)?,
                    done: Vec::new(),
                    single: None,
                }),
                FieldKind::RecordArray(nested) => children.push(ChildState {
                    field_index: index,
                    is_array: true,
                    state: NodeState::build(nested, source)?,
                    done: Vec::new(),
                    single: None,
                }),
                _ => match source.index_of(&field.name) {
                    Some(from) => keys.push(KeyBinding {
                        from,
                        to: index,
                        column: field.name.clone(),
                        parser: CellParser::for_field(field),
                    }),
                    None => {
                        warn!(
                            field = field.name.as_str(),
                            schema = source.name(),
                            "field not found in source, skipped"
                        );
                    }
                },
            }
        }
        Ok(Self {
            schema: Arc::clone(target),
            keys,
            children,
            current: None,
        })
    }

    fn on_row(&mut self, row: &Record) -> Result<Option<Record>, RowError> {
        let mut converted = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            converted.push(convert(row.get(key.from), key)?);
        }

        let same = match &self.current {
            Some(current) => self
                .keys
                .iter()
                .zip(&converted)
                .all(|(key, value)| current.get(key.to) == value.as_ref()),
            None => false,
        };

        let mut finished = None;
        if !same {
            finished = self.finish();
            let mut record = Record::new(Arc::clone(&self.schema));
            for (key, value) in self.keys.iter().zip(converted) {
                if let Some(value) = value {
                    record.set(key.to, value);
                }
            }
            self.current = Some(record);
        }

        for child in &mut self.children {
            if let Some(done) = child.state.on_row(row)? {
                if child.is_array {
                    child.done.push(done);
                } else {
                    child.single = Some(done);
                }
            }
        }

        Ok(finished)
    }

    /// Close the composite under construction, folding in every child's
    /// completed and in-progress groups. Blank composites yield nothing.
    fn finish(&mut self) -> Option<Record> {
        let current = self.current.take();
        let mut record = match current {
            Some(record) => record,
            None => {
                // nothing in progress; still clear child leftovers
                for child in &mut self.children {
                    child.state.finish();
                    child.done.clear();
                    child.single = None;
                }
                return None;
            }
        };

        for child in &mut self.children {
            let tail = child.state.finish();
            if child.is_array {
                let mut items = std::mem::take(&mut child.done);
                items.extend(tail);
                if !items.is_empty() {
                    record.set(child.field_index, Value::RecordArray(items));
                }
            } else {
                let last = tail.or_else(|| child.single.take());
                child.single = None;
                if let Some(last) = last {
                    record.set(child.field_index, Value::Record(last));
                }
            }
        }

        if record.has_any_set() {
            Some(record)
        } else {
            None
        }
    }
}

/// Convert one source value to the target field's kind.
///
/// String cells go through the cell parser; values already of the target
/// kind pass through; anything else is re-parsed from its rendering.
fn convert(value: Option<&Value>, key: &KeyBinding) -> Result<Option<Value>, RowError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let raw = match value {
        Value::String(s) => s.clone(),
        other => {
            if kind_of(other, &key.parser) {
                return Ok(Some(other.clone()));
            }
            other.render()
        }
    };
    key.parser.parse(&raw).map_err(|message| {
        RowError::new(message)
            .with_column(key.column.clone())
            .with_value(raw)
    })
}

fn kind_of(value: &Value, parser: &CellParser) -> bool {
    matches!(
        (value, parser),
        (Value::Integer(_), CellParser::Integer)
            | (Value::Long(_), CellParser::Long)
            | (Value::Double(_), CellParser::Double)
            | (Value::Boolean(_), CellParser::Boolean)
            | (Value::Date(_), CellParser::Date { .. })
            | (Value::DateTime(_), CellParser::DateTime { .. })
            | (Value::StringArray(_), CellParser::StringArray { .. })
    )
}

//! Marker-column dispatch for multi-schema streams.
//!
//! One flat stream interleaves rows of several section layouts; the first
//! column carries the marker naming each row's section. Sections come from
//! the root schema's nested fields carrying [`SectionMeta`] metadata:
//!
//! ```text
//! TYPE_A;va1;va2        ┐ composite 1: type_a + two type_b children
//! TYPE_B;vb11;vb12      │
//! TYPE_B;vb21;vb22      ┘
//! TYPE_A;a1;a2          ┐ composite 2 ...
//! ```
//!
//! A cursor walks the configured section list; when it runs off the end the
//! composite under construction is finalized and the cursor restarts. A full
//! cycle that matches nothing while the composite is empty drops the row
//! with a warning rather than failing the stream.

use std::sync::Arc;

use tracing::warn;

use crate::error::{AssembleError, ConfigError};
use crate::schema::record::{Record, Value};
use crate::schema::{FieldKind, Schema};
use crate::source::{Row, RowReader};

// =============================================================================
// Dispatcher
// =============================================================================

/// Routes marker-tagged rows to per-section readers and merges the
/// accumulated sections into composite records.
///
/// Holds per-stream state: one instance per stream.
pub struct SectionDispatcher {
    schema: Arc<Schema>,
    sections: Vec<Section>,
    cursor: usize,
    started: bool,
}

struct Section {
    field_index: usize,
    marker: String,
    repeated: bool,
    header_row_pending: bool,
    target: Arc<Schema>,
    reader: Option<RowReader>,
    accumulated: Vec<Record>,
    value: Option<Record>,
}

impl SectionDispatcher {
    /// Collect the section configuration from the root schema's nested
    /// fields. Fails when no field carries a marker, when a marker repeats,
    /// or when a marked field is not nested.
    pub fn new(schema: &Arc<Schema>) -> Result<Self, ConfigError> {
        let mut sections: Vec<Section> = Vec::new();
        for (index, field) in schema.fields().iter().enumerate() {
            let Some(section) = &field.meta.section else {
                continue;
            };
            let (target, repeated) = match &field.kind {
                FieldKind::Record(nested) => (Arc::clone(nested), false),
                FieldKind::RecordArray(nested) => (Arc::clone(nested), true),
                _ => {
                    return Err(ConfigError::BadSectionField {
                        field: field.name.clone(),
                    })
                }
            };
            if sections.iter().any(|s| s.marker == section.marker) {
                return Err(ConfigError::DuplicateMarker {
                    schema: schema.name().to_string(),
                    marker: section.marker.clone(),
                });
            }
            sections.push(Section {
                field_index: index,
                marker: section.marker.clone(),
                repeated,
                header_row_pending: section.first_row_is_header,
                target,
                reader: None,
                accumulated: Vec::new(),
                value: None,
            });
        }
        if sections.is_empty() {
            return Err(ConfigError::NoSections {
                schema: schema.name().to_string(),
            });
        }
        Ok(Self {
            schema: Arc::clone(schema),
            sections,
            cursor: 0,
            started: false,
        })
    }

    /// Dispatch one row; returns a composite when one completes.
    pub fn push(&mut self, row: &Row) -> Result<Option<Record>, AssembleError> {
        let marker = row.text(0).unwrap_or_default();
        let mut finished = None;

        let mut index = self.find_from(self.cursor, &marker);
        if index.is_none() {
            // end of the pass: close the composite and retry from the top
            match self.take_composite() {
                Some(record) => finished = Some(record),
                None if self.started => {
                    warn!(
                        marker = marker.as_str(),
                        line = row.line(),
                        "dispatch cycle matched nothing on an empty composite, row dropped"
                    );
                }
                None => {}
            }
            self.cursor = 0;
            self.started = false;
            index = self.find_from(0, &marker);
        }

        let Some(index) = index else {
            warn!(
                marker = marker.as_str(),
                line = row.line(),
                "no section for marker, row dropped"
            );
            return Ok(finished);
        };

        self.read_into(index, row)?;
        self.started = true;

        // a singleton as the last configured section ends the pass
        if self.cursor >= self.sections.len() {
            if let Some(record) = self.take_composite() {
                debug_assert!(finished.is_none(), "markers are unique per pass");
                finished = Some(record);
            }
            self.cursor = 0;
            self.started = false;
        }
        Ok(finished)
    }

    /// Flush the in-progress composite at end of input, exactly once.
    pub fn finish(&mut self) -> Option<Record> {
        self.cursor = 0;
        self.started = false;
        self.take_composite()
    }

    fn find_from(&self, start: usize, marker: &str) -> Option<usize> {
        (start..self.sections.len()).find(|&i| self.sections[i].marker == marker)
    }

    fn read_into(&mut self, index: usize, row: &Row) -> Result<(), AssembleError> {
        let section = &mut self.sections[index];

        // The first matched row may be the section's own header; it then
        // names the columns and carries no data.
        if section.reader.is_none() && section.header_row_pending {
            let headers: Vec<String> = (1..row.len())
                .map(|i| row.text(i).unwrap_or_default())
                .collect();
            section.reader = Some(RowReader::named(&section.target, &headers, 1));
            section.header_row_pending = false;
            self.cursor = index;
            return Ok(());
        }
        let target = &section.target;
        let reader = section
            .reader
            .get_or_insert_with(|| RowReader::positional(target, 1));
        let record = reader.read(row)?;

        if section.repeated {
            section.accumulated.push(record);
            self.cursor = index;
        } else {
            if section.value.is_some() {
                return Err(AssembleError::AlreadySet {
                    marker: section.marker.clone(),
                    line: Some(row.line()),
                });
            }
            section.value = Some(record);
            self.cursor = index + 1;
        }
        Ok(())
    }

    /// Assemble the populated sections into one composite and reset all
    /// accumulators. Returns `None` when nothing was populated.
    fn take_composite(&mut self) -> Option<Record> {
        let mut record = Record::new(Arc::clone(&self.schema));
        let mut populated = false;
        for section in &mut self.sections {
            if section.repeated {
                let items = std::mem::take(&mut section.accumulated);
                if !items.is_empty() {
                    populated = true;
                    record.set(section.field_index, Value::RecordArray(items));
                }
            } else if let Some(value) = section.value.take() {
                record.set(section.field_index, Value::Record(value));
                populated = true;
            }
        }
        populated.then_some(record)
    }
}

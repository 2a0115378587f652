//! # restruct - structured records out of flat rows
//!
//! restruct rebuilds typed, possibly hierarchical records out of flat
//! CSV/Excel rows, and writes them back out.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐     ┌────────────┐
//! │  CSV/Excel  │────▶│  Reformater │────▶│  Assembler   │────▶│  consumer  │
//! │  row source │     │  (optional) │     │ break/section│     │  callback  │
//! └─────────────┘     └─────────────┘     └──────────────┘     └────────────┘
//! ```
//!
//! Two engines do the structural work:
//!
//! - the **break assembler** groups consecutive rows sharing a key into one
//!   nested record (one work, many contributor rows)
//! - the **section dispatcher** routes marker-tagged rows of a mixed stream
//!   to per-section readers and merges the sections into one composite
//!
//! Upstream of both, the **reformater** derives output fields from source
//! fields through a small mapping DSL: extraction with regex rewrite chains,
//! templates, dictionary lookups, joins, sums and pluggable overrides.
//!
//! ## Quick Start
//!
//! ```ignore
//! use restruct::import::Importer;
//!
//! let mut works = Vec::new();
//! Importer::new()
//!     .with_separator(';')
//!     .import_grouped(file, &work_schema, |record| works.push(record))?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - hierarchical error types
//! - [`schema`] - schema builder, field metadata, typed records
//! - [`source`] - CSV/Excel row sources with auto-detection
//! - [`transform`] - mapping-rule DSL and the reformater
//! - [`assemble`] - break assembler and section dispatcher
//! - [`import`] - high-level import entry points
//! - [`export`] - delimited / fixed-width writers

// Core modules
pub mod error;
pub mod schema;

// Row sources
pub mod source;

// Transformation
pub mod transform;

// Structural assembly
pub mod assemble;

// Entry points
pub mod export;
pub mod import;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    AssembleError, ConfigError, CsvError, ExportError, ImportError, RowError,
};

// =============================================================================
// Re-exports - Schema and records
// =============================================================================

pub use schema::record::{Record, Value};
pub use schema::{Field, FieldKind, FieldMeta, Schema, SchemaBuilder, SectionMeta};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    FieldRef, FormatRule, KeyValue, MappingRule, MappingSource, OverrideResolver,
    OverrideResolverFactory, Reformater, RenamedRef, VariableResolver,
};

// =============================================================================
// Re-exports - Assembly
// =============================================================================

pub use assemble::{BreakAssembler, SectionDispatcher};

// =============================================================================
// Re-exports - Import / Export
// =============================================================================

pub use export::Exporter;
pub use import::{Importer, SourceInfo};

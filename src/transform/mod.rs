//! Record transformation: mapping-rule DSL and the reformater.
//!
//! - [`dsl`] - the serde mapping-rule model plus its compiled extraction and
//!   merge machinery
//! - [`reformat`] - derives an output schema from an ordered rule list and
//!   applies all compiled mergers to each incoming record

pub mod dsl;
pub mod reformat;

pub use dsl::{FieldRef, FormatRule, KeyValue, MappingRule, MappingSource, RenamedRef};
pub use reformat::{
    OverrideResolver, OverrideResolverFactory, Reformater, ReformaterBuilder, VariableResolver,
};

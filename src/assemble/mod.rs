//! Structural assembly: nested records out of flat row streams.
//!
//! - [`breaks`] - control-break assembler for a single target schema: a
//!   change in the group-key fields closes the composite under construction
//! - [`sections`] - marker-column dispatcher for multi-schema streams: each
//!   row is routed to the per-section reader matching its first column

pub mod breaks;
pub mod sections;

pub use breaks::BreakAssembler;
pub use sections::SectionDispatcher;

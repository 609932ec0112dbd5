//! Core data model for batched validation.
//!
//! - **[`RecordCollection`]** / **[`Batch`]**: the submitted records and their
//!   fixed-size partitions
//! - **[`AttributePath`]**: parsed rule keys and concrete attribute names
//! - **[`Value`]** / **[`ValueSet`]**: scalar candidates sent to the store
//! - **[`FailureRegistry`]**: failures shared by every engine in a run
//! - **[`ValidationContext`]**: the per-run state threaded through the engine

mod context;
mod path;
mod records;
mod registry;
mod value;

pub use context::{
    AttributePredicate, BailOnFailure, NoHooks, PredicateHooks, SessionHooks, ValidationContext,
};
pub use path::{AttributePath, Expansion, Segment};
pub use records::{Batch, RecordCollection};
pub use registry::{FailureRegistry, Violation};
pub use value::{Value, ValueSet};

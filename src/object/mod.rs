//! Object Module - GC-Managed Object Model
//!
//! Defines the header every managed object carries, the per-type
//! descriptor the object layer supplies, and the scratch stack used by
//! graph walks.

pub mod descriptor;
pub mod header;
pub mod stack;

pub use descriptor::{Descriptor, DestructorFn, FinaliserFn, TraceFn};
pub use header::{ClassTag, Object, HEADER_SIZE};
pub use stack::ObjectStack;

//! Descriptor - Per-Type Object Metadata
//!
//! Every object carries a pointer to a `'static` descriptor supplied by
//! the object layer. The descriptor is the only channel through which the
//! collector learns anything type-specific: how large the object is, how
//! to enumerate its outgoing references, and what cleanup it needs.

use crate::object::header::Object;
use crate::object::stack::ObjectStack;

/// Push every outgoing reference of the object onto the stack.
///
/// Iso references to subregions are pushed like any other reference; the
/// sweep separates them later via the iso-field walk.
pub type TraceFn = fn(*mut Object, &mut ObjectStack);

/// User-visible finalisation. May read other objects in the region; runs
/// before anything in the region has been deallocated.
pub type FinaliserFn = fn(*mut Object);

/// Low-level cleanup. Must not touch other objects; peers may already be
/// finalised and their headers repurposed.
pub type DestructorFn = fn(*mut Object);

/// Per-type metadata consumed by the collector
///
/// Descriptors live for the program's lifetime and are at least 8-byte
/// aligned so the low bits of their address are free for header flags.
#[repr(align(8))]
pub struct Descriptor {
    /// Total object size in bytes, header included
    pub size: usize,

    /// Reference enumeration; `None` for leaf objects
    pub trace: Option<TraceFn>,

    pub finaliser: Option<FinaliserFn>,

    pub destructor: Option<DestructorFn>,

    /// Whether values of this type may hold iso references to subregions
    pub has_iso_fields: bool,
}

impl Descriptor {
    /// Descriptor for a leaf type with no cleanup of any kind.
    pub const fn trivial(size: usize) -> Self {
        Self {
            size,
            trace: None,
            finaliser: None,
            destructor: None,
            has_iso_fields: false,
        }
    }

    /// An object is trivial when it has no finaliser, no destructor and
    /// cannot own subregions. Trivial objects are freed on first
    /// encounter during sweep; non-trivial ones go through the staged
    /// finalise/destruct sequence.
    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.finaliser.is_none() && self.destructor.is_none() && !self.has_iso_fields
    }
}

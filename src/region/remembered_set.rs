//! RememberedSet - References Out of the Region
//!
//! A region does not own the immutable SCCs and cowns its objects point
//! at; it owns reference counts on them. The remembered set is the table
//! of those counts: one entry per canonical target, inserted by the write
//! barrier, marked when mark reaches the target, and swept after the
//! rings so counts on targets no longer referenced are returned.
//!
//! The owning actor is the sole mutator; the only cross-actor effect is
//! the refcount update on the shared target itself.

use std::cell::RefCell;

use indexmap::map::Entry;
use indexmap::IndexMap;

use crate::alloc::Alloc;
use crate::object::{ClassTag, Object};

/// Whether an insert hands its reference count over to the region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOwnership {
    /// The caller keeps its count; the region acquires its own.
    NoTransfer,
    /// The caller's count is transferred to the region.
    YesTransfer,
}

/// Per-region table of references to immutable/cown targets
///
/// Values are the per-cycle mark flag: set by [`RememberedSet::mark`],
/// consumed and cleared by [`RememberedSet::sweep_set`].
pub(crate) struct RememberedSet {
    refs: RefCell<IndexMap<*mut Object, bool>>,
}

impl RememberedSet {
    pub(crate) fn new() -> Self {
        Self {
            refs: RefCell::new(IndexMap::new()),
        }
    }

    /// Record a reference out to the canonical target `o`.
    ///
    /// `o` must already be canonicalized: an RC representative or a cown,
    /// never an SCC interior pointer.
    pub(crate) unsafe fn insert(&self, alloc: &Alloc, o: *mut Object, transfer: TransferOwnership) {
        debug_assert!(matches!((*o).class(), ClassTag::Rc | ClassTag::Cown));

        let mut refs = self.refs.borrow_mut();
        match refs.entry(o) {
            Entry::Vacant(e) => {
                e.insert(false);
                // The region now holds its own count on the target.
                if transfer == TransferOwnership::NoTransfer {
                    (*o).incref();
                }
            }
            Entry::Occupied(_) => {
                // Already accounted for; a transferred count is surplus.
                if transfer == TransferOwnership::YesTransfer {
                    release_external(alloc, o);
                }
            }
        }
    }

    /// Note that mark reached `o`; bumps `marked` the first time per cycle.
    pub(crate) fn mark(&self, _alloc: &Alloc, o: *mut Object, marked: &mut usize) {
        if let Some(flag) = self.refs.borrow_mut().get_mut(&o) {
            if !*flag {
                *flag = true;
                *marked += 1;
            }
        }
    }

    /// Drop every entry mark did not reach this cycle, releasing its
    /// count, and reset the flags of the survivors.
    pub(crate) unsafe fn sweep_set(&self, alloc: &Alloc, marked: usize) {
        let mut refs = self.refs.borrow_mut();

        if marked == refs.len() {
            // Everything survived; just reset the flags.
            for flag in refs.values_mut() {
                *flag = false;
            }
            return;
        }

        refs.retain(|&o, flag| {
            if *flag {
                *flag = false;
                true
            } else {
                unsafe { release_external(alloc, o) };
                false
            }
        });
    }

    /// Absorb `other`'s entries, folding duplicate counts.
    pub(crate) unsafe fn merge(&self, alloc: &Alloc, other: &RememberedSet) {
        let mut ours = self.refs.borrow_mut();
        for (o, _) in other.refs.borrow_mut().drain(..) {
            match ours.entry(o) {
                Entry::Vacant(e) => {
                    e.insert(false);
                }
                Entry::Occupied(_) => {
                    // Both regions held a count; the merged region needs one.
                    release_external(alloc, o);
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.refs.borrow().len()
    }

    pub(crate) fn contains(&self, o: *mut Object) -> bool {
        self.refs.borrow().contains_key(&o)
    }
}

/// Return one reference count on a shared target.
///
/// Dropping the last count reclaims the representative object itself;
/// interior SCC members and cown payloads belong to the freeze and
/// scheduling runtimes respectively.
pub(crate) unsafe fn release_external(alloc: &Alloc, o: *mut Object) {
    if (*o).decref() {
        alloc.dealloc(o as *mut u8, (*o).size());
    }
}

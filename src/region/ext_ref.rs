//! ExternalReferenceTable - Named Handles Into the Region
//!
//! Callers outside the region graph (debuggers, embedding APIs, the
//! runtime's pinning machinery) can hold a handle to an object without
//! keeping it alive. The handle observes collection: once the target is
//! swept, the handle reads empty instead of dangling.
//!
//! Each object carries an external-reference flag in its header so the
//! sweep only consults this table for objects that actually have handles.

use std::cell::{Cell, RefCell};
use std::ptr::NonNull;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::object::Object;

struct ExtRefInner {
    target: Cell<*mut Object>,
}

/// Handle to a region object, invalidated when the object is collected
#[derive(Clone)]
pub struct ExternalRef {
    inner: Rc<ExtRefInner>,
}

impl ExternalRef {
    /// Current target, or `None` once the object has been collected.
    pub fn get(&self) -> Option<NonNull<Object>> {
        NonNull::new(self.inner.target.get())
    }
}

/// Per-region table of external handles, keyed by target object
pub(crate) struct ExternalReferenceTable {
    refs: RefCell<IndexMap<*mut Object, Rc<ExtRefInner>>>,
}

impl ExternalReferenceTable {
    pub(crate) fn new() -> Self {
        Self {
            refs: RefCell::new(IndexMap::new()),
        }
    }

    /// Hand out a handle to `o`, reusing the existing one per object.
    pub(crate) unsafe fn create_ref(&self, o: *mut Object) -> ExternalRef {
        let mut refs = self.refs.borrow_mut();
        let inner = refs
            .entry(o)
            .or_insert_with(|| {
                (*o).set_ext_ref(true);
                Rc::new(ExtRefInner {
                    target: Cell::new(o),
                })
            })
            .clone();
        ExternalRef { inner }
    }

    /// Invalidate and drop the handle entry for a dying object.
    pub(crate) fn erase(&self, o: *mut Object) {
        if let Some(inner) = self.refs.borrow_mut().swap_remove(&o) {
            inner.target.set(std::ptr::null_mut());
        }
    }

    /// Absorb `other`'s handles. Objects belong to exactly one region, so
    /// the key sets are disjoint.
    pub(crate) fn merge(&self, other: &ExternalReferenceTable) {
        let mut ours = self.refs.borrow_mut();
        for (o, inner) in other.refs.borrow_mut().drain(..) {
            let prev = ours.insert(o, inner);
            debug_assert!(prev.is_none());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.refs.borrow().len()
    }
}

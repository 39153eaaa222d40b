//! Region Module - Ownership Domains and Their Collectors
//!
//! A region is an ownership domain of mutable objects rooted at a unique
//! iso object and owned by one actor at a time. This module holds the
//! trace (mark-and-sweep) region implementation, its collaborator tables,
//! and the region-kind dispatch used when releasing whole region graphs.
//!
//! Releasing is a worklist process: tearing one region down can discover
//! iso roots of subregions that are garbage with it, and each of those is
//! dispatched to its own region kind's release. Every iso has a unique
//! owner at the moment of release, so the worklist is drained without
//! synchronization.

pub mod ext_ref;
pub mod remembered_set;
pub mod trace;

pub use ext_ref::ExternalRef;
pub use remembered_set::TransferOwnership;
pub use trace::{IterKind, RegionIter, TraceRegion};

use crate::alloc::Alloc;
use crate::logging::{log_event, GcEvent};
use crate::object::{Object, ObjectStack};

/// Release the region owned by the iso `o` and, transitively, every
/// subregion reachable only through it.
pub fn release(alloc: &Alloc, o: *mut Object) {
    let mut f = ObjectStack::new();
    let mut collect = ObjectStack::new();
    unsafe {
        release_one(alloc, o, &mut f, &mut collect);
        release_worklist(alloc, &mut f, &mut collect);
    }
}

/// Dispatch one iso to its region kind's release.
unsafe fn release_one(
    alloc: &Alloc,
    o: *mut Object,
    f: &mut ObjectStack,
    collect: &mut ObjectStack,
) {
    assert!((*o).is_iso(), "release starts from an iso object");
    let r = (*o).region_base();

    if TraceRegion::is_trace_region(r) {
        TraceRegion::release_internal(r as *mut TraceRegion, alloc, o, f, collect);
    } else {
        panic!("release dispatched to an unknown region kind");
    }
}

/// Drain the subregion worklist accumulated by a sweep or release.
pub(crate) unsafe fn release_worklist(
    alloc: &Alloc,
    f: &mut ObjectStack,
    collect: &mut ObjectStack,
) {
    while let Some(o) = collect.pop() {
        debug_assert!((*o).is_iso());
        log_event(GcEvent::SubregionReleased { root: o as usize });
        release_one(alloc, o, f, collect);
    }
}

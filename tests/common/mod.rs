//! Test Utilities for the Region Collector Test Suite
//!
//! Provides the object layer the collector is missing in isolation: node
//! descriptors with real reference fields, lifecycle recording for
//! finaliser/destructor ordering assertions, and helpers for building
//! shared immutable and cown targets.

#![allow(dead_code)]

use std::cell::RefCell;

use rgc::{Alloc, Descriptor, Object, ObjectStack, TraceRegion, HEADER_SIZE};

/// Reference fields carried by every test node
pub const FIELD_COUNT: usize = 4;

/// Total size of a test node: header plus its reference fields
pub const NODE_SIZE: usize = HEADER_SIZE + FIELD_COUNT * std::mem::size_of::<usize>();

/// ============================================================================
/// LIFECYCLE RECORDING
/// ============================================================================

/// One observed callback invocation, keyed by object address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Finalised(usize),
    Destroyed(usize),
}

thread_local! {
    static EVENTS: RefCell<Vec<Lifecycle>> = const { RefCell::new(Vec::new()) };
}

/// Drain the lifecycle events recorded on this thread so far.
pub fn take_events() -> Vec<Lifecycle> {
    EVENTS.with(|e| e.borrow_mut().drain(..).collect())
}

fn on_finalise(o: *mut Object) {
    EVENTS.with(|e| e.borrow_mut().push(Lifecycle::Finalised(o as usize)));
}

fn on_destruct(o: *mut Object) {
    EVENTS.with(|e| e.borrow_mut().push(Lifecycle::Destroyed(o as usize)));
}

/// Assert that every finaliser ran before any destructor.
pub fn assert_finalisers_before_destructors(events: &[Lifecycle]) {
    let first_destroy = events
        .iter()
        .position(|e| matches!(e, Lifecycle::Destroyed(_)));
    if let Some(boundary) = first_destroy {
        assert!(
            events[boundary..]
                .iter()
                .all(|e| matches!(e, Lifecycle::Destroyed(_))),
            "finaliser ran after a destructor: {:?}",
            events
        );
    }
}

/// ============================================================================
/// NODE DESCRIPTORS
/// ============================================================================

fn trace_fields(o: *mut Object, stack: &mut ObjectStack) {
    unsafe {
        for i in 0..FIELD_COUNT {
            let target = field(o, i);
            if !target.is_null() {
                stack.push(target);
            }
        }
    }
}

/// Trivial node: reference fields, but no cleanup of any kind
pub static TRIVIAL_NODE: Descriptor = Descriptor {
    size: NODE_SIZE,
    trace: Some(trace_fields),
    finaliser: None,
    destructor: None,
    has_iso_fields: false,
};

/// Non-trivial node recording its finalisation and destruction
pub static FINAL_NODE: Descriptor = Descriptor {
    size: NODE_SIZE,
    trace: Some(trace_fields),
    finaliser: Some(on_finalise),
    destructor: Some(on_destruct),
    has_iso_fields: false,
};

/// Non-trivial node whose fields may hold iso references to subregions
pub static OWNER_NODE: Descriptor = Descriptor {
    size: NODE_SIZE,
    trace: Some(trace_fields),
    finaliser: Some(on_finalise),
    destructor: Some(on_destruct),
    has_iso_fields: true,
};

/// Large trivial leaf for heuristic tests
pub static BIG_LEAF: Descriptor = Descriptor::trivial(4096);

/// ============================================================================
/// NODE CONSTRUCTION AND FIELD ACCESS
/// ============================================================================

fn fields(o: *mut Object) -> *mut *mut Object {
    unsafe { (*o).data() as *mut *mut Object }
}

/// Read reference field `i` of a node.
pub unsafe fn field(o: *mut Object, i: usize) -> *mut Object {
    debug_assert!(i < FIELD_COUNT);
    fields(o).add(i).read()
}

/// Write reference field `i` of a node.
pub unsafe fn set_field(o: *mut Object, i: usize, target: *mut Object) {
    debug_assert!(i < FIELD_COUNT);
    fields(o).add(i).write(target);
}

unsafe fn clear_fields(o: *mut Object) {
    for i in 0..FIELD_COUNT {
        set_field(o, i, std::ptr::null_mut());
    }
}

/// Create a region rooted at a fresh node with nulled fields.
pub fn new_region(alloc: &Alloc, desc: &'static Descriptor) -> *mut Object {
    let o = TraceRegion::create(alloc, desc).expect("region creation should succeed");
    unsafe { clear_fields(o) };
    o
}

/// Allocate a node with nulled fields in `root`'s region.
pub fn alloc_in(alloc: &Alloc, root: *mut Object, desc: &'static Descriptor) -> *mut Object {
    let o = TraceRegion::alloc(alloc, root, desc).expect("allocation should succeed");
    unsafe { clear_fields(o) };
    o
}

/// ============================================================================
/// SHARED TARGETS (IMMUTABLES AND COWNS)
/// ============================================================================

/// Leaf descriptor for shared targets; never traced by a region
pub static SHARED_LEAF: Descriptor = Descriptor::trivial(NODE_SIZE);

/// Build a reference-counted immutable representative (count = 1).
pub fn make_immutable(alloc: &Alloc) -> *mut Object {
    let raw = alloc.alloc(SHARED_LEAF.size).expect("allocation should succeed");
    unsafe {
        let o = Object::initialise(raw.as_ptr(), &SHARED_LEAF);
        (*o).init_rc();
        o
    }
}

/// Build an SCC interior member pointing at `parent`.
pub fn make_scc_member(alloc: &Alloc, parent: *mut Object) -> *mut Object {
    let raw = alloc.alloc(SHARED_LEAF.size).expect("allocation should succeed");
    unsafe {
        let o = Object::initialise(raw.as_ptr(), &SHARED_LEAF);
        (*o).make_scc_member(parent);
        o
    }
}

/// Build a cown handle (count = 1).
pub fn make_cown(alloc: &Alloc) -> *mut Object {
    let raw = alloc.alloc(SHARED_LEAF.size).expect("allocation should succeed");
    unsafe {
        let o = Object::initialise(raw.as_ptr(), &SHARED_LEAF);
        (*o).init_cown();
        o
    }
}

/// Drop one count on a shared target, freeing it on the last one.
pub unsafe fn drop_shared(alloc: &Alloc, o: *mut Object) {
    if (*o).decref() {
        alloc.dealloc(o as *mut u8, (*o).size());
    }
}

/// Free a raw standalone object (e.g. an SCC interior member).
pub unsafe fn free_raw(alloc: &Alloc, o: *mut Object) {
    alloc.dealloc(o as *mut u8, (*o).size());
}

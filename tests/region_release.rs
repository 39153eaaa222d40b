//! Region Release Tests - Teardown, Cascades and External Handles
//!
//! Full teardown must drain nested subregions, keep the staged
//! finalisation order within each region, invalidate external handles,
//! and hand every byte back to the allocator.

mod common;

use common::{
    alloc_in, new_region, set_field, take_events, Lifecycle, FINAL_NODE, OWNER_NODE, TRIVIAL_NODE,
};
use rgc::logging::{self, GcEvent, GcLoggerConfig, LogLevel};
use rgc::{Alloc, TraceRegion};

/// ============================================================================
/// TEARDOWN CASCADES
/// ============================================================================

/// Releasing a region releases the subregions it owns, depth by depth,
/// finalising each region's objects before destroying them.
#[test]
fn test_release_cascades_through_nested_subregions() {
    let alloc = Alloc::new();

    let a = new_region(&alloc, &OWNER_NODE);
    let b = new_region(&alloc, &OWNER_NODE);
    let c = new_region(&alloc, &OWNER_NODE);

    unsafe {
        set_field(a, 0, b);
        set_field(b, 0, c);
    }
    take_events();

    rgc::release(&alloc, a);

    // Each region finalises and destroys its own objects before the next
    // subregion in the cascade is touched.
    assert_eq!(
        take_events(),
        vec![
            Lifecycle::Finalised(a as usize),
            Lifecycle::Destroyed(a as usize),
            Lifecycle::Finalised(b as usize),
            Lifecycle::Destroyed(b as usize),
            Lifecycle::Finalised(c as usize),
            Lifecycle::Destroyed(c as usize),
        ]
    );
    assert_eq!(alloc.in_use(), 0);
    assert_eq!(alloc.live_allocations(), 0);
}

/// Release collects every object regardless of reachability from the root.
#[test]
fn test_release_sweeps_unreachable_and_reachable_alike() {
    let alloc = Alloc::new();
    let root = new_region(&alloc, &TRIVIAL_NODE);
    let kept = alloc_in(&alloc, root, &FINAL_NODE);
    let _dropped = alloc_in(&alloc, root, &FINAL_NODE);
    unsafe { set_field(root, 0, kept) };
    take_events();

    rgc::release(&alloc, root);

    let events = take_events();
    common::assert_finalisers_before_destructors(&events);
    assert_eq!(events.len(), 4, "both non-trivial objects get both callbacks");
    assert_eq!(alloc.in_use(), 0);
}

/// ============================================================================
/// EXTERNAL REFERENCES
/// ============================================================================

/// A handle tracks its object across collections and reads empty once the
/// object is swept.
#[test]
fn test_external_ref_invalidated_by_gc() {
    let alloc = Alloc::new();
    let root = new_region(&alloc, &TRIVIAL_NODE);
    let kept = alloc_in(&alloc, root, &TRIVIAL_NODE);
    let doomed = alloc_in(&alloc, root, &TRIVIAL_NODE);
    unsafe { set_field(root, 0, kept) };

    let kept_ref = TraceRegion::create_external_ref(root, kept);
    let doomed_ref = TraceRegion::create_external_ref(root, doomed);
    assert_eq!(TraceRegion::external_ref_count(root), 2);

    TraceRegion::gc(&alloc, root);

    assert_eq!(kept_ref.get().map(|p| p.as_ptr()), Some(kept));
    assert_eq!(doomed_ref.get(), None);
    assert_eq!(TraceRegion::external_ref_count(root), 1);

    rgc::release(&alloc, root);
    assert_eq!(kept_ref.get(), None);
    assert_eq!(alloc.in_use(), 0);
}

/// Handles to non-trivial objects are invalidated through the staged
/// teardown path too.
#[test]
fn test_external_ref_invalidated_for_non_trivial_target() {
    let alloc = Alloc::new();
    let root = new_region(&alloc, &TRIVIAL_NODE);
    let n = alloc_in(&alloc, root, &FINAL_NODE);

    let handle = TraceRegion::create_external_ref(root, n);
    TraceRegion::gc(&alloc, root);

    assert_eq!(handle.get(), None);
    assert_eq!(TraceRegion::external_ref_count(root), 0);

    rgc::release(&alloc, root);
    assert_eq!(alloc.in_use(), 0);
}

/// Handles are deduplicated per object and survive a merge.
#[test]
fn test_external_refs_move_with_merge() {
    let alloc = Alloc::new();
    let ra = new_region(&alloc, &TRIVIAL_NODE);
    let rb = new_region(&alloc, &TRIVIAL_NODE);
    let b_child = alloc_in(&alloc, rb, &TRIVIAL_NODE);

    let first = TraceRegion::create_external_ref(rb, b_child);
    let second = TraceRegion::create_external_ref(rb, b_child);
    assert_eq!(TraceRegion::external_ref_count(rb), 1);

    TraceRegion::merge(&alloc, ra, rb);
    assert_eq!(TraceRegion::external_ref_count(ra), 1);

    // Keep b_child alive through the new root.
    unsafe { set_field(ra, 0, b_child) };
    TraceRegion::gc(&alloc, ra);
    assert_eq!(first.get().map(|p| p.as_ptr()), Some(b_child));

    rgc::release(&alloc, ra);
    assert_eq!(first.get(), None);
    assert_eq!(second.get(), None);
    assert_eq!(alloc.in_use(), 0);
}

/// ============================================================================
/// EVENT TRAIL
/// ============================================================================

/// Collections and teardowns leave a traceable event trail.
#[test]
fn test_collector_emits_lifecycle_events() {
    logging::configure_logger(GcLoggerConfig {
        level: LogLevel::Debug,
        console: false,
        json: false,
        timestamps: false,
    });

    let alloc = Alloc::new();
    let root = new_region(&alloc, &TRIVIAL_NODE);
    TraceRegion::gc(&alloc, root);
    rgc::release(&alloc, root);

    let events = logging::get_events();
    let has = |pred: &dyn Fn(&GcEvent) -> bool| events.iter().any(|(_, e)| pred(e));

    assert!(has(&|e| matches!(e, GcEvent::RegionCreated { .. })));
    assert!(has(&|e| matches!(e, GcEvent::CycleStart { .. })));
    assert!(has(&|e| matches!(e, GcEvent::CycleEnd { .. })));
    assert!(has(&|e| matches!(e, GcEvent::RegionReleased { .. })));
}

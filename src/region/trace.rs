//! TraceRegion - Mark-and-Sweep Region Implementation
//!
//! A trace region is an ownership domain of mutable objects reclaimed
//! together by a mark-and-sweep collector. Every object in the region has
//! an intrusive `next` link forming a circular list (a "ring") threaded
//! through the region metadata object. The ring is bookkeeping, not the
//! object graph:
//!
//! ```text
//!                                 |
//!                                 v
//!                         iso or root object
//!                          ^            \
//!                        /               v
//!                    object_n        TraceRegion
//!                      |               metadata
//!                     ...                 |
//!                       \                 v
//!                        v             object_1
//!                         other __ ... ___/
//!                        objects
//! ```
//!
//! If the iso object is trivial (no finaliser, no destructor, no
//! subregions), every object in its ring is trivial too; conversely a
//! non-trivial iso heads a ring of non-trivial objects. Objects of the
//! other kind live in a second ring reachable through `next_not_root` /
//! `last_not_root`. The partition lets the sweep run every finaliser
//! before any destructor or deallocation without auxiliary storage.
//!
//! The secondary ring keeps a tail pointer for constant-time merging.
//! The primary ring does not need one: the iso is its last element and
//! there is always a pointer to it.

use std::cell::Cell;
use std::time::Instant;

use crate::alloc::{size_to_sizeclass, sizeclass_to_size, Alloc, SizeClass};
use crate::error::Result;
use crate::logging::{log_event, GcEvent};
use crate::object::{ClassTag, Descriptor, Object, ObjectStack};
use crate::region::ext_ref::{ExternalRef, ExternalReferenceTable};
use crate::region::remembered_set::{RememberedSet, TransferOwnership};

/// Regions smaller than this never ask for a collection.
const GC_THRESHOLD_FLOOR: usize = 16 * 1024;

/// Descriptor stamped on every trace-region metadata object; doubles as
/// the region-kind identity checked by [`TraceRegion::is_trace_region`].
static REGION_DESC: Descriptor = Descriptor::trivial(std::mem::size_of::<TraceRegion>());

/// Which objects a region iterator yields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterKind {
    Trivial,
    NonTrivial,
    /// The primary ring first, then the secondary ring.
    AllObjects,
}

/// Region metadata for a mark-and-sweep region
///
/// Headed by an embedded [`Object`] so ring links can point at the
/// metadata: the primary ring is `header.next … iso … header`, and an
/// iso's region back-pointer is simultaneously the link that closes the
/// ring.
#[repr(C)]
pub struct TraceRegion {
    header: Object,

    /// Secondary ring head; the metadata itself when the ring is empty.
    next_not_root: Cell<*mut Object>,

    /// Secondary ring tail, kept for O(1) merge.
    last_not_root: Cell<*mut Object>,

    /// Live bytes, reset and re-accumulated by each sweep.
    current_memory_used: Cell<usize>,

    /// Post-sweep footprint as a compact size class; feeds the GC
    /// trigger heuristic.
    previous_memory_used: Cell<SizeClass>,

    remembered: RememberedSet,

    ext_refs: ExternalReferenceTable,
}

impl TraceRegion {
    // === Region Lookup ===

    /// Region metadata of the iso object `o`.
    ///
    /// # Panics
    ///
    /// Panics if `o` is not an iso or its region is not a trace region.
    pub fn get(o: *mut Object) -> *mut TraceRegion {
        unsafe {
            assert!((*o).is_iso(), "region lookup requires an iso object");
            let r = (*o).region_base();
            assert!(
                Self::is_trace_region(r),
                "iso belongs to a different region kind"
            );
            r as *mut TraceRegion
        }
    }

    /// Whether the region metadata object `r` is a trace region.
    pub fn is_trace_region(r: *mut Object) -> bool {
        unsafe { std::ptr::eq((*r).descriptor(), &REGION_DESC) }
    }

    // === Construction and Allocation ===

    /// Create a new trace region rooted at a fresh object of type `desc`.
    ///
    /// The object becomes the region's iso and the sole element of the
    /// primary ring. Returns the iso.
    pub fn create(alloc: &Alloc, desc: &'static Descriptor) -> Result<*mut Object> {
        let o = Self::alloc_object(alloc, desc)?;

        let raw = match alloc.alloc(std::mem::size_of::<TraceRegion>()) {
            Ok(raw) => raw,
            Err(e) => {
                unsafe { alloc.dealloc(o as *mut u8, desc.size) };
                log_event(GcEvent::AllocationFailure {
                    size: std::mem::size_of::<TraceRegion>(),
                });
                return Err(e);
            }
        };

        let reg = raw.as_ptr() as *mut TraceRegion;
        unsafe {
            reg.write(TraceRegion {
                header: Object::region_header(&REGION_DESC, o),
                next_not_root: Cell::new(reg as *mut Object),
                last_not_root: Cell::new(reg as *mut Object),
                current_memory_used: Cell::new(0),
                previous_memory_used: Cell::new(0),
                remembered: RememberedSet::new(),
                ext_refs: ExternalReferenceTable::new(),
            });
            (*reg).use_memory(desc.size);
            (*o).make_iso(reg as *mut Object);
        }

        log_event(GcEvent::RegionCreated {
            region: reg as usize,
            root: o as usize,
        });
        Ok(o)
    }

    /// Allocate an object of type `desc` in the region of the iso `in_iso`
    /// and append it to the appropriate ring.
    pub fn alloc(alloc: &Alloc, in_iso: *mut Object, desc: &'static Descriptor) -> Result<*mut Object> {
        let reg = Self::get(in_iso);
        let o = Self::alloc_object(alloc, desc)?;

        unsafe {
            (*reg).append(o);
            (*reg).use_memory(desc.size);
        }
        Ok(o)
    }

    fn alloc_object(alloc: &Alloc, desc: &'static Descriptor) -> Result<*mut Object> {
        match alloc.alloc(desc.size) {
            Ok(raw) => Ok(unsafe { Object::initialise(raw.as_ptr(), desc) }),
            Err(e) => {
                log_event(GcEvent::AllocationFailure { size: desc.size });
                Err(e)
            }
        }
    }

    // === Remembered Set and External References ===

    /// Record a reference from `into`'s region out to the immutable or
    /// cown `o`, canonicalizing SCC interior pointers first.
    pub fn insert(alloc: &Alloc, into: *mut Object, o: *mut Object, transfer: TransferOwnership) {
        unsafe {
            assert!(
                (*o).is_immutable() || (*o).is_cown(),
                "remembered set only tracks immutable and cown targets"
            );
            let reg = Self::get(into);
            let o = if (*o).class() == ClassTag::SccPtr {
                (*o).immutable()
            } else {
                o
            };
            (*reg).remembered.insert(alloc, o, transfer);
        }
    }

    /// Hand out an external handle to `o`, an object in `into`'s region.
    ///
    /// The handle reads empty once `o` is collected.
    pub fn create_external_ref(into: *mut Object, o: *mut Object) -> ExternalRef {
        let reg = Self::get(into);
        unsafe {
            debug_assert!((*reg).contains(o));
            (*reg).ext_refs.create_ref(o)
        }
    }

    // === Merge ===

    /// Merge `o`'s region into `into`'s region.
    ///
    /// Both must be trace regions. `o` is demoted to a regular object of
    /// the merged region; its former metadata is deallocated. O(1) ring
    /// surgery plus the collaborators' own merge contracts.
    pub fn merge(alloc: &Alloc, into: *mut Object, o: *mut Object) {
        unsafe {
            assert!((*o).is_iso(), "merge absorbs a region through its iso");
            let reg = Self::get(into);
            let other = (*o).region_base();
            assert!(reg as *mut Object != other, "cannot merge a region into itself");
            assert!(
                Self::is_trace_region(other),
                "merge requires two regions of the same kind"
            );
            let other = other as *mut TraceRegion;

            (*reg).merge_internal(o, other);

            (*reg).ext_refs.merge(&(*other).ext_refs);
            (*reg).remembered.merge(alloc, &(*other).remembered);

            log_event(GcEvent::RegionsMerged {
                into: reg as usize,
                absorbed: other as usize,
            });

            // The absorbed region's metadata is now empty of state.
            Self::dealloc_region(alloc, other);
        }
    }

    unsafe fn merge_internal(&self, o: *mut Object, other: *mut TraceRegion) {
        debug_assert_eq!((*o).region_base(), other as *mut Object);
        let other_obj = other as *mut Object;

        // Absorb the primary ring; the absorbed iso is its tail, and
        // splicing re-stamps it UNMARKED, completing its demotion.
        let head = (*other).head();
        if head != other_obj {
            self.append_pair(head, o);
        }

        // Absorb the secondary ring.
        let head = (*other).next_not_root.get();
        if head != other_obj {
            self.append_pair(head, (*other).last_not_root.get());
        }

        self.current_memory_used
            .set(self.current_memory_used.get() + (*other).current_memory_used.get());

        // Fold both post-sweep footprints through the size-class
        // approximation.
        self.previous_memory_used.set(size_to_sizeclass(
            sizeclass_to_size(self.previous_memory_used.get())
                + sizeclass_to_size((*other).previous_memory_used.get()),
        ));
    }

    // === Swap Root ===

    /// Replace the region's iso `prev` with `next`, another mutable
    /// object of the same region. O(1); no allocation, no deallocation.
    pub fn swap_root(prev: *mut Object, next: *mut Object) {
        unsafe {
            assert!(prev != next, "swap_root requires two distinct objects");
            assert!((*prev).is_iso(), "swap_root starts from the current iso");
            assert!((*next).is_mutable(), "new root must be mutable");

            let reg = Self::get(prev);
            debug_assert!(prev != reg as *mut Object);
            (*reg).swap_root_internal(prev, next);

            log_event(GcEvent::RootSwapped {
                region: reg as usize,
                prev: prev as usize,
                next: next as usize,
            });
        }
    }

    unsafe fn swap_root_internal(&self, oroot: *mut Object, nroot: *mut Object) {
        debug_assert!(self.contains(nroot));
        let self_obj = self.as_object();
        let mut oroot = oroot;

        // If the trivialities differ the rings exchange roles: the old
        // secondary becomes the primary, and the old root is demoted to
        // tail of the new secondary.
        if (*oroot).is_trivial() != (*nroot).is_trivial() {
            debug_assert_eq!((*self.last_not_root.get()).next_any_mark(), self_obj);

            let t = self.head();
            self.set_head(self.next_not_root.get());
            self.next_not_root.set(t);

            let t = self.last_not_root.get();
            self.last_not_root.set(oroot);
            (*oroot).init_next(self_obj);
            oroot = t;
        }

        // The rings may have already put the new root in tail position.
        if oroot != nroot {
            // A region metadata object cannot be a root.
            debug_assert!(oroot != self_obj);
            debug_assert_eq!((*oroot).next_any_mark(), self_obj);
            debug_assert!((*nroot).next() != self_obj);

            let x = self.head();
            let y = (*nroot).next();

            (*oroot).init_next(x);
            self.set_head(y);
        }

        (*nroot).make_iso(self_obj);
    }

    // === Garbage Collection ===

    /// Run a collection on the region of the iso `o`.
    ///
    /// Marks the intra-region graph from the root, sweeps both rings and
    /// the remembered set, then releases every subregion discovered
    /// unreachable. Pointers to immutables and other regions are never
    /// followed.
    pub fn gc(alloc: &Alloc, o: *mut Object) {
        let reg = Self::get(o);
        let started = Instant::now();
        log_event(GcEvent::CycleStart {
            region: reg as usize,
        });

        let mut f = ObjectStack::new();
        let mut collect = ObjectStack::new();
        let mut marked = 0;

        unsafe {
            (*reg).mark(alloc, o, &mut f, &mut marked);
            (*reg).sweep::<false>(alloc, o, &mut f, &mut collect, marked);

            // `collect` holds the isos of unreachable subregions; they are
            // garbage, so release them outright.
            super::release_worklist(alloc, &mut f, &mut collect);

            log_event(GcEvent::CycleEnd {
                region: reg as usize,
                duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                survived_bytes: (*reg).current_memory_used.get(),
            });
        }
    }

    /// Live bytes in `o`'s region as of the last sweep, plus allocations
    /// since.
    pub fn memory_used(o: *mut Object) -> usize {
        unsafe { (*Self::get(o)).current_memory_used.get() }
    }

    /// Whether the region has outgrown its previous post-sweep footprint
    /// enough to be worth collecting.
    pub fn should_gc(o: *mut Object) -> bool {
        unsafe {
            let reg = Self::get(o);
            let previous = sizeclass_to_size((*reg).previous_memory_used.get());
            let current = (*reg).current_memory_used.get();
            current > GC_THRESHOLD_FLOOR.max(previous.saturating_mul(2))
        }
    }

    /// Number of remembered-set entries in `o`'s region.
    pub fn remembered_count(o: *mut Object) -> usize {
        unsafe { (*Self::get(o)).remembered.len() }
    }

    /// Whether `target` is currently tracked by `o`'s remembered set.
    pub fn remembers(o: *mut Object, target: *mut Object) -> bool {
        unsafe { (*Self::get(o)).remembered.contains(target) }
    }

    /// Number of live external handles into `o`'s region.
    pub fn external_ref_count(o: *mut Object) -> usize {
        unsafe { (*Self::get(o)).ext_refs.len() }
    }

    /// Release and deallocate everything in the region of the iso `o`,
    /// the iso and the metadata included. Subregion isos discovered on
    /// the way are pushed onto `collect` for the caller's worklist.
    pub(crate) unsafe fn release_internal(
        reg: *mut TraceRegion,
        alloc: &Alloc,
        o: *mut Object,
        f: &mut ObjectStack,
        collect: &mut ObjectStack,
    ) {
        debug_assert!((*o).is_iso());
        log_event(GcEvent::RegionReleased {
            region: reg as usize,
        });

        (*reg).sweep::<true>(alloc, o, f, collect, 0);
        Self::dealloc_region(alloc, reg);
    }

    /// Run the collaborators' destructors and return the metadata memory.
    unsafe fn dealloc_region(alloc: &Alloc, reg: *mut TraceRegion) {
        debug_assert_eq!((*reg).remembered.len(), 0);
        debug_assert_eq!((*reg).ext_refs.len(), 0);
        std::ptr::drop_in_place(reg);
        alloc.dealloc(reg as *mut u8, std::mem::size_of::<TraceRegion>());
    }

    // === Ring Maintenance ===

    #[inline]
    fn as_object(&self) -> *mut Object {
        self.header.as_mut_ptr()
    }

    /// Head of the primary ring.
    #[inline]
    fn head(&self) -> *mut Object {
        self.header.next()
    }

    #[inline]
    fn set_head(&self, o: *mut Object) {
        self.header.set_next(o);
    }

    #[inline]
    fn use_memory(&self, size: usize) {
        self.current_memory_used
            .set(self.current_memory_used.get() + size);
    }

    #[inline]
    unsafe fn append(&self, o: *mut Object) {
        self.append_pair(o, o);
    }

    /// Splice the sublist `hd..=tl` into the ring matching `hd`'s
    /// triviality, right behind the metadata object. `hd == tl` for a
    /// single object.
    unsafe fn append_pair(&self, hd: *mut Object, tl: *mut Object) {
        let p = self.head();

        if (*hd).is_trivial() == (*p).is_trivial() {
            (*tl).init_next(p);
            self.set_head(hd);
        } else {
            (*tl).init_next(self.next_not_root.get());
            self.next_not_root.set(hd);

            if self.last_not_root.get() == self.as_object() {
                self.last_not_root.set(tl);
            }
        }
    }

    // === Mark ===

    /// Mark every object reachable from the iso `o` within the region.
    ///
    /// Pointers out of the region are delegated: SCC interior pointers
    /// canonicalize through `immutable()` and land in the remembered set,
    /// as do RC and COWN targets. Subregion isos keep their ISO tag and
    /// are left for the sweep's iso-field walk.
    unsafe fn mark(&self, alloc: &Alloc, o: *mut Object, dfs: &mut ObjectStack, marked: &mut usize) {
        (*o).trace(dfs);
        while let Some(p) = dfs.pop() {
            match (*p).class() {
                ClassTag::Iso | ClassTag::Marked => {}

                ClassTag::Unmarked => {
                    (*p).mark();
                    (*p).trace(dfs);
                }

                ClassTag::SccPtr => {
                    let q = (*p).immutable();
                    self.remembered.mark(alloc, q, marked);
                }

                ClassTag::Rc | ClassTag::Cown => {
                    self.remembered.mark(alloc, p, marked);
                }
            }
        }
    }

    // === Sweep ===

    /// Sweep both rings and the remembered set.
    ///
    /// The non-trivial ring goes first: finalisers in it may read any
    /// other object in the region, so nothing may have been freed yet.
    /// With `SWEEP_ALL` the entire region is being released and the iso
    /// is collected like everything else; otherwise the iso survives.
    unsafe fn sweep<const SWEEP_ALL: bool>(
        &self,
        alloc: &Alloc,
        o: *mut Object,
        f: &mut ObjectStack,
        collect: &mut ObjectStack,
        marked: usize,
    ) {
        self.current_memory_used.set(0);

        let primary_trivial = (*o).is_trivial();

        self.sweep_ring::<false, SWEEP_ALL>(alloc, o, primary_trivial, f, collect);
        self.sweep_ring::<true, SWEEP_ALL>(alloc, o, primary_trivial, f, collect);

        self.remembered.sweep_set(alloc, marked);
        self.previous_memory_used
            .set(size_to_sizeclass(self.current_memory_used.get()));
    }

    /// Collect one object. Trivial objects are deallocated on the spot;
    /// non-trivial ones are finalised and chained onto the pending list
    /// `gc`, because other finalisers may still read them.
    unsafe fn sweep_object<const TRIVIAL_RING: bool>(
        &self,
        alloc: &Alloc,
        p: *mut Object,
        gc: &mut *mut Object,
    ) {
        debug_assert!(matches!(
            (*p).class(),
            ClassTag::Iso | ClassTag::Unmarked
        ));

        if TRIVIAL_RING {
            debug_assert!((*p).is_trivial());

            if (*p).has_ext_ref() {
                self.ext_refs.erase(p);
            }
            alloc.dealloc(p as *mut u8, (*p).size());
        } else {
            debug_assert!(!(*p).is_trivial());
            (*p).finalise();

            (*p).init_next(*gc);
            *gc = p;
        }
    }

    /// Walk one ring, unlinking and collecting every UNMARKED object.
    ///
    /// `TRIVIAL_RING` selects which ring; whether that is the primary or
    /// the secondary depends on the root's triviality, which decides both
    /// the walk's starting pointer and which head/tail fields unlinking
    /// has to fix up.
    unsafe fn sweep_ring<const TRIVIAL_RING: bool, const SWEEP_ALL: bool>(
        &self,
        alloc: &Alloc,
        o: *mut Object,
        primary_trivial: bool,
        f: &mut ObjectStack,
        collect: &mut ObjectStack,
    ) {
        let region = self.as_object();
        let is_primary = TRIVIAL_RING == primary_trivial;

        let mut prev = region;
        let mut p = if is_primary {
            self.head()
        } else {
            self.next_not_root.get()
        };
        let mut gc: *mut Object = std::ptr::null_mut();

        // The iterator is no use here: the walk removes and deallocates
        // objects as it goes.
        while p != region {
            match (*p).class() {
                ClassTag::Iso => {
                    // The iso is always the root and the last ring element.
                    debug_assert_eq!((*p).next_any_mark(), region);
                    debug_assert_eq!((*p).region_base(), region);

                    // The iso counts as marked unless the whole region is
                    // being released.
                    if SWEEP_ALL {
                        self.sweep_object::<TRIVIAL_RING>(alloc, p, &mut gc);
                    } else {
                        self.use_memory((*p).size());
                    }

                    p = region;
                }

                ClassTag::Marked => {
                    debug_assert!(!SWEEP_ALL);
                    self.use_memory((*p).size());
                    (*p).unmark();
                    prev = p;
                    p = (*p).next();
                }

                ClassTag::Unmarked => {
                    let q = (*p).next();
                    self.sweep_object::<TRIVIAL_RING>(alloc, p, &mut gc);

                    if !is_primary && prev == region {
                        self.next_not_root.set(q);
                    } else {
                        (*prev).set_next(q);
                    }

                    if !is_primary && self.last_not_root.get() == p {
                        self.last_not_root.set(prev);
                    }

                    p = q;
                }

                tag => panic!("swept object with unexpected class tag {:?}", tag),
            }
        }

        // Subregion discovery has to read the pending objects' headers,
        // so it cannot share a pass with destruction and deallocation.
        if !TRIVIAL_RING {
            let mut p = gc;
            while !p.is_null() {
                (*p).find_iso_fields(o, f, collect);
                p = (*p).next();
            }

            let mut p = gc;
            while !p.is_null() {
                let q = (*p).next();
                if (*p).has_ext_ref() {
                    self.ext_refs.erase(p);
                }
                (*p).destruct();
                alloc.dealloc(p as *mut u8, (*p).size());
                p = q;
            }
        }
    }

    // === Iteration ===

    /// Iterate the objects of `o`'s region.
    pub fn objects(o: *mut Object, kind: IterKind) -> RegionIter {
        let reg = Self::get(o);
        RegionIter::new(reg, kind)
    }

    /// Ring-membership check backing debug assertions.
    unsafe fn contains(&self, o: *mut Object) -> bool {
        let reg = self as *const TraceRegion as *mut TraceRegion;
        RegionIter::new(reg, IterKind::AllObjects).any(|p| p == o)
    }
}

/// Iterator over a region's rings
///
/// Yields raw object pointers; the region must not be mutated while the
/// iterator is live.
pub struct RegionIter {
    reg: *mut TraceRegion,
    ptr: *mut Object,
    kind: IterKind,
}

impl RegionIter {
    fn new(reg: *mut TraceRegion, kind: IterKind) -> Self {
        unsafe {
            let reg_obj = (*reg).as_object();
            let q = (*reg).head();

            let ptr = match kind {
                IterKind::Trivial => {
                    if (*q).is_trivial() {
                        q
                    } else {
                        (*reg).next_not_root.get()
                    }
                }
                IterKind::NonTrivial => {
                    if !(*q).is_trivial() {
                        q
                    } else {
                        (*reg).next_not_root.get()
                    }
                }
                IterKind::AllObjects => q,
            };

            // Landing on the metadata means the ring was empty.
            let ptr = if ptr == reg_obj {
                std::ptr::null_mut()
            } else {
                ptr
            };

            Self { reg, ptr, kind }
        }
    }
}

impl Iterator for RegionIter {
    type Item = *mut Object;

    fn next(&mut self) -> Option<*mut Object> {
        if self.ptr.is_null() {
            return None;
        }
        let cur = self.ptr;

        unsafe {
            let reg_obj = (*self.reg).as_object();
            let q = (*cur).next_any_mark();

            if q != reg_obj {
                self.ptr = q;
            } else if self.kind == IterKind::AllObjects
                && cur != (*self.reg).last_not_root.get()
                && (*self.reg).next_not_root.get() != reg_obj
            {
                // Finished the primary ring with a secondary to switch to.
                debug_assert!((*cur).is_iso());
                self.ptr = (*self.reg).next_not_root.get();
            } else {
                self.ptr = std::ptr::null_mut();
            }
        }

        Some(cur)
    }
}

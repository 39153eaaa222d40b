//! Object Header - Metadata for GC-Managed Objects
//!
//! Object Header Layout (16 bytes on 64-bit):
//! ┌──────────────────────────────────────────────┐
//! │        Descriptor Word (8 bytes)             │
//! │  - Bit 0: external-reference flag            │
//! │  - Bits 3-63: &'static Descriptor address    │
//! ├──────────────────────────────────────────────┤
//! │        Status Word `bits` (8 bytes)          │
//! │  - Bits 0-2: class tag                       │
//! │  - Bits 3-63: payload (see below)            │
//! └──────────────────────────────────────────────┘
//!
//! The payload of the status word is overloaded by class tag:
//!
//! | Tag      | Payload                                        |
//! |----------|------------------------------------------------|
//! | UNMARKED | intrusive ring link (`next`)                   |
//! | MARKED   | intrusive ring link (`next`)                   |
//! | ISO      | region metadata back-pointer (= ring terminator)|
//! | SCC_PTR  | parent link in the immutable SCC structure     |
//! | RC       | reference count, shifted past the tag bits     |
//! | COWN     | reference count, shifted past the tag bits     |
//!
//! The iso object is always the last element of its region's primary
//! ring, so a single word serves as both the region back-pointer and the
//! link that closes the ring at the metadata object.
//!
//! # Memory Ordering Model
//!
//! Region-local fields (ring links, marks, the iso back-pointer) are only
//! ever mutated by the owning actor, so those paths use `Relaxed`.
//! Reference counts on RC and COWN objects are shared across actors:
//! increments are `Relaxed`, decrements are `AcqRel` so the thread that
//! drops the last count observes all prior writes before reclaiming.
//! SCC parent-link compression uses `Relaxed` stores; racing writers all
//! converge on the same representative.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::object::descriptor::Descriptor;
use crate::object::stack::ObjectStack;

/// Size of the object header in bytes
pub const HEADER_SIZE: usize = std::mem::size_of::<Object>();

/// Class tag mask in the status word
const TAG_MASK: usize = 0x7;

/// Payload mask in the status word
const PAYLOAD_MASK: usize = !TAG_MASK;

/// Reference counts live above the tag bits
const RC_SHIFT: usize = 3;
const RC_ONE: usize = 1 << RC_SHIFT;

/// External-reference flag in the descriptor word
const EXT_REF_FLAG: usize = 0x1;
const DESC_MASK: usize = !EXT_REF_FLAG;

/// Object class codes
///
/// UNMARKED and MARKED toggle intra-region liveness during a collection.
/// ISO marks a region root. SCC_PTR, RC and COWN denote references that
/// cross into immutable or concurrently-owned graphs the region does not
/// own; mark delegates those to the remembered set.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassTag {
    Unmarked = 0x0,
    Marked = 0x1,
    SccPtr = 0x2,
    Rc = 0x3,
    Iso = 0x4,
    Cown = 0x5,
}

impl ClassTag {
    /// Decode the low bits of a status word.
    ///
    /// # Panics
    ///
    /// Panics on the two unused bit patterns; a tag outside the
    /// enumerated codes means the header has been corrupted.
    #[inline]
    fn from_bits(bits: usize) -> ClassTag {
        match bits & TAG_MASK {
            0x0 => ClassTag::Unmarked,
            0x1 => ClassTag::Marked,
            0x2 => ClassTag::SccPtr,
            0x3 => ClassTag::Rc,
            0x4 => ClassTag::Iso,
            0x5 => ClassTag::Cown,
            tag => panic!("corrupt object header: class tag {:#x}", tag),
        }
    }
}

/// Header of every GC-managed object
///
/// An object is a header followed by its payload; `*mut Object` is the
/// currency of the whole collector. Region metadata embeds an `Object`
/// as its first field so ring links can point at the metadata and
/// terminate the walk without a special case.
#[repr(C)]
pub struct Object {
    /// Descriptor address with the external-reference flag in bit 0
    desc: AtomicUsize,

    /// Class tag and payload
    bits: AtomicUsize,
}

impl Object {
    /// Stamp a fresh header onto raw memory.
    ///
    /// The object starts UNMARKED with a null ring link; the caller links
    /// it into a ring (or re-tags it as an immutable) afterwards.
    ///
    /// # Safety
    ///
    /// `raw` must point to at least `desc.size` bytes of writable memory
    /// aligned to [`crate::alloc::OBJECT_ALIGNMENT`].
    pub unsafe fn initialise(raw: *mut u8, desc: &'static Descriptor) -> *mut Object {
        debug_assert!(Object::debug_is_aligned(raw));
        debug_assert!(desc.size >= HEADER_SIZE);

        let o = raw as *mut Object;
        o.write(Object {
            desc: AtomicUsize::new(desc as *const Descriptor as usize),
            bits: AtomicUsize::new(ClassTag::Unmarked as usize),
        });
        o
    }

    /// Header for an embedded region metadata object, with its ring
    /// already pointing at `first`.
    pub(crate) fn region_header(desc: &'static Descriptor, first: *mut Object) -> Object {
        Object {
            desc: AtomicUsize::new(desc as *const Descriptor as usize),
            bits: AtomicUsize::new(first as usize | ClassTag::Unmarked as usize),
        }
    }

    pub(crate) fn debug_is_aligned(raw: *const u8) -> bool {
        raw as usize % crate::alloc::OBJECT_ALIGNMENT == 0
    }

    #[inline]
    fn load_bits(&self) -> usize {
        self.bits.load(Ordering::Relaxed)
    }

    #[inline]
    fn store_bits(&self, bits: usize) {
        self.bits.store(bits, Ordering::Relaxed);
    }

    #[inline]
    fn payload(&self) -> usize {
        self.load_bits() & PAYLOAD_MASK
    }

    #[inline]
    pub(crate) fn as_mut_ptr(&self) -> *mut Object {
        self as *const Object as *mut Object
    }

    // === Class Queries ===

    #[inline]
    pub fn class(&self) -> ClassTag {
        ClassTag::from_bits(self.load_bits())
    }

    #[inline]
    pub fn is_iso(&self) -> bool {
        self.class() == ClassTag::Iso
    }

    /// Mutable region objects are those currently UNMARKED or MARKED.
    #[inline]
    pub fn is_mutable(&self) -> bool {
        matches!(self.class(), ClassTag::Unmarked | ClassTag::Marked)
    }

    #[inline]
    pub fn is_immutable(&self) -> bool {
        matches!(self.class(), ClassTag::SccPtr | ClassTag::Rc)
    }

    #[inline]
    pub fn is_cown(&self) -> bool {
        self.class() == ClassTag::Cown
    }

    // === Descriptor Access ===

    #[inline]
    pub fn descriptor(&self) -> &'static Descriptor {
        let addr = self.desc.load(Ordering::Relaxed) & DESC_MASK;
        unsafe { &*(addr as *const Descriptor) }
    }

    /// Total object size in bytes, header included
    #[inline]
    pub fn size(&self) -> usize {
        self.descriptor().size
    }

    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.descriptor().is_trivial()
    }

    /// Start of the object payload, just past the header
    #[inline]
    pub fn data(&self) -> *mut u8 {
        unsafe { (self.as_mut_ptr() as *mut u8).add(HEADER_SIZE) }
    }

    // === External-Reference Flag ===

    #[inline]
    pub fn has_ext_ref(&self) -> bool {
        self.desc.load(Ordering::Relaxed) & EXT_REF_FLAG != 0
    }

    #[inline]
    pub(crate) fn set_ext_ref(&self, on: bool) {
        let word = self.desc.load(Ordering::Relaxed);
        let word = if on {
            word | EXT_REF_FLAG
        } else {
            word & DESC_MASK
        };
        self.desc.store(word, Ordering::Relaxed);
    }

    // === Ring Link Operations ===

    /// Link this object to `next`, re-stamping its class to UNMARKED.
    ///
    /// This is the splice primitive: it is valid on any region object,
    /// including a former iso being demoted into a ring or a dead object
    /// being chained onto the sweep's pending list.
    #[inline]
    pub(crate) fn init_next(&self, next: *mut Object) {
        self.store_bits(next as usize | ClassTag::Unmarked as usize);
    }

    /// Update the ring link of an object that is already UNMARKED.
    #[inline]
    pub(crate) fn set_next(&self, next: *mut Object) {
        debug_assert_eq!(self.class(), ClassTag::Unmarked);
        self.store_bits(next as usize | ClassTag::Unmarked as usize);
    }

    /// Ring link of an UNMARKED object.
    #[inline]
    pub(crate) fn next(&self) -> *mut Object {
        debug_assert_eq!(self.class(), ClassTag::Unmarked);
        self.payload() as *mut Object
    }

    /// Ring link regardless of mark state.
    ///
    /// For an iso the payload is the region metadata, which is exactly
    /// where its ring link must point, so this is valid on it too.
    #[inline]
    pub(crate) fn next_any_mark(&self) -> *mut Object {
        debug_assert!(matches!(
            self.class(),
            ClassTag::Unmarked | ClassTag::Marked | ClassTag::Iso
        ));
        self.payload() as *mut Object
    }

    // === Mark Operations ===

    #[inline]
    pub(crate) fn mark(&self) {
        debug_assert_eq!(self.class(), ClassTag::Unmarked);
        self.store_bits(self.payload() | ClassTag::Marked as usize);
    }

    #[inline]
    pub(crate) fn unmark(&self) {
        debug_assert_eq!(self.class(), ClassTag::Marked);
        self.store_bits(self.payload() | ClassTag::Unmarked as usize);
    }

    // === Iso Operations ===

    /// Stamp this object as the iso of `region`.
    ///
    /// The payload becomes the region back-pointer, which also closes the
    /// primary ring at the metadata object.
    #[inline]
    pub(crate) fn make_iso(&self, region: *mut Object) {
        self.store_bits(region as usize | ClassTag::Iso as usize);
    }

    /// Region metadata back-pointer of an iso object.
    #[inline]
    pub(crate) fn region_base(&self) -> *mut Object {
        debug_assert_eq!(self.class(), ClassTag::Iso);
        self.payload() as *mut Object
    }

    // === Reference Counting (RC and COWN) ===

    /// Re-tag this object as a reference-counted immutable with one
    /// outstanding count. Used by the freeze machinery when an SCC
    /// representative is promoted out of a region.
    pub fn init_rc(&self) {
        self.store_bits(RC_ONE | ClassTag::Rc as usize);
    }

    /// Re-tag this object as a cown handle with one outstanding count.
    pub fn init_cown(&self) {
        self.store_bits(RC_ONE | ClassTag::Cown as usize);
    }

    #[inline]
    pub fn refcount(&self) -> usize {
        debug_assert!(matches!(self.class(), ClassTag::Rc | ClassTag::Cown));
        self.load_bits() >> RC_SHIFT
    }

    /// Acquire one reference count.
    #[inline]
    pub fn incref(&self) {
        debug_assert!(matches!(self.class(), ClassTag::Rc | ClassTag::Cown));
        self.bits.fetch_add(RC_ONE, Ordering::Relaxed);
    }

    /// Drop one reference count; returns true when the last count fell.
    #[inline]
    pub fn decref(&self) -> bool {
        debug_assert!(matches!(self.class(), ClassTag::Rc | ClassTag::Cown));
        let prev = self.bits.fetch_sub(RC_ONE, Ordering::AcqRel);
        debug_assert!(prev >> RC_SHIFT > 0);
        prev >> RC_SHIFT == 1
    }

    // === Immutable SCC Operations ===

    /// Make this object an interior member of the SCC rooted at `parent`.
    pub fn make_scc_member(&self, parent: *mut Object) {
        debug_assert!(!parent.is_null());
        self.store_bits(parent as usize | ClassTag::SccPtr as usize);
    }

    #[inline]
    fn scc_parent(&self) -> *mut Object {
        debug_assert_eq!(self.class(), ClassTag::SccPtr);
        self.payload() as *mut Object
    }

    /// Canonical representative of this immutable's SCC.
    ///
    /// Chases parent links to the reference-counted representative and
    /// compresses the chain behind itself so later chases are O(1).
    pub fn immutable(&self) -> *mut Object {
        let start = self.as_mut_ptr();
        unsafe {
            let mut root = start;
            while (*root).class() == ClassTag::SccPtr {
                root = (*root).scc_parent();
            }
            debug_assert_eq!((*root).class(), ClassTag::Rc);

            let mut p = start;
            while (*p).class() == ClassTag::SccPtr {
                let parent = (*p).scc_parent();
                if parent != root {
                    (*p).make_scc_member(root);
                }
                p = parent;
            }
            root
        }
    }

    // === Callback Dispatch ===

    /// Push this object's outgoing references onto `stack`.
    #[inline]
    pub(crate) fn trace(&self, stack: &mut ObjectStack) {
        if let Some(trace) = self.descriptor().trace {
            trace(self.as_mut_ptr(), stack);
        }
    }

    pub(crate) fn finalise(&self) {
        if let Some(finaliser) = self.descriptor().finaliser {
            finaliser(self.as_mut_ptr());
        }
    }

    pub(crate) fn destruct(&self) {
        if let Some(destructor) = self.descriptor().destructor {
            destructor(self.as_mut_ptr());
        }
    }

    /// Collect the subregion roots reachable from this object's fields.
    ///
    /// Within a region the only iso is the root itself, so every traced
    /// reference still tagged ISO that is not `root` leads into a
    /// different region. Must run while all headers in the region are
    /// intact; the sweep orders its phases around that.
    pub(crate) fn find_iso_fields(
        &self,
        root: *mut Object,
        f: &mut ObjectStack,
        collect: &mut ObjectStack,
    ) {
        debug_assert!(f.is_empty());
        self.trace(f);
        while let Some(q) = f.pop() {
            unsafe {
                if (*q).class() == ClassTag::Iso && q != root {
                    collect.push(q);
                }
            }
        }
    }
}

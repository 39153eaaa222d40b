//! # RGC - Region-Based Tracing Garbage Collector
//!
//! RGC is the mark-and-sweep region collector of an actor runtime. A
//! *region* is a contiguous ownership domain rooted at a unique *iso*
//! (isolated) object; every mutable object belongs to exactly one region,
//! and a region is owned by exactly one actor at a time. Collection is
//! **stop-the-region**, never stop-the-world: an actor collects its own
//! region on its own thread while every other actor keeps running.
//!
//! ## Overview
//!
//! All objects of a region are threaded onto circular intrusive lists
//! ("rings") through their header's `next` link - bookkeeping distinct
//! from the object graph:
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
//! Each region keeps two rings: one for *trivial* objects (no finaliser,
//! no destructor, no subregions) and one for the rest. The iso sits at
//! the tail of the ring matching its own triviality (the *primary* ring).
//! The partition lets a sweep run every finaliser before any destructor
//! or deallocation, in a single pass per ring.
//!
//! A collection cycle:
//!
//! 1. **Mark**: DFS from the iso's references. Intra-region objects
//!    toggle UNMARKED -> MARKED; references into immutable SCCs, RC and
//!    cown targets are delegated to the region's remembered set;
//!    subregion isos are not followed.
//! 2. **Sweep**: walk the non-trivial ring (finalise, discover subregion
//!    roots, destruct, free), then the trivial ring (free on sight), then
//!    sweep the remembered set and refresh the heuristics.
//! 3. **Cascade**: subregions discovered unreachable are released through
//!    a worklist, each dispatched to its region kind.
//!
//! Merging two regions and swapping a region's root are O(1) ring
//! surgery; neither allocates.
//!
//! ## Quick Start
//!
//! ```rust
//! use rgc::{Alloc, Descriptor, TraceRegion};
//!
//! static POINT: Descriptor = Descriptor::trivial(32);
//!
//! fn main() -> Result<(), rgc::RgcError> {
//!     let alloc = Alloc::new();
//!
//!     // A region is created through (and addressed by) its iso object.
//!     let root = TraceRegion::create(&alloc, &POINT)?;
//!     let _child = TraceRegion::alloc(&alloc, root, &POINT)?;
//!
//!     // Nothing references the child, so a collection reclaims it.
//!     TraceRegion::gc(&alloc, root);
//!
//!     // Tearing the region down frees the iso and the metadata too.
//!     rgc::region::release(&alloc, root);
//!     Ok(())
//! }
//! ```
//!
//! ## Safety
//!
//! RGC uses `unsafe` internally and hands out raw `*mut Object` pointers.
//! The object layer consuming this crate must uphold:
//!
//! 1. **Single ownership**: all operations on a region run on the thread
//!    of the actor that currently owns its iso
//! 2. **Accurate descriptors**: `trace` enumerates every reference field;
//!    `size` covers the whole allocation
//! 3. **Callback discipline**: finalisers may read other region objects,
//!    destructors must not
//! 4. **No resurrection**: callbacks must not stash references to dying
//!    objects
//!
//! ## Modules
//!
//! - [`alloc`]: actor-local allocator facade and size classes
//! - [`error`]: error types for allocator failures
//! - [`logging`]: structured event trail for collector operations
//! - [`object`]: object header, descriptors, scratch stacks
//! - [`region`]: trace regions, remembered set, external references

pub mod alloc;
pub mod error;
pub mod logging;
pub mod object;
pub mod region;

pub use alloc::Alloc;
pub use error::{Result, RgcError};
pub use object::{ClassTag, Descriptor, Object, ObjectStack, HEADER_SIZE};
pub use region::{release, ExternalRef, IterKind, RegionIter, TraceRegion, TransferOwnership};

/// RGC version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

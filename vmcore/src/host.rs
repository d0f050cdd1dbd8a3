//! Contracts for collaborators that live outside this crate.
//!
//! The host VM's string representation, garbage collector, and thread-context
//! object are out of scope (§1); we consume them only through the abstract
//! contracts below. A real embedder supplies concrete implementations; this
//! crate never assumes a particular string encoding or GC design.

use core::ptr::NonNull;

/// An opaque handle to a host-owned interned or boxed string. Identity
/// (pointer) equality is always available at this layer; content equality
/// and hashing route through [`StringHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrHandle(pub NonNull<()>);

// SAFETY: a `StrHandle` is an opaque, caller-owned identity token. This crate
// never dereferences it; only the host-supplied `StringHost` does.
unsafe impl Send for StrHandle {}
unsafe impl Sync for StrHandle {}

/// The host's string API (§6): hashing, length-in-graphemes, and substring
/// comparison, used by [`crate::hash::index_hash::IndexHash`] and
/// [`crate::hash::uni_hash::UniHash`].
pub trait StringHost {
    /// A 64-bit hash incorporating the host's per-process salt.
    fn hash_code(&self, s: StrHandle) -> u64;
    /// Length of `s` in graphemes (not bytes).
    fn graphemes(&self, s: StrHandle) -> usize;
    /// Compare `n` graphemes of `a` starting at `ai` against `b` starting at `bi`.
    fn substrings_equal(&self, a: StrHandle, ai: usize, n: usize, b: StrHandle, bi: usize) -> bool;
}

/// An opaque GC header identifying the owner or target of a write-barrier
/// event (§5 "GC interaction").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcHeader(pub NonNull<()>);

unsafe impl Send for GcHeader {}
unsafe impl Sync for GcHeader {}

/// An opaque address of a managed-pointer slot queued for GC marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcSlot(pub NonNull<()>);

unsafe impl Send for GcSlot {}
unsafe impl Sync for GcSlot {}

/// The host's GC API (§6): write barriers and worklist enqueueing. The stats
/// folder (`C5`) calls this whenever it stores a managed type pointer into
/// the stats tree.
pub trait GcSink {
    /// Record that `owner` now holds a reference to `target`.
    fn write_barrier(&self, owner: GcHeader, target: GcHeader);
    /// Enqueue `slot` for the next GC mark pass.
    fn worklist_add(&mut self, slot: GcSlot);
}

/// A no-op [`GcSink`], useful for tests and hosts without incremental GC.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGcSink;

impl GcSink for NullGcSink {
    fn write_barrier(&self, _owner: GcHeader, _target: GcHeader) {}
    fn worklist_add(&mut self, _slot: GcSlot) {}
}

/// An opaque per-mutator-thread token (§5). Carries no required behavior in
/// this crate beyond being a stable, cheaply-copyable identity used for error
/// reporting and GC-barrier targeting by the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadContext(pub usize);

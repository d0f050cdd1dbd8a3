//! `UniHash`: borrowed C-style byte-string keys with a cached 32-bit hash, an
//! inline `i32` value (§4.4). Keys are never owned by the table — callers
//! must keep the backing bytes alive for as long as the key stays inserted,
//! the same borrowing contract `PtrHash` places on its pointer keys.

use crate::{
    error::oops,
    hash::robinhood::{HashSpec, RobinHood, Slot},
};

/// A borrowed byte-string key plus its precomputed 32-bit hash. The hash is
/// "host-provided": this crate never hashes the bytes itself, it only
/// compares them once the cached hashes already agree.
#[derive(Debug, Clone, Copy)]
pub struct UniKey {
    bytes: *const u8,
    len: usize,
    hash: u32,
}

impl UniKey {
    /// Build a key from `bytes` and an already-computed 32-bit hash.
    pub fn with_hash(bytes: &[u8], hash: u32) -> Self {
        Self { bytes: bytes.as_ptr(), len: bytes.len(), hash }
    }

    /// Build a key from `bytes`, hashing them with this crate's own FNV-1a
    /// fallback for callers with no host-side hash to reuse.
    pub fn new(bytes: &[u8]) -> Self {
        Self::with_hash(bytes, fnv1a32(bytes))
    }

    fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.bytes, self.len) }
    }
}

fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for &b in bytes {
        h ^= b as u32;
        h = h.wrapping_mul(0x0100_0193);
    }
    h
}

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    bytes: *const u8,
    len: usize,
    hash: u32,
    value: i32,
}

struct Spec;

impl HashSpec for Spec {
    type Key = UniKey;
    type Entry = Entry;
    type Host<'h> = ();

    const INITIAL_CAPACITY: usize = 8;
    const MAX_PROBE_DISTANCE: u8 = 255;
    const HASH_WIDTH_BITS: u32 = 32;

    #[inline]
    fn hash<'h>(_host: &'h (), key: UniKey) -> u64 {
        key.hash as u64
    }

    fn key_eq<'h>(_host: &'h (), entry: &Entry, key: UniKey) -> bool {
        if entry.hash != key.hash || entry.len != key.len {
            return false;
        }
        let entry_bytes = unsafe { std::slice::from_raw_parts(entry.bytes, entry.len) };
        entry_bytes == key.as_slice()
    }

    #[inline]
    fn key_of(entry: &Entry) -> UniKey {
        UniKey { bytes: entry.bytes, len: entry.len, hash: entry.hash }
    }
}

/// Byte-string keyed hash table with a caller- or host-supplied hash cache.
pub struct UniHash {
    engine: RobinHood<Spec>,
}

impl UniHash {
    pub fn build() -> Self {
        Self { engine: RobinHood::build() }
    }

    pub fn len(&self) -> usize {
        self.engine.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn official_size(&self) -> usize {
        self.engine.official_size() as usize
    }

    pub fn fetch(&self, key: UniKey) -> Option<i32> {
        self.engine.fetch(&(), key).map(|e| e.value)
    }

    /// Panics with `InsertConflict` if `key` is already present with a
    /// different value (§7), matching `PtrHash::insert`.
    pub fn insert(&mut self, key: UniKey, value: i32) {
        match self.engine.lvalue_fetch(&(), key) {
            Slot::Vacant(e) => {
                e.bytes = key.bytes;
                e.len = key.len;
                e.hash = key.hash;
                e.value = value;
            }
            Slot::Occupied(e) => {
                if e.value != value {
                    oops!("insert conflict: key already maps to {}, got {value}", e.value);
                }
            }
        }
    }

    pub fn insert_nocheck(&mut self, key: UniKey, value: i32) {
        match self.engine.lvalue_fetch(&(), key) {
            Slot::Vacant(e) | Slot::Occupied(e) => {
                e.bytes = key.bytes;
                e.len = key.len;
                e.hash = key.hash;
                e.value = value;
            }
        }
    }
}

impl Default for UniHash {
    fn default() -> Self {
        Self::build()
    }
}

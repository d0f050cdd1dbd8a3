//! Data model for the speculation statistics tree (§3.3) and the callsite
//! shape descriptors the trace reducer keys off of.

use crate::host::GcHeader;

/// Opaque identity of a static frame (the guest's notion of "a function").
/// The reference engine's equivalent is a pointer; here it's caller-defined
/// so the crate never assumes a particular guest object layout.
pub type StaticFrameId = u64;

/// Opaque identity of a correlation tag attached to trace events (§ Glossary).
pub type CorrelationId = u64;

/// Whether one callsite argument flag denotes an object (needing a `type`)
/// and/or a container (needing a `decont_type` once deconned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArgFlag {
    pub is_object: bool,
    pub is_container: bool,
}

/// A callable-shape descriptor (Glossary: "Callsite"): how many positional
/// args precede the named ones, and what each flag slot expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callsite {
    pub id: u32,
    pub num_pos: usize,
    pub flags: Vec<ArgFlag>,
}

impl Callsite {
    pub fn flag_count(&self) -> usize {
        self.flags.len()
    }

    /// Maps a parameter's argument index to its flag-vector slot (§4.6):
    /// positional args map 1:1; named args come in `(name, value)` pairs
    /// after the positional run, so only every other one carries a flag.
    pub fn flag_index(&self, arg_idx: usize) -> usize {
        if arg_idx < self.num_pos {
            arg_idx
        } else {
            self.num_pos + (arg_idx - 1 - self.num_pos) / 2
        }
    }
}

/// One argument's observed type shape. `type_`/`decont_type` are GC-managed
/// type-object handles; `None` means "not yet observed" (§3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArgType {
    pub type_: Option<GcHeader>,
    pub type_concrete: bool,
    pub decont_type: Option<GcHeader>,
    pub decont_type_concrete: bool,
}

/// A `(type, concrete)` pair observed at a bytecode offset, with its
/// occurrence count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeCount {
    pub type_: Option<GcHeader>,
    pub concrete: bool,
    pub count: u64,
}

/// An inline-cache value observed at a bytecode offset (`LOG_INVOKE`), with
/// its occurrence count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueCount {
    pub value: i64,
    pub count: u64,
}

/// A callee type tuple attributed back to a caller's invoke offset, with its
/// occurrence count (§4.5 step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTupleCount {
    pub callsite_id: u32,
    pub arg_types: Vec<ArgType>,
    pub count: u64,
}

/// Per-bytecode-offset observations within one type-tuple bucket.
#[derive(Debug, Clone, Default)]
pub struct ByOffset {
    pub bytecode_offset: u32,
    pub types: Vec<TypeCount>,
    pub values: Vec<ValueCount>,
    pub type_tuples: Vec<TypeTupleCount>,
}

impl ByOffset {
    fn new(bytecode_offset: u32) -> Self {
        Self { bytecode_offset, ..Self::default() }
    }

    pub fn record_type(&mut self, type_: Option<GcHeader>, concrete: bool) {
        match self.types.iter_mut().find(|t| t.type_ == type_ && t.concrete == concrete) {
            Some(t) => t.count += 1,
            None => self.types.push(TypeCount { type_, concrete, count: 1 }),
        }
    }

    pub fn record_value(&mut self, value: i64) {
        match self.values.iter_mut().find(|v| v.value == value) {
            Some(v) => v.count += 1,
            None => self.values.push(ValueCount { value, count: 1 }),
        }
    }

    pub fn record_type_tuple(&mut self, callsite_id: u32, arg_types: &[ArgType]) {
        match self
            .type_tuples
            .iter_mut()
            .find(|t| t.callsite_id == callsite_id && t.arg_types == arg_types)
        {
            Some(t) => t.count += 1,
            None => self.type_tuples.push(TypeTupleCount {
                callsite_id,
                arg_types: arg_types.to_vec(),
                count: 1,
            }),
        }
    }
}

/// Stats for one distinct argument-type tuple observed at a callsite.
#[derive(Debug, Clone, Default)]
pub struct ByType {
    pub arg_types: Vec<ArgType>,
    pub hits: u64,
    pub osr_hits: u64,
    pub max_depth: u32,
    pub by_offset: Vec<ByOffset>,
}

impl ByType {
    pub fn offset_mut(&mut self, bytecode_offset: u32) -> &mut ByOffset {
        if let Some(idx) = self.by_offset.iter().position(|o| o.bytecode_offset == bytecode_offset) {
            return &mut self.by_offset[idx];
        }
        self.by_offset.push(ByOffset::new(bytecode_offset));
        self.by_offset.last_mut().unwrap()
    }
}

/// Stats for one distinct callsite shape observed calling this function.
#[derive(Debug, Clone)]
pub struct ByCallsite {
    pub callsite_id: u32,
    pub hits: u64,
    pub osr_hits: u64,
    pub max_depth: u32,
    pub by_type: Vec<ByType>,
}

impl ByCallsite {
    fn new(callsite_id: u32) -> Self {
        Self { callsite_id, hits: 0, osr_hits: 0, max_depth: 0, by_type: Vec::new() }
    }

    /// Find the `by_type` record with byte-identical `arg_types`, if any.
    pub fn find_type(&self, arg_types: &[ArgType]) -> Option<usize> {
        self.by_type.iter().position(|t| t.arg_types == arg_types)
    }
}

/// A pending per-offset observation recorded on a live frame, folded into
/// its `ByOffset` record when the frame pops (§4.5 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetLog {
    /// `LOG_TYPE` / `LOG_RETURN`.
    Type { bytecode_offset: u32, type_: Option<GcHeader>, concrete: bool },
    /// `LOG_INVOKE`.
    Invoke { bytecode_offset: u32, value: i64 },
}

/// A callee type tuple a popped frame leaves for its caller to attribute
/// back to the invoke site (§3.4, §4.5 step 6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTypeInfo {
    pub bytecode_offset: u32,
    pub callsite_id: u32,
    pub arg_types: Vec<ArgType>,
}

/// A dedup-by-offset static (constant/literal) observation (§3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticValue {
    pub bytecode_offset: u32,
    pub value: i64,
}

/// The per-function statistics root (Glossary / §3.3's `SF`).
#[derive(Debug, Clone, Default)]
pub struct FunctionStats {
    pub hits: u64,
    pub osr_hits: u64,
    pub last_update: u32,
    pub by_callsite: Vec<ByCallsite>,
    pub static_values: Vec<StaticValue>,
}

impl FunctionStats {
    pub fn callsite_mut(&mut self, callsite_id: u32) -> usize {
        if let Some(idx) = self.by_callsite.iter().position(|c| c.callsite_id == callsite_id) {
            return idx;
        }
        self.by_callsite.push(ByCallsite::new(callsite_id));
        self.by_callsite.len() - 1
    }

    /// Record a static value at `bytecode_offset` unless one is already
    /// present there (first write wins, §4.6 `STATIC`).
    pub fn record_static(&mut self, bytecode_offset: u32, value: i64) {
        if self.static_values.iter().any(|s| s.bytecode_offset == bytecode_offset) {
            return;
        }
        self.static_values.push(StaticValue { bytecode_offset, value });
    }
}

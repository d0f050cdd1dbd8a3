//! The trace reducer (C6, §4.6): turns a stream of guest-emitted log events
//! into sim-stack transitions and stats-folder calls.

use crate::{
    config::AggregatorTunables,
    error::oops,
    host::{GcHeader, GcSink, GcSlot},
    stats::{
        folder,
        simstack::{Frame, SimStack},
        types::{Callsite, CorrelationId, FunctionStats, OffsetLog, StaticFrameId},
    },
};
use std::collections::HashMap;

/// One entry in the guest's speculation log, in emission order (§4.6).
#[derive(Debug, Clone)]
pub enum TraceEvent {
    Entry { sf: StaticFrameId, owner: GcHeader, callsite: Callsite, cid: CorrelationId },
    Parameter { cid: CorrelationId, arg_idx: usize, type_: Option<GcHeader>, concrete: bool },
    ParameterDecont { cid: CorrelationId, arg_idx: usize, decont_type: Option<GcHeader>, concrete: bool },
    Type { cid: CorrelationId, bytecode_offset: u32, type_: Option<GcHeader>, concrete: bool },
    Invoke { cid: CorrelationId, bytecode_offset: u32, value: i64, callee_code: StaticFrameId },
    Osr { cid: CorrelationId },
    Static { cid: CorrelationId, bytecode_offset: u32, value: i64 },
    Return { cid: CorrelationId, type_: Option<GcHeader>, concrete: bool },
}

/// Owns every static frame's stats tree plus the live sim-stack, and folds
/// trace events into both as they arrive.
pub struct TraceReducer {
    registry: HashMap<StaticFrameId, FunctionStats>,
    sim_stack: SimStack,
    version: u32,
    tunables: AggregatorTunables,
}

impl TraceReducer {
    pub fn new(tunables: AggregatorTunables) -> Self {
        Self {
            registry: HashMap::new(),
            sim_stack: SimStack::new(&tunables),
            version: 0,
            tunables,
        }
    }

    pub fn stats(&self, sf: StaticFrameId) -> Option<&FunctionStats> {
        self.registry.get(&sf)
    }

    /// Advance the global version stamp. Callers bump this once per "check"
    /// cycle (e.g. once per GC run); `cleanup` uses the gap between a
    /// function's `last_update` and the current version to decide eviction.
    pub fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Apply every event in `events`, in order.
    pub fn apply_all(
        &mut self,
        events: impl IntoIterator<Item = TraceEvent>,
        updated: &mut Vec<StaticFrameId>,
        gc: &mut dyn GcSink,
    ) {
        for event in events {
            self.apply(event, updated, gc);
        }
    }

    /// Apply one trace event (§4.6). `updated` collects static frames whose
    /// stats were freshly touched this version, for later `cleanup`.
    pub fn apply(&mut self, event: TraceEvent, updated: &mut Vec<StaticFrameId>, gc: &mut dyn GcSink) {
        match event {
            TraceEvent::Entry { sf, owner, callsite, cid } => {
                let version = self.version;
                let stats = self.registry.entry(sf).or_insert_with(FunctionStats::default);
                if stats.last_update != version {
                    stats.last_update = version;
                    updated.push(sf);
                }
                stats.hits += 1;
                let cs_idx = stats.callsite_mut(callsite.id);
                stats.by_callsite[cs_idx].hits += 1;
                let depth = self.sim_stack.len() as u32;
                self.sim_stack.push(Frame::new(sf, owner, cid, callsite, cs_idx, depth));
            }
            TraceEvent::Parameter { cid, arg_idx, type_, concrete } => {
                if !self.locate_to_top(cid, gc) {
                    return;
                }
                let frame = self.sim_stack.top_mut().expect("locate_to_top guarantees a top frame");
                let flag_idx = frame.callsite.flag_index(arg_idx);
                if flag_idx >= frame.callsite.flag_count() {
                    oops!(
                        "parameter log referenced flag index {flag_idx} beyond callsite's {} flags",
                        frame.callsite.flag_count()
                    );
                }
                if frame.callsite.flags[flag_idx].is_object {
                    frame.arg_types[flag_idx].type_ = type_;
                    frame.arg_types[flag_idx].type_concrete = concrete;
                }
            }
            TraceEvent::ParameterDecont { cid, arg_idx, decont_type, concrete } => {
                if !self.locate_to_top(cid, gc) {
                    return;
                }
                let frame = self.sim_stack.top_mut().expect("locate_to_top guarantees a top frame");
                let flag_idx = frame.callsite.flag_index(arg_idx);
                if flag_idx >= frame.callsite.flag_count() {
                    oops!(
                        "parameter-decont log referenced flag index {flag_idx} beyond callsite's {} flags",
                        frame.callsite.flag_count()
                    );
                }
                if frame.callsite.flags[flag_idx].is_container {
                    frame.arg_types[flag_idx].decont_type = decont_type;
                    frame.arg_types[flag_idx].decont_type_concrete = concrete;
                }
            }
            TraceEvent::Type { cid, bytecode_offset, type_, concrete } => {
                if !self.locate_to_top(cid, gc) {
                    return;
                }
                self.sim_stack
                    .top_mut()
                    .expect("locate_to_top guarantees a top frame")
                    .offset_logs
                    .push(OffsetLog::Type { bytecode_offset, type_, concrete });
            }
            TraceEvent::Invoke { cid, bytecode_offset, value, callee_code } => {
                if !self.locate_to_top(cid, gc) {
                    return;
                }
                let frame = self.sim_stack.top_mut().expect("locate_to_top guarantees a top frame");
                frame.offset_logs.push(OffsetLog::Invoke { bytecode_offset, value });
                frame.last_invoke_offset = Some(bytecode_offset);
                frame.last_invoke_code = Some(callee_code);
            }
            TraceEvent::Osr { cid } => {
                if !self.locate_to_top(cid, gc) {
                    return;
                }
                self.sim_stack.top_mut().expect("locate_to_top guarantees a top frame").osr_hits += 1;
            }
            TraceEvent::Static { cid, bytecode_offset, value } => {
                if !self.locate_to_top(cid, gc) {
                    return;
                }
                let sf = self.sim_stack.top_mut().expect("locate_to_top guarantees a top frame").sf;
                self.registry
                    .get_mut(&sf)
                    .unwrap_or_else(|| oops!("static log for unknown static frame {sf}"))
                    .record_static(bytecode_offset, value);
            }
            TraceEvent::Return { cid, type_, concrete } => {
                if !self.locate_to_top(cid, gc) {
                    return;
                }
                let popped_sf = self.fold_top(gc);
                if type_.is_some() {
                    if let Some(parent) = self.sim_stack.top_mut() {
                        if parent.last_invoke_code == Some(popped_sf) {
                            let offset = parent.last_invoke_offset.unwrap_or_else(|| {
                                oops!("last_invoke_code set without a matching last_invoke_offset")
                            });
                            parent.offset_logs.push(OffsetLog::Type { bytecode_offset: offset, type_, concrete });
                        }
                    }
                }
            }
        }
    }

    /// Pop every remaining frame, folding each into its function's stats.
    /// Called once at stream end.
    pub fn finish(&mut self, gc: &mut dyn GcSink) {
        while !self.sim_stack.is_empty() {
            self.fold_top(gc);
        }
    }

    /// Evict stats trees that haven't been touched in `max_age` versions.
    /// `updated` is compacted in place, keeping only the entries still live.
    pub fn cleanup(&mut self, updated: &mut Vec<StaticFrameId>) {
        let current_version = self.version;
        let max_age = self.tunables.max_age;
        let registry = &mut self.registry;
        updated.retain(|&sf| match registry.get(&sf) {
            Some(stats) if current_version.wrapping_sub(stats.last_update) > max_age => {
                registry.remove(&sf);
                false
            }
            Some(_) => true,
            None => false,
        });
    }

    /// Walk every stats tree, handing each stored type-object handle to the
    /// GC's worklist. This crate has no separate notion of a field's address
    /// distinct from the handle it holds, so each handle's own identity
    /// stands in for its slot.
    pub fn mark(&self, worklist: &mut dyn GcSink) {
        for stats in self.registry.values() {
            for by_cs in &stats.by_callsite {
                for by_type in &by_cs.by_type {
                    mark_arg_types(&by_type.arg_types, worklist);
                    for by_offset in &by_type.by_offset {
                        for t in &by_offset.types {
                            if let Some(h) = t.type_ {
                                worklist.worklist_add(GcSlot(h.0));
                            }
                        }
                        for tt in &by_offset.type_tuples {
                            mark_arg_types(&tt.arg_types, worklist);
                        }
                    }
                }
            }
        }
    }

    /// Locate `cid`, folding and popping every frame above it so the target
    /// ends up on top. Returns `false` (a harmless no-op for the caller) if
    /// `cid` names no live frame — a truncated trace, not a fatal error.
    fn locate_to_top(&mut self, cid: CorrelationId, gc: &mut dyn GcSink) -> bool {
        let idx = match self.sim_stack.find_index(cid) {
            Some(idx) => idx,
            None => return false,
        };
        while self.sim_stack.len() - 1 > idx {
            self.fold_top(gc);
        }
        true
    }

    /// Pop the top frame and fold it into its function's stats. Returns the
    /// popped frame's static-frame id.
    fn fold_top(&mut self, gc: &mut dyn GcSink) -> StaticFrameId {
        let frame = self.sim_stack.pop();
        let sf = frame.sf;
        let owner = frame.owner;
        let parent = self.sim_stack.top_mut();
        let stats = self
            .registry
            .get_mut(&sf)
            .unwrap_or_else(|| oops!("folding a frame for unknown static frame {sf}"));
        folder::fold_frame(stats, frame, parent, owner, gc);
        sf
    }
}

fn mark_arg_types(arg_types: &[crate::stats::types::ArgType], worklist: &mut dyn GcSink) {
    for at in arg_types {
        if let Some(h) = at.type_ {
            worklist.worklist_add(GcSlot(h.0));
        }
        if let Some(h) = at.decont_type {
            worklist.worklist_add(GcSlot(h.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{host::NullGcSink, stats::types::ArgFlag};

    fn gc_header(n: usize) -> GcHeader {
        GcHeader(std::ptr::NonNull::new(n as *mut ()).unwrap())
    }

    fn callsite_with_one_object(id: u32) -> Callsite {
        Callsite { id, num_pos: 1, flags: vec![ArgFlag { is_object: true, is_container: false }] }
    }

    /// A callsite with no typed args at all — vacuously complete, so it
    /// still earns a `by_type` record with nothing to wait on.
    fn callsite_with_no_args(id: u32) -> Callsite {
        Callsite { id, num_pos: 0, flags: Vec::new() }
    }

    // S4 — single frame.
    #[test]
    fn single_frame_scenario() {
        let mut reducer = TraceReducer::new(AggregatorTunables::default());
        let mut updated = Vec::new();
        let mut gc = NullGcSink;
        let sf_a = 1;
        let cs1 = callsite_with_one_object(100);

        reducer.apply(
            TraceEvent::Entry { sf: sf_a, owner: gc_header(1), callsite: cs1, cid: 10 },
            &mut updated,
            &mut gc,
        );
        reducer.apply(
            TraceEvent::Parameter { cid: 10, arg_idx: 0, type_: Some(gc_header(50)), concrete: true },
            &mut updated,
            &mut gc,
        );
        reducer.apply(
            TraceEvent::Type { cid: 10, bytecode_offset: 5, type_: Some(gc_header(60)), concrete: true },
            &mut updated,
            &mut gc,
        );
        reducer.apply(TraceEvent::Osr { cid: 10 }, &mut updated, &mut gc);
        reducer.apply(TraceEvent::Return { cid: 10, type_: None, concrete: false }, &mut updated, &mut gc);
        reducer.finish(&mut gc);

        let stats = reducer.stats(sf_a).unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.by_callsite[0].hits, 1);
        assert_eq!(stats.by_callsite[0].osr_hits, 1);
        assert_eq!(stats.by_callsite[0].by_type.len(), 1);
        let by_type = &stats.by_callsite[0].by_type[0];
        assert_eq!(by_type.arg_types[0].type_, Some(gc_header(50)));
        assert_eq!(by_type.by_offset[0].bytecode_offset, 5);
        assert_eq!(by_type.by_offset[0].types[0].count, 1);
        assert_eq!(updated, vec![sf_a]);
    }

    // S5 — caller/callee type attribution.
    #[test]
    fn caller_callee_type_attribution_scenario() {
        let mut reducer = TraceReducer::new(AggregatorTunables::default());
        let mut updated = Vec::new();
        let mut gc = NullGcSink;
        let sf_a = 1;
        let sf_b = 2;
        let cs_ab = callsite_with_no_args(100); // A takes no typed args itself
        let cs_b1 = callsite_with_one_object(200); // shape B was called with

        reducer.apply(
            TraceEvent::Entry { sf: sf_a, owner: gc_header(1), callsite: cs_ab, cid: 10 },
            &mut updated,
            &mut gc,
        );
        reducer.apply(
            TraceEvent::Invoke { cid: 10, bytecode_offset: 10, value: 0, callee_code: sf_b },
            &mut updated,
            &mut gc,
        );
        reducer.apply(
            TraceEvent::Entry { sf: sf_b, owner: gc_header(2), callsite: cs_b1, cid: 20 },
            &mut updated,
            &mut gc,
        );
        reducer.apply(
            TraceEvent::Parameter { cid: 20, arg_idx: 0, type_: Some(gc_header(70)), concrete: true },
            &mut updated,
            &mut gc,
        );
        reducer.apply(
            TraceEvent::Return { cid: 20, type_: Some(gc_header(80)), concrete: true },
            &mut updated,
            &mut gc,
        );
        reducer.apply(TraceEvent::Return { cid: 10, type_: None, concrete: false }, &mut updated, &mut gc);
        reducer.finish(&mut gc);

        let a_stats = reducer.stats(sf_a).unwrap();
        let a_by_type = &a_stats.by_callsite[0].by_type[0];
        let by_offset_10 = a_by_type.by_offset.iter().find(|o| o.bytecode_offset == 10).unwrap();
        assert_eq!(by_offset_10.type_tuples.len(), 1);
        assert_eq!(by_offset_10.type_tuples[0].callsite_id, 200);
        assert_eq!(by_offset_10.type_tuples[0].count, 1);
        assert_eq!(by_offset_10.types.len(), 1);
        assert_eq!(by_offset_10.types[0].type_, Some(gc_header(80)));
        assert_eq!(by_offset_10.types[0].count, 1);
    }

    // S6 — incomplete tuple discard.
    #[test]
    fn incomplete_tuple_discard_scenario() {
        let mut reducer = TraceReducer::new(AggregatorTunables::default());
        let mut updated = Vec::new();
        let mut gc = NullGcSink;
        let sf_a = 1;
        let sf_b = 2;
        let cs_ab = callsite_with_no_args(100);
        let cs_b1 = callsite_with_one_object(200);

        reducer.apply(
            TraceEvent::Entry { sf: sf_a, owner: gc_header(1), callsite: cs_ab, cid: 10 },
            &mut updated,
            &mut gc,
        );
        reducer.apply(
            TraceEvent::Invoke { cid: 10, bytecode_offset: 10, value: 0, callee_code: sf_b },
            &mut updated,
            &mut gc,
        );
        reducer.apply(
            TraceEvent::Entry { sf: sf_b, owner: gc_header(2), callsite: cs_b1, cid: 20 },
            &mut updated,
            &mut gc,
        );
        // No PARAMETER this time — B's single object arg never gets a type.
        reducer.apply(
            TraceEvent::Return { cid: 20, type_: Some(gc_header(80)), concrete: true },
            &mut updated,
            &mut gc,
        );
        reducer.apply(TraceEvent::Return { cid: 10, type_: None, concrete: false }, &mut updated, &mut gc);
        reducer.finish(&mut gc);

        let b_stats = reducer.stats(sf_b).unwrap();
        assert!(b_stats.by_callsite[0].by_type.is_empty());
        assert_eq!(b_stats.by_callsite[0].hits, 1);

        let a_stats = reducer.stats(sf_a).unwrap();
        let a_by_type = &a_stats.by_callsite[0].by_type[0];
        let by_offset_10 = a_by_type.by_offset.iter().find(|o| o.bytecode_offset == 10);
        assert!(by_offset_10.is_none() || by_offset_10.unwrap().type_tuples.is_empty());
    }

    #[test]
    fn truncated_trace_is_a_harmless_no_op() {
        let mut reducer = TraceReducer::new(AggregatorTunables::default());
        let mut updated = Vec::new();
        let mut gc = NullGcSink;
        // No matching ENTRY for this cid; the event must be ignored, not panic.
        reducer.apply(
            TraceEvent::Parameter { cid: 999, arg_idx: 0, type_: None, concrete: false },
            &mut updated,
            &mut gc,
        );
        assert!(updated.is_empty());
    }

    #[test]
    fn cleanup_evicts_stale_entries_and_keeps_fresh_ones() {
        let mut reducer = TraceReducer::new(AggregatorTunables { max_age: 2, ..AggregatorTunables::default() });
        let mut updated = Vec::new();
        let mut gc = NullGcSink;
        reducer.apply(
            TraceEvent::Entry { sf: 1, owner: gc_header(1), callsite: callsite_with_one_object(1), cid: 10 },
            &mut updated,
            &mut gc,
        );
        reducer.finish(&mut gc);
        for _ in 0..5 {
            reducer.bump_version();
        }
        reducer.cleanup(&mut updated);
        assert!(updated.is_empty());
        assert!(reducer.stats(1).is_none());
    }

    // §8.1 property 6 — stats folding idempotence: a trace delivered in one
    // batch must fold to the same stats as the same trace delivered split
    // across a truncated prefix (one that leaves a frame still open, never
    // reaching its own RETURN) followed by the full trace from the start.
    #[test]
    fn truncated_prefix_then_full_trace_matches_one_shot_application() {
        let sf_a = 1;
        let cs1 = callsite_with_one_object(100);
        let events = vec![
            TraceEvent::Entry { sf: sf_a, owner: gc_header(1), callsite: cs1, cid: 10 },
            TraceEvent::Parameter { cid: 10, arg_idx: 0, type_: Some(gc_header(50)), concrete: true },
            TraceEvent::Type { cid: 10, bytecode_offset: 5, type_: Some(gc_header(60)), concrete: true },
            TraceEvent::Osr { cid: 10 },
            TraceEvent::Return { cid: 10, type_: None, concrete: false },
        ];
        let prefix_len = 3; // ENTRY, PARAMETER, TYPE — the frame is still open here.

        let mut one_shot = TraceReducer::new(AggregatorTunables::default());
        let mut one_shot_updated = Vec::new();
        let mut gc = NullGcSink;
        let mut combined = events[..prefix_len].to_vec();
        combined.extend(events.clone());
        one_shot.apply_all(combined, &mut one_shot_updated, &mut gc);
        one_shot.finish(&mut gc);

        let mut chunked = TraceReducer::new(AggregatorTunables::default());
        let mut chunked_updated = Vec::new();
        chunked.apply_all(events[..prefix_len].to_vec(), &mut chunked_updated, &mut gc);
        chunked.apply_all(events.clone(), &mut chunked_updated, &mut gc);
        chunked.finish(&mut gc);

        let a = one_shot.stats(sf_a).unwrap();
        let b = chunked.stats(sf_a).unwrap();
        assert_eq!(a.hits, b.hits);
        assert_eq!(a.by_callsite[0].hits, b.by_callsite[0].hits);
        assert_eq!(a.by_callsite[0].osr_hits, b.by_callsite[0].osr_hits);
        assert_eq!(a.by_callsite[0].by_type.len(), b.by_callsite[0].by_type.len());
        assert_eq!(
            a.by_callsite[0].by_type[0].by_offset[0].types[0].count,
            b.by_callsite[0].by_type[0].by_offset[0].types[0].count
        );
    }
}

//! Pop-time stats folding (C5, §4.5). Dedup throughout is linear search:
//! these collections hold a handful of entries per site, so a flat `Vec`
//! beats a secondary index.

use crate::{
    error::oops,
    host::{GcHeader, GcSink},
    stats::{
        simstack::Frame,
        types::{ArgType, ByType, CallTypeInfo, Callsite, FunctionStats, OffsetLog},
    },
};

fn is_complete(callsite: &Callsite, arg_types: &[ArgType]) -> bool {
    callsite.flags.iter().zip(arg_types).all(|(flag, at)| {
        if flag.is_object && at.type_.is_none() {
            return false;
        }
        if flag.is_container && at.type_concrete && at.decont_type.is_none() {
            return false;
        }
        true
    })
}

/// Fold a just-popped frame into its function's stats tree, per §4.5's
/// numbered steps. `parent` is the frame now at the top of the sim-stack (if
/// any), which may receive a `call_type_info` attribution (step 6). `owner`
/// identifies the popping frame's static-frame object for GC write barriers.
pub fn fold_frame(
    stats: &mut FunctionStats,
    frame: Frame,
    parent: Option<&mut Frame>,
    owner: GcHeader,
    gc: &mut dyn GcSink,
) {
    // Step 1.
    stats.osr_hits += frame.osr_hits;
    let cs_idx = frame.callsite_idx;
    {
        let by_cs = &mut stats.by_callsite[cs_idx];
        by_cs.osr_hits += frame.osr_hits;
        by_cs.max_depth = by_cs.max_depth.max(frame.depth);
    }

    let callee_callsite_id = frame.callsite.id;

    // Step 2. A callsite with no object-typed args is vacuously complete
    // (nothing to wait on), so it still earns a `by_type` record — that's
    // the only place an invoke-site attribution from a callee has anywhere
    // to land (§8.2 S5).
    let by_type_idx = if is_complete(&frame.callsite, &frame.arg_types) {
        let by_cs = &mut stats.by_callsite[cs_idx];
        match by_cs.find_type(&frame.arg_types) {
            Some(idx) => Some(idx),
            None => {
                by_cs.by_type.push(ByType { arg_types: frame.arg_types.clone(), ..ByType::default() });
                Some(by_cs.by_type.len() - 1)
            }
        }
    } else {
        None
    };

    // Steps 3-5, only when a by_type record was kept.
    if let Some(idx) = by_type_idx {
        let by_type = &mut stats.by_callsite[cs_idx].by_type[idx];

        for log in &frame.offset_logs {
            match *log {
                OffsetLog::Type { bytecode_offset, type_, concrete } => {
                    by_type.offset_mut(bytecode_offset).record_type(type_, concrete);
                }
                OffsetLog::Invoke { bytecode_offset, value } => {
                    by_type.offset_mut(bytecode_offset).record_value(value);
                }
            }
        }

        for cti in &frame.call_type_info {
            by_type.offset_mut(cti.bytecode_offset).record_type_tuple(cti.callsite_id, &cti.arg_types);
            for at in &cti.arg_types {
                if let Some(t) = at.type_ {
                    gc.write_barrier(owner, t);
                }
                if let Some(t) = at.decont_type {
                    gc.write_barrier(owner, t);
                }
            }
        }

        by_type.hits += 1;
        by_type.osr_hits += frame.osr_hits;
        by_type.max_depth = by_type.max_depth.max(frame.depth);

        // Step 6. Only a tuple good enough to have earned a `by_type` record
        // gets attributed back to the caller's invoke site — an incomplete
        // tuple was discarded above and must not surface in the caller's
        // stats either (§8.2 S6).
        if let Some(parent) = parent {
            if parent.last_invoke_code == Some(frame.sf) {
                let offset = parent
                    .last_invoke_offset
                    .unwrap_or_else(|| oops!("last_invoke_code set without a matching last_invoke_offset"));
                parent.call_type_info.push(CallTypeInfo {
                    bytecode_offset: offset,
                    callsite_id: callee_callsite_id,
                    arg_types: frame.arg_types.clone(),
                });
            }
        }
    }

    // Step 7: `frame`'s offset_logs/call_type_info/arg_types all drop here.
}

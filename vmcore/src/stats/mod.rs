//! The speculation statistics aggregator (C4–C6): a live sim-stack of
//! in-flight invocations, the pop-time folder that drains a finished frame
//! into its function's stats tree, and the trace reducer tying both to a
//! stream of guest-emitted log events.

mod folder;
mod simstack;

pub mod reducer;
pub mod types;

pub use reducer::{TraceEvent, TraceReducer};
pub use simstack::{Frame, SimStack};
pub use types::{
    ArgFlag, ArgType, ByCallsite, ByOffset, ByType, CallTypeInfo, Callsite, CorrelationId,
    FunctionStats, OffsetLog, StaticFrameId, StaticValue, TypeCount, TypeTupleCount, ValueCount,
};

//! gridscale-metrics — metric sources for the scaling dimensions.
//!
//! Each source supplies the healthy band and the current reading for one
//! dimension (cpu, memory, queue depth). The decision engine never sees
//! where a reading came from; new dimensions are added by implementing
//! [`MetricSource`], not by branching in the engine.

pub mod source;

pub use source::{
    source_for, CpuSource, MemorySource, MetricSource, QueueSource, UnknownTrigger,
    METRIC_UNAVAILABLE,
};

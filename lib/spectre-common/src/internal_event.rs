//! A small `InternalEvent` trait, mirroring the pattern used
//! throughout the upstream buffer and pipeline internals: a struct per
//! observable occurrence, emitted once at the point it happens, which
//! records both a `tracing` event and the `metrics` counters/gauges it
//! implies. Call sites never touch `metrics::*` macros directly;
//! they construct an event value and call `.emit()`.

pub trait InternalEvent {
    fn emit(self);
}

/// Emits an [`InternalEvent`]. A thin free function rather than a
/// macro: callers read `emit(PipelineBatchFlushed { .. })` the same
/// way the upstream codebase reads `emit!(...)`.
pub fn emit(event: impl InternalEvent) {
    event.emit();
}

//! Logging facade.
//!
//! With the `tracing` feature the macros are `tracing`'s own and every
//! pipeline stage runs inside a `stage` span. Without it the macros expand to
//! nothing and [`stage`] returns an inert guard.

#[cfg(feature = "tracing")]
pub use tracing::{debug, info, warn};

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub use crate::{debug, info, warn};

/// Guard for the span of one pipeline stage; the span closes on drop.
#[cfg(feature = "tracing")]
pub type StageGuard = tracing::span::EnteredSpan;

#[cfg(not(feature = "tracing"))]
#[derive(Debug)]
pub struct StageGuard;

/// Enter the span of a pipeline stage (`parse`, `compile`, `render`).
#[cfg(feature = "tracing")]
pub fn stage(name: &'static str) -> StageGuard {
    tracing::debug_span!("stage", name).entered()
}

#[cfg(not(feature = "tracing"))]
pub fn stage(_name: &'static str) -> StageGuard {
    StageGuard
}

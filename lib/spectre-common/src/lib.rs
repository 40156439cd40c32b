//! Ambient building blocks shared by every crate in the workspace:
//! the error-kind taxonomy, the shutdown/cancellation primitive, and
//! the internal-event-emission pattern used for metrics.

pub mod error;
pub mod guard;
pub mod internal_event;
pub mod shutdown;

pub use error::{DomainError, ErrorKind, HasKind};
pub use guard::guarded;
pub use internal_event::{emit, InternalEvent};
pub use shutdown::{await_with_deadline, DeadlineOutcome, ShutdownSignal};

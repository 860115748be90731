//! Resolve operations and the per-registration pipeline.
//!
//! Every top-level resolve call creates a [`ResolveOperation`]. The
//! operation pushes each component it activates onto an activation stack,
//! which is how cycles are detected, and runs the component's
//! [`ResolvePipeline`]:
//!
//! 1. request start: cycle check, diagnostics, error attribution
//! 2. scope selection: the lifetime policy picks the owning scope
//! 3. decoration: projection to the requested service, then decorators
//! 4. sharing: shared instances are created once per owning scope
//! 5. parameter selection: preparing hooks
//! 6. activation: activator, activating hooks, disposal tracking, activated hooks
//!
//! Nested dependencies resolved through a [`ResolveContext`] run inside the
//! same operation. Errors pop the activation stack on the way out, so a
//! failed branch never leaves stale frames behind.

mod context;
mod events;
mod operation;
mod pipeline;

pub use context::{ResolveContext, ResolveRequest, ResolveRequestContext};
pub use events::{ActivatedEvent, ActivatingEvent, PreparingEvent};
pub use operation::ResolveOperation;
pub use pipeline::{FnMiddleware, Next, PipelinePhase, ResolveMiddleware, ResolvePipeline};

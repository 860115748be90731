//! Diagnostic observers for resolve operations.
//!
//! Observers see every top-level resolve operation, every component
//! pipeline entered inside it and every scope that ends. All callbacks
//! default to no-ops.

use std::sync::Arc;
use std::time::Duration;

use crate::error::DiError;
use crate::key::Service;
use crate::registration::ComponentRegistration;
use crate::scope::ScopeTag;

/// Hooks into the resolution engine.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{ContainerBuilder, Registrar, ResolveObserver, Resolver, Service};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Counter(AtomicUsize);
///
/// impl ResolveObserver for Counter {
///     fn operation_started(&self, _service: &Service) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///     }
/// }
///
/// let counter = Arc::new(Counter::default());
/// let mut builder = ContainerBuilder::new();
/// builder.register_instance(7u8);
/// builder.add_observer(counter.clone());
///
/// let container = builder.build().unwrap();
/// container.resolve::<u8>().unwrap();
/// assert_eq!(counter.0.load(Ordering::SeqCst), 1);
/// ```
pub trait ResolveObserver: Send + Sync {
    /// A top-level resolve operation started.
    fn operation_started(&self, _service: &Service) {}

    /// A top-level resolve operation finished.
    fn operation_finished(&self, _service: &Service, _error: Option<&DiError>, _elapsed: Duration) {}

    /// A component's pipeline was entered.
    fn pipeline_entered(&self, _service: &Service, _component: &ComponentRegistration) {}

    /// A component's pipeline returned.
    fn pipeline_exited(&self, _service: &Service, _component: &ComponentRegistration, _succeeded: bool) {}

    /// A lifetime scope was created.
    fn scope_beginning(&self, _tag: &ScopeTag) {}

    /// A lifetime scope started disposing.
    fn scope_ending(&self, _tag: &ScopeTag) {}
}

/// Emits every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ResolveObserver for TracingObserver {
    fn operation_started(&self, service: &Service) {
        tracing::debug!(%service, "resolve operation started");
    }

    fn operation_finished(&self, service: &Service, error: Option<&DiError>, elapsed: Duration) {
        match error {
            None => tracing::debug!(%service, ?elapsed, "resolve operation finished"),
            Some(error) => tracing::debug!(%service, ?elapsed, %error, "resolve operation failed"),
        }
    }

    fn pipeline_entered(&self, service: &Service, component: &ComponentRegistration) {
        tracing::trace!(%service, component = %component.describe(), "pipeline entered");
    }

    fn pipeline_exited(&self, service: &Service, component: &ComponentRegistration, succeeded: bool) {
        tracing::trace!(%service, component = %component.describe(), succeeded, "pipeline exited");
    }

    fn scope_beginning(&self, tag: &ScopeTag) {
        tracing::trace!(%tag, "lifetime scope beginning");
    }

    fn scope_ending(&self, tag: &ScopeTag) {
        tracing::debug!(%tag, "lifetime scope ending");
    }
}

/// Observer list shared by every scope of a container.
#[derive(Clone, Default)]
pub(crate) struct Observers {
    list: Arc<Vec<Arc<dyn ResolveObserver>>>,
}

impl Observers {
    pub(crate) fn new(list: Vec<Arc<dyn ResolveObserver>>) -> Self {
        Self { list: Arc::new(list) }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub(crate) fn each(&self, f: impl Fn(&dyn ResolveObserver)) {
        for observer in self.list.iter() {
            f(observer.as_ref());
        }
    }
}

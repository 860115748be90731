use std::cell::RefCell;
use std::time::Instant;

use crate::error::{DiError, DiResult};
use crate::internal::StackVec;
use crate::registration::{ComponentId, ComponentRegistration, Instance};
use crate::scope::LifetimeScope;

use super::context::{ResolveContext, ResolveRequest, ResolveRequestContext};

struct Frame {
    id: ComponentId,
    component: String,
}

type DeferredAction = Box<dyn FnOnce(&ResolveContext<'_>) -> DiResult<()>>;

struct Deferred {
    scope: LifetimeScope,
    action: DeferredAction,
}

/// One top-level resolve call and every activation nested inside it.
///
/// Owns the activation stack used for cycle detection. Operations never
/// cross threads; a resolve started from inside an activator through a
/// scope handle gets an operation, and a stack, of its own.
pub struct ResolveOperation {
    scope: LifetimeScope,
    stack: RefCell<StackVec<Frame>>,
    deferred: RefCell<Vec<Deferred>>,
}

/// Pops the activation frame when the component's pipeline returns.
pub(super) struct FrameGuard<'op> {
    stack: &'op RefCell<StackVec<Frame>>,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

impl ResolveOperation {
    fn new(scope: LifetimeScope) -> Self {
        Self {
            scope,
            stack: RefCell::new(StackVec::new()),
            deferred: RefCell::new(Vec::new()),
        }
    }

    /// Runs `request` as a new top-level operation in `scope`.
    pub(crate) fn execute(scope: &LifetimeScope, request: &ResolveRequest) -> DiResult<Instance> {
        let operation = ResolveOperation::new(scope.clone());
        let observers = scope.observers();
        let started = (!observers.is_empty()).then(Instant::now);
        if started.is_some() {
            observers.each(|observer| observer.operation_started(request.service()));
        }
        tracing::trace!(service = %request.service(), scope = %scope.tag(), "resolve operation started");

        let result = operation.run(request);

        if let Some(started) = started {
            let elapsed = started.elapsed();
            observers.each(|observer| {
                observer.operation_finished(request.service(), result.as_ref().err(), elapsed)
            });
        }
        if let Err(error) = &result {
            tracing::debug!(service = %request.service(), %error, "resolve operation failed");
        }
        result
    }

    fn run(&self, request: &ResolveRequest) -> DiResult<Instance> {
        let instance = self.resolve_in(&self.scope, request)?;
        self.complete()?;
        Ok(instance)
    }

    /// Runs deferred actions until none are left; actions may defer more.
    fn complete(&self) -> DiResult<()> {
        loop {
            let pending = std::mem::take(&mut *self.deferred.borrow_mut());
            if pending.is_empty() {
                return Ok(());
            }
            for deferred in pending {
                let context = ResolveContext::new(self, deferred.scope);
                (deferred.action)(&context)?;
            }
        }
    }

    /// The scope the operation was started from.
    pub fn initiating_scope(&self) -> &LifetimeScope {
        &self.scope
    }

    /// Number of components currently mid-activation.
    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Runs the pipeline of `request.registration()` with `scope` as the
    /// requesting scope, sharing this operation's activation stack.
    pub(crate) fn resolve_in(&self, scope: &LifetimeScope, request: &ResolveRequest) -> DiResult<Instance> {
        let registration = request.registration().clone();
        let mut context = ResolveRequestContext::new(self, scope.clone(), request);
        registration.pipeline().invoke(&mut context)?;
        context.take_instance().ok_or_else(|| {
            DiError::Configuration(format!(
                "pipeline of {} completed without producing an instance",
                registration.describe()
            ))
        })
    }

    pub(crate) fn defer(&self, scope: LifetimeScope, action: DeferredAction) {
        self.deferred.borrow_mut().push(Deferred { scope, action });
    }

    /// Pushes `registration` onto the activation stack.
    ///
    /// Fails with `CircularDependency` when it is already being activated,
    /// or with `DepthExceeded` when detection is off and the stack is too deep.
    pub(super) fn enter(&self, registration: &ComponentRegistration) -> DiResult<FrameGuard<'_>> {
        let options = self.scope.options();
        {
            let stack = self.stack.borrow();
            if options.circular_dependency_detection {
                if stack.iter().any(|frame| frame.id == registration.id()) {
                    let mut chain: Vec<String> =
                        stack.iter().map(|frame| frame.component.clone()).collect();
                    chain.push(registration.describe());
                    return Err(DiError::CircularDependency { chain });
                }
            } else if stack.len() >= options.max_resolve_depth {
                return Err(DiError::DepthExceeded(options.max_resolve_depth));
            }
        }
        self.stack.borrow_mut().push(Frame {
            id: registration.id(),
            component: registration.describe(),
        });
        Ok(FrameGuard { stack: &self.stack })
    }

    /// Components on the activation stack, outermost first.
    pub fn activation_path(&self) -> Vec<String> {
        self.stack
            .borrow()
            .iter()
            .map(|frame| frame.component.clone())
            .collect()
    }
}

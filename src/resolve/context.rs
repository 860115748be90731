use std::sync::Arc;

use crate::disposer::Disposable;
use crate::error::DiResult;
use crate::key::Service;
use crate::parameters::Parameters;
use crate::registration::{ComponentRegistration, Instance};
use crate::scope::LifetimeScope;
use crate::traits::ResolverCore;

use super::operation::ResolveOperation;

/// A service, the registration chosen to provide it and the parameters.
#[derive(Clone)]
pub struct ResolveRequest {
    service: Service,
    registration: Arc<ComponentRegistration>,
    parameters: Parameters,
}

impl ResolveRequest {
    /// Request for `service` provided by `registration`, without parameters.
    pub fn new(service: Service, registration: Arc<ComponentRegistration>) -> Self {
        Self {
            service,
            registration,
            parameters: Parameters::new(),
        }
    }

    /// Replaces the parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Requested service.
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Registration providing the service.
    pub fn registration(&self) -> &Arc<ComponentRegistration> {
        &self.registration
    }

    /// Supplied parameters.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }
}

impl std::fmt::Debug for ResolveRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveRequest")
            .field("service", &self.service)
            .field("component", &self.registration.describe())
            .field("parameters", &self.parameters.len())
            .finish()
    }
}

/// Handle through which activators and hooks resolve their dependencies.
///
/// Resolving through a context continues the running operation, so nested
/// dependencies share its activation stack. The context's scope is the
/// scope that owns the component being activated: a singleton's
/// dependencies come from the root scope even when it was first requested
/// from a child.
pub struct ResolveContext<'op> {
    operation: &'op ResolveOperation,
    scope: LifetimeScope,
}

impl<'op> ResolveContext<'op> {
    pub(crate) fn new(operation: &'op ResolveOperation, scope: LifetimeScope) -> Self {
        Self { operation, scope }
    }

    /// The scope dependencies are resolved from.
    pub fn scope(&self) -> &LifetimeScope {
        &self.scope
    }

    /// The running operation.
    pub fn operation(&self) -> &'op ResolveOperation {
        self.operation
    }

    /// Every registration of `service` visible from this context's scope.
    pub fn registrations_for(&self, service: &Service) -> DiResult<Vec<Arc<ComponentRegistration>>> {
        self.scope.registry().registrations_for(service)
    }

    /// Resolves `service` through a specific registration.
    pub fn resolve_registration(
        &self,
        service: &Service,
        registration: &Arc<ComponentRegistration>,
        parameters: &Parameters,
    ) -> DiResult<Instance> {
        self.resolve_registration_in(&self.scope, service, registration, parameters)
    }

    /// Resolves `service` through `registration` as if requested from `scope`.
    ///
    /// Stays in the running operation, so cycles through `scope` are still
    /// detected.
    pub fn resolve_registration_in(
        &self,
        scope: &LifetimeScope,
        service: &Service,
        registration: &Arc<ComponentRegistration>,
        parameters: &Parameters,
    ) -> DiResult<Instance> {
        scope.ensure_active()?;
        let request = ResolveRequest::new(service.clone(), registration.clone())
            .with_parameters(parameters.clone());
        self.operation.resolve_in(scope, &request)
    }

    /// Resolves the default registration of `service`, `None` when unregistered.
    pub fn resolve_instance(&self, service: &Service) -> DiResult<Option<Instance>> {
        self.resolve_service(service, &Parameters::new())
    }

    /// Runs `action` once the top-level operation has produced its instance.
    ///
    /// Used to complete circular graphs, e.g. property injection between two
    /// components that reference each other.
    pub fn defer<F>(&self, action: F)
    where
        F: FnOnce(&ResolveContext<'_>) -> DiResult<()> + 'static,
    {
        self.operation.defer(self.scope.clone(), Box::new(action));
    }
}

impl ResolverCore for ResolveContext<'_> {
    fn resolve_service(&self, service: &Service, parameters: &Parameters) -> DiResult<Option<Instance>> {
        self.scope.ensure_active()?;
        let Some(registration) = self.scope.registry().try_get_registration(service)? else {
            return Ok(None);
        };
        self.resolve_registration(service, &registration, parameters).map(Some)
    }

    fn is_registered_service(&self, service: &Service) -> bool {
        self.scope.is_registered_service(service)
    }

    fn track_disposable(&self, item: Disposable) -> DiResult<()> {
        self.scope.track_disposable(item)
    }
}

/// State of one component request as it travels through the pipeline.
///
/// Middleware may inspect and change the parameters, the scope and the
/// instance. The pipeline's result is the instance left in the context.
pub struct ResolveRequestContext<'op> {
    pub(super) operation: &'op ResolveOperation,
    pub(super) scope: LifetimeScope,
    pub(super) service: Service,
    pub(super) registration: Arc<ComponentRegistration>,
    pub(super) parameters: Parameters,
    pub(super) instance: Option<Instance>,
}

impl<'op> ResolveRequestContext<'op> {
    pub(super) fn new(operation: &'op ResolveOperation, scope: LifetimeScope, request: &ResolveRequest) -> Self {
        Self {
            operation,
            scope,
            service: request.service.clone(),
            registration: request.registration.clone(),
            parameters: request.parameters.clone(),
            instance: None,
        }
    }

    /// Requested service.
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Registration being resolved.
    pub fn registration(&self) -> &Arc<ComponentRegistration> {
        &self.registration
    }

    /// Requesting scope, or the owning scope once scope selection has run.
    pub fn scope(&self) -> &LifetimeScope {
        &self.scope
    }

    /// Parameters for the activator.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Replaces the parameters for the rest of the pipeline.
    pub fn set_parameters(&mut self, parameters: Parameters) {
        self.parameters = parameters;
    }

    /// The instance produced so far.
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    /// Sets the pipeline's result.
    pub fn set_instance(&mut self, instance: Instance) {
        self.instance = Some(instance);
    }

    pub(crate) fn take_instance(&mut self) -> Option<Instance> {
        self.instance.take()
    }

    /// Context for resolving other services from this request's scope.
    pub fn resolve_context(&self) -> ResolveContext<'op> {
        ResolveContext::new(self.operation, self.scope.clone())
    }

    /// The running operation.
    pub fn operation(&self) -> &'op ResolveOperation {
        self.operation
    }
}

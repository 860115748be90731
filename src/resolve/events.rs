use std::sync::Arc;

use crate::error::DiResult;
use crate::key::Service;
use crate::parameters::{Parameter, Parameters};
use crate::registration::{ComponentRegistration, Instance};

use super::context::ResolveContext;

/// Passed to preparing hooks before the activator runs.
pub struct PreparingEvent<'a, 'op> {
    pub(super) context: &'a ResolveContext<'op>,
    pub(super) service: &'a Service,
    pub(super) registration: &'a ComponentRegistration,
    pub(super) parameters: &'a mut Parameters,
}

impl<'a, 'op> PreparingEvent<'a, 'op> {
    /// Resolver for other services.
    pub fn context(&self) -> &ResolveContext<'op> {
        self.context
    }

    /// Requested service.
    pub fn service(&self) -> &Service {
        self.service
    }

    /// Registration about to be activated.
    pub fn registration(&self) -> &ComponentRegistration {
        self.registration
    }

    /// Parameters the activator will receive.
    pub fn parameters(&self) -> &Parameters {
        self.parameters
    }

    /// Adds a parameter.
    pub fn add_parameter(&mut self, parameter: Parameter) {
        self.parameters.push(parameter);
    }

    /// Replaces every parameter.
    pub fn set_parameters(&mut self, parameters: Parameters) {
        *self.parameters = parameters;
    }
}

/// Passed to activating hooks; the instance may be replaced.
pub struct ActivatingEvent<'a, 'op> {
    pub(super) context: &'a ResolveContext<'op>,
    pub(super) registration: &'a ComponentRegistration,
    pub(super) parameters: &'a Parameters,
    pub(super) instance: &'a mut Instance,
}

impl<'a, 'op> ActivatingEvent<'a, 'op> {
    /// Resolver for other services.
    pub fn context(&self) -> &ResolveContext<'op> {
        self.context
    }

    /// Registration being activated.
    pub fn registration(&self) -> &ComponentRegistration {
        self.registration
    }

    /// Parameters the activator received.
    pub fn parameters(&self) -> &Parameters {
        self.parameters
    }

    /// The raw instance.
    pub fn instance(&self) -> &Instance {
        self.instance
    }

    /// The raw instance as `T`.
    pub fn instance_as<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.instance.downcast::<T>()
    }

    /// Substitutes the instance, e.g. with a proxy of the same type.
    pub fn replace_instance<T: ?Sized + Send + Sync + 'static>(&mut self, value: Arc<T>) {
        *self.instance = Instance::new(value);
    }
}

/// Passed to activated hooks once the instance is complete.
pub struct ActivatedEvent<'a, 'op> {
    pub(super) context: &'a ResolveContext<'op>,
    pub(super) registration: &'a ComponentRegistration,
    pub(super) parameters: &'a Parameters,
    pub(super) instance: &'a Instance,
}

impl<'a, 'op> ActivatedEvent<'a, 'op> {
    /// Resolver for other services.
    pub fn context(&self) -> &ResolveContext<'op> {
        self.context
    }

    /// Registration that was activated.
    pub fn registration(&self) -> &ComponentRegistration {
        self.registration
    }

    /// Parameters the activator received.
    pub fn parameters(&self) -> &Parameters {
        self.parameters
    }

    /// The activated instance.
    pub fn instance(&self) -> &Instance {
        self.instance
    }

    /// The activated instance as `T`.
    pub fn instance_as<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.instance.downcast::<T>()
    }
}

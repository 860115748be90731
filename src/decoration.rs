//! Decorators and composites.
//!
//! A decorator wraps every instance resolved for a service; decorators
//! apply in registration order, so the last one registered is outermost.
//! A composite is the default registration of a service and aggregates all
//! of its other registrations.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::activators::Activator;
use crate::error::DiResult;
use crate::key::{Service, TypedService};
use crate::parameters::Parameters;
use crate::registration::{ComponentId, Instance};
use crate::resolve::ResolveContext;

/// Wraps instances of service `S`.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{ContainerBuilder, Decorator, DiResult, Registrar, ResolveContext, Resolver};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct Plain;
/// impl Greeter for Plain {
///     fn greet(&self) -> String { "hello".into() }
/// }
///
/// struct Shouting(Arc<dyn Greeter>);
/// impl Greeter for Shouting {
///     fn greet(&self) -> String { self.0.greet().to_uppercase() }
/// }
///
/// struct Shout;
/// impl Decorator<dyn Greeter> for Shout {
///     fn decorate(&self, inner: Arc<dyn Greeter>, _: &ResolveContext<'_>) -> DiResult<Arc<dyn Greeter>> {
///         Ok(Arc::new(Shouting(inner)))
///     }
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder.register(|_| Ok(Plain)).as_trait::<dyn Greeter>(|g| g);
/// builder.decorate_with::<dyn Greeter, _>(Shout);
///
/// let container = builder.build().unwrap();
/// assert_eq!(container.resolve::<dyn Greeter>().unwrap().greet(), "HELLO");
/// ```
pub trait Decorator<S: ?Sized>: Send + Sync {
    /// Returns the instance to hand out in place of `inner`.
    fn decorate(&self, inner: Arc<S>, context: &ResolveContext<'_>) -> DiResult<Arc<S>>;
}

impl<S, F> Decorator<S> for F
where
    S: ?Sized,
    F: Fn(Arc<S>, &ResolveContext<'_>) -> DiResult<Arc<S>> + Send + Sync,
{
    fn decorate(&self, inner: Arc<S>, context: &ResolveContext<'_>) -> DiResult<Arc<S>> {
        self(inner, context)
    }
}

type DecorateFn = Arc<dyn Fn(Instance, &ResolveContext<'_>) -> DiResult<Instance> + Send + Sync>;

/// A decorator bound to one service.
pub struct DecoratorRegistration {
    id: ComponentId,
    service: Service,
    decorate: DecorateFn,
}

impl DecoratorRegistration {
    /// Registration applying `decorator` to `service`, whose instances are `Arc<S>`.
    pub fn new<S, D>(service: Service, decorator: D) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        D: Decorator<S> + 'static,
    {
        Self {
            id: ComponentId::next(),
            service,
            decorate: Arc::new(move |instance: Instance, context: &ResolveContext<'_>| {
                let inner = instance.downcast::<S>()?;
                decorator.decorate(inner, context).map(Instance::new)
            }),
        }
    }

    /// Identity; also the order in which decorators apply.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The decorated service.
    pub fn service(&self) -> &Service {
        &self.service
    }

    pub(crate) fn apply(&self, instance: Instance, context: &ResolveContext<'_>) -> DiResult<Instance> {
        (self.decorate)(instance, context)
    }
}

impl std::fmt::Debug for DecoratorRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoratorRegistration")
            .field("id", &self.id)
            .field("service", &self.service)
            .finish()
    }
}

/// Aggregates the non-composite registrations of a service into one `Arc<S>`.
pub(crate) struct CompositeActivator<S: ?Sized, F> {
    service: Service,
    assemble: F,
    _marker: PhantomData<fn() -> Arc<S>>,
}

impl<S, F> CompositeActivator<S, F>
where
    S: ?Sized + Send + Sync + 'static,
    F: Fn(Vec<Arc<S>>, &ResolveContext<'_>) -> DiResult<Arc<S>> + Send + Sync,
{
    pub(crate) fn new(service: Service, assemble: F) -> Self {
        Self {
            service,
            assemble,
            _marker: PhantomData,
        }
    }
}

impl<S, F> Activator for CompositeActivator<S, F>
where
    S: ?Sized + Send + Sync + 'static,
    F: Fn(Vec<Arc<S>>, &ResolveContext<'_>) -> DiResult<Arc<S>> + Send + Sync,
{
    fn limit_type(&self) -> TypedService {
        TypedService::of::<S>()
    }

    fn activate(&self, context: &ResolveContext<'_>, parameters: &Parameters) -> DiResult<Instance> {
        let mut parts = Vec::new();
        for registration in context.registrations_for(&self.service)? {
            if registration.options().is_composite {
                continue;
            }
            let instance = context.resolve_registration(&self.service, &registration, parameters)?;
            parts.push(instance.downcast::<S>()?);
        }
        (self.assemble)(parts, context).map(Instance::new)
    }
}

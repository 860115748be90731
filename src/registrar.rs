//! Registration helpers shared by the container builder and scope builders.
//!
//! [`Registrar`] collects registrations, decorators and sources; nothing
//! touches a registry until the builder is applied. Each `register*` call
//! returns a [`RegistrationBuilder`] for configuring the new component.

use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::activators::{DelegateActivator, InstanceActivator, ReflectionActivator};
use crate::adapters::adapter_keys;
use crate::decoration::{CompositeActivator, Decorator, DecoratorRegistration};
use crate::disposer::Disposable;
use crate::error::DiResult;
use crate::key::{Discriminator, Service, TypedService};
use crate::lifetime::{ComponentLifetime, DeclaringScopeLifetime, InstanceOwnership, InstanceSharing, Lifetime};
use crate::parameters::Parameters;
use crate::reflection::{Injectable, PropertyWiring};
use crate::registration::{
    ComponentRegistration, ExposedService, Instance, Projection, RegistrationData,
};
use crate::registry::ComponentRegistry;
use crate::resolve::{ActivatedEvent, ActivatingEvent, PreparingEvent, ResolveContext, ResolveMiddleware};
use crate::scope::ScopeTag;
use crate::sources::RegistrationSource;
use crate::traits::{AsyncDispose, Dispose};

struct PendingComponent {
    data: RegistrationData,
    preserve_defaults: bool,
    // Collection, lazy, factory and owned keys over each exposed type
    adapter_keys: Vec<TypedService>,
}

/// Registrations collected by a builder, applied to a registry in order.
#[doc(hidden)]
pub struct PendingRegistrations {
    components: Vec<PendingComponent>,
    decorators: Vec<Arc<DecoratorRegistration>>,
    sources: Vec<Arc<dyn RegistrationSource>>,
    // Id of the scope being configured, for scope-local registrations
    declaring_scope: Option<u64>,
}

impl PendingRegistrations {
    pub(crate) fn new(declaring_scope: Option<u64>) -> Self {
        Self {
            components: Vec::new(),
            decorators: Vec::new(),
            sources: Vec::new(),
            declaring_scope,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.components.is_empty() && self.decorators.is_empty() && self.sources.is_empty()
    }

    fn push<T: ?Sized + Send + Sync + 'static>(&mut self, data: RegistrationData) -> RegistrationBuilder<'_, T> {
        self.components.push(PendingComponent {
            data,
            preserve_defaults: false,
            adapter_keys: adapter_keys::<T>().to_vec(),
        });
        let index = self.components.len() - 1;
        RegistrationBuilder {
            component: &mut self.components[index],
            declaring_scope: self.declaring_scope,
            _marker: PhantomData,
        }
    }

    /// Adds everything to `registry`: sources, then decorators, then
    /// components in declaration order.
    ///
    /// Returns the registrations marked for auto-activation.
    pub(crate) fn apply(self, registry: &ComponentRegistry) -> DiResult<Vec<Arc<ComponentRegistration>>> {
        for source in self.sources {
            registry.add_registration_source(source)?;
        }
        for decorator in self.decorators {
            registry.register_decorator(decorator)?;
        }
        let mut auto_activate = Vec::new();
        for component in self.components {
            registry.learn_adapter_shapes(&component.adapter_keys);
            let registration = Arc::new(ComponentRegistration::new(component.data));
            registry.register(registration.clone(), component.preserve_defaults)?;
            if registration.options().auto_activate {
                auto_activate.push(registration);
            }
        }
        Ok(auto_activate)
    }
}

/// Collects component registrations.
///
/// Implemented by [`ContainerBuilder`](crate::ContainerBuilder) and
/// [`ScopeBuilder`](crate::ScopeBuilder).
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{ContainerBuilder, Registrar, Resolver};
/// use std::sync::Arc;
///
/// struct Config {
///     url: String,
/// }
///
/// struct Client {
///     config: Arc<Config>,
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder.register_instance(Config { url: "db://local".into() });
/// builder
///     .register(|c| Ok(Client { config: c.resolve()? }))
///     .instance_per_lifetime_scope();
///
/// let container = builder.build().unwrap();
/// let client = container.resolve::<Client>().unwrap();
/// assert_eq!(client.config.url, "db://local");
/// ```
pub trait Registrar {
    #[doc(hidden)]
    fn pending(&mut self) -> &mut PendingRegistrations;

    /// Registers a pre-built value as a single instance.
    fn register_instance<T: Send + Sync + 'static>(&mut self, value: T) -> RegistrationBuilder<'_, T> {
        self.register_arc(Arc::new(value))
    }

    /// Registers a pre-built `Arc`, which may hold a trait object.
    fn register_arc<T: ?Sized + Send + Sync + 'static>(&mut self, value: Arc<T>) -> RegistrationBuilder<'_, T> {
        let data = RegistrationData::new(Arc::new(InstanceActivator::new(value)));
        self.pending().push::<T>(data).single_instance()
    }

    /// Registers a factory; a new instance per request unless configured otherwise.
    fn register<T, F>(&mut self, factory: F) -> RegistrationBuilder<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveContext<'_>) -> DiResult<T> + Send + Sync + 'static,
    {
        let activator =
            DelegateActivator::of(move |context: &ResolveContext<'_>, _parameters: &Parameters| factory(context));
        self.pending().push(RegistrationData::new(Arc::new(activator)))
    }

    /// Registers a factory that also receives the request's parameters.
    fn register_with_parameters<T, F>(&mut self, factory: F) -> RegistrationBuilder<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveContext<'_>, &Parameters) -> DiResult<T> + Send + Sync + 'static,
    {
        self.pending()
            .push(RegistrationData::new(Arc::new(DelegateActivator::of(factory))))
    }

    /// Registers `T`, built from its declared constructors.
    fn register_type<T: Injectable>(&mut self) -> RegistrationBuilder<'_, T> {
        self.pending()
            .push(RegistrationData::new(Arc::new(ReflectionActivator::<T>::new())))
    }

    /// Decorates every instance of service `S` with a closure.
    fn register_decorator<S, F>(&mut self, decorator: F)
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<S>, &ResolveContext<'_>) -> DiResult<Arc<S>> + Send + Sync + 'static,
    {
        self.decorate_with::<S, F>(decorator);
    }

    /// Decorates every instance of service `S` with a [`Decorator`].
    fn decorate_with<S, D>(&mut self, decorator: D)
    where
        S: ?Sized + Send + Sync + 'static,
        D: Decorator<S> + 'static,
    {
        self.pending()
            .decorators
            .push(Arc::new(DecoratorRegistration::new::<S, D>(Service::typed::<S>(), decorator)));
    }

    /// Registers the composite of service `S`.
    ///
    /// The composite becomes the default for `S` and receives every other
    /// registration of `S`. A service has at most one composite.
    fn register_composite<S, F>(&mut self, assemble: F) -> RegistrationBuilder<'_, S>
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(Vec<Arc<S>>, &ResolveContext<'_>) -> DiResult<Arc<S>> + Send + Sync + 'static,
    {
        let service = Service::typed::<S>();
        let mut data = RegistrationData::new(Arc::new(CompositeActivator::<S, F>::new(service.clone(), assemble)));
        data.services.push(ExposedService::new(service));
        data.options.is_composite = true;
        self.pending().push(data)
    }

    /// Adds a registration source.
    fn add_source(&mut self, source: Arc<dyn RegistrationSource>) {
        self.pending().sources.push(source);
    }

    /// Adds a fully configured registration.
    fn register_component(&mut self, data: RegistrationData, preserve_defaults: bool) {
        let builder = self.pending().push::<()>(data);
        if preserve_defaults {
            builder.preserve_existing_defaults();
        }
    }
}

fn projection<T, S, F>(project: F) -> Projection
where
    T: ?Sized + Send + Sync + 'static,
    S: ?Sized + Send + Sync + 'static,
    F: Fn(Arc<T>) -> Arc<S> + Send + Sync + 'static,
{
    Arc::new(move |instance: &Instance| -> DiResult<Instance> {
        Ok(Instance::new(project(instance.downcast::<T>()?)))
    })
}

/// Configures one pending registration.
///
/// Without any `as_*` or `keyed` call the component is exposed as its own
/// type. Once a service is added explicitly, only the added services are
/// exposed.
pub struct RegistrationBuilder<'a, T: ?Sized> {
    component: &'a mut PendingComponent,
    declaring_scope: Option<u64>,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<'a, T: ?Sized + Send + Sync + 'static> RegistrationBuilder<'a, T> {
    fn data(&mut self) -> &mut RegistrationData {
        &mut self.component.data
    }

    fn learn_adapters<S: ?Sized + Send + Sync + 'static>(mut self) -> Self {
        let keys = &mut self.component.adapter_keys;
        for key in adapter_keys::<S>() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        self
    }

    fn expose(mut self, exposed: ExposedService) -> Self {
        let services = &mut self.data().services;
        if !services.iter().any(|existing| existing.service() == exposed.service()) {
            services.push(exposed);
        }
        self
    }

    /// Exposes the component as its own type.
    pub fn as_self(self) -> Self {
        self.expose(ExposedService::new(Service::typed::<T>()))
    }

    /// Exposes the instance as `service` without conversion.
    ///
    /// The registry rejects services that are not the component's own type.
    pub fn as_service(self, service: Service) -> Self {
        self.expose(ExposedService::new(service))
    }

    /// Exposes the component as its own type under `key`.
    pub fn keyed(self, key: impl Into<Discriminator>) -> Self {
        self.expose(ExposedService::new(Service::keyed::<T>(key)))
    }

    /// Exposes the component as `S`, typically a trait object.
    pub fn as_trait<S>(self, project: impl Fn(Arc<T>) -> Arc<S> + Send + Sync + 'static) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.expose(ExposedService::projected(Service::typed::<S>(), projection(project)))
            .learn_adapters::<S>()
    }

    /// Exposes the component as `S` under `key`.
    pub fn as_keyed_trait<S>(
        self,
        key: impl Into<Discriminator>,
        project: impl Fn(Arc<T>) -> Arc<S> + Send + Sync + 'static,
    ) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.expose(ExposedService::projected(Service::keyed::<S>(key), projection(project)))
            .learn_adapters::<S>()
    }

    /// Sets the lifetime policy and sharing mode.
    pub fn with_lifetime(mut self, lifetime: Arc<dyn ComponentLifetime>, sharing: InstanceSharing) -> Self {
        let data = self.data();
        data.lifetime = lifetime;
        data.sharing = sharing;
        self
    }

    fn lifetime(self, lifetime: Lifetime) -> Self {
        let (policy, sharing) = lifetime.into_parts();
        self.with_lifetime(policy, sharing)
    }

    /// One instance for the container.
    ///
    /// Inside a scope builder this is one instance for the configured scope.
    pub fn single_instance(self) -> Self {
        match self.declaring_scope {
            Some(scope_id) => {
                self.with_lifetime(Arc::new(DeclaringScopeLifetime::new(scope_id)), InstanceSharing::Shared)
            }
            None => self.lifetime(Lifetime::Singleton),
        }
    }

    /// One instance per lifetime scope.
    pub fn instance_per_lifetime_scope(self) -> Self {
        self.lifetime(Lifetime::Scoped)
    }

    /// A new instance per request.
    pub fn instance_per_dependency(self) -> Self {
        self.lifetime(Lifetime::Transient)
    }

    /// One instance per nearest ancestor scope tagged with one of `tags`.
    pub fn instance_per_matching_lifetime_scope<I, G>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<ScopeTag>,
    {
        self.lifetime(Lifetime::Matching(tags.into_iter().map(Into::into).collect()))
    }

    /// The container never releases the instances.
    pub fn externally_owned(mut self) -> Self {
        self.data().ownership = InstanceOwnership::ExternallyOwned;
        self
    }

    /// Runs `release` when the owning scope ends.
    pub fn on_release<F>(mut self, release: F) -> Self
    where
        F: Fn(Arc<T>) + Send + Sync + 'static,
    {
        let release = Arc::new(release);
        self.data().release = Some(Arc::new(move |instance: &Instance| -> Option<Disposable> {
            let value = instance.try_downcast::<T>()?;
            let release = release.clone();
            Some(Disposable::from_fn(type_name::<T>(), move || (*release)(value)))
        }));
        self
    }

    /// Keeps an existing default for the exposed services.
    pub fn preserve_existing_defaults(mut self) -> Self {
        self.component.preserve_defaults = true;
        self
    }

    /// Attaches metadata.
    pub fn with_metadata<V: std::any::Any + Send + Sync>(mut self, key: impl Into<String>, value: V) -> Self {
        self.data().metadata.insert(key, value);
        self
    }

    /// Runs `hook` before activation.
    pub fn on_preparing<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut PreparingEvent<'_, '_>) -> DiResult<()> + Send + Sync + 'static,
    {
        self.data().on_preparing(Arc::new(hook));
        self
    }

    /// Runs `hook` after construction; the hook may replace the instance.
    pub fn on_activating<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ActivatingEvent<'_, '_>) -> DiResult<()> + Send + Sync + 'static,
    {
        self.data().on_activating(Arc::new(hook));
        self
    }

    /// Runs `hook` once the instance is complete.
    pub fn on_activated<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ActivatedEvent<'_, '_>) -> DiResult<()> + Send + Sync + 'static,
    {
        self.data().on_activated(Arc::new(hook));
        self
    }

    /// Resolves the component as soon as the container (or scope) is built.
    pub fn auto_activate(mut self) -> Self {
        self.data().options.auto_activate = true;
        self
    }

    /// Adds a pipeline stage for this component.
    pub fn with_middleware<M: ResolveMiddleware + 'static>(mut self, middleware: Arc<M>) -> Self {
        self.data().middleware.push(middleware);
        self
    }
}

impl<'a, T: ?Sized + Dispose> RegistrationBuilder<'a, T> {
    /// Calls [`Dispose::dispose`] when the owning scope ends.
    pub fn disposable(mut self) -> Self {
        self.data().release = Some(Arc::new(|instance: &Instance| {
            instance.try_downcast::<T>().map(Disposable::from_dispose)
        }));
        self
    }
}

impl<'a, T: ?Sized + AsyncDispose> RegistrationBuilder<'a, T> {
    /// Awaits [`AsyncDispose::dispose`] when the owning scope ends.
    ///
    /// Such instances can only be released by `dispose_async`.
    pub fn async_disposable(mut self) -> Self {
        self.data().release = Some(Arc::new(|instance: &Instance| {
            instance.try_downcast::<T>().map(Disposable::from_async_dispose)
        }));
        self
    }
}

impl<'a, T: ?Sized + Dispose + AsyncDispose> RegistrationBuilder<'a, T> {
    /// Releases through whichever contract the disposing call uses.
    pub fn dual_disposable(mut self) -> Self {
        self.data().release = Some(Arc::new(|instance: &Instance| {
            instance.try_downcast::<T>().map(Disposable::from_both)
        }));
        self
    }
}

impl<'a, T: Injectable> RegistrationBuilder<'a, T> {
    /// Builds `T` from its declared constructors and injects its properties.
    pub fn properties_autowired(mut self, wiring: PropertyWiring) -> Self {
        self.data().activator = Arc::new(ReflectionActivator::<T>::new().with_property_wiring(wiring));
        self
    }
}

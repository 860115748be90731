//! Component registrations.
//!
//! A [`ComponentRegistration`] is the immutable description of how to build
//! one component: its activator, lifetime policy, sharing and ownership,
//! the services it exposes, metadata and lifecycle hooks. Registrations are
//! reference-counted and shared between the registry, scopes and pipelines.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::activators::Activator;
use crate::disposer::Disposable;
use crate::error::{DiError, DiResult};
use crate::key::{Service, TypedService};
use crate::lifetime::{ComponentLifetime, CurrentScopeLifetime, InstanceOwnership, InstanceSharing};
use crate::resolve::{
    ActivatedEvent, ActivatingEvent, PreparingEvent, ResolveMiddleware, ResolvePipeline,
};

/// Type-erased component instance.
///
/// Always wraps an `Arc<T>`, so sized types and trait objects are handled
/// the same way. Cloning is cheap and preserves identity.
#[derive(Clone)]
pub struct Instance(Arc<dyn Any + Send + Sync>);

impl Instance {
    /// Erases `value`.
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Instance(Arc::new(value))
    }

    /// Recovers the typed `Arc<T>`.
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.try_downcast::<T>().ok_or(DiError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })
    }

    /// Recovers the typed `Arc<T>` if the instance holds one.
    pub fn try_downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.0.downcast_ref::<Arc<T>>().cloned()
    }

    /// Whether two handles refer to the same erased instance.
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Instance(..)")
    }
}

/// Registration identity.
///
/// Ids are allocated sequentially, so comparing them also compares
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

static NEXT_COMPONENT: AtomicU64 = AtomicU64::new(1);

impl ComponentId {
    pub(crate) fn next() -> Self {
        ComponentId(NEXT_COMPONENT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Converts a raw component instance into the form of an exposed service.
pub type Projection = Arc<dyn Fn(&Instance) -> DiResult<Instance> + Send + Sync>;

/// A service exposed by a registration.
///
/// Without a projection the service type must be the activator's limit type.
#[derive(Clone)]
pub struct ExposedService {
    service: Service,
    projection: Option<Projection>,
}

impl ExposedService {
    /// Exposes the raw instance as `service`.
    pub fn new(service: Service) -> Self {
        Self {
            service,
            projection: None,
        }
    }

    /// Exposes the instance as `service` through `projection`.
    pub fn projected(service: Service, projection: Projection) -> Self {
        Self {
            service,
            projection: Some(projection),
        }
    }

    /// The exposed key.
    pub fn service(&self) -> &Service {
        &self.service
    }

    pub(crate) fn has_projection(&self) -> bool {
        self.projection.is_some()
    }
}

impl fmt::Debug for ExposedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExposedService")
            .field("service", &self.service)
            .field("projected", &self.projection.is_some())
            .finish()
    }
}

/// Key/value metadata attached to a registration.
#[derive(Clone, Default)]
pub struct Metadata {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Metadata {
    /// Stores `value` under `key`.
    pub fn insert<V: Any + Send + Sync>(&mut self, key: impl Into<String>, value: V) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Typed lookup.
    pub fn get<V: Any + Send + Sync>(&self, key: &str) -> Option<&V> {
        self.values.get(key).and_then(|value| value.downcast_ref::<V>())
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Flags that change how the registry and container treat a registration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationOptions {
    /// Aggregates the other registrations of its service.
    pub is_composite: bool,
    /// Resolved once when the container (or configured scope) is built.
    pub auto_activate: bool,
}

/// Produces the disposer entry for an activated instance, if it needs one.
pub type ReleaseFn = Arc<dyn Fn(&Instance) -> Option<Disposable> + Send + Sync>;

/// Hook run before activation; may rewrite parameters.
pub type PreparingHook = Arc<dyn Fn(&mut PreparingEvent<'_, '_>) -> DiResult<()> + Send + Sync>;
/// Hook run after construction; may replace the instance.
pub type ActivatingHook = Arc<dyn Fn(&mut ActivatingEvent<'_, '_>) -> DiResult<()> + Send + Sync>;
/// Hook run once the instance is complete.
pub type ActivatedHook = Arc<dyn Fn(&ActivatedEvent<'_, '_>) -> DiResult<()> + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) preparing: Vec<PreparingHook>,
    pub(crate) activating: Vec<ActivatingHook>,
    pub(crate) activated: Vec<ActivatedHook>,
}

/// Mutable description consumed by [`ComponentRegistration::new`].
///
/// Builders fill this in; sources create it directly.
pub struct RegistrationData {
    /// Produces raw instances.
    pub activator: Arc<dyn Activator>,
    /// Selects the owning scope.
    pub lifetime: Arc<dyn ComponentLifetime>,
    /// Per-scope caching.
    pub sharing: InstanceSharing,
    /// Whether the owning scope disposes instances.
    pub ownership: InstanceOwnership,
    /// Exposed services in declaration order. Empty means "the limit type".
    pub services: Vec<ExposedService>,
    /// User metadata.
    pub metadata: Metadata,
    /// Registration this one adapts, for source-supplied adapters.
    pub target: Option<Arc<ComponentRegistration>>,
    /// Disposal contract of the produced instances.
    pub release: Option<ReleaseFn>,
    /// Registry and container flags.
    pub options: RegistrationOptions,
    /// Extra pipeline stages.
    pub middleware: Vec<Arc<dyn ResolveMiddleware>>,
    pub(crate) hooks: Hooks,
}

impl RegistrationData {
    /// Transient, scope-owned registration of `activator` with no services yet.
    pub fn new(activator: Arc<dyn Activator>) -> Self {
        Self {
            activator,
            lifetime: Arc::new(CurrentScopeLifetime),
            sharing: InstanceSharing::None,
            ownership: InstanceOwnership::OwnedByScope,
            services: Vec::new(),
            metadata: Metadata::default(),
            target: None,
            release: None,
            options: RegistrationOptions::default(),
            middleware: Vec::new(),
            hooks: Hooks::default(),
        }
    }

    /// Adds a preparing hook.
    pub fn on_preparing(&mut self, hook: PreparingHook) {
        self.hooks.preparing.push(hook);
    }

    /// Adds an activating hook.
    pub fn on_activating(&mut self, hook: ActivatingHook) {
        self.hooks.activating.push(hook);
    }

    /// Adds an activated hook.
    pub fn on_activated(&mut self, hook: ActivatedHook) {
        self.hooks.activated.push(hook);
    }
}

/// Immutable description of one component.
pub struct ComponentRegistration {
    id: ComponentId,
    activator: Arc<dyn Activator>,
    lifetime: Arc<dyn ComponentLifetime>,
    sharing: InstanceSharing,
    ownership: InstanceOwnership,
    services: Vec<ExposedService>,
    metadata: Metadata,
    target: Option<Arc<ComponentRegistration>>,
    release: Option<ReleaseFn>,
    options: RegistrationOptions,
    middleware: Vec<Arc<dyn ResolveMiddleware>>,
    hooks: Hooks,
    pipeline: OnceCell<Arc<ResolvePipeline>>,
}

impl ComponentRegistration {
    /// Freezes `data` into a registration with a fresh id.
    pub fn new(data: RegistrationData) -> Self {
        let mut services = data.services;
        if services.is_empty() {
            services.push(ExposedService::new(Service::Typed(data.activator.limit_type())));
        }
        Self {
            id: ComponentId::next(),
            activator: data.activator,
            lifetime: data.lifetime,
            sharing: data.sharing,
            ownership: data.ownership,
            services,
            metadata: data.metadata,
            target: data.target,
            release: data.release,
            options: data.options,
            middleware: data.middleware,
            hooks: data.hooks,
            pipeline: OnceCell::new(),
        }
    }

    /// Registration identity.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The activator.
    pub fn activator(&self) -> &Arc<dyn Activator> {
        &self.activator
    }

    /// Concrete type produced by the activator.
    pub fn limit_type(&self) -> TypedService {
        self.activator.limit_type()
    }

    /// The lifetime policy.
    pub fn lifetime(&self) -> &Arc<dyn ComponentLifetime> {
        &self.lifetime
    }

    /// Sharing mode.
    pub fn sharing(&self) -> InstanceSharing {
        self.sharing
    }

    /// Ownership mode.
    pub fn ownership(&self) -> InstanceOwnership {
        self.ownership
    }

    /// Exposed services, never empty.
    pub fn services(&self) -> &[ExposedService] {
        &self.services
    }

    /// Whether the registration exposes `service`.
    pub fn exposes(&self, service: &Service) -> bool {
        self.services.iter().any(|exposed| exposed.service == *service)
    }

    /// First exposed service.
    pub fn primary_service(&self) -> &Service {
        &self.services[0].service
    }

    /// User metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Registration this one adapts.
    pub fn target(&self) -> Option<&Arc<ComponentRegistration>> {
        self.target.as_ref()
    }

    /// Registry and container flags.
    pub fn options(&self) -> RegistrationOptions {
        self.options
    }

    /// Short description used in errors and logs.
    pub fn describe(&self) -> String {
        self.activator.limit_type().type_name().to_string()
    }

    /// The resolve pipeline, built on first use.
    pub fn pipeline(&self) -> &Arc<ResolvePipeline> {
        self.pipeline
            .get_or_init(|| Arc::new(ResolvePipeline::build(&self.middleware)))
    }

    /// Converts a raw instance into the form of `service`.
    ///
    /// Services the registration does not expose get the raw instance.
    pub(crate) fn project(&self, service: &Service, raw: Instance) -> DiResult<Instance> {
        match self
            .services
            .iter()
            .find(|exposed| exposed.service == *service)
            .and_then(|exposed| exposed.projection.as_ref())
        {
            Some(projection) => projection(&raw),
            None => Ok(raw),
        }
    }

    pub(crate) fn release_entry(&self, instance: &Instance) -> Option<Disposable> {
        self.release.as_ref().and_then(|release| release(instance))
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.hooks
    }
}

impl fmt::Debug for ComponentRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistration")
            .field("id", &self.id)
            .field("limit_type", &self.activator.limit_type())
            .field("lifetime", &self.lifetime)
            .field("sharing", &self.sharing)
            .field("ownership", &self.ownership)
            .field("services", &self.services)
            .field("target", &self.target.as_ref().map(|target| target.id))
            .finish()
    }
}

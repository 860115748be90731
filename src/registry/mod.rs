//! Component registry: service to registrations, with on-demand sources.
//!
//! Explicit registrations are visible immediately. Registration sources are
//! consulted the first time a service is looked up, at most once per
//! service, and their answers are merged into the service's entry.
//!
//! A child registry (created for a lifetime scope that adds its own
//! registrations) sees its parent's explicit and non-adapter registrations
//! first, followed by its own. Adapter sources are re-run in the child so
//! adapters cover the child's registrations too.

mod entry;

use std::any::TypeId;
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::adapters::AdapterShape;
use crate::decoration::DecoratorRegistration;
use crate::error::{DiError, DiResult};
use crate::internal::FastMap;
use crate::key::{Service, TypedService};
use crate::reflection::ReflectionCache;
use crate::registration::{ComponentId, ComponentRegistration};
use crate::sources::RegistrationSource;

use entry::{Provenance, ServiceEntry};

/// Callback invoked for every registration added to a registry.
pub type RegisteredListener = Arc<dyn Fn(&Arc<ComponentRegistration>) + Send + Sync>;

#[derive(Default)]
struct RegistryState {
    services: FastMap<Service, ServiceEntry>,
    registrations: Vec<Arc<ComponentRegistration>>,
    sources: Vec<Arc<dyn RegistrationSource>>,
    decorators: FastMap<Service, Vec<Arc<DecoratorRegistration>>>,
    composites: FastMap<Service, ComponentId>,
    // Adapter shapes by wrapper type, learned from exposed services and shaped lookups
    shapes: FastMap<TypeId, Arc<AdapterShape>>,
}

// Held while one service's sources run. The flag marks a run in progress
// on the owning thread, so re-entrant lookups of the same service return early.
type InitGuard = Arc<ReentrantMutex<Cell<bool>>>;

/// Clears the in-progress flag, even if a source panics.
struct InProgress<'a> {
    running: &'a Cell<bool>,
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.running.set(false);
    }
}

/// Maps services to the registrations that provide them.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{
///     ComponentRegistration, ComponentRegistry, InstanceActivator, ReflectionCache,
///     RegistrationData, Service,
/// };
/// use std::sync::Arc;
///
/// let registry = ComponentRegistry::new(Arc::new(ReflectionCache::new()));
///
/// let first = Arc::new(ComponentRegistration::new(RegistrationData::new(Arc::new(
///     InstanceActivator::new(Arc::new(1u32)),
/// ))));
/// let second = Arc::new(ComponentRegistration::new(RegistrationData::new(Arc::new(
///     InstanceActivator::new(Arc::new(2u32)),
/// ))));
/// registry.register(first.clone(), false).unwrap();
/// registry.register(second.clone(), true).unwrap();
///
/// // preserve_defaults kept the first registration as the default
/// let default = registry.try_get_registration(&Service::typed::<u32>()).unwrap().unwrap();
/// assert_eq!(default.id(), first.id());
/// assert_eq!(registry.registrations_for(&Service::typed::<u32>()).unwrap().len(), 2);
/// ```
pub struct ComponentRegistry {
    parent: Option<Arc<ComponentRegistry>>,
    state: RwLock<RegistryState>,
    // One guard per service whose sources are being queried
    init: Mutex<FastMap<Service, InitGuard>>,
    listeners: RwLock<Vec<RegisteredListener>>,
    cache: Arc<ReflectionCache>,
    attached: AtomicBool,
    disposed: AtomicBool,
}

impl ComponentRegistry {
    /// Root registry using `cache` for type metadata.
    pub fn new(cache: Arc<ReflectionCache>) -> Self {
        Self {
            parent: None,
            state: RwLock::new(RegistryState::default()),
            init: Mutex::new(FastMap::default()),
            listeners: RwLock::new(Vec::new()),
            cache,
            attached: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Child registry layered over `parent`.
    ///
    /// Inherits the parent's adapter sources; other sources stay with the parent.
    pub fn child_of(parent: Arc<ComponentRegistry>) -> Self {
        let sources = parent
            .sources()
            .into_iter()
            .filter(|source| source.is_adapter_for_individual_components())
            .collect();
        Self {
            cache: parent.cache.clone(),
            parent: Some(parent),
            state: RwLock::new(RegistryState {
                sources,
                ..RegistryState::default()
            }),
            init: Mutex::new(FastMap::default()),
            listeners: RwLock::new(Vec::new()),
            attached: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Parent registry, for child registries.
    pub fn parent(&self) -> Option<&Arc<ComponentRegistry>> {
        self.parent.as_ref()
    }

    /// The reflection cache used for validation and metadata.
    pub fn reflection_cache(&self) -> &Arc<ReflectionCache> {
        &self.cache
    }

    fn ensure_active(&self) -> DiResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(DiError::disposed("component registry"))
        } else {
            Ok(())
        }
    }

    /// Whether the registry has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Adds an explicit registration.
    ///
    /// It becomes the default for each of its services unless
    /// `preserve_defaults` is set and a default already exists. Validation
    /// failures leave the registry unchanged.
    pub fn register(&self, registration: Arc<ComponentRegistration>, preserve_defaults: bool) -> DiResult<()> {
        self.ensure_active()?;
        self.validate(&registration, preserve_defaults)?;
        {
            let mut state = self.state.write();
            if registration.options().is_composite {
                // Re-checked under the write lock
                for exposed in registration.services() {
                    if state.composites.contains_key(exposed.service()) {
                        return Err(duplicate_composite(exposed.service()));
                    }
                }
                for exposed in registration.services() {
                    state.composites.insert(exposed.service().clone(), registration.id());
                }
            }
            state.registrations.push(registration.clone());
            for exposed in registration.services() {
                state
                    .services
                    .entry(exposed.service().clone())
                    .or_default()
                    .push(registration.clone(), Provenance::Explicit { preserve_defaults });
            }
        }
        tracing::debug!(
            component = %registration.describe(),
            id = %registration.id(),
            services = registration.services().len(),
            preserve_defaults,
            "component registered"
        );
        self.notify(&registration);
        Ok(())
    }

    fn validate(&self, registration: &ComponentRegistration, preserve_defaults: bool) -> DiResult<()> {
        let limit = registration.limit_type();
        for exposed in registration.services() {
            if exposed.has_projection() {
                continue;
            }
            if let Some(typed) = exposed.service().typed_service() {
                if !self.cache.is_assignable(&limit, typed) {
                    return Err(DiError::Configuration(format!(
                        "{} is not assignable to service {}; expose it through a projection",
                        limit.type_name(),
                        exposed.service()
                    )));
                }
            }
        }
        if registration.options().is_composite {
            if preserve_defaults {
                return Err(DiError::Configuration(format!(
                    "composite {} cannot preserve existing defaults",
                    registration.describe()
                )));
            }
            let state = self.state.read();
            for exposed in registration.services() {
                if state.composites.contains_key(exposed.service()) {
                    return Err(duplicate_composite(exposed.service()));
                }
            }
        }
        Ok(())
    }

    /// Adds a registration source.
    ///
    /// Services whose sources were already consulted are not re-queried.
    pub fn add_registration_source(&self, source: Arc<dyn RegistrationSource>) -> DiResult<()> {
        self.ensure_active()?;
        tracing::debug!(source = source.description(), "registration source added");
        self.state.write().sources.push(source);
        Ok(())
    }

    /// Sources consulted by this registry, in the order they were added.
    pub fn sources(&self) -> Vec<Arc<dyn RegistrationSource>> {
        self.state.read().sources.clone()
    }

    /// Adds a decorator for its service.
    pub fn register_decorator(&self, decorator: Arc<DecoratorRegistration>) -> DiResult<()> {
        self.ensure_active()?;
        self.state
            .write()
            .decorators
            .entry(decorator.service().clone())
            .or_default()
            .push(decorator);
        Ok(())
    }

    /// Decorators for `service`, innermost first.
    pub fn decorators_for(&self, service: &Service) -> Vec<Arc<DecoratorRegistration>> {
        let mut decorators = match &self.parent {
            Some(parent) => parent.decorators_for(service),
            None => Vec::new(),
        };
        if let Some(own) = self.state.read().decorators.get(service) {
            decorators.extend(own.iter().cloned());
        }
        decorators
    }

    /// Registers a callback invoked for every registration added afterwards.
    pub fn on_registered(&self, listener: RegisteredListener) {
        self.listeners.write().push(listener);
    }

    fn notify(&self, registration: &Arc<ComponentRegistration>) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(registration);
        }
    }

    /// Default registration for `service`, or `None` when nothing provides it.
    pub fn try_get_registration(&self, service: &Service) -> DiResult<Option<Arc<ComponentRegistration>>> {
        self.ensure_active()?;
        self.ensure_sources_queried(service);
        let state = self.state.read();
        let entry = state.services.get(service);
        if let Some(registration) = entry.and_then(ServiceEntry::explicit_default) {
            return Ok(Some(registration.clone()));
        }
        if let Some(parent) = &self.parent {
            if let Some(registration) = parent.inheritable_default(service) {
                return Ok(Some(registration));
            }
        }
        Ok(entry.and_then(|entry| entry.source_default(true)).cloned())
    }

    /// Default registration for `service`.
    pub fn registration(&self, service: &Service) -> DiResult<Arc<ComponentRegistration>> {
        self.try_get_registration(service)?
            .ok_or_else(|| DiError::not_registered(service))
    }

    /// Whether anything provides `service`. A disposed registry provides nothing.
    pub fn is_registered(&self, service: &Service) -> bool {
        matches!(self.try_get_registration(service), Ok(Some(_)))
    }

    /// Every registration providing `service`, in registration order.
    ///
    /// Registrations inherited from parent registries come first.
    pub fn registrations_for(&self, service: &Service) -> DiResult<Vec<Arc<ComponentRegistration>>> {
        self.ensure_active()?;
        self.ensure_sources_queried(service);
        let mut registrations = match &self.parent {
            Some(parent) => parent.inheritable_registrations_for(service),
            None => Vec::new(),
        };
        if let Some(entry) = self.state.read().services.get(service) {
            registrations.extend(entry.registrations().cloned());
        }
        Ok(registrations)
    }

    /// Every registration known to this registry, parents first.
    pub fn registrations(&self) -> Vec<Arc<ComponentRegistration>> {
        let mut registrations = match &self.parent {
            Some(parent) => parent.registrations(),
            None => Vec::new(),
        };
        registrations.extend(self.state.read().registrations.iter().cloned());
        registrations
    }

    fn inheritable_default(&self, service: &Service) -> Option<Arc<ComponentRegistration>> {
        if self.is_disposed() {
            return None;
        }
        self.ensure_sources_queried(service);
        let state = self.state.read();
        let entry = state.services.get(service);
        if let Some(registration) = entry.and_then(ServiceEntry::explicit_default) {
            return Some(registration.clone());
        }
        if let Some(parent) = &self.parent {
            if let Some(registration) = parent.inheritable_default(service) {
                return Some(registration);
            }
        }
        entry.and_then(|entry| entry.source_default(false)).cloned()
    }

    fn inheritable_registrations_for(&self, service: &Service) -> Vec<Arc<ComponentRegistration>> {
        if self.is_disposed() {
            return Vec::new();
        }
        self.ensure_sources_queried(service);
        let mut registrations = match &self.parent {
            Some(parent) => parent.inheritable_registrations_for(service),
            None => Vec::new(),
        };
        if let Some(entry) = self.state.read().services.get(service) {
            registrations.extend(entry.inheritable_registrations().cloned());
        }
        registrations
    }

    /// Records the adapter shapes carried by `keys`.
    ///
    /// A lookup of a wrapper type without a shape, such as
    /// `Service::typed::<Vec<Arc<T>>>()`, is answered with the learned shape.
    pub(crate) fn learn_adapter_shapes(&self, keys: &[TypedService]) {
        let mut state = self.state.write();
        for key in keys {
            if state.shapes.contains_key(&key.type_id()) {
                continue;
            }
            if let Some(shape) = self.cache.generic_definition(key) {
                state.shapes.insert(key.type_id(), shape);
            }
        }
    }

    fn known_shape(&self, type_id: TypeId) -> Option<Arc<AdapterShape>> {
        if let Some(shape) = self.state.read().shapes.get(&type_id) {
            return Some(shape.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.known_shape(type_id))
    }

    /// Service key carrying its adapter shape, if the wrapper type is known.
    fn shaped(&self, service: &Service) -> Service {
        match service.typed_service() {
            Some(typed) if typed.shape().is_none() => match self.known_shape(typed.type_id()) {
                Some(shape) => service.with_type(typed.with_shape(shape)),
                None => service.clone(),
            },
            Some(typed) => {
                if !self.state.read().shapes.contains_key(&typed.type_id()) {
                    self.learn_adapter_shapes(std::slice::from_ref(typed));
                }
                service.clone()
            }
            None => service.clone(),
        }
    }

    fn init_guard(&self, service: &Service) -> InitGuard {
        self.init
            .lock()
            .entry(service.clone())
            .or_insert_with(|| Arc::new(ReentrantMutex::new(Cell::new(false))))
            .clone()
    }

    fn ensure_sources_queried(&self, service: &Service) {
        let service = self.shaped(service);
        if self.sources_done(&service) {
            return;
        }
        let guard = self.init_guard(&service);
        {
            let running = guard.lock();
            // A lookup triggered by one of this service's own sources sees
            // what is registered so far instead of recursing
            if running.get() || self.sources_done(&service) {
                return;
            }
            running.set(true);
            let _in_progress = InProgress { running: &running };
            self.query_sources(&service);
        }
        if self.sources_done(&service) {
            let mut init = self.init.lock();
            if init.get(&service).map_or(false, |current| Arc::ptr_eq(current, &guard)) {
                init.remove(&service);
            }
        }
    }

    fn query_sources(&self, service: &Service) {
        let pending: Vec<(usize, Arc<dyn RegistrationSource>)> = {
            let state = self.state.read();
            let skipped = state
                .services
                .get(service)
                .map(ServiceEntry::skipped_sources)
                .unwrap_or_default();
            state
                .sources
                .iter()
                .cloned()
                .enumerate()
                .filter(|(index, _)| !skipped.contains(index))
                .collect()
        };

        let accessor = |wanted: &Service| self.registrations_for(wanted).unwrap_or_default();
        let mut supplied = Vec::new();
        for (index, source) in pending {
            let adapter = source.is_adapter_for_individual_components();
            let registrations = source.registrations_for(service, &accessor);
            if !registrations.is_empty() {
                tracing::trace!(
                    source = source.description(),
                    service = %service,
                    count = registrations.len(),
                    "registration source supplied components"
                );
            }
            for registration in registrations {
                self.add_from_source(service, index, adapter, &registration);
                supplied.push(registration);
            }
        }

        let preferred = self.preferred_adapter(service, &supplied);
        {
            let shaped = service.adapter_shape().is_some();
            self.state
                .write()
                .services
                .entry(service.clone())
                .or_default()
                .mark_queried(shaped, preferred);
        }
        for registration in &supplied {
            self.notify(registration);
        }
    }

    fn sources_done(&self, service: &Service) -> bool {
        self.state
            .read()
            .services
            .get(service)
            .map_or(false, |entry| entry.sources_queried(service.adapter_shape().is_some()))
    }

    fn add_from_source(
        &self,
        queried: &Service,
        source_index: usize,
        adapter: bool,
        registration: &Arc<ComponentRegistration>,
    ) {
        let mut state = self.state.write();
        state.registrations.push(registration.clone());
        for exposed in registration.services() {
            let entry = state.services.entry(exposed.service().clone()).or_default();
            entry.push(registration.clone(), Provenance::Source { adapter });
            // Adapter output is never fed back to the adapter that made it
            if adapter && exposed.service() != queried {
                entry.skip_source(source_index);
            }
        }
    }

    /// The adapter following the element service's default, if the service is an adapter.
    fn preferred_adapter(
        &self,
        service: &Service,
        supplied: &[Arc<ComponentRegistration>],
    ) -> Option<ComponentId> {
        let shape = service.adapter_shape()?;
        if matches!(**shape, AdapterShape::Collection { .. }) {
            return None;
        }
        let element = service.with_type(shape.element().clone());
        let element_default = self.try_get_registration(&element).ok().flatten()?;
        supplied
            .iter()
            .find(|registration| {
                registration
                    .target()
                    .map_or(false, |target| target.id() == element_default.id())
            })
            .map(|registration| registration.id())
    }

    /// Whether this registry holds registrations of its own.
    pub fn has_local_components(&self) -> bool {
        !self.state.read().registrations.is_empty()
    }

    pub(crate) fn attach_to_cache(&self) {
        if !self.attached.swap(true, Ordering::AcqRel) {
            self.cache.attach_container();
        }
    }

    /// Releases every registration. Later operations fail with `ObjectDisposed`.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut state = self.state.write();
            *state = RegistryState::default();
        }
        self.listeners.write().clear();
        if self.attached.swap(false, Ordering::AcqRel) {
            self.cache.detach_container();
        }
        tracing::debug!("component registry disposed");
    }
}

fn duplicate_composite(service: &Service) -> DiError {
    DiError::Configuration(format!("service {service} already has a composite registration"))
}

impl Drop for ComponentRegistry {
    fn drop(&mut self) {
        if self.attached.swap(false, Ordering::AcqRel) {
            self.cache.detach_container();
        }
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ComponentRegistry")
            .field("registrations", &state.registrations.len())
            .field("services", &state.services.len())
            .field("sources", &state.sources.len())
            .field("child", &self.parent.is_some())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

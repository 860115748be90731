//! Container construction.
//!
//! [`ContainerBuilder`] collects registrations and produces a [`Container`],
//! which owns the root lifetime scope. [`ScopeBuilder`] collects
//! registrations local to a child scope.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::config::ContainerOptions;
use crate::disposer::Disposable;
use crate::error::DiResult;
use crate::key::Service;
use crate::observer::{Observers, ResolveObserver};
use crate::parameters::Parameters;
use crate::reflection::ReflectionCache;
use crate::registrar::{PendingRegistrations, Registrar};
use crate::registration::Instance;
use crate::registry::ComponentRegistry;
use crate::resolve::ResolveRequest;
use crate::scope::LifetimeScope;
use crate::sources::{CollectionSource, FactorySource, LazySource, OwnedSource, RegistrationSource};
use crate::traits::ResolverCore;

/// Builds a [`Container`].
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{ContainerBuilder, Registrar, Resolver};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".into()
///     }
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder
///     .register(|_| Ok(English))
///     .as_trait::<dyn Greeter>(|e| e)
///     .single_instance();
///
/// let container = builder.build().unwrap();
/// let greeter = container.resolve::<dyn Greeter>().unwrap();
/// assert_eq!(greeter.greet(), "hello");
/// ```
pub struct ContainerBuilder {
    pending: PendingRegistrations,
    options: ContainerOptions,
    cache: Option<Arc<ReflectionCache>>,
    observers: Vec<Arc<dyn ResolveObserver>>,
}

impl ContainerBuilder {
    /// Builder with default options and the process-wide reflection cache.
    pub fn new() -> Self {
        Self {
            pending: PendingRegistrations::new(None),
            options: ContainerOptions::default(),
            cache: None,
            observers: Vec::new(),
        }
    }

    /// Replaces the container options.
    pub fn with_options(&mut self, options: ContainerOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// Uses `cache` instead of the process-wide reflection cache.
    pub fn with_reflection_cache(&mut self, cache: Arc<ReflectionCache>) -> &mut Self {
        self.cache = Some(cache);
        self
    }

    /// Adds a diagnostic observer.
    pub fn add_observer<O: ResolveObserver + 'static>(&mut self, observer: Arc<O>) -> &mut Self {
        self.observers.push(observer);
        self
    }

    /// Builds the container.
    ///
    /// Registrations are added in declaration order, then components marked
    /// for auto-activation are resolved from the root scope.
    pub fn build(self) -> DiResult<Container> {
        let Self {
            pending,
            options,
            cache,
            observers,
        } = self;
        options.validate()?;

        let cache = cache.unwrap_or_else(ReflectionCache::shared);
        let registry = Arc::new(ComponentRegistry::new(cache.clone()));
        registry.attach_to_cache();

        if options.default_sources {
            let defaults: [Arc<dyn RegistrationSource>; 4] = [
                Arc::new(CollectionSource),
                Arc::new(LazySource),
                Arc::new(FactorySource),
                Arc::new(OwnedSource),
            ];
            for source in defaults {
                registry.add_registration_source(source)?;
            }
        }

        let auto_activate = pending.apply(&registry)?;
        if options.evict_registration_cache {
            cache.evict_registration_entries();
        }

        let components = registry.registrations().len();
        let root = LifetimeScope::new_root(registry, Arc::new(options), Observers::new(observers));
        let container = Container { root };
        for registration in auto_activate {
            let request = ResolveRequest::new(registration.primary_service().clone(), registration);
            container.root.resolve_request(&request)?;
        }

        tracing::debug!(components, "container built");
        Ok(container)
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Registrar for ContainerBuilder {
    fn pending(&mut self) -> &mut PendingRegistrations {
        &mut self.pending
    }
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("options", &self.options)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

/// Registrations local to a child lifetime scope.
///
/// `single_instance` inside a scope builder means one instance for the new
/// scope, shared with its descendants.
pub struct ScopeBuilder {
    pending: PendingRegistrations,
}

impl ScopeBuilder {
    pub(crate) fn new(scope_id: u64) -> Self {
        Self {
            pending: PendingRegistrations::new(Some(scope_id)),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn into_pending(self) -> PendingRegistrations {
        self.pending
    }
}

impl Registrar for ScopeBuilder {
    fn pending(&mut self) -> &mut PendingRegistrations {
        &mut self.pending
    }
}

/// A built container: the root of the lifetime scope tree.
///
/// Dereferences to the root [`LifetimeScope`]. Dropping the container
/// disposes the root scope if that has not happened yet.
pub struct Container {
    root: LifetimeScope,
}

impl Container {
    /// The root scope.
    pub fn root_scope(&self) -> &LifetimeScope {
        &self.root
    }

    /// Disposes the root scope and the registry.
    pub fn dispose(&self) -> DiResult<()> {
        self.root.dispose()
    }

    /// Disposes the root scope, awaiting async releases.
    pub async fn dispose_async(&self) {
        self.root.dispose_async().await
    }
}

impl Deref for Container {
    type Target = LifetimeScope;

    fn deref(&self) -> &LifetimeScope {
        &self.root
    }
}

impl ResolverCore for Container {
    fn resolve_service(&self, service: &Service, parameters: &Parameters) -> DiResult<Option<Instance>> {
        self.root.resolve_service(service, parameters)
    }

    fn is_registered_service(&self, service: &Service) -> bool {
        self.root.is_registered_service(service)
    }

    fn track_disposable(&self, item: Disposable) -> DiResult<()> {
        self.root.track_disposable(item)
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if self.root.is_disposed() {
            return;
        }
        if let Err(error) = self.root.dispose() {
            tracing::warn!(%error, "failed to dispose container");
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container").field("root", &self.root).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Resolver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn auto_activated_components_are_resolved_during_build() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut builder = ContainerBuilder::new();
        builder
            .register(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(42u32)
            })
            .single_instance()
            .auto_activate();

        let container = builder.build().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*container.resolve::<u32>().unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_options_fail_the_build() {
        let mut builder = ContainerBuilder::new();
        builder.with_options(ContainerOptions {
            circular_dependency_detection: false,
            max_resolve_depth: 0,
            ..ContainerOptions::default()
        });
        assert!(builder.build().is_err());
    }

    #[test]
    fn dropping_the_container_disposes_the_root() {
        let mut builder = ContainerBuilder::new();
        builder.register_instance(1u8);
        let container = builder.build().unwrap();
        let root = container.root_scope().clone();
        drop(container);
        assert!(root.is_disposed());
        assert!(root.resolve::<u8>().is_err());
    }

    #[test]
    fn private_cache_tracks_attached_containers() {
        let cache = Arc::new(ReflectionCache::new());
        let mut builder = ContainerBuilder::new();
        builder.with_reflection_cache(cache.clone());
        let container = builder.build().unwrap();
        assert_eq!(cache.attached_containers(), 1);
        container.dispose().unwrap();
        assert_eq!(cache.attached_containers(), 0);
    }
}

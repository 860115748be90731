//! Resolver traits for service resolution.

use std::sync::Arc;

use crate::adapters::{Factory, Lazy, Owned};
use crate::disposer::Disposable;
use crate::error::{DiError, DiResult};
use crate::key::{Discriminator, Service};
use crate::parameters::Parameters;
use crate::registration::Instance;
use crate::traits::{AsyncDispose, Dispose};

/// Object-safe core of every resolver.
///
/// Implemented by lifetime scopes, the container and the [`ResolveContext`]
/// handed to factories. Resolving through a scope or the container starts a
/// new resolve operation; resolving through a `ResolveContext` continues the
/// operation that is already running, so nested dependencies share its
/// activation stack and cycle detection.
///
/// Most users should use the [`Resolver`] trait instead, which provides
/// typed generic methods on top of this one.
///
/// [`ResolveContext`]: crate::ResolveContext
pub trait ResolverCore {
    /// Resolves `service`, or returns `Ok(None)` when nothing provides it.
    ///
    /// # Arguments
    ///
    /// * `service` - The key to resolve
    /// * `parameters` - Values that take precedence over the container when
    ///   the component's constructor arguments are bound
    ///
    /// # Returns
    ///
    /// * `Ok(Some(instance))` - The instance in the form of `service`
    /// * `Ok(None)` - No registration or source provides `service`
    /// * `Err(DiError)` - Resolution failed (cycle, disposed scope, activator error, ...)
    fn resolve_service(&self, service: &Service, parameters: &Parameters) -> DiResult<Option<Instance>>;

    /// Whether a registration or source provides `service`.
    fn is_registered_service(&self, service: &Service) -> bool;

    /// Tracks `item` for release when the resolver's scope ends.
    fn track_disposable(&self, item: Disposable) -> DiResult<()>;
}

/// Typed resolution API.
///
/// Blanket-implemented for every [`ResolverCore`], so the container, lifetime
/// scopes and factory contexts all expose the same methods.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{ContainerBuilder, Registrar, Resolver};
/// use std::sync::Arc;
///
/// trait Logger: Send + Sync {
///     fn log(&self, msg: &str) -> String;
/// }
///
/// struct ConsoleLogger;
/// impl Logger for ConsoleLogger {
///     fn log(&self, msg: &str) -> String {
///         format!("LOG: {}", msg)
///     }
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder.register_instance(42usize);
/// builder
///     .register(|_| Ok(ConsoleLogger))
///     .as_trait::<dyn Logger>(|logger| logger)
///     .single_instance();
///
/// let container = builder.build().unwrap();
///
/// let number = container.resolve::<usize>().unwrap();
/// assert_eq!(*number, 42);
///
/// let logger = container.resolve::<dyn Logger>().unwrap();
/// assert_eq!(logger.log("ready"), "LOG: ready");
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves a service by type.
    ///
    /// Works for concrete types and trait objects alike. When several
    /// registrations expose the type, the default one wins (by default the
    /// last registered).
    ///
    /// # Examples
    ///
    /// ```
    /// use ferrous_ioc::{ContainerBuilder, Registrar, Resolver};
    ///
    /// let mut builder = ContainerBuilder::new();
    /// builder.register_instance("configuration".to_string());
    ///
    /// let container = builder.build().unwrap();
    /// let config = container.resolve::<String>().unwrap();
    /// assert_eq!(&*config, "configuration");
    /// ```
    fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.resolve_as::<T>(&Service::typed::<T>(), &Parameters::new())
    }

    /// Resolves a service by type, returning `Ok(None)` when it is not registered.
    ///
    /// Other failures, such as a throwing factory, are still errors.
    fn try_resolve<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        self.try_resolve_as::<T>(&Service::typed::<T>(), &Parameters::new())
    }

    /// Resolves a service by type, supplying parameters to its constructor.
    fn resolve_with<T: ?Sized + Send + Sync + 'static>(&self, parameters: Parameters) -> DiResult<Arc<T>> {
        self.resolve_as::<T>(&Service::typed::<T>(), &parameters)
    }

    /// Resolves a keyed service.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferrous_ioc::{ContainerBuilder, Registrar, Resolver};
    ///
    /// let mut builder = ContainerBuilder::new();
    /// builder.register_instance("primary-db".to_string()).keyed("primary");
    /// builder.register_instance("replica-db".to_string()).keyed("replica");
    ///
    /// let container = builder.build().unwrap();
    /// assert_eq!(&*container.resolve_keyed::<String>("replica").unwrap(), "replica-db");
    /// assert!(container.try_resolve::<String>().unwrap().is_none());
    /// ```
    fn resolve_keyed<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: impl Into<Discriminator>,
    ) -> DiResult<Arc<T>> {
        self.resolve_as::<T>(&Service::keyed::<T>(key), &Parameters::new())
    }

    /// Resolves a keyed service, returning `Ok(None)` when it is not registered.
    fn try_resolve_keyed<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: impl Into<Discriminator>,
    ) -> DiResult<Option<Arc<T>>> {
        self.try_resolve_as::<T>(&Service::keyed::<T>(key), &Parameters::new())
    }

    /// Resolves an arbitrary service key as `T`.
    fn resolve_as<T: ?Sized + Send + Sync + 'static>(
        &self,
        service: &Service,
        parameters: &Parameters,
    ) -> DiResult<Arc<T>> {
        self.try_resolve_as::<T>(service, parameters)?
            .ok_or_else(|| DiError::not_registered(service))
    }

    /// Resolves an arbitrary service key as `T`, returning `Ok(None)` when it is not registered.
    fn try_resolve_as<T: ?Sized + Send + Sync + 'static>(
        &self,
        service: &Service,
        parameters: &Parameters,
    ) -> DiResult<Option<Arc<T>>> {
        match self.resolve_service(service, parameters)? {
            Some(instance) => instance.downcast::<T>().map(Some),
            None => Ok(None),
        }
    }

    /// Resolves every registration of `T`, in registration order.
    ///
    /// Returns an empty list when nothing is registered.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferrous_ioc::{ContainerBuilder, Registrar, Resolver};
    /// use std::sync::Arc;
    ///
    /// trait Plugin: Send + Sync {
    ///     fn name(&self) -> &str;
    /// }
    ///
    /// struct Auth;
    /// impl Plugin for Auth {
    ///     fn name(&self) -> &str { "auth" }
    /// }
    ///
    /// struct Cache;
    /// impl Plugin for Cache {
    ///     fn name(&self) -> &str { "cache" }
    /// }
    ///
    /// let mut builder = ContainerBuilder::new();
    /// builder.register(|_| Ok(Auth)).as_trait::<dyn Plugin>(|p| p);
    /// builder.register(|_| Ok(Cache)).as_trait::<dyn Plugin>(|p| p);
    ///
    /// let container = builder.build().unwrap();
    /// let names: Vec<String> = container
    ///     .resolve_all::<dyn Plugin>()
    ///     .unwrap()
    ///     .iter()
    ///     .map(|p| p.name().to_string())
    ///     .collect();
    /// assert_eq!(names, vec!["auth", "cache"]);
    /// ```
    fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        let all = self.resolve_as::<Vec<Arc<T>>>(&Service::collection::<T>(), &Parameters::new())?;
        Ok(Arc::try_unwrap(all).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Resolves a deferred handle to the default registration of `T`.
    fn resolve_lazy<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<Lazy<T>>> {
        self.resolve_as::<Lazy<T>>(&Service::lazy::<T>(), &Parameters::new())
    }

    /// Resolves a factory that creates `T` on each call.
    fn resolve_factory<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<Factory<T>>> {
        self.resolve_as::<Factory<T>>(&Service::factory::<T>(), &Parameters::new())
    }

    /// Resolves `T` inside a private child scope released with the handle.
    fn resolve_owned<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<Owned<T>>> {
        self.resolve_as::<Owned<T>>(&Service::owned::<T>(), &Parameters::new())
    }

    /// Whether the service type `T` is registered.
    fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.is_registered_service(&Service::typed::<T>())
    }

    /// Registers a synchronous disposal hook with the resolver's scope.
    ///
    /// Use this from factories that create resources outside the
    /// component's own release contract.
    fn register_disposer<T: Dispose>(&self, service: Arc<T>) -> DiResult<()> {
        self.track_disposable(Disposable::from_dispose(service))
    }

    /// Registers an asynchronous disposal hook with the resolver's scope.
    fn register_async_disposer<T: AsyncDispose>(&self, service: Arc<T>) -> DiResult<()> {
        self.track_disposable(Disposable::from_async_dispose(service))
    }
}

impl<R: ResolverCore + ?Sized> Resolver for R {}

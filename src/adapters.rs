//! Implicit relationship types.
//!
//! Besides `T` itself the container can provide:
//!
//! * `Vec<Arc<T>>`: every registration of `T`, in registration order
//! * [`Lazy<T>`]: defers resolving `T` until first use
//! * [`Factory<T>`]: creates a new `T` per call
//! * [`Owned<T>`]: `T` resolved in a private child scope that the caller
//!   releases
//!
//! The matching service keys carry an adapter shape that tells the
//! registration sources how to build the wrapper for any `T`.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::DiResult;
use crate::key::{Service, TypedService};
use crate::parameters::Parameters;
use crate::registration::{ComponentRegistration, Instance};
use crate::resolve::ResolveRequest;
use crate::scope::{LifetimeScope, WeakScope};

pub(crate) type AssembleFn = fn(Vec<Instance>) -> DiResult<Instance>;
pub(crate) type WrapFn = fn(AdapterCore) -> Instance;
pub(crate) type OwnFn = fn(LifetimeScope, Instance) -> DiResult<Instance>;

/// How to build an adapter service out of its element service.
pub(crate) enum AdapterShape {
    Collection { element: TypedService, assemble: AssembleFn },
    Lazy { element: TypedService, wrap: WrapFn },
    Factory { element: TypedService, wrap: WrapFn },
    Owned { element: TypedService, wrap: OwnFn },
}

impl AdapterShape {
    pub(crate) fn element(&self) -> &TypedService {
        match self {
            AdapterShape::Collection { element, .. }
            | AdapterShape::Lazy { element, .. }
            | AdapterShape::Factory { element, .. }
            | AdapterShape::Owned { element, .. } => element,
        }
    }
}

impl fmt::Debug for AdapterShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            AdapterShape::Collection { .. } => "Collection",
            AdapterShape::Lazy { .. } => "Lazy",
            AdapterShape::Factory { .. } => "Factory",
            AdapterShape::Owned { .. } => "Owned",
        };
        write!(f, "{}<{}>", kind, self.element().type_name())
    }
}

fn assemble_collection<T: ?Sized + Send + Sync + 'static>(items: Vec<Instance>) -> DiResult<Instance> {
    let typed = items
        .iter()
        .map(Instance::downcast::<T>)
        .collect::<DiResult<Vec<Arc<T>>>>()?;
    Ok(Instance::new(Arc::new(typed)))
}

fn wrap_lazy<T: ?Sized + Send + Sync + 'static>(core: AdapterCore) -> Instance {
    Instance::new(Arc::new(Lazy::<T> {
        core,
        value: OnceCell::new(),
    }))
}

fn wrap_factory<T: ?Sized + Send + Sync + 'static>(core: AdapterCore) -> Instance {
    Instance::new(Arc::new(Factory::<T> {
        core,
        _marker: PhantomData,
    }))
}

fn wrap_owned<T: ?Sized + Send + Sync + 'static>(scope: LifetimeScope, instance: Instance) -> DiResult<Instance> {
    let value = instance.downcast::<T>()?;
    Ok(Instance::new(Arc::new(Owned {
        value,
        scope,
        released: AtomicBool::new(false),
    })))
}

impl TypedService {
    /// Key for `Vec<Arc<T>>`, the collection of every `T`.
    pub fn collection<T: ?Sized + Send + Sync + 'static>() -> Self {
        TypedService::shaped::<Vec<Arc<T>>>(AdapterShape::Collection {
            element: TypedService::of::<T>(),
            assemble: assemble_collection::<T>,
        })
    }

    /// Key for [`Lazy<T>`].
    pub fn lazy<T: ?Sized + Send + Sync + 'static>() -> Self {
        TypedService::shaped::<Lazy<T>>(AdapterShape::Lazy {
            element: TypedService::of::<T>(),
            wrap: wrap_lazy::<T>,
        })
    }

    /// Key for [`Factory<T>`].
    pub fn factory<T: ?Sized + Send + Sync + 'static>() -> Self {
        TypedService::shaped::<Factory<T>>(AdapterShape::Factory {
            element: TypedService::of::<T>(),
            wrap: wrap_factory::<T>,
        })
    }

    /// Key for [`Owned<T>`].
    pub fn owned<T: ?Sized + Send + Sync + 'static>() -> Self {
        TypedService::shaped::<Owned<T>>(AdapterShape::Owned {
            element: TypedService::of::<T>(),
            wrap: wrap_owned::<T>,
        })
    }
}

/// Adapter keys over `T`, each carrying its shape.
///
/// Registries learn these when `T` is exposed, so a plain
/// `Service::typed::<Vec<Arc<T>>>()` lookup finds the collection shape.
pub(crate) fn adapter_keys<T: ?Sized + Send + Sync + 'static>() -> [TypedService; 4] {
    [
        TypedService::collection::<T>(),
        TypedService::lazy::<T>(),
        TypedService::factory::<T>(),
        TypedService::owned::<T>(),
    ]
}

impl Service {
    /// Collection of every registration of `T`.
    pub fn collection<T: ?Sized + Send + Sync + 'static>() -> Self {
        Service::Typed(TypedService::collection::<T>())
    }

    /// Deferred `T`.
    pub fn lazy<T: ?Sized + Send + Sync + 'static>() -> Self {
        Service::Typed(TypedService::lazy::<T>())
    }

    /// Factory of `T`.
    pub fn factory<T: ?Sized + Send + Sync + 'static>() -> Self {
        Service::Typed(TypedService::factory::<T>())
    }

    /// `T` in its own disposable scope.
    pub fn owned<T: ?Sized + Send + Sync + 'static>() -> Self {
        Service::Typed(TypedService::owned::<T>())
    }
}

/// Link from an adapter instance back to the registration it wraps.
pub(crate) struct AdapterCore {
    scope: WeakScope,
    service: Service,
    registration: Arc<ComponentRegistration>,
}

impl AdapterCore {
    pub(crate) fn new(scope: &LifetimeScope, service: Service, registration: Arc<ComponentRegistration>) -> Self {
        Self {
            scope: scope.downgrade(),
            service,
            registration,
        }
    }

    fn resolve(&self, parameters: Parameters) -> DiResult<Instance> {
        let scope = self.scope.upgrade()?;
        scope.resolve_request(
            &ResolveRequest::new(self.service.clone(), self.registration.clone())
                .with_parameters(parameters),
        )
    }
}

/// Resolves `T` on first access and caches it.
///
/// The handle holds its scope weakly; accessing it after the scope is
/// disposed or dropped fails with `ObjectDisposed`.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{ContainerBuilder, Registrar, Resolver};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// static BUILT: AtomicUsize = AtomicUsize::new(0);
///
/// struct Expensive;
///
/// let mut builder = ContainerBuilder::new();
/// builder.register(|_| {
///     BUILT.fetch_add(1, Ordering::SeqCst);
///     Ok(Expensive)
/// });
/// let container = builder.build().unwrap();
///
/// let lazy = container.resolve_lazy::<Expensive>().unwrap();
/// assert_eq!(BUILT.load(Ordering::SeqCst), 0);
/// let first = lazy.value().unwrap();
/// let second = lazy.value().unwrap();
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(BUILT.load(Ordering::SeqCst), 1);
/// ```
pub struct Lazy<T: ?Sized> {
    core: AdapterCore,
    value: OnceCell<Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Lazy<T> {
    /// The value, resolving it on first call.
    pub fn value(&self) -> DiResult<Arc<T>> {
        self.value
            .get_or_try_init(|| self.core.resolve(Parameters::new())?.downcast::<T>())
            .cloned()
    }

    /// Whether the value has been resolved.
    pub fn is_value_created(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("service", &self.core.service)
            .field("created", &self.value.get().is_some())
            .finish()
    }
}

/// Creates `T` on each call, honoring the wrapped registration's sharing.
pub struct Factory<T: ?Sized> {
    core: AdapterCore,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Factory<T> {
    /// Resolves a `T`.
    pub fn create(&self) -> DiResult<Arc<T>> {
        self.create_with(Parameters::new())
    }

    /// Resolves a `T` with parameters for its constructor.
    pub fn create_with(&self, parameters: Parameters) -> DiResult<Arc<T>> {
        self.core.resolve(parameters)?.downcast::<T>()
    }
}

impl<T: ?Sized> fmt::Debug for Factory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("service", &self.core.service)
            .finish()
    }
}

/// `T` together with the child scope it was resolved in.
///
/// Disposing the handle (or dropping the last reference to it) ends that
/// scope, releasing `T` and every dependency the scope owns. Dependencies
/// owned by outer scopes, such as singletons, are unaffected.
pub struct Owned<T: ?Sized> {
    value: Arc<T>,
    scope: LifetimeScope,
    released: AtomicBool,
}

impl<T: ?Sized> Owned<T> {
    /// The owned value.
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// Ends the private scope.
    pub fn dispose(&self) -> DiResult<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.scope.dispose()
    }

    /// Ends the private scope, awaiting async releases.
    pub async fn dispose_async(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scope.dispose_async().await;
    }
}

impl<T: ?Sized> Deref for Owned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: ?Sized> Drop for Owned<T> {
    fn drop(&mut self) {
        if let Err(error) = self.dispose() {
            tracing::warn!(%error, "failed to release owned instance");
        }
    }
}

impl<T: ?Sized> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owned")
            .field("type", &std::any::type_name::<T>())
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish()
    }
}

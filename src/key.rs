//! Service key types for the resolution engine.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::adapters::AdapterShape;

/// Identity of a service type.
///
/// Works for sized types and trait objects alike (`TypedService::of::<dyn Logger>()`).
/// Only the `TypeId` takes part in equality and hashing; the type name is
/// carried for diagnostics, and adapter requests (collections, `Lazy<T>`, ...)
/// additionally carry an adapter shape describing how to build the wrapper.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::TypedService;
///
/// trait Logger: Send + Sync {}
///
/// let a = TypedService::of::<dyn Logger>();
/// let b = TypedService::of::<dyn Logger>();
/// assert_eq!(a, b);
/// assert!(a.type_name().contains("Logger"));
/// ```
#[derive(Clone)]
pub struct TypedService {
    id: TypeId,
    name: &'static str,
    shape: Option<Arc<AdapterShape>>,
}

impl TypedService {
    /// Key for the service type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            shape: None,
        }
    }

    pub(crate) fn shaped<T: ?Sized + 'static>(shape: AdapterShape) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            shape: Some(Arc::new(shape)),
        }
    }

    pub(crate) fn with_shape(&self, shape: Arc<AdapterShape>) -> Self {
        Self {
            id: self.id,
            name: self.name,
            shape: Some(shape),
        }
    }

    /// The `TypeId` identifying this service.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Human-readable type name (`std::any::type_name`).
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn shape(&self) -> Option<&Arc<AdapterShape>> {
        self.shape.as_ref()
    }
}

impl PartialEq for TypedService {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        // Name and shape are payload: identity is the TypeId alone
        self.id == other.id
    }
}

impl Eq for TypedService {}

impl Hash for TypedService {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Discriminator distinguishing several keyed registrations of one type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Discriminator {
    /// String key, e.g. `"primary"`.
    Name(Arc<str>),
    /// Numeric key.
    Number(i64),
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discriminator::Name(name) => write!(f, "{:?}", name),
            Discriminator::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for Discriminator {
    fn from(value: &str) -> Self {
        Discriminator::Name(Arc::from(value))
    }
}

impl From<String> for Discriminator {
    fn from(value: String) -> Self {
        Discriminator::Name(Arc::from(value))
    }
}

impl From<i64> for Discriminator {
    fn from(value: i64) -> Self {
        Discriminator::Number(value)
    }
}

impl From<i32> for Discriminator {
    fn from(value: i32) -> Self {
        Discriminator::Number(i64::from(value))
    }
}

/// Key that is equal only to itself (and its copies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniqueService(u64);

static NEXT_UNIQUE: AtomicU64 = AtomicU64::new(1);

impl UniqueService {
    /// Allocates a fresh key distinct from every other `UniqueService`.
    pub fn new() -> Self {
        UniqueService(NEXT_UNIQUE.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for UniqueService {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity used to look up a component.
///
/// The variant set is closed; equality and hashing are variant-specific and
/// two keys of different variants are never equal.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::Service;
///
/// struct Database;
///
/// let plain = Service::typed::<Database>();
/// let primary = Service::keyed::<Database>("primary");
/// let replica = Service::keyed::<Database>("replica");
///
/// assert_ne!(plain, primary);
/// assert_ne!(primary, replica);
/// assert_eq!(primary, Service::keyed::<Database>("primary"));
///
/// let a = Service::unique();
/// assert_eq!(a, a.clone());
/// assert_ne!(a, Service::unique());
///
/// let isolated = Service::isolated("plugins", plain.clone());
/// assert_ne!(isolated, plain);
/// assert_eq!(isolated.to_string(), format!("plugins::{}", plain));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Service {
    /// Service identified by its type.
    Typed(TypedService),
    /// Type plus discriminator.
    Keyed {
        /// The service type.
        service: TypedService,
        /// The discriminator.
        key: Discriminator,
    },
    /// Never equal to any other key instance.
    Unique(UniqueService),
    /// Another key, forced distinct within a bounded context.
    Isolated {
        /// Name of the bounded context.
        context: Arc<str>,
        /// Wrapped key.
        service: Box<Service>,
    },
}

impl Service {
    /// Type-identified key for `T`.
    #[inline]
    pub fn typed<T: ?Sized + 'static>() -> Self {
        Service::Typed(TypedService::of::<T>())
    }

    /// Keyed key for `T`.
    pub fn keyed<T: ?Sized + 'static>(key: impl Into<Discriminator>) -> Self {
        Service::Keyed {
            service: TypedService::of::<T>(),
            key: key.into(),
        }
    }

    /// A fresh always-unique key.
    pub fn unique() -> Self {
        Service::Unique(UniqueService::new())
    }

    /// Wraps `service` so it is a distinct key inside `context`.
    pub fn isolated(context: impl Into<Arc<str>>, service: Service) -> Self {
        Service::Isolated {
            context: context.into(),
            service: Box::new(service),
        }
    }

    /// The type part of this key, if it has one.
    ///
    /// Isolated keys report the type of the key they wrap.
    pub fn typed_service(&self) -> Option<&TypedService> {
        match self {
            Service::Typed(service) => Some(service),
            Service::Keyed { service, .. } => Some(service),
            Service::Unique(_) => None,
            Service::Isolated { service, .. } => service.typed_service(),
        }
    }

    /// The discriminator of a keyed service.
    pub fn discriminator(&self) -> Option<&Discriminator> {
        match self {
            Service::Keyed { key, .. } => Some(key),
            Service::Isolated { service, .. } => service.discriminator(),
            _ => None,
        }
    }

    /// Same key with its type part replaced, keeping discriminator and isolation.
    pub(crate) fn with_type(&self, typed: TypedService) -> Service {
        match self {
            Service::Typed(_) => Service::Typed(typed),
            Service::Keyed { key, .. } => Service::Keyed {
                service: typed,
                key: key.clone(),
            },
            Service::Unique(unique) => Service::Unique(*unique),
            Service::Isolated { context, service } => Service::Isolated {
                context: context.clone(),
                service: Box::new(service.with_type(typed)),
            },
        }
    }

    pub(crate) fn adapter_shape(&self) -> Option<&Arc<AdapterShape>> {
        self.typed_service().and_then(TypedService::shape)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Typed(service) => f.write_str(service.type_name()),
            Service::Keyed { service, key } => write!(f, "{} ({})", service.type_name(), key),
            Service::Unique(UniqueService(id)) => write!(f, "unique#{}", id),
            Service::Isolated { context, service } => write!(f, "{}::{}", context, service),
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service({})", self)
    }
}

impl From<TypedService> for Service {
    fn from(value: TypedService) -> Self {
        Service::Typed(value)
    }
}

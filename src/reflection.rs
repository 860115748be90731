//! Type metadata and the reflection cache.
//!
//! Rust has no runtime reflection, so constructor and property metadata is
//! declared by the component itself through [`Injectable`]. The
//! [`ReflectionCache`] memoizes that metadata, assignability checks and
//! adapter ("generic definition") shapes. Every entry records whether it
//! served registration or resolution, so registration-only entries can be
//! evicted once a container is built.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::adapters::AdapterShape;
use crate::error::{DiError, DiResult};
use crate::internal::FastMap;
use crate::key::{Discriminator, Service, TypedService};
use crate::registration::Instance;

/// Description of one constructor argument.
#[derive(Debug, Clone)]
pub struct ParameterInfo {
    /// Zero-based position.
    pub position: usize,
    /// Argument name.
    pub name: &'static str,
    /// Service resolved when no parameter supplies the argument.
    pub service: Service,
}

/// Values bound to a constructor's arguments, in position order.
pub struct Arguments {
    values: Vec<Instance>,
}

impl Arguments {
    pub(crate) fn new(values: Vec<Instance>) -> Self {
        Self { values }
    }

    /// Typed value of the argument at `position`.
    pub fn get<P: ?Sized + Send + Sync + 'static>(&self, position: usize) -> DiResult<Arc<P>> {
        self.values
            .get(position)
            .ok_or_else(|| DiError::InvalidArgument(format!("no argument at position {position}")))?
            .downcast::<P>()
    }

    /// Number of bound arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no argument is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

type ConstructFn<T> = Arc<dyn Fn(&Arguments) -> DiResult<T> + Send + Sync>;

/// A constructor of `T` together with its argument list.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Constructor, Injectable};
/// use std::sync::Arc;
///
/// struct Clock;
/// struct Scheduler {
///     clock: Arc<Clock>,
/// }
///
/// impl Injectable for Scheduler {
///     fn constructors() -> Vec<Constructor<Self>> {
///         vec![Constructor::new(|args| Ok(Scheduler { clock: args.get(0)? }))
///             .param::<Clock>("clock")]
///     }
/// }
///
/// assert_eq!(Scheduler::constructors()[0].parameters().len(), 1);
/// ```
pub struct Constructor<T> {
    parameters: Vec<ParameterInfo>,
    invoke: ConstructFn<T>,
}

impl<T: 'static> Constructor<T> {
    /// Constructor with no arguments yet.
    pub fn new<F>(invoke: F) -> Self
    where
        F: Fn(&Arguments) -> DiResult<T> + Send + Sync + 'static,
    {
        Self {
            parameters: Vec::new(),
            invoke: Arc::new(invoke),
        }
    }

    /// Appends an argument resolved as service `P`.
    pub fn param<P: ?Sized + 'static>(self, name: &'static str) -> Self {
        self.service_param(name, Service::typed::<P>())
    }

    /// Appends an argument resolved as keyed service `P`.
    pub fn keyed_param<P: ?Sized + 'static>(
        self,
        name: &'static str,
        key: impl Into<Discriminator>,
    ) -> Self {
        self.service_param(name, Service::keyed::<P>(key))
    }

    /// Appends an argument receiving every `P`, bound as `Vec<Arc<P>>`.
    pub fn collection_param<P: ?Sized + Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.service_param(name, Service::collection::<P>())
    }

    /// Appends an argument bound as [`Lazy<P>`](crate::Lazy).
    pub fn lazy_param<P: ?Sized + Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.service_param(name, Service::lazy::<P>())
    }

    /// Appends an argument bound as [`Factory<P>`](crate::Factory).
    pub fn factory_param<P: ?Sized + Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.service_param(name, Service::factory::<P>())
    }

    /// Appends an argument bound as [`Owned<P>`](crate::Owned).
    pub fn owned_param<P: ?Sized + Send + Sync + 'static>(self, name: &'static str) -> Self {
        self.service_param(name, Service::owned::<P>())
    }

    /// Appends an argument resolved as an arbitrary service.
    pub fn service_param(mut self, name: &'static str, service: Service) -> Self {
        let position = self.parameters.len();
        self.parameters.push(ParameterInfo {
            position,
            name,
            service,
        });
        self
    }

    /// Declared arguments.
    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }

    pub(crate) fn invoke(&self, arguments: &Arguments) -> DiResult<T> {
        (self.invoke)(arguments)
    }
}

impl<T> fmt::Debug for Constructor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.parameters.iter().map(|p| p.name))
            .finish()
    }
}

type SetFn<T> = Arc<dyn Fn(&T, Instance) -> DiResult<()> + Send + Sync>;

/// An injectable property of `T`.
///
/// Setters receive `&T`; components use interior mutability for wired
/// properties.
pub struct Property<T> {
    name: &'static str,
    service: Service,
    set: SetFn<T>,
}

impl<T: 'static> Property<T> {
    /// Property receiving service `P`.
    pub fn new<P, F>(name: &'static str, set: F) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        F: Fn(&T, Arc<P>) + Send + Sync + 'static,
    {
        Self {
            name,
            service: Service::typed::<P>(),
            set: Arc::new(move |target: &T, value: Instance| -> DiResult<()> {
                set(target, value.downcast::<P>()?);
                Ok(())
            }),
        }
    }

    /// Property name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Service injected into the property.
    pub fn service(&self) -> &Service {
        &self.service
    }

    pub(crate) fn set(&self, target: &T, value: Instance) -> DiResult<()> {
        (self.set)(target, value)
    }
}

/// Whether and how properties of reflection-activated components are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyWiring {
    /// Properties are left alone.
    #[default]
    None,
    /// Properties are injected during activation.
    Required,
    /// Properties are injected once the outermost resolve completes,
    /// which tolerates property cycles.
    AllowCircular,
}

/// Components the reflection activator can build.
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Candidate constructors.
    fn constructors() -> Vec<Constructor<Self>>;

    /// Injectable properties.
    fn properties() -> Vec<Property<Self>> {
        Vec::new()
    }
}

/// Which phase an entry serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheUsage {
    /// Needed only while registrations are being validated.
    Registration,
    /// Needed while resolving.
    Resolution,
}

/// Member of a type that a cache entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Constructor list.
    Constructors,
    /// Property list.
    Properties,
    /// Whether the type can be exposed as the given service type.
    Assignability(TypeId),
    /// Adapter shape of a generic wrapper type.
    GenericDefinition,
}

/// Key of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    type_id: TypeId,
    type_name: &'static str,
    member: MemberKind,
}

impl CacheKey {
    fn of(service: &TypedService, member: MemberKind) -> Self {
        Self {
            type_id: service.type_id(),
            type_name: service.type_name(),
            member,
        }
    }

    /// Type the entry describes.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Member the entry describes.
    pub fn member(&self) -> MemberKind {
        self.member
    }
}

struct CacheEntry {
    usage: CacheUsage,
    value: Arc<dyn Any + Send + Sync>,
}

/// Memoized type metadata, optionally shared by several containers.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{ReflectionCache, TypedService};
///
/// let cache = ReflectionCache::new();
/// let limit = TypedService::of::<u32>();
/// assert!(cache.is_assignable(&limit, &TypedService::of::<u32>()));
/// assert!(!cache.is_assignable(&limit, &TypedService::of::<u64>()));
///
/// // Assignability only matters while registering
/// assert_eq!(cache.evict_registration_entries(), 2);
/// assert!(cache.is_empty());
/// ```
pub struct ReflectionCache {
    entries: RwLock<FastMap<CacheKey, CacheEntry>>,
    containers: AtomicUsize,
    shared_between_containers: AtomicBool,
}

static SHARED: Lazy<Mutex<Weak<ReflectionCache>>> = Lazy::new(|| Mutex::new(Weak::new()));

impl ReflectionCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FastMap::default()),
            containers: AtomicUsize::new(0),
            shared_between_containers: AtomicBool::new(false),
        }
    }

    /// Process-wide cache.
    ///
    /// The cache lives as long as some container or caller holds it and is
    /// recreated on the next call once every holder has dropped it.
    pub fn shared() -> Arc<Self> {
        let mut slot = SHARED.lock();
        if let Some(cache) = slot.upgrade() {
            return cache;
        }
        let cache = Arc::new(Self::new());
        *slot = Arc::downgrade(&cache);
        cache
    }

    /// Constructor list of `T`.
    pub fn constructors<T: Injectable>(&self) -> Arc<Vec<Constructor<T>>> {
        self.get_or_insert_with(
            CacheKey::of(&TypedService::of::<T>(), MemberKind::Constructors),
            CacheUsage::Resolution,
            T::constructors,
        )
    }

    /// Property list of `T`.
    pub fn properties<T: Injectable>(&self) -> Arc<Vec<Property<T>>> {
        self.get_or_insert_with(
            CacheKey::of(&TypedService::of::<T>(), MemberKind::Properties),
            CacheUsage::Resolution,
            T::properties,
        )
    }

    /// Whether instances of `limit` can be exposed as `service` without a projection.
    pub fn is_assignable(&self, limit: &TypedService, service: &TypedService) -> bool {
        let assignable = self.get_or_insert_with(
            CacheKey::of(limit, MemberKind::Assignability(service.type_id())),
            CacheUsage::Registration,
            || limit.type_id() == service.type_id(),
        );
        *assignable
    }

    /// Adapter shape of a shaped wrapper key, memoized per wrapper type.
    pub(crate) fn generic_definition(&self, service: &TypedService) -> Option<Arc<AdapterShape>> {
        let shape = service.shape()?.clone();
        let memoized = self.get_or_insert_with(
            CacheKey::of(service, MemberKind::GenericDefinition),
            CacheUsage::Resolution,
            move || shape,
        );
        Some((*memoized).clone())
    }

    fn get_or_insert_with<V, F>(&self, key: CacheKey, usage: CacheUsage, compute: F) -> Arc<V>
    where
        V: Any + Send + Sync,
        F: FnOnce() -> V,
    {
        if let Some(value) = self.lookup::<V>(&key) {
            return value;
        }
        // Compute outside the lock; the first writer wins
        let computed = Arc::new(compute());
        let erased: Arc<dyn Any + Send + Sync> = computed.clone();
        let mut entries = self.entries.write();
        let entry = entries.entry(key).or_insert_with(|| CacheEntry {
            usage,
            value: erased.clone(),
        });
        match entry.value.clone().downcast::<V>() {
            Ok(value) => value,
            Err(_) => {
                entry.value = erased;
                entry.usage = usage;
                computed
            }
        }
    }

    fn lookup<V: Any + Send + Sync>(&self, key: &CacheKey) -> Option<Arc<V>> {
        let entries = self.entries.read();
        entries
            .get(key)
            .and_then(|entry| entry.value.clone().downcast::<V>().ok())
    }

    /// Whether an entry exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Whether any entry matches `predicate`.
    pub fn contains_where<P>(&self, predicate: P) -> bool
    where
        P: Fn(&CacheKey, CacheUsage) -> bool,
    {
        self.entries
            .read()
            .iter()
            .any(|(key, entry)| predicate(key, entry.usage))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Drops the entries matching `predicate`; returns how many were dropped.
    pub fn clear_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&CacheKey, CacheUsage) -> bool,
    {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, entry| !predicate(key, entry.usage));
        before - entries.len()
    }

    /// Drops registration-only entries.
    ///
    /// Does nothing while more than one live container uses the cache,
    /// since another container may still be registering.
    pub fn evict_registration_entries(&self) -> usize {
        if self.shared_between_containers.load(Ordering::Acquire) {
            tracing::debug!("reflection cache shared between containers, keeping registration entries");
            return 0;
        }
        let evicted = self.clear_where(|_, usage| usage == CacheUsage::Registration);
        tracing::trace!(evicted, "evicted registration-only reflection entries");
        evicted
    }

    /// Number of live containers using this cache.
    pub fn attached_containers(&self) -> usize {
        self.containers.load(Ordering::Acquire)
    }

    pub(crate) fn attach_container(&self) {
        let previous = self.containers.fetch_add(1, Ordering::AcqRel);
        if previous >= 1 {
            self.shared_between_containers.store(true, Ordering::Release);
        }
    }

    pub(crate) fn detach_container(&self) {
        let detached = self
            .containers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1));
        // Back to a single user: its evictions no longer race another builder
        if let Ok(previous) = detached {
            if previous <= 2 {
                self.shared_between_containers.store(false, Ordering::Release);
            }
        }
    }
}

impl Default for ReflectionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReflectionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectionCache")
            .field("entries", &self.len())
            .field("containers", &self.attached_containers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static CONSTRUCTOR_CALLS: AtomicUsize = AtomicUsize::new(0);

    struct Widget;

    impl Injectable for Widget {
        fn constructors() -> Vec<Constructor<Self>> {
            CONSTRUCTOR_CALLS.fetch_add(1, Ordering::SeqCst);
            vec![Constructor::new(|_| Ok(Widget))]
        }
    }

    #[test]
    fn constructor_metadata_is_memoized() {
        let cache = ReflectionCache::new();
        let before = CONSTRUCTOR_CALLS.load(Ordering::SeqCst);
        let first = cache.constructors::<Widget>();
        let second = cache.constructors::<Widget>();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(CONSTRUCTOR_CALLS.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn eviction_keeps_resolution_entries() {
        let cache = ReflectionCache::new();
        cache.constructors::<Widget>();
        cache.is_assignable(&TypedService::of::<Widget>(), &TypedService::of::<Widget>());
        assert_eq!(cache.len(), 2);

        cache.attach_container();
        assert_eq!(cache.evict_registration_entries(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_suppressed_while_shared() {
        let cache = ReflectionCache::new();
        cache.attach_container();
        cache.attach_container();
        cache.is_assignable(&TypedService::of::<u8>(), &TypedService::of::<u8>());
        assert_eq!(cache.evict_registration_entries(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_resumes_once_back_to_one_container() {
        let cache = ReflectionCache::new();
        cache.attach_container();
        cache.attach_container();
        cache.detach_container();
        assert_eq!(cache.attached_containers(), 1);

        cache.is_assignable(&TypedService::of::<u8>(), &TypedService::of::<u8>());
        assert_eq!(cache.evict_registration_entries(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_where_filters_by_member() {
        let cache = ReflectionCache::new();
        cache.constructors::<Widget>();
        cache.properties::<Widget>();
        let removed = cache.clear_where(|key, _| key.member() == MemberKind::Properties);
        assert_eq!(removed, 1);
        assert!(cache.contains(&CacheKey::of(
            &TypedService::of::<Widget>(),
            MemberKind::Constructors
        )));
    }

    #[test]
    fn detach_never_underflows() {
        let cache = ReflectionCache::new();
        cache.detach_container();
        assert_eq!(cache.attached_containers(), 0);
    }
}

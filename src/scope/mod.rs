//! Lifetime scopes.
//!
//! Scopes form a tree rooted at the container. Each scope owns a table of
//! shared instances and a [`Disposer`] for the instances it is responsible
//! for releasing. Children hold their parent and root weakly; the tree is
//! kept alive by whoever holds scope handles, with the container holding
//! the root.
//!
//! A scope moves through `Active`, `Ending` and `Disposed`. Once it leaves
//! `Active` every operation on it fails with `ObjectDisposed`.

mod shared;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use crate::container::ScopeBuilder;
use crate::config::ContainerOptions;
use crate::disposer::{Disposable, Disposer};
use crate::error::{DiError, DiResult};
use crate::key::Service;
use crate::lifetime::ComponentLifetime;
use crate::observer::Observers;
use crate::parameters::Parameters;
use crate::registration::{ComponentId, Instance};
use crate::registry::ComponentRegistry;
use crate::resolve::{ResolveOperation, ResolveRequest};
use crate::traits::ResolverCore;

pub(crate) use shared::SharedKey;
use shared::SharedInstances;

/// Label of a lifetime scope, matched by tag-matching lifetimes.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::ScopeTag;
///
/// let tag = ScopeTag::from("request");
/// assert_eq!(tag, ScopeTag::Named("request".into()));
/// assert_eq!(tag.to_string(), "request");
/// assert_eq!(ScopeTag::Root.to_string(), "root");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeTag {
    /// The container's own scope.
    Root,
    /// Scope started without a tag; carries the scope id.
    Anonymous(u64),
    /// User-supplied tag.
    Named(Arc<str>),
}

impl fmt::Display for ScopeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeTag::Root => f.write_str("root"),
            ScopeTag::Anonymous(id) => write!(f, "scope-{id}"),
            ScopeTag::Named(name) => f.write_str(name),
        }
    }
}

impl From<&str> for ScopeTag {
    fn from(value: &str) -> Self {
        ScopeTag::Named(Arc::from(value))
    }
}

impl From<String> for ScopeTag {
    fn from(value: String) -> Self {
        ScopeTag::Named(Arc::from(value))
    }
}

impl From<Arc<str>> for ScopeTag {
    fn from(value: Arc<str>) -> Self {
        ScopeTag::Named(value)
    }
}

const ACTIVE: u8 = 0;
const ENDING: u8 = 1;
const DISPOSED: u8 = 2;

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

struct ScopeInner {
    id: u64,
    tag: ScopeTag,
    parent: Option<Weak<ScopeInner>>,
    root: Weak<ScopeInner>,
    registry: Arc<ComponentRegistry>,
    // Child scopes with local registrations own a child registry
    owns_registry: bool,
    shared: SharedInstances,
    disposer: Disposer,
    state: AtomicU8,
    options: Arc<ContainerOptions>,
    observers: Observers,
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        if self.state.load(Ordering::Acquire) != ACTIVE || self.disposer.is_empty() {
            return;
        }
        tracing::warn!(
            scope = %self.tag,
            tracked = self.disposer.len(),
            "lifetime scope dropped without being disposed; releasing tracked instances"
        );
        if let Err(error) = self.disposer.dispose() {
            tracing::warn!(scope = %self.tag, %error, "failed to release instances of dropped scope");
        }
    }
}

/// A node of the lifetime scope tree.
///
/// Handles are cheap to clone and all refer to the same scope. Resolving
/// through a scope starts a new resolve operation rooted at it.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{ContainerBuilder, Registrar, Resolver};
/// use std::sync::Arc;
///
/// struct Logger;
/// struct Handler {
///     logger: Arc<Logger>,
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder.register(|_| Ok(Logger)).single_instance();
/// builder.register(|c| Ok(Handler { logger: c.resolve()? }));
/// let container = builder.build().unwrap();
///
/// let first = container.begin_lifetime_scope().unwrap();
/// let second = container.begin_lifetime_scope().unwrap();
/// let a = first.resolve::<Handler>().unwrap();
/// let b = second.resolve::<Handler>().unwrap();
/// assert!(!Arc::ptr_eq(&a, &b));
/// assert!(Arc::ptr_eq(&a.logger, &b.logger));
/// ```
#[derive(Clone)]
pub struct LifetimeScope {
    inner: Arc<ScopeInner>,
}

/// Non-owning scope handle.
#[derive(Clone)]
pub(crate) struct WeakScope(Weak<ScopeInner>);

impl WeakScope {
    pub(crate) fn upgrade(&self) -> DiResult<LifetimeScope> {
        self.0
            .upgrade()
            .map(|inner| LifetimeScope { inner })
            .ok_or_else(|| DiError::disposed("lifetime scope"))
    }
}

impl LifetimeScope {
    pub(crate) fn new_root(
        registry: Arc<ComponentRegistry>,
        options: Arc<ContainerOptions>,
        observers: Observers,
    ) -> Self {
        let inner = Arc::new_cyclic(|root| ScopeInner {
            id: NEXT_SCOPE.fetch_add(1, Ordering::Relaxed),
            tag: ScopeTag::Root,
            parent: None,
            root: root.clone(),
            registry,
            owns_registry: true,
            shared: SharedInstances::default(),
            disposer: Disposer::new(),
            state: AtomicU8::new(ACTIVE),
            options,
            observers,
        });
        let scope = LifetimeScope { inner };
        scope
            .inner
            .observers
            .each(|observer| observer.scope_beginning(&scope.inner.tag));
        scope
    }

    /// Process-unique scope id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The scope's tag.
    pub fn tag(&self) -> &ScopeTag {
        &self.inner.tag
    }

    /// Whether this is the container's scope.
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// The parent scope, `None` for the root.
    ///
    /// Fails when the parent has already been dropped.
    pub fn parent(&self) -> DiResult<Option<LifetimeScope>> {
        match &self.inner.parent {
            None => Ok(None),
            Some(parent) => parent
                .upgrade()
                .map(|inner| Some(LifetimeScope { inner }))
                .ok_or_else(|| DiError::disposed("parent lifetime scope")),
        }
    }

    /// The root scope of the tree.
    pub fn root(&self) -> DiResult<LifetimeScope> {
        self.inner
            .root
            .upgrade()
            .map(|inner| LifetimeScope { inner })
            .ok_or_else(|| DiError::disposed("root lifetime scope"))
    }

    /// Registry visible from this scope, including scope-local registrations.
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.inner.registry
    }

    /// The scope's disposer.
    pub fn disposer(&self) -> &Disposer {
        &self.inner.disposer
    }

    /// Options of the owning container.
    pub fn options(&self) -> &ContainerOptions {
        &self.inner.options
    }

    pub(crate) fn observers(&self) -> &Observers {
        &self.inner.observers
    }

    pub(crate) fn downgrade(&self) -> WeakScope {
        WeakScope(Arc::downgrade(&self.inner))
    }

    /// Whether both handles refer to the same scope.
    pub fn same_scope(&self, other: &LifetimeScope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether the scope has started or finished disposing.
    pub fn is_disposed(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) != ACTIVE
    }

    pub(crate) fn ensure_active(&self) -> DiResult<()> {
        if self.is_disposed() {
            Err(DiError::disposed(format!("lifetime scope '{}'", self.inner.tag)))
        } else {
            Ok(())
        }
    }

    /// Starts an untagged child scope.
    pub fn begin_lifetime_scope(&self) -> DiResult<LifetimeScope> {
        self.begin_lifetime_scope_with(None, |_| {})
    }

    /// Starts a child scope carrying `tag`.
    pub fn begin_tagged_lifetime_scope(&self, tag: impl Into<ScopeTag>) -> DiResult<LifetimeScope> {
        self.begin_lifetime_scope_with(Some(tag.into()), |_| {})
    }

    /// Starts a child scope, optionally tagged, with its own registrations.
    ///
    /// Registrations added through `configure` are visible to the new scope
    /// and its descendants only. Components marked for auto-activation are
    /// resolved before the scope is returned.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_ioc::{ContainerBuilder, Registrar, Resolver, ScopeTag};
    ///
    /// let container = ContainerBuilder::new().build().unwrap();
    /// let request = container
    ///     .begin_lifetime_scope_with(Some(ScopeTag::from("request")), |scope| {
    ///         scope.register_instance(String::from("GET /health"));
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(&*request.resolve::<String>().unwrap(), "GET /health");
    /// assert!(container.try_resolve::<String>().unwrap().is_none());
    /// ```
    pub fn begin_lifetime_scope_with<F>(&self, tag: Option<ScopeTag>, configure: F) -> DiResult<LifetimeScope>
    where
        F: FnOnce(&mut ScopeBuilder),
    {
        self.ensure_active()?;
        let id = NEXT_SCOPE.fetch_add(1, Ordering::Relaxed);
        let mut builder = ScopeBuilder::new(id);
        configure(&mut builder);

        let (registry, owns_registry, auto_activate) = if builder.is_empty() {
            (self.inner.registry.clone(), false, Vec::new())
        } else {
            let registry = Arc::new(ComponentRegistry::child_of(self.inner.registry.clone()));
            let auto_activate = builder.into_pending().apply(&registry)?;
            (registry, true, auto_activate)
        };

        let tag = tag.unwrap_or(ScopeTag::Anonymous(id));
        let scope = LifetimeScope {
            inner: Arc::new(ScopeInner {
                id,
                tag,
                parent: Some(Arc::downgrade(&self.inner)),
                root: self.inner.root.clone(),
                registry,
                owns_registry,
                shared: SharedInstances::default(),
                disposer: Disposer::new(),
                state: AtomicU8::new(ACTIVE),
                options: self.inner.options.clone(),
                observers: self.inner.observers.clone(),
            }),
        };
        tracing::trace!(scope = %scope.inner.tag, parent = %self.inner.tag, "lifetime scope beginning");
        scope
            .inner
            .observers
            .each(|observer| observer.scope_beginning(&scope.inner.tag));

        for registration in auto_activate {
            let request = ResolveRequest::new(registration.primary_service().clone(), registration);
            scope.resolve_request(&request)?;
        }
        Ok(scope)
    }

    /// The scope owning instances of `lifetime` when resolving from this scope.
    pub fn find_scope(&self, lifetime: &dyn ComponentLifetime) -> DiResult<LifetimeScope> {
        lifetime.find_scope(self)
    }

    /// The shared instance for `(id, qualifier)` in the scope that owns
    /// `lifetime` instances, if created. Reads through to ancestor scopes.
    pub fn try_get_shared_instance(
        &self,
        lifetime: &dyn ComponentLifetime,
        id: ComponentId,
        qualifier: Option<ComponentId>,
    ) -> DiResult<Option<Instance>> {
        let owner = self.find_scope(lifetime)?;
        Ok(owner.inner.shared.get(&(id, qualifier)))
    }

    /// The shared instance for `(id, qualifier)` in the scope that owns
    /// `lifetime` instances, created by `create` on first request.
    ///
    /// Concurrent first requests for one key run `create` once; the others
    /// wait for its result. Requests for other keys are not blocked.
    pub fn create_shared_instance<F>(
        &self,
        lifetime: &dyn ComponentLifetime,
        id: ComponentId,
        qualifier: Option<ComponentId>,
        create: F,
    ) -> DiResult<Instance>
    where
        F: FnOnce() -> DiResult<Instance>,
    {
        let owner = self.find_scope(lifetime)?;
        owner.shared_instance((id, qualifier), || format!("component {id}"), create)
    }

    pub(crate) fn shared_instance<D, F>(&self, key: SharedKey, describe: D, create: F) -> DiResult<Instance>
    where
        D: FnOnce() -> String,
        F: FnOnce() -> DiResult<Instance>,
    {
        self.ensure_active()?;
        self.inner.shared.get_or_create(key, describe, create)
    }

    /// Number of shared instances created in this scope.
    pub fn shared_instance_count(&self) -> usize {
        self.inner.shared.len()
    }

    /// Resolves `request` in a new resolve operation rooted at this scope.
    pub fn resolve_request(&self, request: &ResolveRequest) -> DiResult<Instance> {
        self.ensure_active()?;
        ResolveOperation::execute(self, request)
    }

    fn begin_ending(&self) -> bool {
        self.inner
            .state
            .compare_exchange(ACTIVE, ENDING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn announce_ending(&self) {
        tracing::debug!(
            scope = %self.inner.tag,
            tracked = self.inner.disposer.len(),
            "lifetime scope ending"
        );
        self.inner
            .observers
            .each(|observer| observer.scope_ending(&self.inner.tag));
    }

    fn finish_disposal(&self) {
        self.inner.shared.clear();
        if self.inner.owns_registry {
            self.inner.registry.dispose();
        }
        self.inner.state.store(DISPOSED, Ordering::Release);
    }

    /// Releases every instance this scope owns, most recent first.
    ///
    /// Child scopes are not disposed. The root scope also disposes the
    /// registry. Calling this again is a no-op. Fails with
    /// `AsyncDisposalRequired` when an owned instance only supports async
    /// release; the scope is disposed either way.
    pub fn dispose(&self) -> DiResult<()> {
        if !self.begin_ending() {
            return Ok(());
        }
        self.announce_ending();
        let result = self.inner.disposer.dispose();
        self.finish_disposal();
        result
    }

    /// Releases every instance this scope owns, awaiting async releases.
    pub async fn dispose_async(&self) {
        if !self.begin_ending() {
            return;
        }
        self.announce_ending();
        self.inner.disposer.dispose_async().await;
        self.finish_disposal();
    }
}

impl ResolverCore for LifetimeScope {
    fn resolve_service(&self, service: &Service, parameters: &Parameters) -> DiResult<Option<Instance>> {
        self.ensure_active()?;
        let Some(registration) = self.inner.registry.try_get_registration(service)? else {
            return Ok(None);
        };
        let request = ResolveRequest::new(service.clone(), registration).with_parameters(parameters.clone());
        ResolveOperation::execute(self, &request).map(Some)
    }

    fn is_registered_service(&self, service: &Service) -> bool {
        !self.is_disposed() && self.inner.registry.is_registered(service)
    }

    fn track_disposable(&self, item: Disposable) -> DiResult<()> {
        self.ensure_active()?;
        self.inner.disposer.push(item)
    }
}

impl fmt::Debug for LifetimeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeScope")
            .field("id", &self.inner.id)
            .field("tag", &self.inner.tag)
            .field("disposed", &self.is_disposed())
            .field("tracked", &self.inner.disposer.len())
            .finish()
    }
}

//! Release contracts for owned components.

/// Synchronous release of a component's resources.
///
/// Registrations opt in with `.disposable()`; the owning lifetime scope
/// then calls `dispose` when it ends, in reverse activation order.
///
/// ```
/// use ferrous_ioc::{ContainerBuilder, Dispose, Registrar};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// #[derive(Default)]
/// struct TempDir {
///     removed: AtomicBool,
/// }
///
/// impl Dispose for TempDir {
///     fn dispose(&self) {
///         self.removed.store(true, Ordering::SeqCst);
///     }
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder
///     .register(|_| Ok(TempDir::default()))
///     .instance_per_lifetime_scope()
///     .disposable();
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Releases the resources held by this component. Called at most once.
    fn dispose(&self);
}

/// Asynchronous release of a component's resources.
///
/// Components that only implement this trait are released by
/// `dispose_async`; a synchronous dispose reaching one of them fails with
/// [`DiError::AsyncDisposalRequired`](crate::DiError::AsyncDisposalRequired).
///
/// ```
/// use async_trait::async_trait;
/// use ferrous_ioc::{AsyncDispose, ContainerBuilder, Registrar};
///
/// struct Outbox {
///     pending: usize,
/// }
///
/// #[async_trait]
/// impl AsyncDispose for Outbox {
///     async fn dispose(&self) {
///         // flush self.pending messages
///         let _ = self.pending;
///     }
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder
///     .register(|_| Ok(Outbox { pending: 0 }))
///     .single_instance()
///     .async_disposable();
/// ```
#[async_trait::async_trait]
pub trait AsyncDispose: Send + Sync + 'static {
    /// Releases the resources held by this component. Awaited at most once.
    async fn dispose(&self);
}

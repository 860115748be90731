//! LIFO disposal of tracked instances.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{DiError, DiResult};
use crate::internal::BoxFutureUnit;
use crate::traits::{AsyncDispose, Dispose};

type SyncRelease = Box<dyn FnOnce() + Send>;
type AsyncRelease = Box<dyn FnOnce() -> BoxFutureUnit + Send>;

/// One tracked item and the way it can be released.
///
/// An item may support synchronous release, asynchronous release or both.
pub struct Disposable {
    name: String,
    sync: Option<SyncRelease>,
    asynchronous: Option<AsyncRelease>,
}

impl Disposable {
    /// Item released through [`Dispose`].
    pub fn from_dispose<T: Dispose + ?Sized>(value: Arc<T>) -> Self {
        Self {
            name: std::any::type_name::<T>().to_string(),
            sync: Some(Box::new(move || value.dispose())),
            asynchronous: None,
        }
    }

    /// Item released through [`AsyncDispose`].
    pub fn from_async_dispose<T: AsyncDispose + ?Sized>(value: Arc<T>) -> Self {
        Self {
            name: std::any::type_name::<T>().to_string(),
            sync: None,
            asynchronous: Some(Box::new(move || {
                Box::pin(async move { value.dispose().await })
            })),
        }
    }

    /// Item supporting both release forms; async disposal prefers the async form.
    pub fn from_both<T: Dispose + AsyncDispose + ?Sized>(value: Arc<T>) -> Self {
        let for_async = value.clone();
        Self {
            name: std::any::type_name::<T>().to_string(),
            sync: Some(Box::new(move || Dispose::dispose(&*value))),
            asynchronous: Some(Box::new(move || {
                Box::pin(async move { AsyncDispose::dispose(&*for_async).await })
            })),
        }
    }

    /// Item released by a closure.
    pub fn from_fn(name: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name: name.into(),
            sync: Some(Box::new(release)),
            asynchronous: None,
        }
    }

    /// Diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether synchronous disposal can release this item.
    pub fn supports_sync(&self) -> bool {
        self.sync.is_some()
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("name", &self.name)
            .field("sync", &self.sync.is_some())
            .field("async", &self.asynchronous.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Disposing,
    Disposed,
}

struct DisposerState {
    items: Vec<Disposable>,
    phase: Phase,
}

/// Per-scope stack of items released in reverse insertion order.
///
/// Once disposal starts, further pushes fail. Disposing twice is a no-op.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Disposable, Disposer};
/// use std::sync::{Arc, Mutex};
///
/// let order = Arc::new(Mutex::new(Vec::new()));
/// let disposer = Disposer::new();
/// for name in ["a", "b", "c"] {
///     let order = order.clone();
///     disposer
///         .push(Disposable::from_fn(name, move || order.lock().unwrap().push(name)))
///         .unwrap();
/// }
///
/// disposer.dispose().unwrap();
/// assert_eq!(*order.lock().unwrap(), vec!["c", "b", "a"]);
/// assert!(disposer.push(Disposable::from_fn("late", || {})).is_err());
/// ```
pub struct Disposer {
    state: Mutex<DisposerState>,
}

impl Disposer {
    /// Empty, open disposer.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DisposerState {
                items: Vec::new(),
                phase: Phase::Open,
            }),
        }
    }

    /// Tracks `item`.
    pub fn push(&self, item: Disposable) -> DiResult<()> {
        let mut state = self.state.lock();
        if state.phase != Phase::Open {
            return Err(DiError::disposed(format!(
                "disposer (cannot track {})",
                item.name
            )));
        }
        state.items.push(item);
        Ok(())
    }

    /// Number of tracked items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether disposal has completed.
    pub fn is_disposed(&self) -> bool {
        self.state.lock().phase == Phase::Disposed
    }

    fn begin(&self) -> bool {
        let mut state = self.state.lock();
        if state.phase != Phase::Open {
            return false;
        }
        state.phase = Phase::Disposing;
        true
    }

    fn pop(&self) -> Option<Disposable> {
        self.state.lock().items.pop()
    }

    fn finish(&self) {
        let mut state = self.state.lock();
        state.items.clear();
        state.phase = Phase::Disposed;
    }

    /// Releases every item synchronously, last tracked first.
    ///
    /// Meeting an item that only supports async release stops disposal with
    /// [`DiError::AsyncDisposalRequired`]; the remaining items are dropped
    /// without being released and the disposer counts as disposed.
    pub fn dispose(&self) -> DiResult<()> {
        if !self.begin() {
            return Ok(());
        }
        let mut released = 0usize;
        let result = loop {
            let Some(item) = self.pop() else {
                break Ok(());
            };
            match item.sync {
                Some(release) => {
                    release();
                    released += 1;
                }
                None => break Err(DiError::AsyncDisposalRequired(item.name)),
            }
        };
        self.finish();
        tracing::trace!(released, ok = result.is_ok(), "disposer finished");
        result
    }

    /// Releases every item, awaiting async releases, last tracked first.
    ///
    /// The lock is never held across an await.
    pub async fn dispose_async(&self) {
        if !self.begin() {
            return;
        }
        let mut released = 0usize;
        while let Some(item) = self.pop() {
            match (item.asynchronous, item.sync) {
                (Some(release), _) => release().await,
                (None, Some(release)) => release(),
                (None, None) => {}
            }
            released += 1;
        }
        self.finish();
        tracing::trace!(released, "disposer finished asynchronously");
    }
}

impl Default for Disposer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Disposer")
            .field("items", &state.items.len())
            .field("phase", &state.phase)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counted(Arc<AtomicUsize>);

    impl Dispose for Counted {
        fn dispose(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct AsyncOnly;

    #[async_trait::async_trait]
    impl AsyncDispose for AsyncOnly {
        async fn dispose(&self) {}
    }

    #[test]
    fn second_dispose_is_noop() {
        let count = Arc::new(AtomicUsize::new(0));
        let disposer = Disposer::new();
        disposer
            .push(Disposable::from_dispose(Arc::new(Counted(count.clone()))))
            .unwrap();
        disposer.dispose().unwrap();
        disposer.dispose().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(disposer.is_disposed());
    }

    #[test]
    fn async_only_item_fails_sync_disposal() {
        let count = Arc::new(AtomicUsize::new(0));
        let disposer = Disposer::new();
        disposer
            .push(Disposable::from_dispose(Arc::new(Counted(count.clone()))))
            .unwrap();
        disposer
            .push(Disposable::from_async_dispose(Arc::new(AsyncOnly)))
            .unwrap();

        let result = disposer.dispose();
        assert!(matches!(result, Err(DiError::AsyncDisposalRequired(_))));
        // Remaining items are dropped, not released
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(disposer.is_empty());
        assert!(disposer.is_disposed());
    }

    #[test]
    fn release_cannot_track_more_items() {
        let disposer = Arc::new(Disposer::new());
        let inner = disposer.clone();
        let rejected = Arc::new(AtomicUsize::new(0));
        let flag = rejected.clone();
        disposer
            .push(Disposable::from_fn("reentrant", move || {
                if inner.push(Disposable::from_fn("late", || {})).is_err() {
                    flag.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .unwrap();
        disposer.dispose().unwrap();
        assert_eq!(rejected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn async_disposal_handles_mixed_items() {
        let count = Arc::new(AtomicUsize::new(0));
        let disposer = Disposer::new();
        disposer
            .push(Disposable::from_dispose(Arc::new(Counted(count.clone()))))
            .unwrap();
        disposer
            .push(Disposable::from_async_dispose(Arc::new(AsyncOnly)))
            .unwrap();
        disposer.dispose_async().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(disposer.is_disposed());
    }
}

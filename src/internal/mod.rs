//! Internal implementation details.

#[cfg(feature = "ahash")]
pub(crate) type FastMap<K, V> = ahash::AHashMap<K, V>;
#[cfg(not(feature = "ahash"))]
pub(crate) type FastMap<K, V> = std::collections::HashMap<K, V>;

// Activation stacks rarely exceed a handful of frames
#[cfg(feature = "smallvec")]
pub(crate) type StackVec<T> = smallvec::SmallVec<[T; 16]>;
#[cfg(not(feature = "smallvec"))]
pub(crate) type StackVec<T> = Vec<T>;

use std::future::Future;
use std::pin::Pin;

/// Future type for disposal operations.
pub(crate) type BoxFutureUnit = Pin<Box<dyn Future<Output = ()> + Send>>;

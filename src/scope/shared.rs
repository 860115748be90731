//! Per-scope table of shared instances.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::{DiError, DiResult};
use crate::internal::FastMap;
use crate::registration::{ComponentId, Instance};

/// Component id plus optional qualifier (the outermost decorator, for
/// decorated instances).
pub(crate) type SharedKey = (ComponentId, Option<ComponentId>);

/// At most one instance per key, created under a per-key once-cell.
///
/// Concurrent requests for the same key block until the first creator
/// finishes; a failed creation leaves the key empty so a later request can
/// retry. The table lock is only held to find the cell, never while an
/// instance is being created.
#[derive(Default)]
pub(crate) struct SharedInstances {
    cells: Mutex<FastMap<SharedKey, Arc<OnceCell<Instance>>>>,
    creating: Mutex<FastMap<SharedKey, ThreadId>>,
}

struct Creating<'a> {
    creating: &'a Mutex<FastMap<SharedKey, ThreadId>>,
    key: SharedKey,
}

impl Drop for Creating<'_> {
    fn drop(&mut self) {
        self.creating.lock().remove(&self.key);
    }
}

impl SharedInstances {
    pub(crate) fn get(&self, key: &SharedKey) -> Option<Instance> {
        self.cells.lock().get(key).and_then(|cell| cell.get().cloned())
    }

    pub(crate) fn get_or_create<D, C>(&self, key: SharedKey, describe: D, create: C) -> DiResult<Instance>
    where
        D: FnOnce() -> String,
        C: FnOnce() -> DiResult<Instance>,
    {
        let cell = self
            .cells
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        if let Some(instance) = cell.get() {
            return Ok(instance.clone());
        }

        // Re-entering the cell from the thread that is initializing it would deadlock
        let current = thread::current().id();
        if self.creating.lock().get(&key) == Some(&current) {
            let component = describe();
            return Err(DiError::CircularDependency {
                chain: vec![component.clone(), component],
            });
        }

        cell.get_or_try_init(|| {
            self.creating.lock().insert(key, current);
            let _creating = Creating {
                creating: &self.creating,
                key,
            };
            create()
        })
        .cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.cells
            .lock()
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    pub(crate) fn clear(&self) {
        // Drop instances outside the lock
        let cells = std::mem::take(&mut *self.cells.lock());
        drop(cells);
    }
}

//! Per-service registration lists and default selection.

use std::sync::Arc;

use crate::registration::{ComponentId, ComponentRegistration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Provenance {
    Explicit { preserve_defaults: bool },
    Source { adapter: bool },
}

struct Entry {
    registration: Arc<ComponentRegistration>,
    provenance: Provenance,
}

/// Registrations of one service in the order they were added.
///
/// Default rules: a composite always wins; otherwise the last explicit
/// registration that did not preserve defaults; otherwise the first
/// explicit one that did; otherwise a source-supplied registration.
#[derive(Default)]
pub(super) struct ServiceEntry {
    entries: Vec<Entry>,
    sources_queried: bool,
    // Whether the sources saw the key with its adapter shape attached
    queried_with_shape: bool,
    skipped_sources: Vec<usize>,
    preferred_adapter: Option<ComponentId>,
}

impl ServiceEntry {
    pub(super) fn push(&mut self, registration: Arc<ComponentRegistration>, provenance: Provenance) {
        self.entries.push(Entry {
            registration,
            provenance,
        });
    }

    pub(super) fn registrations(&self) -> impl Iterator<Item = &Arc<ComponentRegistration>> {
        self.entries.iter().map(|entry| &entry.registration)
    }

    /// Registrations a child registry inherits: everything but adapters.
    pub(super) fn inheritable_registrations(&self) -> impl Iterator<Item = &Arc<ComponentRegistration>> {
        self.entries
            .iter()
            .filter(|entry| entry.provenance != Provenance::Source { adapter: true })
            .map(|entry| &entry.registration)
    }

    pub(super) fn explicit_default(&self) -> Option<&Arc<ComponentRegistration>> {
        let mut explicit = self
            .entries
            .iter()
            .filter(|entry| matches!(entry.provenance, Provenance::Explicit { .. }));
        if let Some(composite) = explicit
            .clone()
            .find(|entry| entry.registration.options().is_composite)
        {
            return Some(&composite.registration);
        }
        explicit
            .clone()
            .rev()
            .find(|entry| entry.provenance == Provenance::Explicit { preserve_defaults: false })
            .or_else(|| {
                explicit.find(|entry| entry.provenance == Provenance::Explicit { preserve_defaults: true })
            })
            .map(|entry| &entry.registration)
    }

    /// Default among source-supplied registrations.
    ///
    /// For adapters this is the one wrapping the element service's default,
    /// otherwise the last one supplied.
    pub(super) fn source_default(&self, include_adapters: bool) -> Option<&Arc<ComponentRegistration>> {
        let candidates = || {
            self.entries.iter().filter(move |entry| match entry.provenance {
                Provenance::Source { adapter } => include_adapters || !adapter,
                Provenance::Explicit { .. } => false,
            })
        };
        if let Some(preferred) = self.preferred_adapter {
            if let Some(entry) = candidates().find(|entry| entry.registration.id() == preferred) {
                return Some(&entry.registration);
            }
        }
        candidates().last().map(|entry| &entry.registration)
    }

    /// Whether sources have answered a lookup of this key. A lookup that
    /// knows the adapter shape is not answered by one that did not.
    pub(super) fn sources_queried(&self, shaped: bool) -> bool {
        self.sources_queried && (self.queried_with_shape || !shaped)
    }

    pub(super) fn mark_queried(&mut self, shaped: bool, preferred_adapter: Option<ComponentId>) {
        self.sources_queried = true;
        self.queried_with_shape |= shaped;
        if preferred_adapter.is_some() {
            self.preferred_adapter = preferred_adapter;
        }
    }

    pub(super) fn skipped_sources(&self) -> Vec<usize> {
        self.skipped_sources.clone()
    }

    pub(super) fn skip_source(&mut self, index: usize) {
        if !self.skipped_sources.contains(&index) {
            self.skipped_sources.push(index);
        }
    }
}

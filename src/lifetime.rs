//! Lifetime policies, sharing and ownership.
//!
//! A lifetime policy is a strategy object: given the most-nested scope that
//! is currently resolving, it names the scope that owns the instance. The
//! sharing mode then decides whether that scope caches the instance.

use std::fmt;
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::scope::{LifetimeScope, ScopeTag};

/// Strategy selecting the scope that owns a component's instances.
pub trait ComponentLifetime: Send + Sync + fmt::Debug {
    /// Returns the owning scope for an activation requested from `most_nested`.
    fn find_scope(&self, most_nested: &LifetimeScope) -> DiResult<LifetimeScope>;
}

/// Instances belong to the scope in which they are requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentScopeLifetime;

impl ComponentLifetime for CurrentScopeLifetime {
    fn find_scope(&self, most_nested: &LifetimeScope) -> DiResult<LifetimeScope> {
        Ok(most_nested.clone())
    }
}

/// Instances belong to the root scope (the container).
#[derive(Debug, Clone, Copy, Default)]
pub struct RootScopeLifetime;

impl ComponentLifetime for RootScopeLifetime {
    fn find_scope(&self, most_nested: &LifetimeScope) -> DiResult<LifetimeScope> {
        most_nested.root()
    }
}

/// Instances belong to the nearest ancestor whose tag is in a target set.
#[derive(Debug, Clone)]
pub struct MatchingScopeLifetime {
    tags: Vec<ScopeTag>,
}

impl MatchingScopeLifetime {
    /// Matches any of `tags`.
    pub fn new<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ScopeTag>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// The tags this policy matches.
    pub fn tags(&self) -> &[ScopeTag] {
        &self.tags
    }
}

impl ComponentLifetime for MatchingScopeLifetime {
    fn find_scope(&self, most_nested: &LifetimeScope) -> DiResult<LifetimeScope> {
        let mut current = Some(most_nested.clone());
        while let Some(scope) = current {
            if self.tags.iter().any(|tag| tag == scope.tag()) {
                return Ok(scope);
            }
            current = scope.parent()?;
        }
        Err(DiError::NoMatchingScope {
            tags: self
                .tags
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Instances belong to the scope whose builder declared the registration.
///
/// Used for `single_instance` registrations added while configuring a
/// child scope.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeclaringScopeLifetime {
    scope_id: u64,
}

impl DeclaringScopeLifetime {
    pub(crate) fn new(scope_id: u64) -> Self {
        Self { scope_id }
    }
}

impl ComponentLifetime for DeclaringScopeLifetime {
    fn find_scope(&self, most_nested: &LifetimeScope) -> DiResult<LifetimeScope> {
        let mut current = Some(most_nested.clone());
        while let Some(scope) = current {
            if scope.id() == self.scope_id {
                return Ok(scope);
            }
            current = scope.parent()?;
        }
        Err(DiError::NoMatchingScope {
            tags: format!("scope-{}", self.scope_id),
        })
    }
}

/// Whether a registration yields one instance per owning scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstanceSharing {
    /// A fresh instance per request.
    #[default]
    None,
    /// One instance per owning scope.
    Shared,
}

/// Whether the container disposes produced instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstanceOwnership {
    /// The owning scope's disposer releases the instance.
    #[default]
    OwnedByScope,
    /// The caller is responsible for releasing the instance.
    ExternallyOwned,
}

/// Common policy/sharing combinations.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Lifetime, InstanceSharing};
///
/// let (_policy, sharing) = Lifetime::Singleton.into_parts();
/// assert_eq!(sharing, InstanceSharing::Shared);
///
/// let (_policy, sharing) = Lifetime::Transient.into_parts();
/// assert_eq!(sharing, InstanceSharing::None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifetime {
    /// One instance for the container, owned by the root scope.
    Singleton,
    /// One instance per lifetime scope.
    Scoped,
    /// A new instance per request, owned by the requesting scope.
    Transient,
    /// One instance per nearest ancestor scope carrying one of these tags.
    Matching(Vec<ScopeTag>),
}

impl Lifetime {
    /// Splits into the policy strategy and the sharing mode.
    pub fn into_parts(self) -> (Arc<dyn ComponentLifetime>, InstanceSharing) {
        match self {
            Lifetime::Singleton => (Arc::new(RootScopeLifetime), InstanceSharing::Shared),
            Lifetime::Scoped => (Arc::new(CurrentScopeLifetime), InstanceSharing::Shared),
            Lifetime::Transient => (Arc::new(CurrentScopeLifetime), InstanceSharing::None),
            Lifetime::Matching(tags) => {
                (Arc::new(MatchingScopeLifetime::new(tags)), InstanceSharing::Shared)
            }
        }
    }
}

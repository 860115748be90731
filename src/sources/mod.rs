//! Registration sources: providers of registrations on demand.
//!
//! The registry asks its sources for registrations the first time a
//! service is requested, and remembers the answer.

mod collection;
mod implicit;

use std::sync::Arc;

use crate::key::Service;
use crate::registration::ComponentRegistration;

pub use collection::CollectionSource;
pub use implicit::{FactorySource, LazySource, OwnedSource};

/// Looks up the registrations currently known for a service.
pub type RegistrationAccessor<'a> = &'a dyn Fn(&Service) -> Vec<Arc<ComponentRegistration>>;

/// Supplies registrations for services nobody registered explicitly.
pub trait RegistrationSource: Send + Sync {
    /// Registrations providing `service`; may use `accessor` to inspect others.
    fn registrations_for(
        &self,
        service: &Service,
        accessor: RegistrationAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>>;

    /// Whether every supplied registration adapts one existing registration.
    ///
    /// Adapter sources are re-run by child registries so adapters see the
    /// child's own registrations.
    fn is_adapter_for_individual_components(&self) -> bool {
        false
    }

    /// Diagnostic name.
    fn description(&self) -> &str;
}

use std::sync::Arc;

use crate::activators::Activator;
use crate::adapters::{AdapterShape, AssembleFn};
use crate::error::DiResult;
use crate::key::{Service, TypedService};
use crate::lifetime::InstanceOwnership;
use crate::parameters::Parameters;
use crate::registration::{ComponentRegistration, ExposedService, Instance, RegistrationData};
use crate::resolve::ResolveContext;

use super::{RegistrationAccessor, RegistrationSource};

/// Provides `Vec<Arc<T>>` for every `T`, empty when `T` has no registrations.
#[derive(Debug, Default)]
pub struct CollectionSource;

impl RegistrationSource for CollectionSource {
    fn registrations_for(
        &self,
        service: &Service,
        _accessor: RegistrationAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let Some(shape) = service.adapter_shape() else {
            return Vec::new();
        };
        let AdapterShape::Collection { element, assemble } = &**shape else {
            return Vec::new();
        };
        let activator = CollectionActivator {
            limit: service.typed_service().cloned().unwrap_or_else(|| element.clone()),
            element: service.with_type(element.clone()),
            assemble: *assemble,
        };
        let mut data = RegistrationData::new(Arc::new(activator));
        data.services.push(ExposedService::new(service.clone()));
        data.ownership = InstanceOwnership::ExternallyOwned;
        vec![Arc::new(ComponentRegistration::new(data))]
    }

    fn description(&self) -> &str {
        "collection support"
    }
}

struct CollectionActivator {
    limit: TypedService,
    element: Service,
    assemble: AssembleFn,
}

impl Activator for CollectionActivator {
    fn limit_type(&self) -> TypedService {
        self.limit.clone()
    }

    fn activate(&self, context: &ResolveContext<'_>, _parameters: &Parameters) -> DiResult<Instance> {
        let mut items = Vec::new();
        for registration in context.registrations_for(&self.element)? {
            // Composites aggregate the other elements and are never an element themselves
            if registration.options().is_composite {
                continue;
            }
            items.push(context.resolve_registration(&self.element, &registration, &Parameters::new())?);
        }
        (self.assemble)(items)
    }
}

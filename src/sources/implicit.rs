use std::sync::Arc;

use crate::activators::Activator;
use crate::adapters::{AdapterCore, AdapterShape, OwnFn, WrapFn};
use crate::error::DiResult;
use crate::key::{Service, TypedService};
use crate::lifetime::InstanceOwnership;
use crate::parameters::Parameters;
use crate::registration::{ComponentRegistration, ExposedService, Instance, RegistrationData};
use crate::resolve::ResolveContext;

use super::{RegistrationAccessor, RegistrationSource};

/// One adapter registration per registration of the element service.
fn adapt_each(
    service: &Service,
    element: &TypedService,
    accessor: RegistrationAccessor<'_>,
    activator: impl Fn(Service, Arc<ComponentRegistration>) -> Arc<dyn Activator>,
) -> Vec<Arc<ComponentRegistration>> {
    let element = service.with_type(element.clone());
    accessor(&element)
        .into_iter()
        .map(|target| {
            let mut data = RegistrationData::new(activator(element.clone(), target.clone()));
            data.services.push(ExposedService::new(service.clone()));
            data.ownership = InstanceOwnership::ExternallyOwned;
            data.target = Some(target);
            Arc::new(ComponentRegistration::new(data))
        })
        .collect()
}

fn limit_of(service: &Service) -> TypedService {
    service
        .typed_service()
        .cloned()
        .unwrap_or_else(TypedService::of::<()>)
}

/// Provides `Lazy<T>` for every registration of `T`.
#[derive(Debug, Default)]
pub struct LazySource;

impl RegistrationSource for LazySource {
    fn registrations_for(
        &self,
        service: &Service,
        accessor: RegistrationAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let Some(shape) = service.adapter_shape() else {
            return Vec::new();
        };
        let AdapterShape::Lazy { element, wrap } = &**shape else {
            return Vec::new();
        };
        let limit = limit_of(service);
        adapt_each(service, element, accessor, |element, target| {
            Arc::new(WrappingActivator {
                limit: limit.clone(),
                element,
                target,
                wrap: *wrap,
            })
        })
    }

    fn is_adapter_for_individual_components(&self) -> bool {
        true
    }

    fn description(&self) -> &str {
        "lazy support"
    }
}

/// Provides `Factory<T>` for every registration of `T`.
#[derive(Debug, Default)]
pub struct FactorySource;

impl RegistrationSource for FactorySource {
    fn registrations_for(
        &self,
        service: &Service,
        accessor: RegistrationAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let Some(shape) = service.adapter_shape() else {
            return Vec::new();
        };
        let AdapterShape::Factory { element, wrap } = &**shape else {
            return Vec::new();
        };
        let limit = limit_of(service);
        adapt_each(service, element, accessor, |element, target| {
            Arc::new(WrappingActivator {
                limit: limit.clone(),
                element,
                target,
                wrap: *wrap,
            })
        })
    }

    fn is_adapter_for_individual_components(&self) -> bool {
        true
    }

    fn description(&self) -> &str {
        "factory support"
    }
}

/// Provides `Owned<T>` for every registration of `T`.
#[derive(Debug, Default)]
pub struct OwnedSource;

impl RegistrationSource for OwnedSource {
    fn registrations_for(
        &self,
        service: &Service,
        accessor: RegistrationAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>> {
        let Some(shape) = service.adapter_shape() else {
            return Vec::new();
        };
        let AdapterShape::Owned { element, wrap } = &**shape else {
            return Vec::new();
        };
        let limit = limit_of(service);
        adapt_each(service, element, accessor, |element, target| {
            Arc::new(OwnedActivator {
                limit: limit.clone(),
                element,
                target,
                wrap: *wrap,
            })
        })
    }

    fn is_adapter_for_individual_components(&self) -> bool {
        true
    }

    fn description(&self) -> &str {
        "owned instance support"
    }
}

/// Builds a `Lazy<T>` or `Factory<T>` bound to the requesting scope.
struct WrappingActivator {
    limit: TypedService,
    element: Service,
    target: Arc<ComponentRegistration>,
    wrap: WrapFn,
}

impl Activator for WrappingActivator {
    fn limit_type(&self) -> TypedService {
        self.limit.clone()
    }

    fn activate(&self, context: &ResolveContext<'_>, _parameters: &Parameters) -> DiResult<Instance> {
        Ok((self.wrap)(AdapterCore::new(
            context.scope(),
            self.element.clone(),
            self.target.clone(),
        )))
    }
}

struct OwnedActivator {
    limit: TypedService,
    element: Service,
    target: Arc<ComponentRegistration>,
    wrap: OwnFn,
}

impl Activator for OwnedActivator {
    fn limit_type(&self) -> TypedService {
        self.limit.clone()
    }

    fn activate(&self, context: &ResolveContext<'_>, parameters: &Parameters) -> DiResult<Instance> {
        let child = context.scope().begin_lifetime_scope()?;
        let result = context
            .resolve_registration_in(&child, &self.element, &self.target, parameters)
            .and_then(|instance| (self.wrap)(child.clone(), instance));
        if result.is_err() {
            if let Err(error) = child.dispose() {
                tracing::warn!(%error, "failed to release owned scope after activation error");
            }
        }
        result
    }
}

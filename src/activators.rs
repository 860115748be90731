//! Activators: the terminal step that produces a raw instance.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::key::{Service, TypedService};
use crate::parameters::Parameters;
use crate::reflection::{
    Arguments, Constructor, Injectable, ParameterInfo, Property, PropertyWiring, ReflectionCache,
};
use crate::registration::Instance;
use crate::resolve::ResolveContext;
use crate::traits::ResolverCore;

/// Produces raw component instances.
pub trait Activator: Send + Sync {
    /// Concrete type of the produced instances.
    fn limit_type(&self) -> TypedService;

    /// Builds one instance. Nested dependencies are resolved through `context`.
    fn activate(&self, context: &ResolveContext<'_>, parameters: &Parameters) -> DiResult<Instance>;
}

/// Always returns the same pre-built instance.
pub struct InstanceActivator {
    limit: TypedService,
    instance: Instance,
}

impl InstanceActivator {
    /// Activator for `value`.
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            limit: TypedService::of::<T>(),
            instance: Instance::new(value),
        }
    }
}

impl Activator for InstanceActivator {
    fn limit_type(&self) -> TypedService {
        self.limit.clone()
    }

    fn activate(&self, _context: &ResolveContext<'_>, _parameters: &Parameters) -> DiResult<Instance> {
        Ok(self.instance.clone())
    }
}

type DelegateFn = Arc<dyn Fn(&ResolveContext<'_>, &Parameters) -> DiResult<Instance> + Send + Sync>;

/// Invokes a user factory.
pub struct DelegateActivator {
    limit: TypedService,
    factory: DelegateFn,
}

impl DelegateActivator {
    /// Activator for an already type-erased factory.
    pub fn new(limit: TypedService, factory: DelegateFn) -> Self {
        Self { limit, factory }
    }

    /// Activator for a factory producing `T` by value.
    pub fn of<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveContext<'_>, &Parameters) -> DiResult<T> + Send + Sync + 'static,
    {
        Self {
            limit: TypedService::of::<T>(),
            factory: Arc::new(move |context: &ResolveContext<'_>, parameters: &Parameters| {
                factory(context, parameters).map(|value| Instance::new(Arc::new(value)))
            }),
        }
    }

    /// Activator for a factory producing `Arc<T>`, including trait objects.
    pub fn of_arc<T, F>(factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ResolveContext<'_>, &Parameters) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            limit: TypedService::of::<T>(),
            factory: Arc::new(move |context: &ResolveContext<'_>, parameters: &Parameters| {
                factory(context, parameters).map(Instance::new)
            }),
        }
    }
}

impl Activator for DelegateActivator {
    fn limit_type(&self) -> TypedService {
        self.limit.clone()
    }

    fn activate(&self, context: &ResolveContext<'_>, parameters: &Parameters) -> DiResult<Instance> {
        (self.factory)(context, parameters)
    }
}

enum Binding {
    Supplied(Instance),
    Resolve(Service),
}

/// Builds `T` from its declared constructors.
///
/// Picks the constructor with the most bindable arguments. An argument is
/// bindable when a parameter supplies it or its service is registered.
/// Constructor and property metadata is read through the reflection cache
/// of the registry doing the resolving.
pub struct ReflectionActivator<T> {
    wiring: PropertyWiring,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Injectable> Default for ReflectionActivator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Injectable> ReflectionActivator<T> {
    /// Activator without property injection.
    pub fn new() -> Self {
        Self {
            wiring: PropertyWiring::None,
            _marker: PhantomData,
        }
    }

    /// Enables property injection.
    pub fn with_property_wiring(mut self, wiring: PropertyWiring) -> Self {
        self.wiring = wiring;
        self
    }

    fn select<'c>(
        &self,
        constructors: &'c [Constructor<T>],
        context: &ResolveContext<'_>,
        parameters: &Parameters,
    ) -> DiResult<(&'c Constructor<T>, Vec<Binding>)> {
        let mut best: Vec<(&'c Constructor<T>, Vec<Binding>)> = Vec::new();
        let mut unbindable = Vec::new();

        for constructor in constructors {
            match bind(constructor.parameters(), context, parameters) {
                Ok(bindings) => {
                    let arity = bindings.len();
                    match best.first().map(|(c, _)| c.parameters().len()) {
                        Some(current) if arity < current => {}
                        Some(current) if arity == current => best.push((constructor, bindings)),
                        _ => best = vec![(constructor, bindings)],
                    }
                }
                Err(missing) => unbindable.push(format!("({})", missing.join(", "))),
            }
        }

        match best.len() {
            0 => Err(DiError::NoBindableConstructor {
                component: std::any::type_name::<T>().to_string(),
                details: if unbindable.is_empty() {
                    "no constructors declared".to_string()
                } else {
                    format!("cannot resolve parameters {}", unbindable.join(" or "))
                },
            }),
            1 => Ok(best.remove(0)),
            n => Err(DiError::Configuration(format!(
                "{n} constructors of {} with {} parameters are equally bindable",
                std::any::type_name::<T>(),
                best[0].0.parameters().len()
            ))),
        }
    }
}

fn bind(
    infos: &[ParameterInfo],
    context: &ResolveContext<'_>,
    parameters: &Parameters,
) -> Result<Vec<Binding>, Vec<&'static str>> {
    let mut bindings = Vec::with_capacity(infos.len());
    let mut missing = Vec::new();
    for info in infos {
        if let Some(value) = parameters.find(info) {
            bindings.push(Binding::Supplied(value.clone()));
        } else if context.is_registered_service(&info.service) {
            bindings.push(Binding::Resolve(info.service.clone()));
        } else {
            missing.push(info.name);
        }
    }
    if missing.is_empty() {
        Ok(bindings)
    } else {
        Err(missing)
    }
}

fn inject_properties<T: 'static>(
    context: &ResolveContext<'_>,
    target: &T,
    properties: &[Property<T>],
) -> DiResult<()> {
    for property in properties {
        // Unregistered properties stay untouched
        if let Some(value) = context.resolve_instance(property.service())? {
            property.set(target, value)?;
        }
    }
    Ok(())
}

impl<T: Injectable> Activator for ReflectionActivator<T> {
    fn limit_type(&self) -> TypedService {
        TypedService::of::<T>()
    }

    fn activate(&self, context: &ResolveContext<'_>, parameters: &Parameters) -> DiResult<Instance> {
        let cache: &ReflectionCache = context.scope().registry().reflection_cache();
        let constructors = cache.constructors::<T>();
        let (constructor, bindings) = self.select(&constructors, context, parameters)?;

        let mut values = Vec::with_capacity(bindings.len());
        for binding in bindings {
            match binding {
                Binding::Supplied(value) => values.push(value),
                Binding::Resolve(service) => values.push(
                    context
                        .resolve_instance(&service)?
                        .ok_or_else(|| DiError::not_registered(&service))?,
                ),
            }
        }
        let instance = Arc::new(constructor.invoke(&Arguments::new(values))?);

        match self.wiring {
            PropertyWiring::None => {}
            PropertyWiring::Required => {
                let properties = cache.properties::<T>();
                inject_properties(context, &*instance, &properties)?;
            }
            PropertyWiring::AllowCircular => {
                let properties = cache.properties::<T>();
                let target = instance.clone();
                context.defer(move |context| inject_properties(context, &*target, &properties));
            }
        }

        Ok(Instance::new(instance))
    }
}

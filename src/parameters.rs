//! Resolve-time parameters.
//!
//! Parameters supplied to a resolve call take precedence over the
//! container when a constructor argument is bound.

use std::sync::Arc;

use crate::key::{Service, TypedService};
use crate::reflection::ParameterInfo;
use crate::registration::Instance;

/// A single argument supplied at resolve time.
#[derive(Debug, Clone)]
pub enum Parameter {
    /// Binds the constructor argument at a position.
    Positional(usize, Instance),
    /// Binds the constructor argument with a name.
    Named(Arc<str>, Instance),
    /// Binds any constructor argument of a type.
    Typed(TypedService, Instance),
}

impl Parameter {
    /// Positional parameter.
    pub fn positional<T: ?Sized + Send + Sync + 'static>(position: usize, value: Arc<T>) -> Self {
        Parameter::Positional(position, Instance::new(value))
    }

    /// Named parameter.
    pub fn named<T: ?Sized + Send + Sync + 'static>(name: impl Into<Arc<str>>, value: Arc<T>) -> Self {
        Parameter::Named(name.into(), Instance::new(value))
    }

    /// Typed parameter, matching arguments whose service type is `T`.
    pub fn typed<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Parameter::Typed(TypedService::of::<T>(), Instance::new(value))
    }

    /// The supplied value.
    pub fn value(&self) -> &Instance {
        match self {
            Parameter::Positional(_, value)
            | Parameter::Named(_, value)
            | Parameter::Typed(_, value) => value,
        }
    }

    fn matches(&self, info: &ParameterInfo) -> bool {
        match self {
            Parameter::Positional(position, _) => *position == info.position,
            Parameter::Named(name, _) => &**name == info.name,
            Parameter::Typed(typed, _) => match &info.service {
                Service::Typed(service) => service == typed,
                _ => false,
            },
        }
    }
}

/// Ordered list of parameters for one resolve call.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Parameter, Parameters};
/// use std::sync::Arc;
///
/// let parameters = Parameters::new()
///     .with(Parameter::named("port", Arc::new(8080u16)))
///     .with(Parameter::typed(Arc::new(String::from("localhost"))));
///
/// assert_eq!(parameters.len(), 2);
/// assert_eq!(*parameters.named::<u16>("port").unwrap(), 8080);
/// assert_eq!(&*parameters.typed::<String>().unwrap(), "localhost");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    items: Vec<Parameter>,
}

impl Parameters {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `parameter`, builder style.
    pub fn with(mut self, parameter: Parameter) -> Self {
        self.items.push(parameter);
        self
    }

    /// Appends `parameter`.
    pub fn push(&mut self, parameter: Parameter) {
        self.items.push(parameter);
    }

    /// Replaces every parameter that binds the same slot as `parameter`.
    pub fn replace(&mut self, parameter: Parameter) {
        self.items.retain(|existing| !same_slot(existing, &parameter));
        self.items.push(parameter);
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.items.iter()
    }

    /// Value for a named parameter.
    pub fn named<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.items.iter().find_map(|parameter| match parameter {
            Parameter::Named(n, value) if &**n == name => value.try_downcast::<T>(),
            _ => None,
        })
    }

    /// Value for a typed parameter of type `T`.
    pub fn typed<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let wanted = TypedService::of::<T>();
        self.items.iter().find_map(|parameter| match parameter {
            Parameter::Typed(typed, value) if *typed == wanted => value.try_downcast::<T>(),
            _ => None,
        })
    }

    /// Value for a positional parameter.
    pub fn positional<T: ?Sized + Send + Sync + 'static>(&self, position: usize) -> Option<Arc<T>> {
        self.items.iter().find_map(|parameter| match parameter {
            Parameter::Positional(p, value) if *p == position => value.try_downcast::<T>(),
            _ => None,
        })
    }

    /// Supplied value for a constructor argument, if any; last match wins.
    pub(crate) fn find(&self, info: &ParameterInfo) -> Option<&Instance> {
        self.items
            .iter()
            .rev()
            .find(|parameter| parameter.matches(info))
            .map(Parameter::value)
    }
}

impl FromIterator<Parameter> for Parameters {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

fn same_slot(a: &Parameter, b: &Parameter) -> bool {
    match (a, b) {
        (Parameter::Positional(x, _), Parameter::Positional(y, _)) => x == y,
        (Parameter::Named(x, _), Parameter::Named(y, _)) => x == y,
        (Parameter::Typed(x, _), Parameter::Typed(y, _)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(position: usize, name: &'static str, service: Service) -> ParameterInfo {
        ParameterInfo {
            position,
            name,
            service,
        }
    }

    #[test]
    fn find_matches_each_kind() {
        let parameters = Parameters::new()
            .with(Parameter::positional(0, Arc::new(1u8)))
            .with(Parameter::named("timeout", Arc::new(30u32)))
            .with(Parameter::typed(Arc::new(String::from("db"))));

        assert!(parameters.find(&info(0, "first", Service::typed::<u8>())).is_some());
        assert!(parameters.find(&info(3, "timeout", Service::typed::<u32>())).is_some());
        assert!(parameters.find(&info(5, "name", Service::typed::<String>())).is_some());
        assert!(parameters.find(&info(6, "other", Service::typed::<u64>())).is_none());
    }

    #[test]
    fn typed_parameters_do_not_bind_keyed_arguments() {
        let parameters = Parameters::new().with(Parameter::typed(Arc::new(String::from("db"))));
        let keyed = info(0, "name", Service::keyed::<String>("primary"));
        assert!(parameters.find(&keyed).is_none());
    }

    #[test]
    fn replace_overrides_same_slot() {
        let mut parameters = Parameters::new().with(Parameter::named("port", Arc::new(1u16)));
        parameters.replace(Parameter::named("port", Arc::new(2u16)));
        assert_eq!(parameters.len(), 1);
        assert_eq!(*parameters.named::<u16>("port").unwrap(), 2);
    }
}

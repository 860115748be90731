//! Error types for the resolution engine.

use thiserror::Error;

/// Boxed error produced by activators and user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Resolution and lifecycle errors.
///
/// Every variant except [`DiError::Activator`] is a *resolution failure*:
/// it propagates through enclosing activations unchanged. A raw
/// `Activator` error is wrapped exactly once, at the innermost component
/// boundary, into [`DiError::ActivationFailure`].
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{ContainerBuilder, DiError, Resolver};
///
/// let container = ContainerBuilder::new().build().unwrap();
/// match container.resolve::<String>() {
///     Err(DiError::NotRegistered { service }) => {
///         assert_eq!(service, "alloc::string::String");
///     }
///     _ => unreachable!(),
/// }
///
/// let circular = DiError::CircularDependency {
///     chain: vec!["A".into(), "B".into(), "A".into()],
/// };
/// assert_eq!(circular.to_string(), "Circular component dependency detected: A -> B -> A");
/// ```
#[derive(Debug, Error)]
pub enum DiError {
    /// No registration or source can satisfy the requested service.
    #[error("The requested service '{service}' has not been registered")]
    NotRegistered {
        /// Description of the requested service.
        service: String,
    },

    /// A component is already mid-activation in this operation.
    #[error("Circular component dependency detected: {}", .chain.join(" -> "))]
    CircularDependency {
        /// Component chain in cycle order, ending with the repeated component.
        chain: Vec<String>,
    },

    /// Recursion guard used when proactive cycle detection is switched off.
    #[error("Maximum resolve depth {0} exceeded")]
    DepthExceeded(usize),

    /// Operation on a scope, registry or disposer that has been torn down.
    #[error("Cannot access a disposed object: {0}")]
    ObjectDisposed(String),

    /// The activator of a component failed.
    #[error("An error occurred while activating {component} (path: {}): {source}", .path.join(" -> "))]
    ActivationFailure {
        /// Component whose activator failed.
        component: String,
        /// Activation path leading to the component.
        path: Vec<String>,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },

    /// None of a component's constructors can be satisfied.
    #[error("None of the constructors of {component} can be invoked: {details}")]
    NoBindableConstructor {
        /// Component type.
        component: String,
        /// Unbindable parameters per constructor.
        details: String,
    },

    /// A tag-matching lifetime found no ancestor scope with a matching tag.
    #[error("No scope with a tag matching '{tags}' is visible from the scope in which the instance was requested")]
    NoMatchingScope {
        /// Required tags.
        tags: String,
    },

    /// Static or dynamic configuration conflict.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid argument to a core operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A resolved instance had an unexpected type.
    #[error("Type mismatch: expected {expected}")]
    TypeMismatch {
        /// Expected type name.
        expected: &'static str,
    },

    /// Synchronous disposal met an item that only supports async disposal.
    #[error("{0} only supports asynchronous disposal; call dispose_async() instead")]
    AsyncDisposalRequired(String),

    /// Raw failure raised by an activator or callback, not yet attributed.
    #[error("{0}")]
    Activator(BoxError),
}

impl DiError {
    /// Wraps an arbitrary error raised inside an activator or hook.
    ///
    /// The resolve pipeline attributes it to the failing component.
    pub fn activator(error: impl Into<BoxError>) -> Self {
        DiError::Activator(error.into())
    }

    /// Whether this error is a resolution failure that must not be wrapped again.
    pub fn is_resolution_failure(&self) -> bool {
        !matches!(self, DiError::Activator(_))
    }

    pub(crate) fn not_registered(service: &crate::Service) -> Self {
        DiError::NotRegistered {
            service: service.to_string(),
        }
    }

    pub(crate) fn disposed(what: impl Into<String>) -> Self {
        DiError::ObjectDisposed(what.into())
    }
}

/// Result type for resolution operations.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{DiResult, DiError};
///
/// fn failing_operation() -> DiResult<()> {
///     Err(DiError::Configuration("two composites for one service".into()))
/// }
///
/// assert!(failing_operation().is_err());
/// ```
pub type DiResult<T> = Result<T, DiError>;

//! # ferrous-ioc
//!
//! Resolution engine for an inversion-of-control container.
//!
//! ## Features
//!
//! - **Component registry**: services map to ordered registrations; the last one wins
//! - **Registration sources**: collections, `Lazy<T>`, `Factory<T>` and `Owned<T>` on demand
//! - **Lifetime scopes**: a tree of scopes, each owning its shared instances
//! - **Resolve pipeline**: phased middleware with decorators and activation hooks
//! - **Circular dependency detection**: fails with the full activation path
//! - **Deterministic disposal**: owned instances are released most recent first
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_ioc::{ContainerBuilder, Registrar, Resolver};
//! use std::sync::Arc;
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let mut builder = ContainerBuilder::new();
//! builder.register_instance(Database {
//!     connection_string: "postgres://localhost".to_string(),
//! });
//! builder.register(|c| Ok(UserService { db: c.resolve()? }));
//!
//! let container = builder.build().unwrap();
//! let users = container.resolve::<UserService>().unwrap();
//! assert_eq!(users.db.connection_string, "postgres://localhost");
//! ```
//!
//! ## Lifetimes
//!
//! - **Single instance**: one instance, owned by the root scope
//! - **Per lifetime scope**: one instance per scope that resolves it
//! - **Per matching scope**: one instance per nearest scope with a given tag
//! - **Per dependency**: a new instance for every request
//!
//! ## Scopes
//!
//! ```rust
//! use ferrous_ioc::{ContainerBuilder, Registrar, Resolver};
//! use std::sync::Arc;
//!
//! struct RequestId(u32);
//!
//! let mut builder = ContainerBuilder::new();
//! builder
//!     .register(|_| Ok(RequestId(7)))
//!     .instance_per_lifetime_scope();
//! let container = builder.build().unwrap();
//!
//! let scope = container.begin_lifetime_scope().unwrap();
//! let a = scope.resolve::<RequestId>().unwrap();
//! let b = scope.resolve::<RequestId>().unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//! scope.dispose().unwrap();
//! ```

pub mod activators;
pub mod adapters;
pub mod config;
pub mod container;
pub mod decoration;
pub mod disposer;
pub mod error;
pub mod key;
pub mod lifetime;
pub mod observer;
pub mod parameters;
pub mod reflection;
pub mod registrar;
pub mod registration;
pub mod registry;
pub mod resolve;
pub mod scope;
pub mod sources;
pub mod traits;

mod internal;

pub use activators::{Activator, DelegateActivator, InstanceActivator, ReflectionActivator};
pub use adapters::{Factory, Lazy, Owned};
pub use config::{ContainerOptions, DEFAULT_MAX_RESOLVE_DEPTH};
pub use container::{Container, ContainerBuilder, ScopeBuilder};
pub use decoration::{Decorator, DecoratorRegistration};
pub use disposer::{Disposable, Disposer};
pub use error::{BoxError, DiError, DiResult};
pub use key::{Discriminator, Service, TypedService, UniqueService};
pub use lifetime::{
    ComponentLifetime, CurrentScopeLifetime, InstanceOwnership, InstanceSharing, Lifetime,
    MatchingScopeLifetime, RootScopeLifetime,
};
pub use observer::{ResolveObserver, TracingObserver};
pub use parameters::{Parameter, Parameters};
pub use reflection::{
    Arguments, CacheKey, CacheUsage, Constructor, Injectable, MemberKind, ParameterInfo, Property,
    PropertyWiring, ReflectionCache,
};
pub use registrar::{Registrar, RegistrationBuilder};
pub use registration::{
    ComponentId, ComponentRegistration, ExposedService, Instance, Metadata, RegistrationData,
    RegistrationOptions,
};
pub use registry::{ComponentRegistry, RegisteredListener};
pub use resolve::{
    ActivatedEvent, ActivatingEvent, FnMiddleware, Next, PipelinePhase, PreparingEvent,
    ResolveContext, ResolveMiddleware, ResolveOperation, ResolvePipeline, ResolveRequest,
    ResolveRequestContext,
};
pub use scope::{LifetimeScope, ScopeTag};
pub use sources::{
    CollectionSource, FactorySource, LazySource, OwnedSource, RegistrationAccessor, RegistrationSource,
};
pub use traits::{AsyncDispose, Dispose, Resolver, ResolverCore};

/// Common imports for building and using a container.
pub mod prelude {
    pub use crate::{
        Container, ContainerBuilder, DiError, DiResult, Dispose, AsyncDispose, Factory, Lazy,
        LifetimeScope, Owned, Parameter, Parameters, Registrar, ResolveContext, Resolver, Service,
    };
}

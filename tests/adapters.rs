use ferrous_ioc::{
    ContainerBuilder, ContainerOptions, DiError, Dispose, Factory, Lazy, Owned, Parameter,
    Parameters, Registrar, Resolver,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;
}

struct Auth;
impl Plugin for Auth {
    fn name(&self) -> &'static str {
        "auth"
    }
}

struct Cache;
impl Plugin for Cache {
    fn name(&self) -> &'static str {
        "cache"
    }
}

#[test]
fn test_collection_in_registration_order() {
    let mut builder = ContainerBuilder::new();
    builder.register(|_| Ok(Auth)).as_trait::<dyn Plugin>(|p| p);
    builder.register(|_| Ok(Cache)).as_trait::<dyn Plugin>(|p| p);
    let container = builder.build().unwrap();

    let names: Vec<_> = container
        .resolve_all::<dyn Plugin>()
        .unwrap()
        .iter()
        .map(|p| p.name())
        .collect();
    assert_eq!(names, vec!["auth", "cache"]);
}

#[test]
fn test_empty_collection_when_nothing_registered() {
    let container = ContainerBuilder::new().build().unwrap();
    assert!(container.resolve_all::<dyn Plugin>().unwrap().is_empty());
}

#[test]
fn test_collection_as_a_dependency() {
    struct Host {
        plugins: Arc<Vec<Arc<dyn Plugin>>>,
    }

    let mut builder = ContainerBuilder::new();
    builder.register(|_| Ok(Auth)).as_trait::<dyn Plugin>(|p| p);
    builder.register(|c| Ok(Host { plugins: c.resolve()? }));
    let container = builder.build().unwrap();

    let host = container.resolve::<Host>().unwrap();
    assert_eq!(host.plugins.len(), 1);
}

#[test]
fn test_direct_collection_lookup_then_resolve_all() {
    let mut builder = ContainerBuilder::new();
    builder.register(|_| Ok(Auth)).as_trait::<dyn Plugin>(|p| p);
    builder.register(|_| Ok(Cache)).as_trait::<dyn Plugin>(|p| p);
    let container = builder.build().unwrap();

    let direct = container.try_resolve::<Vec<Arc<dyn Plugin>>>().unwrap().unwrap();
    assert_eq!(direct.len(), 2);
    assert_eq!(container.resolve_all::<dyn Plugin>().unwrap().len(), 2);
}

#[test]
fn test_early_collection_lookup_does_not_break_resolve_all() {
    let container = ContainerBuilder::new().build().unwrap();

    // Nothing exposes dyn Plugin, so the vector type is not yet known to be a collection
    assert!(container.try_resolve::<Vec<Arc<dyn Plugin>>>().unwrap().is_none());
    assert!(container.resolve_all::<dyn Plugin>().unwrap().is_empty());
    // resolve_all taught the container the collection shape
    let later = container.try_resolve::<Vec<Arc<dyn Plugin>>>().unwrap().unwrap();
    assert!(later.is_empty());
}

#[test]
fn test_collection_dependency_resolved_inside_a_scope() {
    struct Host {
        plugins: Arc<Vec<Arc<dyn Plugin>>>,
    }

    let mut builder = ContainerBuilder::new();
    builder.register(|_| Ok(Auth)).as_trait::<dyn Plugin>(|p| p);
    builder.register(|c| Ok(Host { plugins: c.resolve()? }));
    let container = builder.build().unwrap();

    let scope = container
        .begin_lifetime_scope_with(None, |scope| {
            scope.register(|_| Ok(Cache)).as_trait::<dyn Plugin>(|p| p);
        })
        .unwrap();
    assert_eq!(scope.resolve::<Host>().unwrap().plugins.len(), 2);
    assert_eq!(container.resolve::<Host>().unwrap().plugins.len(), 1);
}

#[test]
fn test_scope_local_registrations_join_the_collection() {
    let mut builder = ContainerBuilder::new();
    builder.register(|_| Ok(Auth)).as_trait::<dyn Plugin>(|p| p);
    let container = builder.build().unwrap();

    let scope = container
        .begin_lifetime_scope_with(None, |scope| {
            scope.register(|_| Ok(Cache)).as_trait::<dyn Plugin>(|p| p);
        })
        .unwrap();

    assert_eq!(scope.resolve_all::<dyn Plugin>().unwrap().len(), 2);
    assert_eq!(container.resolve_all::<dyn Plugin>().unwrap().len(), 1);
    assert_eq!(scope.resolve::<dyn Plugin>().unwrap().name(), "cache");
}

#[test]
fn test_lazy_defers_resolution() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let mut builder = ContainerBuilder::new();
    builder.register(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Auth)
    });
    let container = builder.build().unwrap();

    let lazy: Arc<Lazy<Auth>> = container.resolve_lazy().unwrap();
    assert!(!lazy.is_value_created());
    assert_eq!(built.load(Ordering::SeqCst), 0);

    let a = lazy.value().unwrap();
    let b = lazy.value().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(lazy.is_value_created());
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lazy_of_unregistered_service_is_not_registered() {
    let container = ContainerBuilder::new().build().unwrap();
    assert!(container.try_resolve_as::<Lazy<Auth>>(&ferrous_ioc::Service::lazy::<Auth>(), &Parameters::new())
        .unwrap()
        .is_none());
}

#[test]
fn test_lazy_after_scope_disposal_fails() {
    let mut builder = ContainerBuilder::new();
    builder.register(|_| Ok(Auth));
    let container = builder.build().unwrap();

    let scope = container.begin_lifetime_scope().unwrap();
    let lazy = scope.resolve_lazy::<Auth>().unwrap();
    scope.dispose().unwrap();
    assert!(matches!(lazy.value(), Err(DiError::ObjectDisposed(_))));
}

#[test]
fn test_factory_creates_per_call_and_accepts_parameters() {
    struct Connection {
        port: u16,
    }

    let mut builder = ContainerBuilder::new();
    builder.register_with_parameters(|_, parameters: &Parameters| {
        Ok(Connection {
            port: parameters.typed::<u16>().map_or(80, |p| *p),
        })
    });
    let container = builder.build().unwrap();

    let factory: Arc<Factory<Connection>> = container.resolve_factory().unwrap();
    let a = factory.create().unwrap();
    let b = factory
        .create_with(Parameters::new().with(Parameter::typed(Arc::new(8080u16))))
        .unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.port, 80);
    assert_eq!(b.port, 8080);
}

#[test]
fn test_factory_honours_sharing() {
    let mut builder = ContainerBuilder::new();
    builder.register(|_| Ok(Auth)).single_instance();
    let container = builder.build().unwrap();

    let factory = container.resolve_factory::<Auth>().unwrap();
    assert!(Arc::ptr_eq(&factory.create().unwrap(), &factory.create().unwrap()));
}

#[test]
fn test_owned_releases_its_private_scope() {
    struct Session {
        released: Arc<AtomicUsize>,
    }
    impl Dispose for Session {
        fn dispose(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
    struct Shared {
        released: Arc<AtomicUsize>,
    }
    impl Dispose for Shared {
        fn dispose(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    let session_released = Arc::new(AtomicUsize::new(0));
    let shared_released = Arc::new(AtomicUsize::new(0));
    let mut builder = ContainerBuilder::new();
    let counter = session_released.clone();
    builder
        .register(move |_| {
            Ok(Session {
                released: counter.clone(),
            })
        })
        .disposable();
    let counter = shared_released.clone();
    builder
        .register(move |_| {
            Ok(Shared {
                released: counter.clone(),
            })
        })
        .single_instance()
        .disposable();
    let container = builder.build().unwrap();
    container.resolve::<Shared>().unwrap();

    let owned: Arc<Owned<Session>> = container.resolve_owned().unwrap();
    let _session: &Session = &owned;
    owned.dispose().unwrap();
    owned.dispose().unwrap();
    assert_eq!(session_released.load(Ordering::SeqCst), 1);
    assert_eq!(shared_released.load(Ordering::SeqCst), 0);

    // Dropping an owned handle releases too
    let second = container.resolve_owned::<Session>().unwrap();
    drop(second);
    assert_eq!(session_released.load(Ordering::SeqCst), 2);
}

#[test]
fn test_without_default_sources_adapters_are_unavailable() {
    let mut builder = ContainerBuilder::new();
    builder.with_options(ContainerOptions {
        default_sources: false,
        ..ContainerOptions::default()
    });
    builder.register(|_| Ok(Auth));
    let container = builder.build().unwrap();

    assert!(container.resolve::<Auth>().is_ok());
    assert!(matches!(
        container.resolve_lazy::<Auth>(),
        Err(DiError::NotRegistered { .. })
    ));
}

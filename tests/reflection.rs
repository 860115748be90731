use ferrous_ioc::{
    CacheUsage, Constructor, ContainerBuilder, ContainerOptions, DiError, Injectable, Lazy, MemberKind,
    Parameter, Parameters, ReflectionCache, Registrar, Resolver,
};
use serial_test::serial;
use std::sync::Arc;

struct Clock;

struct Store {
    name: String,
}

struct Scheduler {
    clock: Option<Arc<Clock>>,
    store: Option<Arc<Store>>,
}

impl Injectable for Scheduler {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![
            Constructor::new(|_| {
                Ok(Scheduler {
                    clock: None,
                    store: None,
                })
            }),
            Constructor::new(|args| {
                Ok(Scheduler {
                    clock: Some(args.get(0)?),
                    store: None,
                })
            })
            .param::<Clock>("clock"),
            Constructor::new(|args| {
                Ok(Scheduler {
                    clock: Some(args.get(0)?),
                    store: Some(args.get(1)?),
                })
            })
            .param::<Clock>("clock")
            .param::<Store>("store"),
        ]
    }
}

struct NeedsStore {
    store: Arc<Store>,
}

impl Injectable for NeedsStore {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|args| Ok(NeedsStore { store: args.get(0)? })).param::<Store>("store")]
    }
}

fn private_builder() -> (ContainerBuilder, Arc<ReflectionCache>) {
    let cache = Arc::new(ReflectionCache::new());
    let mut builder = ContainerBuilder::new();
    builder.with_reflection_cache(cache.clone());
    (builder, cache)
}

#[test]
fn test_constructor_with_most_resolvable_parameters_wins() {
    let (mut builder, _cache) = private_builder();
    builder.register(|_| Ok(Clock));
    builder.register_type::<Scheduler>();
    let container = builder.build().unwrap();

    let scheduler = container.resolve::<Scheduler>().unwrap();
    assert!(scheduler.clock.is_some());
    assert!(scheduler.store.is_none());
}

#[test]
fn test_supplied_parameters_make_constructors_bindable() {
    let (mut builder, _cache) = private_builder();
    builder.register(|_| Ok(Clock));
    builder.register_type::<Scheduler>();
    let container = builder.build().unwrap();

    let scheduler = container
        .resolve_with::<Scheduler>(Parameters::new().with(Parameter::named(
            "store",
            Arc::new(Store {
                name: "supplied".into(),
            }),
        )))
        .unwrap();
    assert_eq!(scheduler.store.as_ref().unwrap().name, "supplied");
}

#[test]
fn test_no_bindable_constructor() {
    let (mut builder, _cache) = private_builder();
    builder.register_type::<NeedsStore>();
    let container = builder.build().unwrap();

    match container.resolve::<NeedsStore>() {
        Err(DiError::NoBindableConstructor { component, details }) => {
            assert!(component.contains("NeedsStore"));
            assert!(details.contains("store"));
        }
        other => panic!("expected NoBindableConstructor, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_metadata_is_cached_for_resolution() {
    let (mut builder, cache) = private_builder();
    builder.register_instance(Store { name: "db".into() });
    builder.register_type::<NeedsStore>();
    let container = builder.build().unwrap();

    let first = container.resolve::<NeedsStore>().unwrap();
    assert_eq!(first.store.name, "db");
    let cached = cache.len();
    container.resolve::<NeedsStore>().unwrap();
    assert_eq!(cache.len(), cached);
    assert!(cache.contains_where(|key, usage| {
        key.member() == MemberKind::Constructors && usage == CacheUsage::Resolution
    }));
}

#[test]
fn test_registration_entries_evicted_after_build() {
    let (mut builder, cache) = private_builder();
    builder.register_instance(Store { name: "db".into() });
    let _container = builder.build().unwrap();

    assert!(!cache.contains_where(|_, usage| usage == CacheUsage::Registration));
}

#[test]
fn test_registration_entries_kept_when_eviction_disabled() {
    let (mut builder, cache) = private_builder();
    builder.with_options(ContainerOptions {
        evict_registration_cache: false,
        ..ContainerOptions::default()
    });
    builder.register_instance(Store { name: "db".into() });
    let _container = builder.build().unwrap();

    assert!(cache.contains_where(|key, usage| {
        usage == CacheUsage::Registration && matches!(key.member(), MemberKind::Assignability(_))
    }));
}

#[test]
#[serial]
fn test_shared_cache_is_reused_while_containers_live() {
    let first = ContainerBuilder::new().build().unwrap();
    let cache = first.registry().reflection_cache().clone();
    assert!(Arc::ptr_eq(&cache, &ReflectionCache::shared()));

    let second = ContainerBuilder::new().build().unwrap();
    assert!(Arc::ptr_eq(&cache, second.registry().reflection_cache()));
    assert_eq!(cache.attached_containers(), 2);

    // Another container may still be registering, so nothing is evicted
    assert_eq!(cache.evict_registration_entries(), 0);

    first.dispose().unwrap();
    second.dispose().unwrap();
    assert_eq!(cache.attached_containers(), 0);
}

#[test]
#[serial]
fn test_clearing_the_shared_cache() {
    let mut builder = ContainerBuilder::new();
    builder.register_instance(Store { name: "db".into() });
    builder.register_type::<NeedsStore>();
    let container = builder.build().unwrap();
    container.resolve::<NeedsStore>().unwrap();

    let cache = container.registry().reflection_cache().clone();
    assert!(!cache.is_empty());
    cache.clear();
    assert!(cache.is_empty());

    // Entries are rebuilt on demand
    container.resolve::<NeedsStore>().unwrap();
    assert!(!cache.is_empty());
}

trait Sink: Send + Sync {
    fn label(&self) -> &'static str;
}

struct Console;
impl Sink for Console {
    fn label(&self) -> &'static str {
        "console"
    }
}

struct File;
impl Sink for File {
    fn label(&self) -> &'static str {
        "file"
    }
}

struct Fanout {
    sinks: Arc<Vec<Arc<dyn Sink>>>,
    fallback: Arc<Lazy<dyn Sink>>,
}

impl Injectable for Fanout {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|args| {
            Ok(Fanout {
                sinks: args.get(0)?,
                fallback: args.get(1)?,
            })
        })
        .collection_param::<dyn Sink>("sinks")
        .lazy_param::<dyn Sink>("fallback")]
    }
}

#[test]
fn test_adapter_typed_constructor_parameters_bind() {
    let (mut builder, _cache) = private_builder();
    builder.register(|_| Ok(Console)).as_trait::<dyn Sink>(|s| s);
    builder.register(|_| Ok(File)).as_trait::<dyn Sink>(|s| s);
    builder.register_type::<Fanout>();
    let container = builder.build().unwrap();

    let fanout = container.resolve::<Fanout>().unwrap();
    let labels: Vec<_> = fanout.sinks.iter().map(|s| s.label()).collect();
    assert_eq!(labels, vec!["console", "file"]);
    assert!(!fanout.fallback.is_value_created());
    assert_eq!(fanout.fallback.value().unwrap().label(), "file");
}

struct Collector {
    sinks: Arc<Vec<Arc<dyn Sink>>>,
}

impl Injectable for Collector {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|args| Ok(Collector { sinks: args.get(0)? }))
            .collection_param::<dyn Sink>("sinks")]
    }
}

#[test]
fn test_collection_parameter_binds_with_no_elements() {
    let (mut builder, _cache) = private_builder();
    builder.register_type::<Collector>();
    builder.register_type::<Fanout>();
    let container = builder.build().unwrap();

    assert!(container.resolve::<Collector>().unwrap().sinks.is_empty());
    // A deferred Sink needs a registered Sink, so Fanout has no bindable constructor
    assert!(container.resolve::<Fanout>().is_err());
}

use ferrous_ioc::{
    ContainerBuilder, DiError, Parameter, Parameters, Registrar, Resolver, Service,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

struct English;
impl Greeter for English {
    fn greet(&self) -> String {
        "hello".to_string()
    }
}

struct French;
impl Greeter for French {
    fn greet(&self) -> String {
        "bonjour".to_string()
    }
}

#[test]
fn test_instance_and_factory_registration() {
    struct Config {
        url: String,
    }
    struct Client {
        config: Arc<Config>,
    }

    let mut builder = ContainerBuilder::new();
    builder.register_instance(Config {
        url: "db://local".to_string(),
    });
    builder.register(|c| Ok(Client { config: c.resolve()? }));

    let container = builder.build().unwrap();
    let client = container.resolve::<Client>().unwrap();
    assert_eq!(client.config.url, "db://local");
    assert!(container.is_registered::<Client>());
    assert!(!container.is_registered::<String>());
}

#[test]
fn test_per_dependency_creates_new_instances() {
    let mut builder = ContainerBuilder::new();
    builder.register(|_| Ok(String::from("transient")));
    let container = builder.build().unwrap();

    let a = container.resolve::<String>().unwrap();
    let b = container.resolve::<String>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn test_single_instance_is_shared() {
    let mut builder = ContainerBuilder::new();
    builder.register(|_| Ok(String::from("single"))).single_instance();
    let container = builder.build().unwrap();

    let a = container.resolve::<String>().unwrap();
    let b = container.resolve::<String>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_trait_projection_and_last_registration_wins() {
    let mut builder = ContainerBuilder::new();
    builder.register(|_| Ok(English)).as_trait::<dyn Greeter>(|g| g);
    builder.register(|_| Ok(French)).as_trait::<dyn Greeter>(|g| g);
    let container = builder.build().unwrap();

    assert_eq!(container.resolve::<dyn Greeter>().unwrap().greet(), "bonjour");
    let all: Vec<String> = container
        .resolve_all::<dyn Greeter>()
        .unwrap()
        .iter()
        .map(|g| g.greet())
        .collect();
    assert_eq!(all, vec!["hello", "bonjour"]);

    // Only the trait was exposed
    assert!(container.try_resolve::<English>().unwrap().is_none());
}

#[test]
fn test_component_exposed_as_self_and_trait_shares_one_instance() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut builder = ContainerBuilder::new();
    builder
        .register(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(English)
        })
        .as_self()
        .as_trait::<dyn Greeter>(|g| g)
        .single_instance();
    let container = builder.build().unwrap();

    container.resolve::<English>().unwrap();
    container.resolve::<dyn Greeter>().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_keyed_services() {
    let mut builder = ContainerBuilder::new();
    builder.register(|_| Ok(English)).as_keyed_trait::<dyn Greeter>("en", |g| g);
    builder.register(|_| Ok(French)).as_keyed_trait::<dyn Greeter>("fr", |g| g);
    let container = builder.build().unwrap();

    assert_eq!(container.resolve_keyed::<dyn Greeter>("fr").unwrap().greet(), "bonjour");
    assert_eq!(container.resolve_keyed::<dyn Greeter>("en").unwrap().greet(), "hello");
    assert!(container.try_resolve_keyed::<dyn Greeter>("de").unwrap().is_none());
    assert!(container.try_resolve::<dyn Greeter>().unwrap().is_none());
}

#[test]
fn test_unregistered_service() {
    let container = ContainerBuilder::new().build().unwrap();

    match container.resolve::<u64>() {
        Err(DiError::NotRegistered { service }) => assert!(service.contains("u64")),
        other => panic!("expected NotRegistered, got {:?}", other.map(|_| ())),
    }
    assert!(container.try_resolve::<u64>().unwrap().is_none());
}

#[test]
fn test_parameters_reach_the_factory() {
    struct Greeting(String);

    let mut builder = ContainerBuilder::new();
    builder.register_with_parameters(|_, parameters: &Parameters| {
        let name = parameters
            .named::<String>("name")
            .ok_or_else(|| DiError::InvalidArgument("name missing".into()))?;
        Ok(Greeting(format!("hi {name}")))
    });
    let container = builder.build().unwrap();

    let greeting = container
        .resolve_with::<Greeting>(
            Parameters::new().with(Parameter::named("name", Arc::new(String::from("ada")))),
        )
        .unwrap();
    assert_eq!(greeting.0, "hi ada");
}

#[test]
fn test_factory_error_is_attributed_to_the_component() {
    struct Broken;
    struct NeedsBroken {
        _broken: Arc<Broken>,
    }

    let mut builder = ContainerBuilder::new();
    builder.register::<Broken, _>(|_| Err(DiError::activator("disk unavailable")));
    builder.register(|c| Ok(NeedsBroken { _broken: c.resolve()? }));
    let container = builder.build().unwrap();

    match container.resolve::<NeedsBroken>() {
        Err(DiError::ActivationFailure { component, path, source }) => {
            assert!(component.contains("Broken"));
            assert_eq!(path.len(), 2);
            assert!(path[0].contains("NeedsBroken"));
            assert_eq!(source.to_string(), "disk unavailable");
        }
        other => panic!("expected ActivationFailure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_activation_hooks() {
    struct Counter {
        value: AtomicUsize,
    }

    let prepared = Arc::new(AtomicUsize::new(0));
    let seen = prepared.clone();
    let mut builder = ContainerBuilder::new();
    builder
        .register_with_parameters(|_, parameters: &Parameters| {
            let start = parameters.typed::<usize>().map_or(0, |v| *v);
            Ok(Counter {
                value: AtomicUsize::new(start),
            })
        })
        .on_preparing(move |event| {
            seen.fetch_add(1, Ordering::SeqCst);
            event.add_parameter(Parameter::typed(Arc::new(10usize)));
            Ok(())
        })
        .on_activating(|event| {
            let counter = event.instance_as::<Counter>()?;
            counter.value.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .on_activated(|event| {
            let counter = event.instance_as::<Counter>()?;
            counter.value.fetch_add(100, Ordering::SeqCst);
            Ok(())
        });
    let container = builder.build().unwrap();

    let counter = container.resolve::<Counter>().unwrap();
    assert_eq!(counter.value.load(Ordering::SeqCst), 111);
    assert_eq!(prepared.load(Ordering::SeqCst), 1);
}

#[test]
fn test_activating_hook_can_replace_the_instance() {
    let mut builder = ContainerBuilder::new();
    builder
        .register(|_| Ok(String::from("original")))
        .on_activating(|event| {
            event.replace_instance(Arc::new(String::from("replaced")));
            Ok(())
        });
    let container = builder.build().unwrap();
    assert_eq!(&*container.resolve::<String>().unwrap(), "replaced");
}

#[test]
fn test_metadata_is_visible_on_the_registration() {
    let mut builder = ContainerBuilder::new();
    builder.register_instance(5u8).with_metadata("owner", String::from("payments"));
    let container = builder.build().unwrap();

    let registration = container.registry().registration(&Service::typed::<u8>()).unwrap();
    assert_eq!(
        registration.metadata().get::<String>("owner").map(|v| v.as_str()),
        Some("payments")
    );
}

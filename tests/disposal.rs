use async_trait::async_trait;
use ferrous_ioc::{AsyncDispose, ContainerBuilder, DiError, Dispose, Registrar, Resolver};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

struct Tracked {
    name: String,
    log: Log,
}

impl Dispose for Tracked {
    fn dispose(&self) {
        self.log.lock().push(self.name.clone());
    }
}

struct First(Tracked);
struct Second(Tracked);
struct Third(Tracked);

impl Dispose for First {
    fn dispose(&self) {
        self.0.dispose()
    }
}
impl Dispose for Second {
    fn dispose(&self) {
        self.0.dispose()
    }
}
impl Dispose for Third {
    fn dispose(&self) {
        self.0.dispose()
    }
}

fn tracked(name: &str, log: &Log) -> Tracked {
    Tracked {
        name: name.to_string(),
        log: log.clone(),
    }
}

#[test]
fn test_sync_disposal_lifo_order() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = ContainerBuilder::new();
    let l = log.clone();
    builder
        .register(move |_| Ok(First(tracked("first", &l))))
        .instance_per_lifetime_scope()
        .disposable();
    let l = log.clone();
    builder
        .register(move |_| Ok(Second(tracked("second", &l))))
        .instance_per_lifetime_scope()
        .disposable();
    let l = log.clone();
    builder
        .register(move |_| Ok(Third(tracked("third", &l))))
        .instance_per_lifetime_scope()
        .disposable();
    let container = builder.build().unwrap();

    let scope = container.begin_lifetime_scope().unwrap();
    scope.resolve::<First>().unwrap();
    scope.resolve::<Second>().unwrap();
    scope.resolve::<Third>().unwrap();
    scope.dispose().unwrap();

    assert_eq!(*log.lock(), vec!["third", "second", "first"]);
}

#[test]
fn test_dependencies_are_released_after_their_dependents() {
    struct Outer {
        _inner: Arc<Second>,
        tracked: Tracked,
    }
    impl Dispose for Outer {
        fn dispose(&self) {
            self.tracked.dispose()
        }
    }

    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = ContainerBuilder::new();
    let l = log.clone();
    builder
        .register(move |_| Ok(Second(tracked("inner", &l))))
        .disposable();
    let l = log.clone();
    builder
        .register(move |c| {
            Ok(Outer {
                _inner: c.resolve()?,
                tracked: tracked("outer", &l),
            })
        })
        .disposable();
    let container = builder.build().unwrap();

    let scope = container.begin_lifetime_scope().unwrap();
    scope.resolve::<Outer>().unwrap();
    scope.dispose().unwrap();
    assert_eq!(*log.lock(), vec!["outer", "inner"]);
}

#[test]
fn test_each_scope_releases_only_what_it_owns() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = ContainerBuilder::new();
    let l = log.clone();
    builder
        .register(move |_| Ok(First(tracked("singleton", &l))))
        .single_instance()
        .disposable();
    let l = log.clone();
    builder
        .register(move |_| Ok(Second(tracked("scoped", &l))))
        .instance_per_lifetime_scope()
        .disposable();
    let container = builder.build().unwrap();

    let scope = container.begin_lifetime_scope().unwrap();
    scope.resolve::<First>().unwrap();
    scope.resolve::<Second>().unwrap();
    scope.dispose().unwrap();
    assert_eq!(*log.lock(), vec!["scoped"]);

    container.dispose().unwrap();
    assert_eq!(*log.lock(), vec!["scoped", "singleton"]);

    // Exactly once, however often dispose is called
    container.dispose().unwrap();
    scope.dispose().unwrap();
    assert_eq!(log.lock().len(), 2);
}

#[test]
fn test_disposing_a_parent_leaves_a_live_child_usable() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let created = Arc::new(AtomicUsize::new(0));
    let mut builder = ContainerBuilder::new();
    let (l, n) = (log.clone(), created.clone());
    builder
        .register(move |_| {
            let index = n.fetch_add(1, Ordering::SeqCst);
            Ok(First(tracked(&format!("first-{index}"), &l)))
        })
        .instance_per_lifetime_scope()
        .disposable();
    let container = builder.build().unwrap();

    let parent = container.begin_lifetime_scope().unwrap();
    let child = parent.begin_lifetime_scope().unwrap();
    parent.resolve::<First>().unwrap();
    let in_child = child.resolve::<First>().unwrap();

    parent.dispose().unwrap();
    assert_eq!(*log.lock(), vec!["first-0"]);
    assert!(parent.resolve::<First>().is_err());

    // Ending a parent does not end its children
    assert!(!child.is_disposed());
    assert!(Arc::ptr_eq(&child.resolve::<First>().unwrap(), &in_child));
    assert_eq!(in_child.0.name, "first-1");

    child.dispose().unwrap();
    parent.dispose().unwrap();
    child.dispose().unwrap();
    drop(child);
    drop(parent);
    assert_eq!(*log.lock(), vec!["first-0", "first-1"]);
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[test]
fn test_externally_owned_instances_are_not_released() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = ContainerBuilder::new();
    let l = log.clone();
    builder
        .register(move |_| Ok(First(tracked("external", &l))))
        .disposable()
        .externally_owned();
    let container = builder.build().unwrap();

    container.resolve::<First>().unwrap();
    container.dispose().unwrap();
    assert!(log.lock().is_empty());
}

#[test]
fn test_on_release_callback() {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let mut builder = ContainerBuilder::new();
    builder
        .register(|_| Ok(String::from("connection")))
        .instance_per_lifetime_scope()
        .on_release(move |value: Arc<String>| {
            assert_eq!(value.as_str(), "connection");
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let container = builder.build().unwrap();

    let scope = container.begin_lifetime_scope().unwrap();
    scope.resolve::<String>().unwrap();
    scope.resolve::<String>().unwrap();
    scope.dispose().unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dropping_a_scope_releases_its_instances() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = ContainerBuilder::new();
    let l = log.clone();
    builder
        .register(move |_| Ok(First(tracked("dropped", &l))))
        .instance_per_lifetime_scope()
        .disposable();
    let container = builder.build().unwrap();

    {
        let scope = container.begin_lifetime_scope().unwrap();
        scope.resolve::<First>().unwrap();
    }
    assert_eq!(*log.lock(), vec!["dropped"]);
}

struct AsyncOnly {
    log: Log,
}

#[async_trait]
impl AsyncDispose for AsyncOnly {
    async fn dispose(&self) {
        tokio::task::yield_now().await;
        self.log.lock().push("async".to_string());
    }
}

#[test]
fn test_sync_dispose_of_async_only_item_fails() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = ContainerBuilder::new();
    let l = log.clone();
    builder
        .register(move |_| Ok(AsyncOnly { log: l.clone() }))
        .instance_per_lifetime_scope()
        .async_disposable();
    let container = builder.build().unwrap();

    let scope = container.begin_lifetime_scope().unwrap();
    scope.resolve::<AsyncOnly>().unwrap();
    assert!(matches!(scope.dispose(), Err(DiError::AsyncDisposalRequired(_))));
    assert!(scope.is_disposed());
}

#[tokio::test]
async fn test_async_disposal_mixes_sync_and_async_in_lifo_order() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = ContainerBuilder::new();
    let l = log.clone();
    builder
        .register(move |_| Ok(First(tracked("sync", &l))))
        .instance_per_lifetime_scope()
        .disposable();
    let l = log.clone();
    builder
        .register(move |_| Ok(AsyncOnly { log: l.clone() }))
        .instance_per_lifetime_scope()
        .async_disposable();
    let container = builder.build().unwrap();

    let scope = container.begin_lifetime_scope().unwrap();
    scope.resolve::<First>().unwrap();
    scope.resolve::<AsyncOnly>().unwrap();
    scope.dispose_async().await;

    assert_eq!(*log.lock(), vec!["async", "sync"]);
    assert!(scope.is_disposed());
}

#[test]
fn test_resolver_registered_disposers() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let container = ContainerBuilder::new().build().unwrap();
    let scope = container.begin_lifetime_scope().unwrap();

    scope.register_disposer(Arc::new(tracked("manual-1", &log))).unwrap();
    scope.register_disposer(Arc::new(tracked("manual-2", &log))).unwrap();
    scope.dispose().unwrap();

    assert_eq!(*log.lock(), vec!["manual-2", "manual-1"]);
    assert!(scope.register_disposer(Arc::new(tracked("late", &log))).is_err());
}

proptest! {
    #[test]
    fn prop_disposal_is_reverse_of_tracking(count in 1usize..24) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let container = ContainerBuilder::new().build().unwrap();
        let scope = container.begin_lifetime_scope().unwrap();

        for i in 0..count {
            scope.register_disposer(Arc::new(tracked(&i.to_string(), &log))).unwrap();
        }
        scope.dispose().unwrap();

        let expected: Vec<String> = (0..count).rev().map(|i| i.to_string()).collect();
        prop_assert_eq!(&*log.lock(), &expected);
    }
}

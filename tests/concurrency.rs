use crossbeam_utils::thread;
use ferrous_ioc::{
    ComponentRegistration, ContainerBuilder, InstanceActivator, RegistrationAccessor,
    RegistrationData, RegistrationSource, Registrar, Resolver, Service,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::time::Duration;

struct Slow {
    id: usize,
}

#[test]
fn test_concurrent_first_resolve_creates_one_singleton() {
    const THREADS: usize = 16;
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let mut builder = ContainerBuilder::new();
    builder
        .register(move |_| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(Slow {
                id: counter.fetch_add(1, Ordering::SeqCst),
            })
        })
        .single_instance();
    let container = builder.build().unwrap();
    let barrier = Barrier::new(THREADS);

    let ids: Vec<usize> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|_| {
                    barrier.wait();
                    container.resolve::<Slow>().unwrap().id
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(ids.iter().all(|&id| id == 0));
}

#[test]
fn test_concurrent_scopes_get_their_own_instances() {
    const THREADS: usize = 8;
    let mut builder = ContainerBuilder::new();
    builder
        .register(|_| Ok(Slow { id: 0 }))
        .instance_per_lifetime_scope();
    let container = builder.build().unwrap();

    let instances: Vec<Arc<Slow>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|_| {
                    let scope = container.begin_lifetime_scope().unwrap();
                    let a = scope.resolve::<Slow>().unwrap();
                    let b = scope.resolve::<Slow>().unwrap();
                    assert!(Arc::ptr_eq(&a, &b));
                    a
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    for (i, a) in instances.iter().enumerate() {
        for b in &instances[i + 1..] {
            assert!(!Arc::ptr_eq(a, b));
        }
    }
}

#[test]
fn test_independent_singletons_do_not_block_each_other() {
    struct Fast;

    let mut builder = ContainerBuilder::new();
    builder
        .register(|_| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(Slow { id: 1 })
        })
        .single_instance();
    builder.register(|_| Ok(Fast)).single_instance();
    let container = builder.build().unwrap();
    let started = Barrier::new(2);

    thread::scope(|s| {
        s.spawn(|_| {
            started.wait();
            container.resolve::<Slow>().unwrap();
        });
        s.spawn(|_| {
            started.wait();
            let begin = std::time::Instant::now();
            container.resolve::<Fast>().unwrap();
            assert!(begin.elapsed() < Duration::from_millis(150));
        });
    })
    .unwrap();
}

#[test]
fn test_concurrent_resolution_with_nested_singletons() {
    struct Config;
    struct Repo {
        _config: Arc<Config>,
    }

    let configs = Arc::new(AtomicUsize::new(0));
    let counter = configs.clone();
    let mut builder = ContainerBuilder::new();
    builder
        .register(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Config)
        })
        .single_instance();
    builder.register(|c| Ok(Repo { _config: c.resolve()? }));
    let container = builder.build().unwrap();

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|_| {
                for _ in 0..100 {
                    container.resolve::<Repo>().unwrap();
                }
            });
        }
    })
    .unwrap();

    assert_eq!(configs.load(Ordering::SeqCst), 1);
}

fn instance_of<T: Send + Sync + 'static>(value: T) -> Arc<ComponentRegistration> {
    Arc::new(ComponentRegistration::new(RegistrationData::new(Arc::new(
        InstanceActivator::new(Arc::new(value)),
    ))))
}

/// Supplies `Slow` slowly and counts how often it was asked.
struct SlowSource {
    calls: AtomicUsize,
}

impl RegistrationSource for SlowSource {
    fn registrations_for(
        &self,
        service: &Service,
        _accessor: RegistrationAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>> {
        if *service != Service::typed::<Slow>() {
            return Vec::new();
        }
        let id = self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        vec![instance_of(Slow { id })]
    }

    fn description(&self) -> &str {
        "slow"
    }
}

#[test]
fn test_concurrent_first_lookups_query_a_source_once() {
    const THREADS: usize = 16;
    let source = Arc::new(SlowSource {
        calls: AtomicUsize::new(0),
    });
    let mut builder = ContainerBuilder::new();
    builder.add_source(source.clone());
    let container = builder.build().unwrap();
    let barrier = Barrier::new(THREADS);

    let ids: Vec<usize> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|_| {
                    barrier.wait();
                    container.resolve::<Slow>().unwrap().id
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert!(ids.iter().all(|&id| id == 0));
}

/// Holds the `u16` lookup open until released, answers `u32` at once.
struct GateSource {
    entered: Barrier,
    gate: Mutex<mpsc::Receiver<()>>,
}

impl RegistrationSource for GateSource {
    fn registrations_for(
        &self,
        service: &Service,
        _accessor: RegistrationAccessor<'_>,
    ) -> Vec<Arc<ComponentRegistration>> {
        if *service == Service::typed::<u16>() {
            self.entered.wait();
            match self.gate.lock().recv_timeout(Duration::from_secs(5)) {
                Ok(()) => vec![instance_of(16u16)],
                Err(_) => Vec::new(),
            }
        } else if *service == Service::typed::<u32>() {
            vec![instance_of(32u32)]
        } else {
            Vec::new()
        }
    }

    fn description(&self) -> &str {
        "gate"
    }
}

#[test]
fn test_source_lookup_for_one_service_does_not_block_another() {
    let (release, gate) = mpsc::channel();
    let source = Arc::new(GateSource {
        entered: Barrier::new(2),
        gate: Mutex::new(gate),
    });
    let mut builder = ContainerBuilder::new();
    builder.add_source(source.clone());
    let container = builder.build().unwrap();

    thread::scope(|s| {
        let held = s.spawn(|_| container.try_resolve::<u16>().unwrap().map(|v| *v));
        s.spawn(|_| {
            source.entered.wait();
            // The u16 lookup is still in progress here
            assert_eq!(*container.resolve::<u32>().unwrap(), 32);
            release.send(()).unwrap();
        });
        assert_eq!(held.join().unwrap(), Some(16));
    })
    .unwrap();
}

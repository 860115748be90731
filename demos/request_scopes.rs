//! Request handling with one tagged lifetime scope per request.
//!
//! Run with `RUST_LOG=ferrous_ioc=debug cargo run --example request_scopes`
//! to see the container's own diagnostics.

use ferrous_ioc::{
    ContainerBuilder, DiResult, Dispose, Registrar, Resolver, ScopeTag, TracingObserver,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

struct TickingClock(AtomicU64);

impl Clock for TickingClock {
    fn now(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// One per request; released when the request scope ends.
struct UnitOfWork {
    request: Arc<RequestInfo>,
    started: u64,
}

impl Dispose for UnitOfWork {
    fn dispose(&self) {
        tracing::info!(path = %self.request.path, started = self.started, "unit of work committed");
    }
}

struct RequestInfo {
    path: String,
}

struct Handler {
    work: Arc<UnitOfWork>,
    clock: Arc<dyn Clock>,
}

impl Handler {
    fn handle(&self) -> String {
        format!(
            "{} handled at tick {} (unit of work from tick {})",
            self.work.request.path,
            self.clock.now(),
            self.work.started
        )
    }
}

fn main() -> DiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut builder = ContainerBuilder::new();
    builder.add_observer(Arc::new(TracingObserver));
    builder
        .register(|_| Ok(TickingClock(AtomicU64::new(0))))
        .as_trait::<dyn Clock>(|c| c)
        .single_instance();
    builder
        .register(|c| {
            let clock: Arc<dyn Clock> = c.resolve()?;
            Ok(UnitOfWork {
                request: c.resolve()?,
                started: clock.now(),
            })
        })
        .instance_per_matching_lifetime_scope(["request"])
        .disposable();
    builder.register(|c| {
        Ok(Handler {
            work: c.resolve()?,
            clock: c.resolve()?,
        })
    });
    let container = builder.build()?;

    for path in ["/orders", "/invoices", "/health"] {
        let request = container.begin_lifetime_scope_with(Some(ScopeTag::from("request")), |scope| {
            scope.register_instance(RequestInfo {
                path: path.to_string(),
            });
        })?;

        // Two handlers in one request share the unit of work
        let first = request.resolve::<Handler>()?;
        let second = request.resolve::<Handler>()?;
        assert!(Arc::ptr_eq(&first.work, &second.work));
        println!("{}", first.handle());
        println!("{}", second.handle());

        request.dispose()?;
    }

    container.dispose()
}

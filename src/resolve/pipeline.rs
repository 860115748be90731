use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::decoration::DecoratorRegistration;
use crate::error::{DiError, DiResult};
use crate::lifetime::{InstanceOwnership, InstanceSharing};
use crate::registration::{ComponentRegistration, Instance};
use crate::traits::ResolverCore;

use super::context::ResolveRequestContext;
use super::events::{ActivatedEvent, ActivatingEvent, PreparingEvent};

/// Continuation handed to middleware; runs the rest of the pipeline.
pub type Next<'n> = &'n mut dyn FnMut(&mut ResolveRequestContext<'_>) -> DiResult<()>;

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelinePhase {
    /// Cycle detection and activation stack bookkeeping.
    ResolveRequestStart,
    /// Selection of the scope owning the instance.
    ScopeSelection,
    /// Service projection and decorators.
    Decoration,
    /// Per-scope instance sharing.
    Sharing,
    /// Preparing hooks; parameters are final afterwards.
    ParameterSelection,
    /// Activator, activating hooks, disposal tracking, activated hooks.
    Activation,
}

/// A pipeline stage.
///
/// User middleware runs inside the built-in request-start stage and ahead
/// of (wrapping) the built-in stage of every other phase.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{
///     ContainerBuilder, DiResult, Next, PipelinePhase, Registrar, ResolveMiddleware,
///     ResolveRequestContext, Resolver,
/// };
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct CountActivations(AtomicUsize);
///
/// impl ResolveMiddleware for CountActivations {
///     fn phase(&self) -> PipelinePhase {
///         PipelinePhase::Activation
///     }
///
///     fn execute(&self, context: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
///         self.0.fetch_add(1, Ordering::SeqCst);
///         next(context)
///     }
/// }
///
/// let counter = Arc::new(CountActivations::default());
/// let mut builder = ContainerBuilder::new();
/// builder
///     .register(|_| Ok(5u16))
///     .single_instance()
///     .with_middleware(counter.clone());
/// let container = builder.build().unwrap();
///
/// container.resolve::<u16>().unwrap();
/// container.resolve::<u16>().unwrap();
/// assert_eq!(counter.0.load(Ordering::SeqCst), 1);
/// ```
pub trait ResolveMiddleware: Send + Sync {
    /// Phase the stage belongs to.
    fn phase(&self) -> PipelinePhase;

    /// Runs the stage; call `next` to continue the pipeline.
    fn execute(&self, context: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()>;

    /// Diagnostic name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

type MiddlewareFn =
    dyn Fn(&mut ResolveRequestContext<'_>, Next<'_>) -> DiResult<()> + Send + Sync;

/// Middleware built from a closure.
pub struct FnMiddleware {
    phase: PipelinePhase,
    name: &'static str,
    run: Box<MiddlewareFn>,
}

impl FnMiddleware {
    /// Stage in `phase` running `run`.
    pub fn new<F>(phase: PipelinePhase, name: &'static str, run: F) -> Self
    where
        F: Fn(&mut ResolveRequestContext<'_>, Next<'_>) -> DiResult<()> + Send + Sync + 'static,
    {
        Self {
            phase,
            name,
            run: Box::new(run),
        }
    }
}

impl ResolveMiddleware for FnMiddleware {
    fn phase(&self) -> PipelinePhase {
        self.phase
    }

    fn execute(&self, context: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
        (self.run)(context, next)
    }

    fn name(&self) -> &str {
        self.name
    }
}

fn missing_instance(registration: &ComponentRegistration) -> DiError {
    DiError::Configuration(format!(
        "pipeline of {} did not produce an instance",
        registration.describe()
    ))
}

struct RequestStart;

impl ResolveMiddleware for RequestStart {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::ResolveRequestStart
    }

    fn execute(&self, context: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
        let operation = context.operation;
        let registration = context.registration.clone();
        let _frame = operation.enter(&registration)?;

        let observers = context.scope.observers().clone();
        if !observers.is_empty() {
            observers.each(|observer| observer.pipeline_entered(&context.service, &registration));
        }
        let result = next(context);
        if !observers.is_empty() {
            let succeeded = result.is_ok();
            observers.each(|observer| observer.pipeline_exited(&context.service, &registration, succeeded));
        }

        // Attribute raw failures to the innermost component, exactly once
        result.map_err(|error| match error {
            DiError::Activator(source) => DiError::ActivationFailure {
                component: registration.describe(),
                path: operation.activation_path(),
                source,
            },
            other => other,
        })
    }

    fn name(&self) -> &str {
        "request start"
    }
}

struct ScopeSelection;

impl ResolveMiddleware for ScopeSelection {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::ScopeSelection
    }

    fn execute(&self, context: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
        let owner = context.registration.lifetime().find_scope(&context.scope)?;
        owner.ensure_active()?;
        context.scope = owner;
        next(context)
    }

    fn name(&self) -> &str {
        "scope selection"
    }
}

struct Decoration;

fn project(context: &mut ResolveRequestContext<'_>) -> DiResult<()> {
    let raw = context
        .take_instance()
        .ok_or_else(|| missing_instance(&context.registration))?;
    let projected = context.registration.project(&context.service, raw)?;
    context.instance = Some(projected);
    Ok(())
}

fn decorate(
    context: &mut ResolveRequestContext<'_>,
    next: Next<'_>,
    decorators: &[Arc<DecoratorRegistration>],
) -> DiResult<Instance> {
    next(context)?;
    project(context)?;
    let mut instance = context
        .take_instance()
        .ok_or_else(|| missing_instance(&context.registration))?;
    let resolver = context.resolve_context();
    for decorator in decorators {
        instance = decorator.apply(instance, &resolver)?;
    }
    Ok(instance)
}

impl ResolveMiddleware for Decoration {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::Decoration
    }

    fn execute(&self, context: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
        let decorators = context.scope.registry().decorators_for(&context.service);
        let Some(outermost) = decorators.last().map(|decorator| decorator.id()) else {
            next(context)?;
            return project(context);
        };

        let instance = if context.registration.sharing() == InstanceSharing::Shared {
            // Decorated form cached next to the raw instance
            let owner = context.scope.clone();
            let registration = context.registration.clone();
            owner.shared_instance(
                (registration.id(), Some(outermost)),
                || registration.describe(),
                || decorate(context, next, &decorators),
            )?
        } else {
            decorate(context, next, &decorators)?
        };
        context.instance = Some(instance);
        Ok(())
    }

    fn name(&self) -> &str {
        "decoration"
    }
}

struct Sharing;

impl ResolveMiddleware for Sharing {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::Sharing
    }

    fn execute(&self, context: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
        if context.registration.sharing() != InstanceSharing::Shared {
            return next(context);
        }
        let owner = context.scope.clone();
        let registration = context.registration.clone();
        let instance = owner.shared_instance(
            (registration.id(), None),
            || registration.describe(),
            || {
                next(context)?;
                context
                    .take_instance()
                    .ok_or_else(|| missing_instance(&registration))
            },
        )?;
        context.instance = Some(instance);
        Ok(())
    }

    fn name(&self) -> &str {
        "sharing"
    }
}

struct Preparing;

impl ResolveMiddleware for Preparing {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::ParameterSelection
    }

    fn execute(&self, context: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
        let registration = context.registration.clone();
        let hooks = &registration.hooks().preparing;
        if !hooks.is_empty() {
            let resolver = context.resolve_context();
            for hook in hooks {
                let mut event = PreparingEvent {
                    context: &resolver,
                    service: &context.service,
                    registration: &registration,
                    parameters: &mut context.parameters,
                };
                hook(&mut event)?;
            }
        }
        next(context)
    }

    fn name(&self) -> &str {
        "preparing"
    }
}

struct Activation;

impl ResolveMiddleware for Activation {
    fn phase(&self) -> PipelinePhase {
        PipelinePhase::Activation
    }

    fn execute(&self, context: &mut ResolveRequestContext<'_>, next: Next<'_>) -> DiResult<()> {
        let registration = context.registration.clone();
        let resolver = context.resolve_context();
        let mut instance = registration
            .activator()
            .activate(&resolver, &context.parameters)?;

        let hooks = registration.hooks();
        for hook in &hooks.activating {
            let mut event = ActivatingEvent {
                context: &resolver,
                registration: &registration,
                parameters: &context.parameters,
                instance: &mut instance,
            };
            hook(&mut event)?;
        }

        if registration.ownership() == InstanceOwnership::OwnedByScope {
            if let Some(entry) = registration.release_entry(&instance) {
                context.scope.track_disposable(entry)?;
            }
        }

        for hook in &hooks.activated {
            hook(&ActivatedEvent {
                context: &resolver,
                registration: &registration,
                parameters: &context.parameters,
                instance: &instance,
            })?;
        }

        context.instance = Some(instance);
        next(context)
    }

    fn name(&self) -> &str {
        "activation"
    }
}

fn built_in() -> [Arc<dyn ResolveMiddleware>; 6] {
    [
        Arc::new(RequestStart),
        Arc::new(ScopeSelection),
        Arc::new(Decoration),
        Arc::new(Sharing),
        Arc::new(Preparing),
        Arc::new(Activation),
    ]
}

static BUILT_IN: Lazy<[Arc<dyn ResolveMiddleware>; 6]> = Lazy::new(built_in);

/// The ordered stages one registration's requests run through.
pub struct ResolvePipeline {
    stages: Vec<Arc<dyn ResolveMiddleware>>,
}

impl ResolvePipeline {
    /// Built-in stages merged with `custom`, ordered by phase.
    ///
    /// Custom stages of one phase keep their relative order.
    pub fn build(custom: &[Arc<dyn ResolveMiddleware>]) -> Self {
        let mut stages = Vec::with_capacity(BUILT_IN.len() + custom.len());
        for built_in in BUILT_IN.iter() {
            let phase = built_in.phase();
            let user = custom.iter().filter(|stage| stage.phase() == phase).cloned();
            if phase == PipelinePhase::ResolveRequestStart {
                stages.push(built_in.clone());
                stages.extend(user);
            } else {
                stages.extend(user);
                stages.push(built_in.clone());
            }
        }
        Self { stages }
    }

    /// Runs every stage against `context`.
    pub fn invoke(&self, context: &mut ResolveRequestContext<'_>) -> DiResult<()> {
        self.invoke_at(0, context)
    }

    fn invoke_at(&self, index: usize, context: &mut ResolveRequestContext<'_>) -> DiResult<()> {
        match self.stages.get(index) {
            Some(stage) => stage.execute(context, &mut |context| self.invoke_at(index + 1, context)),
            None => Ok(()),
        }
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }
}

impl fmt::Debug for ResolvePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stage_names()).finish()
    }
}

//! # Spawning
//!
//! The spawn facade builds an actor under a live parent and hands back its
//! reference — never the actor itself. A parent is either the
//! [`ActorSystem`] (for top-level actors) or another actor's
//! [`ActorRef`](crate::ActorRef); both resolve through the system-map
//! guard, so spawning under a stopped parent fails loudly.
//!
//! [`Props`] carries everything about an actor that isn't its behavior:
//! its name, its initial state (a value or an async function — exactly one,
//! by construction), its supervision policy, the idle-shutdown window, and
//! the `after_stop` hook.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::error;

use crate::actor::{ActorCell, AfterStopFn, Cell, FaultMessage, InitFn};
use crate::behavior::Behavior;
use crate::context::ActorContext;
use crate::error::{ActorError, Fault};
use crate::reference::{ActorRef, UntypedRef};
use crate::schedule::Macrotask;
use crate::supervision::{box_policy, resume_policy, Decision, PolicyFn, SupervisionEvent};
use crate::system::ActorSystem;

/// Everything about an actor except its behavior.
pub struct Props<S, M> {
    pub(crate) name: Option<String>,
    pub(crate) shutdown_after: Option<Duration>,
    pub(crate) on_crash: Option<PolicyFn<M>>,
    pub(crate) init: InitFn<S, M>,
    pub(crate) init_ready: bool,
    pub(crate) after_stop: Option<AfterStopFn<S, M>>,
}

impl<S, M> Props<S, M>
where
    S: Clone + Send + 'static,
    M: Send + Sync + 'static,
{
    /// Props whose initial state is a plain value. Each (re)initialization
    /// starts from a fresh clone of it.
    pub fn with_state(state: S) -> Self
    where
        S: Sync,
    {
        Self {
            name: None,
            shutdown_after: None,
            on_crash: None,
            init: Box::new(move |_ctx| {
                let state = state.clone();
                async move { Ok(state) }.boxed()
            }),
            init_ready: true,
            after_stop: None,
        }
    }

    /// Props whose initial state comes from an async function, invoked
    /// with a fresh context at spawn and again on every reset. Until it
    /// resolves, no message reaches the behavior.
    pub fn with_state_fn<F, Fut>(init: F) -> Self
    where
        F: Fn(ActorContext<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, Fault>> + Send + 'static,
    {
        Self {
            name: None,
            shutdown_after: None,
            on_crash: None,
            init: Box::new(move |ctx| init(ctx).boxed()),
            init_ready: false,
            after_stop: None,
        }
    }

    /// An explicit name, unique among the parent's children. Spawning a
    /// second child with the same name fails. Without one, an opaque
    /// random token is assigned.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Self-stop after this long with an empty mailbox. The window resets
    /// on every dispatch; the delay is clamped to the engine's safe
    /// maximum.
    pub fn shutdown_after(mut self, delay: Duration) -> Self {
        self.shutdown_after = Some(delay);
        self
    }

    /// The supervision policy consulted when this actor faults. Defaults
    /// to escalating to the parent.
    pub fn on_crash<F, Fut>(mut self, policy: F) -> Self
    where
        F: Fn(SupervisionEvent<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Decision> + Send + 'static,
    {
        self.on_crash = Some(box_policy(policy));
        self
    }

    /// Runs once, asynchronously, after the actor stops — with the final
    /// state and a last context snapshot. Failures in the hook are
    /// swallowed.
    pub fn after_stop<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(Option<S>, ActorContext<M>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.after_stop = Some(Box::new(move |state, ctx| hook(state, ctx).boxed()));
        self
    }
}

impl<M> Props<(), M>
where
    M: Send + Sync + 'static,
{
    /// Props for an actor that keeps no state of its own.
    pub fn stateless() -> Self {
        Self::with_state(())
    }
}

/// A resolved parent: the shared system plus the parent's live cell.
/// Opaque — obtained only through [`SpawnParent`].
pub struct ParentHandle {
    pub(crate) shared: Arc<crate::system::SystemShared>,
    pub(crate) cell: Arc<dyn Cell>,
}

/// Anything an actor can be spawned under: the system root or a live
/// actor.
pub trait SpawnParent {
    #[doc(hidden)]
    fn parent_handle(&self) -> Result<ParentHandle, ActorError>;
}

impl SpawnParent for ActorSystem {
    fn parent_handle(&self) -> Result<ParentHandle, ActorError> {
        self.root_parent_handle()
    }
}

impl<M: Send + Sync + 'static> SpawnParent for ActorRef<M> {
    fn parent_handle(&self) -> Result<ParentHandle, ActorError> {
        let shared = self.system.upgrade().ok_or(ActorError::SystemDown)?;
        let cell = shared.apply_or_stopped(self.id, &self.path, Ok)?;
        Ok(ParentHandle { shared, cell })
    }
}

/// Spawns a stateful actor under `parent` and returns its reference.
pub fn spawn<P, B, S, M>(parent: &P, behavior: B, props: Props<S, M>) -> Result<ActorRef<M>, ActorError>
where
    P: SpawnParent + ?Sized,
    B: Behavior<S, M>,
    S: Clone + Send + 'static,
    M: Send + Sync + 'static,
{
    let ParentHandle { shared, cell } = parent.parent_handle()?;
    ActorCell::spawn_under(&shared, &cell, Box::new(behavior), props)
}

/// Spawns a stateless actor: `handler` runs in its own turn per message,
/// independently of the actor's drain loop.
///
/// The actor itself carries a fixed resume policy (a policy set on
/// `props` is ignored). A handler fault is routed back to this actor's
/// fault path through the system map; if the actor is no longer resident
/// by then, the fault is logged loudly and dropped.
pub fn spawn_stateless<P, F, Fut, M>(
    parent: &P,
    handler: F,
    props: Props<(), M>,
) -> Result<ActorRef<M>, ActorError>
where
    P: SpawnParent + ?Sized,
    F: Fn(Arc<M>, ActorContext<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    M: Send + Sync + 'static,
{
    let handler = Arc::new(handler);
    let behavior = move |_state: (), message: Arc<M>, ctx: ActorContext<M>| {
        let handler = handler.clone();
        async move {
            let owner = ctx.self_ref().untyped();
            let fault_message: FaultMessage = message.clone();
            Macrotask::spawn(async move {
                let outcome = AssertUnwindSafe((*handler)(message, ctx)).catch_unwind().await;
                let fault = match outcome {
                    Ok(Ok(())) => return,
                    Ok(Err(fault)) => fault,
                    Err(payload) => Fault::from_panic(payload),
                };
                route_stateless_fault(owner, fault_message, fault).await;
            });
            Ok(())
        }
    };
    let props = Props {
        on_crash: Some(box_policy(resume_policy::<M>)),
        ..props
    };
    spawn(parent, behavior, props)
}

async fn route_stateless_fault(owner: UntypedRef, message: FaultMessage, fault: Fault) {
    match owner.locate() {
        Ok(cell) => cell.handle_fault(Some(message), fault, None).await,
        Err(_) => {
            error!(
                path = %owner.path(), fault = %fault,
                "stateless handler faulted after its actor left the system"
            );
        }
    }
}

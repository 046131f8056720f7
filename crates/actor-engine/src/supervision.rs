//! # Supervision
//!
//! When user code faults — a behavior returns `Err` or panics, or an
//! initial-state function fails — the actor's supervision policy decides
//! what happens next. A policy is a pure async mapping from a
//! [`SupervisionEvent`] to a [`Decision`]; the engine applies the decision.
//!
//! Faults flow *up*: with the default policy ([`escalate_policy`]) the same
//! fault is delegated to the parent, whose own policy then runs with the
//! faulting child attached to the event. A fault that escalates past every
//! ancestor reaches the system root, which logs it loudly and stops the
//! faulting subtree.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::ActorContext;
use crate::error::Fault;
use crate::reference::UntypedRef;

/// The fate of a faulting actor, chosen by its supervision policy.
///
/// "This actor" is the actor whose policy ran — for an escalated fault that
/// is the parent, with the faulting child identified on the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Stop this actor.
    Stop,
    /// Stop this actor and all of its siblings.
    StopAll,
    /// Stop the faulting child. With no child on the event, the fault
    /// escalates instead.
    StopChild,
    /// Stop every child of this actor.
    StopAllChildren,
    /// Continue — drain the next queued message.
    Resume,
    /// Stop all children, rerun state initialization, then resume.
    /// The mailbox is preserved.
    Reset,
    /// Reset this actor and all of its siblings.
    ResetAll,
    /// Reset the faulting child. With no child on the event, the fault
    /// escalates instead.
    ResetChild,
    /// Reset every child of this actor.
    ResetAllChildren,
    /// Delegate the same fault to the parent.
    Escalate,
}

/// Everything a policy gets to look at before deciding.
pub struct SupervisionEvent<M> {
    /// The message whose processing faulted, if any. `None` for faults
    /// raised during state initialization. Untyped because escalated
    /// faults cross actors with different message types.
    pub message: Option<Arc<dyn Any + Send + Sync>>,
    /// The fault itself.
    pub fault: Fault,
    /// A context snapshot for the deciding actor.
    pub context: ActorContext<M>,
    /// The faulting child, present when the fault arrived by escalation.
    pub child: Option<UntypedRef>,
}

impl<M> SupervisionEvent<M> {
    /// Downcasts the faulting message, when one is attached and the type
    /// matches.
    pub fn message_as<T: 'static>(&self) -> Option<&T> {
        self.message.as_deref().and_then(|m| m.downcast_ref())
    }
}

pub(crate) type PolicyFn<M> =
    Box<dyn Fn(SupervisionEvent<M>) -> BoxFuture<'static, Decision> + Send + Sync>;

pub(crate) fn box_policy<M, F, Fut>(policy: F) -> PolicyFn<M>
where
    F: Fn(SupervisionEvent<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Decision> + Send + 'static,
{
    Box::new(move |event| policy(event).boxed())
}

/// The library default: delegate the fault to the parent.
pub async fn escalate_policy<M>(_event: SupervisionEvent<M>) -> Decision {
    Decision::Escalate
}

/// The fixed policy of stateless actors: drop the fault and keep draining.
pub async fn resume_policy<M>(_event: SupervisionEvent<M>) -> Decision {
    Decision::Resume
}

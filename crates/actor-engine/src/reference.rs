//! # References
//!
//! Actors are never handed out directly — callers hold opaque references
//! and every operation goes through the system map, which resolves the
//! reference to the live actor or fails. A reference is therefore safe to
//! keep across the target's whole lifecycle: once the actor stops, every
//! operation on the reference reports it instead of touching stale state.
//!
//! Three flavors:
//!
//! - [`ActorRef<M>`] — the typed handle returned by `spawn`; dispatch,
//!   query, stop.
//! - [`UntypedRef`] — a type-erased handle, used where references cross
//!   message types (a context's `parent` and `children`, the faulting
//!   child on a supervision event).
//! - [`QueryRef<R>`] — the temporary reply reference carried inside a
//!   query message; resolving it completes the query.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Weak;
use std::time::Duration;

use crate::actor::{ActorId, Cell};
use crate::error::{ActorError, Fault};
use crate::path::ActorPath;
use crate::schedule::clamp_delay;
use crate::system::SystemShared;

/// A typed handle on a live actor. Cheap to clone and share across tasks.
pub struct ActorRef<M> {
    pub(crate) id: ActorId,
    pub(crate) path: ActorPath,
    pub(crate) system: Weak<SystemShared>,
    pub(crate) _marker: PhantomData<fn(M) -> M>,
}

impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            path: self.path.clone(),
            system: self.system.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M> fmt::Debug for ActorRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorRef({})", self.path)
    }
}

impl<M> PartialEq for ActorRef<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for ActorRef<M> {}

impl<M: Send + Sync + 'static> ActorRef<M> {
    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    /// The actor's name among its siblings.
    pub fn name(&self) -> &str {
        self.path.name()
    }

    /// Enqueues a message. Fire-and-forget: `Ok` acknowledges delivery to
    /// the mailbox, not processing.
    pub fn dispatch(&self, message: M) -> Result<(), ActorError> {
        let shared = self.system.upgrade().ok_or(ActorError::SystemDown)?;
        shared.apply_or_stopped(self.id, &self.path, |cell| {
            cell.dispatch_any(Box::new(message))
        })
    }

    /// Asks the actor a question and awaits the reply.
    ///
    /// `factory` builds the outgoing message around a fresh [`QueryRef`];
    /// whichever actor ends up holding that reference resolves it to
    /// complete the query. If nothing settles it within `timeout`
    /// (clamped to the engine's safe maximum), the returned future fails
    /// with [`ActorError::QueryTimeout`]. Timing out does not cancel any
    /// in-flight work on the target.
    pub async fn query<R, F>(&self, factory: F, timeout: Duration) -> Result<R, ActorError>
    where
        R: Send + 'static,
        F: FnOnce(QueryRef<R>) -> M,
    {
        let shared = self.system.upgrade().ok_or(ActorError::SystemDown)?;
        let timeout = clamp_delay(timeout);

        // The reply reference is registered before the message goes out, so
        // a handler can never observe an unregistered reference.
        let (temp_id, receiver) = shared.add_temp_reference();
        let reply_ref = QueryRef {
            id: temp_id,
            system: self.system.clone(),
            _marker: PhantomData,
        };
        let message = factory(reply_ref);

        if let Err(e) = self.dispatch(message) {
            shared.remove_temp_reference(temp_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(Ok(reply))) => {
                shared.remove_temp_reference(temp_id);
                reply
                    .downcast::<R>()
                    .map(|boxed| *boxed)
                    .map_err(|_| ActorError::ReplyType)
            }
            Ok(Ok(Err(fault))) => {
                shared.remove_temp_reference(temp_id);
                Err(ActorError::QueryRejected(fault))
            }
            Ok(Err(_)) => {
                shared.remove_temp_reference(temp_id);
                Err(ActorError::ReplyDropped)
            }
            Err(_) => {
                shared.remove_temp_reference(temp_id);
                Err(ActorError::QueryTimeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Stops the actor: children are stopped recursively, the parent is
    /// notified, and the `after_stop` hook runs once.
    pub fn stop(&self) -> Result<(), ActorError> {
        let shared = self.system.upgrade().ok_or(ActorError::SystemDown)?;
        shared.apply_or_stopped(self.id, &self.path, |cell| {
            cell.stop();
            Ok(())
        })
    }

    /// This reference with the message type erased.
    pub fn untyped(&self) -> UntypedRef {
        UntypedRef {
            id: self.id,
            path: self.path.clone(),
            system: self.system.clone(),
        }
    }
}

/// A reference with the message type erased.
#[derive(Clone)]
pub struct UntypedRef {
    pub(crate) id: ActorId,
    pub(crate) path: ActorPath,
    pub(crate) system: Weak<SystemShared>,
}

impl fmt::Debug for UntypedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UntypedRef({})", self.path)
    }
}

impl PartialEq for UntypedRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for UntypedRef {}

impl UntypedRef {
    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    /// Dispatches a message whose concrete type must match the target's
    /// message type, checked at delivery.
    pub fn dispatch_any(&self, message: impl Any + Send) -> Result<(), ActorError> {
        let shared = self.system.upgrade().ok_or(ActorError::SystemDown)?;
        shared.apply_or_stopped(self.id, &self.path, |cell| {
            cell.dispatch_any(Box::new(message))
        })
    }

    pub fn stop(&self) -> Result<(), ActorError> {
        let shared = self.system.upgrade().ok_or(ActorError::SystemDown)?;
        shared.apply_or_stopped(self.id, &self.path, |cell| {
            cell.stop();
            Ok(())
        })
    }

    /// Reinterprets this reference with a concrete message type. No check
    /// happens here — a wrong guess surfaces as
    /// [`ActorError::MessageType`] at dispatch time.
    pub fn typed<M: Send + Sync + 'static>(&self) -> ActorRef<M> {
        ActorRef {
            id: self.id,
            path: self.path.clone(),
            system: self.system.clone(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn locate(&self) -> Result<std::sync::Arc<dyn Cell>, ActorError> {
        let shared = self.system.upgrade().ok_or(ActorError::SystemDown)?;
        shared.apply_or_stopped(self.id, &self.path, Ok)
    }
}

/// The temporary reply reference carried inside a query message.
///
/// Scoped to the system's correlation table: resolving or rejecting it
/// settles the query's deferral and removes the table entry, exactly once.
/// Further settles are no-ops and report `false`.
pub struct QueryRef<R> {
    pub(crate) id: u64,
    pub(crate) system: Weak<SystemShared>,
    pub(crate) _marker: PhantomData<fn(R)>,
}

impl<R> Clone for QueryRef<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            system: self.system.clone(),
            _marker: PhantomData,
        }
    }
}

impl<R> fmt::Debug for QueryRef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryRef(#{})", self.id)
    }
}

impl<R: Send + 'static> QueryRef<R> {
    /// Completes the query with a reply. Returns `false` when the query
    /// already settled (a reply arrived, or it timed out).
    pub fn resolve(&self, value: R) -> bool {
        match self.system.upgrade() {
            Some(shared) => shared.settle_temp_reference(self.id, Ok(Box::new(value))),
            None => false,
        }
    }

    /// Fails the query with a fault instead of a reply.
    pub fn reject(&self, fault: Fault) -> bool {
        match self.system.upgrade() {
            Some(shared) => shared.settle_temp_reference(self.id, Err(fault)),
            None => false,
        }
    }
}

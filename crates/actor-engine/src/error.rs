//! # Engine Errors
//!
//! This module defines the common error types used throughout the actor engine.
//! By centralizing error definitions, we ensure consistent error handling across
//! references, the spawn facade, and the system map.
//!
//! Two kinds of failure live here and they are deliberately distinct:
//!
//! - [`ActorError`] — usage and resolution errors reported to the *caller* of an
//!   engine operation (dispatching to a stopped actor, duplicate child names,
//!   query timeouts). These never travel through the supervision tree.
//! - [`Fault`] — a failure raised by user code (a behavior, an initial-state
//!   function, a stateless handler). Faults never surface to the dispatcher;
//!   they flow up the tree to supervision policies.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::path::ActorPath;

/// Errors that can occur within the actor engine itself.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    /// The target actor has been stopped; no further work is accepted.
    #[error("actor {0} is stopped")]
    Stopped(ActorPath),
    /// The reference no longer resolves to a live actor in the system map.
    #[error("no live actor for reference {0}")]
    Unresolvable(ActorPath),
    /// A sibling with the same name is already registered under this parent.
    #[error("a child named '{name}' already exists under {parent}")]
    DuplicateName { parent: ActorPath, name: String },
    /// The query deferral was not resolved within the supplied timeout.
    #[error("query timed out after {0} ms")]
    QueryTimeout(u64),
    /// The query deferral was explicitly rejected by a responder.
    #[error("query was rejected: {0}")]
    QueryRejected(Fault),
    /// The responder settled the query with a value of an unexpected type.
    #[error("query reply could not be downcast to the requested type")]
    ReplyType,
    /// The reply channel was dropped without the deferral being settled.
    #[error("query reply channel closed before a reply arrived")]
    ReplyDropped,
    /// An untyped message could not be downcast to the actor's message type.
    #[error("message could not be downcast to the actor's message type")]
    MessageType,
    /// The owning [`ActorSystem`](crate::ActorSystem) has been dropped.
    #[error("actor system has been dropped")]
    SystemDown,
}

/// A failure raised by user code, travelling through the supervision tree.
///
/// Faults are cheap to clone: escalation hands the same fault to each level
/// of the tree in turn. Construct one from any error via [`Fault::error`],
/// or from plain text with [`Fault::msg`]. Behavior panics are captured by
/// the engine and arrive at policies as panic faults.
#[derive(Clone)]
pub struct Fault {
    inner: Arc<FaultKind>,
}

enum FaultKind {
    Error(Box<dyn std::error::Error + Send + Sync>),
    Message(String),
    Panic(String),
}

impl Fault {
    /// A fault carrying a plain text description.
    pub fn msg(text: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(FaultKind::Message(text.into())),
        }
    }

    /// A fault wrapping a concrete error value.
    pub fn error(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(FaultKind::Error(Box::new(err))),
        }
    }

    /// Builds a fault from a captured panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let text = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            inner: Arc::new(FaultKind::Panic(text)),
        }
    }

    /// True when this fault was captured from a panic rather than returned.
    pub fn is_panic(&self) -> bool {
        matches!(*self.inner, FaultKind::Panic(_))
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner {
            FaultKind::Error(e) => write!(f, "{e}"),
            FaultKind::Message(m) => write!(f, "{m}"),
            FaultKind::Panic(p) => write!(f, "panic: {p}"),
        }
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fault({self})")
    }
}

impl From<&str> for Fault {
    fn from(text: &str) -> Self {
        Fault::msg(text)
    }
}

impl From<String> for Fault {
    fn from(text: String) -> Self {
        Fault::msg(text)
    }
}

//! The context handed to behavior code.
//!
//! A context is a snapshot taken at the start of each behavior invocation
//! (and again for initialization, supervision, and the `after_stop` hook).
//! The `children` mapping is a copy — mutating it does not affect the
//! engine's bookkeeping. The mailbox probe reads through to the live
//! mailbox and is intended for inspection only.

use std::collections::HashMap;
use std::sync::Weak;

use crate::actor::Cell;
use crate::path::ActorPath;
use crate::reference::{ActorRef, UntypedRef};

/// What a behavior invocation gets to see of its own actor.
pub struct ActorContext<M> {
    pub(crate) self_ref: ActorRef<M>,
    pub(crate) parent: Option<UntypedRef>,
    pub(crate) children: HashMap<String, UntypedRef>,
    pub(crate) mailbox: MailboxProbe,
}

impl<M> Clone for ActorContext<M> {
    fn clone(&self) -> Self {
        Self {
            self_ref: self.self_ref.clone(),
            parent: self.parent.clone(),
            children: self.children.clone(),
            mailbox: self.mailbox.clone(),
        }
    }
}

impl<M> ActorContext<M> {
    /// The actor's own reference — e.g. for self-dispatch.
    pub fn self_ref(&self) -> &ActorRef<M> {
        &self.self_ref
    }

    /// The parent's reference. `None` when the parent is the system root.
    pub fn parent(&self) -> Option<&UntypedRef> {
        self.parent.as_ref()
    }

    pub fn path(&self) -> &ActorPath {
        &self.self_ref.path
    }

    pub fn name(&self) -> &str {
        self.self_ref.path.name()
    }

    /// A snapshot of the child references, keyed by child name.
    pub fn children(&self) -> &HashMap<String, UntypedRef> {
        &self.children
    }

    /// A read-only probe into the actor's live mailbox.
    pub fn mailbox(&self) -> &MailboxProbe {
        &self.mailbox
    }
}

/// Reads pending-message counts off a live mailbox. Reports zero once the
/// actor is gone.
#[derive(Clone)]
pub struct MailboxProbe {
    pub(crate) cell: Weak<dyn Cell>,
}

impl MailboxProbe {
    pub fn len(&self) -> usize {
        self.cell.upgrade().map(|c| c.mailbox_len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

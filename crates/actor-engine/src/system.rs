//! # The Actor System
//!
//! The system is the anchor of the tree: it holds the root cell, the
//! process-wide map from reference to live actor, and the correlation
//! table pairing temporary query references with their deferrals.
//!
//! The engine touches actors only through [`SystemShared::apply_or_stopped`]
//! — the one atomic unit that resolves a reference to a live, non-stopped
//! actor and acts on it, or fails with a well-defined error.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::actor::{ActorId, AnyMessage, Cell, FaultMessage};
use crate::deferral::{Deferral, Settled};
use crate::error::{ActorError, Fault};
use crate::path::ActorPath;
use crate::reference::UntypedRef;
use crate::spawn::ParentHandle;

/// A query reply in type-erased transit.
pub(crate) type AnyReply = Box<dyn Any + Send>;

pub(crate) struct SystemShared {
    name: String,
    cells: Mutex<HashMap<ActorId, Arc<dyn Cell>>>,
    temp_refs: Mutex<HashMap<u64, Deferral<AnyReply>>>,
    next_actor_id: AtomicU64,
    next_temp_id: AtomicU64,
    stopped: AtomicBool,
    root: OnceLock<Arc<RootCell>>,
}

impl SystemShared {
    pub(crate) fn next_actor_id(&self) -> ActorId {
        self.next_actor_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register(&self, cell: Arc<dyn Cell>) {
        self.lock_cells().insert(cell.id(), cell);
    }

    pub(crate) fn deregister(&self, id: ActorId) {
        self.lock_cells().remove(&id);
    }

    /// Resolves a reference to its live actor and acts on it; fails when
    /// the reference no longer resolves or the actor has stopped.
    pub(crate) fn apply_or_stopped<R>(
        &self,
        id: ActorId,
        path: &ActorPath,
        f: impl FnOnce(Arc<dyn Cell>) -> Result<R, ActorError>,
    ) -> Result<R, ActorError> {
        let cell = self.lock_cells().get(&id).cloned();
        match cell {
            Some(cell) if !cell.is_stopped() => f(cell),
            Some(_) => Err(ActorError::Stopped(path.clone())),
            None => Err(ActorError::Unresolvable(path.clone())),
        }
    }

    /// Registers a fresh temporary reference and returns its id plus the
    /// receiver observing the paired deferral.
    pub(crate) fn add_temp_reference(&self) -> (u64, oneshot::Receiver<Settled<AnyReply>>) {
        let id = self.next_temp_id.fetch_add(1, Ordering::Relaxed);
        let (deferral, receiver) = Deferral::new();
        self.lock_temp().insert(id, deferral);
        (id, receiver)
    }

    pub(crate) fn remove_temp_reference(&self, id: u64) {
        self.lock_temp().remove(&id);
    }

    /// Settles the deferral behind a temporary reference and removes the
    /// table entry, in one step. `false` when the reference is gone —
    /// the query already settled.
    pub(crate) fn settle_temp_reference(&self, id: u64, outcome: Settled<AnyReply>) -> bool {
        let entry = self.lock_temp().remove(&id);
        match entry {
            Some(deferral) => match outcome {
                Ok(value) => deferral.resolve(value),
                Err(fault) => deferral.reject(fault),
            },
            None => false,
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn root_cell(&self) -> Arc<RootCell> {
        self.root.get().expect("root cell is set at construction").clone()
    }

    fn root_path(&self) -> &ActorPath {
        &self.root.get().expect("root cell is set at construction").path
    }

    fn lock_cells(&self) -> std::sync::MutexGuard<'_, HashMap<ActorId, Arc<dyn Cell>>> {
        self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_temp(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Deferral<AnyReply>>> {
        self.temp_refs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The root of the supervision tree.
///
/// It owns the top-level actors and is the final stop for escalation: a
/// fault no policy handled is logged loudly and the faulting subtree is
/// stopped.
pub(crate) struct RootCell {
    path: ActorPath,
    system: Weak<SystemShared>,
    inner: Mutex<RootInner>,
}

struct RootInner {
    children: HashMap<String, Arc<dyn Cell>>,
    child_refs: HashMap<String, UntypedRef>,
}

impl RootCell {
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, RootInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Cell for RootCell {
    fn id(&self) -> ActorId {
        0
    }

    fn path(&self) -> &ActorPath {
        &self.path
    }

    fn is_root(&self) -> bool {
        true
    }

    fn is_stopped(&self) -> bool {
        self.system.upgrade().map(|s| s.is_stopped()).unwrap_or(true)
    }

    fn dispatch_any(self: Arc<Self>, _message: AnyMessage) -> Result<(), ActorError> {
        Err(ActorError::Unresolvable(self.path.clone()))
    }

    fn stop(self: Arc<Self>) {
        let Some(shared) = self.system.upgrade() else {
            return;
        };
        if shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let children: Vec<Arc<dyn Cell>> = {
            let mut inner = self.lock_inner();
            inner.child_refs.clear();
            inner.children.drain().map(|(_, child)| child).collect()
        };
        for child in children {
            child.stop();
        }
        info!(system = %self.path, "actor system stopped");
    }

    fn reset(self: Arc<Self>) {
        warn!(system = %self.path, "reset is not defined for the system root");
    }

    async fn handle_fault(
        self: Arc<Self>,
        _message: Option<FaultMessage>,
        fault: Fault,
        child: Option<Arc<dyn Cell>>,
    ) {
        match child {
            Some(child) => {
                error!(
                    child = %child.path(), fault = %fault,
                    "fault escalated to the system root; stopping the subtree"
                );
                child.stop();
            }
            None => error!(fault = %fault, "fault escalated to the system root"),
        }
    }

    fn child_spawned(&self, child: Arc<dyn Cell>) -> Result<(), ActorError> {
        let Some(shared) = self.system.upgrade() else {
            return Err(ActorError::SystemDown);
        };
        if shared.is_stopped() {
            return Err(ActorError::Stopped(self.path.clone()));
        }
        let mut inner = self.lock_inner();
        let name = child.path().name().to_string();
        if inner.children.contains_key(&name) {
            return Err(ActorError::DuplicateName {
                parent: self.path.clone(),
                name,
            });
        }
        inner.child_refs.insert(name.clone(), child.untyped_ref());
        inner.children.insert(name, child);
        Ok(())
    }

    fn child_stopped(&self, name: &str) {
        let mut inner = self.lock_inner();
        inner.children.remove(name);
        inner.child_refs.remove(name);
    }

    fn children(&self) -> Vec<Arc<dyn Cell>> {
        self.lock_inner().children.values().cloned().collect()
    }

    fn mailbox_len(&self) -> usize {
        0
    }

    fn untyped_ref(&self) -> UntypedRef {
        UntypedRef {
            id: 0,
            path: self.path.clone(),
            system: self.system.clone(),
        }
    }
}

/// An in-process actor system: the root of one supervision tree.
///
/// Cheap to clone — clones share the same tree. Dropping the last clone
/// tears the shared structures down, so keep the system alive for as long
/// as its actors should run.
#[derive(Clone)]
pub struct ActorSystem {
    pub(crate) shared: Arc<SystemShared>,
}

impl ActorSystem {
    /// A system with a generated name.
    pub fn new() -> Self {
        let token = uuid::Uuid::new_v4().simple().to_string();
        Self::with_name(&format!("system-{}", &token[..8]))
    }

    /// A system anchored at `/{name}`.
    pub fn with_name(name: &str) -> Self {
        let shared = Arc::new(SystemShared {
            name: name.to_string(),
            cells: Mutex::new(HashMap::new()),
            temp_refs: Mutex::new(HashMap::new()),
            // id 0 is the root
            next_actor_id: AtomicU64::new(1),
            next_temp_id: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
            root: OnceLock::new(),
        });
        let root = Arc::new(RootCell {
            path: ActorPath::root(name),
            system: Arc::downgrade(&shared),
            inner: Mutex::new(RootInner {
                children: HashMap::new(),
                child_refs: HashMap::new(),
            }),
        });
        let _ = shared.root.set(root);
        info!(system = name, "actor system started");
        Self { shared }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The root path, `/{name}`.
    pub fn path(&self) -> &ActorPath {
        self.shared.root_path()
    }

    /// Stops every top-level actor (and so, recursively, the whole tree)
    /// and refuses further spawns.
    pub fn stop(&self) {
        let root = self.shared.root_cell();
        root.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    pub(crate) fn root_parent_handle(&self) -> Result<ParentHandle, ActorError> {
        let root = self.shared.root_cell();
        if self.shared.is_stopped() {
            return Err(ActorError::Stopped(root.path.clone()));
        }
        Ok(ParentHandle {
            shared: self.shared.clone(),
            cell: root,
        })
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

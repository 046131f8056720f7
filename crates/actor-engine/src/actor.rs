//! # The Dispatch Engine
//!
//! `ActorCell` is the runtime half of an actor: it owns the state, the
//! mailbox, and the children, and drives the per-actor state machine.
//!
//! The discipline is strict and small:
//!
//! - `busy` governs execution — at most one behavior invocation is in
//!   flight per actor, ever. A dispatch either starts a run (idle actor)
//!   or appends to the mailbox (busy actor).
//! - Each run is a macrotask: control returns to the runtime between
//!   receiving a message and invoking the behavior, so timers and other
//!   actors interleave.
//! - When a run completes, the next mailbox entry is popped; when the
//!   mailbox drains, `busy` drops and the idle-shutdown timer (if
//!   configured) is re-armed.
//! - `stopped` is terminal and monotonic: no message, behavior run, or
//!   child spawn is accepted afterwards; the mailbox is abandoned.
//!
//! Faults (an `Err` or panic from user code) never reach the dispatcher.
//! They run through the actor's supervision policy, and the resulting
//! [`Decision`] is applied here — possibly recursing up the tree when the
//! decision is to escalate.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::behavior::Behavior;
use crate::context::{ActorContext, MailboxProbe};
use crate::error::{ActorError, Fault};
use crate::mailbox::{Envelope, Mailbox};
use crate::path::ActorPath;
use crate::reference::{ActorRef, UntypedRef};
use crate::schedule::{clamp_delay, Macrotask, Timer};
use crate::spawn::Props;
use crate::supervision::{box_policy, escalate_policy, Decision, PolicyFn, SupervisionEvent};
use crate::system::SystemShared;

pub(crate) type ActorId = u64;

/// A message in type-erased transit, before delivery downcasts it.
pub(crate) type AnyMessage = Box<dyn Any + Send>;

/// A faulting message as shown to supervision policies up the tree.
pub(crate) type FaultMessage = Arc<dyn Any + Send + Sync>;

pub(crate) type InitFn<S, M> =
    Box<dyn Fn(ActorContext<M>) -> BoxFuture<'static, Result<S, Fault>> + Send + Sync>;

pub(crate) type AfterStopFn<S, M> =
    Box<dyn FnOnce(Option<S>, ActorContext<M>) -> BoxFuture<'static, ()> + Send>;

/// The type-erased face of an actor, as stored in the system map and the
/// parent/child graph. Everything the supervision tree needs crosses this
/// trait; the typed machinery stays inside `ActorCell`.
#[async_trait]
pub(crate) trait Cell: Send + Sync + 'static {
    fn id(&self) -> ActorId;
    fn path(&self) -> &ActorPath;
    fn is_root(&self) -> bool {
        false
    }
    fn is_stopped(&self) -> bool;
    fn dispatch_any(self: Arc<Self>, message: AnyMessage) -> Result<(), ActorError>;
    fn stop(self: Arc<Self>);
    fn reset(self: Arc<Self>);
    async fn handle_fault(
        self: Arc<Self>,
        message: Option<FaultMessage>,
        fault: Fault,
        child: Option<Arc<dyn Cell>>,
    );
    fn child_spawned(&self, child: Arc<dyn Cell>) -> Result<(), ActorError>;
    fn child_stopped(&self, name: &str);
    fn children(&self) -> Vec<Arc<dyn Cell>>;
    fn mailbox_len(&self) -> usize;
    fn untyped_ref(&self) -> UntypedRef;
}

struct Inner<S, M> {
    mailbox: Mailbox<M>,
    state: Option<S>,
    busy: bool,
    stopped: bool,
    /// Set when a supervisor resumed or reset this actor while a run was
    /// still unwinding; the run's tail performs the deferred drain.
    resume_pending: bool,
    /// Bumped on every reset so a superseded init task or in-flight
    /// message run cannot write state over the reinitialized value.
    init_epoch: u64,
    parent: Option<Weak<dyn Cell>>,
    children: HashMap<String, Arc<dyn Cell>>,
    child_refs: HashMap<String, UntypedRef>,
    macrotask: Option<Macrotask>,
    idle_timer: Option<Timer>,
}

pub(crate) struct ActorCell<S, M>
where
    S: Clone + Send + 'static,
    M: Send + Sync + 'static,
{
    id: ActorId,
    path: ActorPath,
    system: Weak<SystemShared>,
    weak_self: Weak<ActorCell<S, M>>,
    behavior: Box<dyn Behavior<S, M>>,
    on_crash: PolicyFn<M>,
    shutdown_after: Option<Duration>,
    init: InitFn<S, M>,
    /// True when the init function wraps a plain seed value and resolves
    /// without suspending — such actors initialize inside `spawn` itself.
    init_ready: bool,
    after_stop: Mutex<Option<AfterStopFn<S, M>>>,
    /// Opens once state initialization succeeds; runs park on it so no
    /// user message reaches the behavior before init resolves.
    init_gate: watch::Sender<bool>,
    inner: Mutex<Inner<S, M>>,
}

impl<S, M> ActorCell<S, M>
where
    S: Clone + Send + 'static,
    M: Send + Sync + 'static,
{
    /// Constructs an actor under a live parent, registers it with the
    /// parent and the system map, and kicks off state initialization.
    /// The visible result is the reference, never the cell.
    pub(crate) fn spawn_under(
        shared: &Arc<SystemShared>,
        parent: &Arc<dyn Cell>,
        behavior: Box<dyn Behavior<S, M>>,
        props: Props<S, M>,
    ) -> Result<ActorRef<M>, ActorError> {
        if parent.is_stopped() {
            return Err(ActorError::Stopped(parent.path().clone()));
        }
        let name = props
            .name
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let path = parent.path().child(&name);
        let id = shared.next_actor_id();
        let (init_gate, _) = watch::channel(false);
        let on_crash = props
            .on_crash
            .unwrap_or_else(|| box_policy(escalate_policy::<M>));

        let cell = Arc::new_cyclic(|weak_self| ActorCell {
            id,
            path: path.clone(),
            system: Arc::downgrade(shared),
            weak_self: weak_self.clone(),
            behavior,
            on_crash,
            shutdown_after: props.shutdown_after.map(clamp_delay),
            init: props.init,
            init_ready: props.init_ready,
            after_stop: Mutex::new(props.after_stop),
            init_gate,
            inner: Mutex::new(Inner {
                mailbox: Mailbox::new(),
                state: None,
                busy: false,
                stopped: false,
                resume_pending: false,
                init_epoch: 0,
                parent: Some(Arc::downgrade(parent)),
                children: HashMap::new(),
                child_refs: HashMap::new(),
                macrotask: None,
                idle_timer: None,
            }),
        });

        // Eager sibling-name check: registration with the parent fails
        // loudly on collision, before the system map sees the actor.
        parent.child_spawned(cell.clone())?;
        shared.register(cell.clone());
        cell.start_init();
        {
            let mut inner = cell.lock_inner();
            cell.arm_idle_timer(&mut inner);
        }
        info!(path = %cell.path, "actor spawned");

        Ok(ActorRef {
            id,
            path,
            system: Arc::downgrade(shared),
            _marker: PhantomData,
        })
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner<S, M>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A method only runs while some `Arc` holds the cell.
    fn strong(&self) -> Arc<Self> {
        self.weak_self
            .upgrade()
            .expect("live cell has at least one strong reference")
    }

    fn make_ref(&self) -> ActorRef<M> {
        ActorRef {
            id: self.id,
            path: self.path.clone(),
            system: self.system.clone(),
            _marker: PhantomData,
        }
    }

    fn context_locked(&self, inner: &Inner<S, M>) -> ActorContext<M> {
        let parent = inner
            .parent
            .as_ref()
            .and_then(|weak| weak.upgrade())
            .filter(|p| !p.is_root())
            .map(|p| p.untyped_ref());
        let probe: Weak<dyn Cell> = self.weak_self.clone();
        ActorContext {
            self_ref: self.make_ref(),
            parent,
            children: inner.child_refs.clone(),
            mailbox: MailboxProbe { cell: probe },
        }
    }

    fn context(&self) -> ActorContext<M> {
        let inner = self.lock_inner();
        self.context_locked(&inner)
    }

    // --- state initialization ---

    fn start_init(&self) {
        self.init_gate.send_replace(false);
        if self.init_ready {
            // a plain seed value lands before spawn (or reset) returns
            let ctx = self.context();
            if let Some(Ok(state)) = (self.init)(ctx).now_or_never() {
                let mut inner = self.lock_inner();
                if inner.stopped {
                    return;
                }
                inner.state = Some(state);
                drop(inner);
                self.init_gate.send_replace(true);
                return;
            }
        }
        let cell = self.strong();
        Macrotask::spawn(async move { cell.run_init().await });
    }

    async fn run_init(self: Arc<Self>) {
        let epoch = self.lock_inner().init_epoch;
        let ctx = self.context();
        let outcome = AssertUnwindSafe((self.init)(ctx)).catch_unwind().await;
        match outcome {
            Ok(Ok(state)) => {
                {
                    let mut inner = self.lock_inner();
                    if inner.stopped || inner.init_epoch != epoch {
                        return;
                    }
                    inner.state = Some(state);
                }
                self.init_gate.send_replace(true);
            }
            Ok(Err(fault)) => self.init_faulted(epoch, fault).await,
            Err(payload) => self.init_faulted(epoch, Fault::from_panic(payload)).await,
        }
    }

    async fn init_faulted(&self, epoch: u64, fault: Fault) {
        {
            let inner = self.lock_inner();
            if inner.stopped || inner.init_epoch != epoch {
                return;
            }
        }
        warn!(path = %self.path, fault = %fault, "state initialization failed");
        self.handle_fault_common(None, fault, None).await;
    }

    // --- dispatch and the run loop ---

    fn enqueue(&self, message: Arc<M>) -> Result<(), ActorError> {
        let mut inner = self.lock_inner();
        if inner.stopped {
            return Err(ActorError::Stopped(self.path.clone()));
        }
        if let Some(timer) = inner.idle_timer.take() {
            timer.cancel();
        }
        if inner.busy {
            inner.mailbox.push(Envelope { message });
            debug!(path = %self.path, pending = inner.mailbox.len(), "message queued");
        } else {
            debug!(path = %self.path, "message scheduled");
            self.schedule(&mut inner, message);
        }
        Ok(())
    }

    fn schedule(&self, inner: &mut Inner<S, M>, message: Arc<M>) {
        inner.busy = true;
        let cell = self.strong();
        inner.macrotask = Some(Macrotask::spawn(async move {
            cell.run_message(message).await;
        }));
    }

    async fn run_message(self: Arc<Self>, message: Arc<M>) {
        // Once the run has started it is no longer cancellable; stop()
        // only prevents runs that have not begun.
        self.lock_inner().macrotask = None;

        let mut gate = self.init_gate.subscribe();
        if gate.wait_for(|ready| *ready).await.is_err() {
            return;
        }
        if self.is_stopped() {
            return;
        }

        let ctx = self.context();
        // the epoch is read in the same critical section that claims the
        // state, so a later reset marks this run's result as stale
        let (state, snapshot, epoch) = {
            let mut inner = self.lock_inner();
            match inner.state.take() {
                Some(state) => {
                    let snapshot = state.clone();
                    (state, snapshot, inner.init_epoch)
                }
                None => {
                    // A reset tore initialization down between the gate
                    // opening and this run claiming the state. Requeue and
                    // wait for the new init to land.
                    inner.mailbox.unshift(Envelope { message });
                    return;
                }
            }
        };

        let outcome = {
            let fut = self.behavior.receive(state, message.clone(), ctx);
            AssertUnwindSafe(fut).catch_unwind().await
        };
        match outcome {
            Ok(Ok(next)) => {
                {
                    let mut inner = self.lock_inner();
                    if inner.stopped {
                        return;
                    }
                    // a reset superseded this run; its result belongs to
                    // the discarded incarnation
                    if inner.init_epoch == epoch {
                        inner.state = Some(next);
                    }
                }
                self.advance_finishing();
            }
            Ok(Err(fault)) => self.run_faulted(epoch, message, snapshot, fault).await,
            Err(payload) => {
                self.run_faulted(epoch, message, snapshot, Fault::from_panic(payload))
                    .await
            }
        }
    }

    async fn run_faulted(&self, epoch: u64, message: Arc<M>, snapshot: S, fault: Fault) {
        let superseded = {
            let mut inner = self.lock_inner();
            if inner.stopped {
                return;
            }
            if inner.init_epoch == epoch {
                // the faulting invocation must not be observable in the state
                if inner.state.is_none() {
                    inner.state = Some(snapshot);
                }
                false
            } else {
                true
            }
        };
        if superseded {
            // a reset already dealt with this actor; the fault belongs to
            // the discarded incarnation
            self.finish_faulted();
            return;
        }
        warn!(path = %self.path, fault = %fault, "behavior faulted");
        let message: FaultMessage = message;
        self.handle_fault_common(Some(message), fault, None).await;
        self.finish_faulted();
    }

    /// Drain request from outside the current run: a supervisor's `Resume`
    /// or the tail of a `Reset`. If a run is still unwinding, the drain is
    /// deferred to that run's tail.
    fn advance_external(&self) {
        let mut inner = self.lock_inner();
        if inner.stopped {
            return;
        }
        if inner.busy {
            inner.resume_pending = true;
            return;
        }
        self.pop_or_idle(&mut inner);
    }

    /// Tail of a successful run: pop the next message or go idle.
    fn advance_finishing(&self) {
        let mut inner = self.lock_inner();
        if inner.stopped {
            return;
        }
        inner.resume_pending = false;
        self.pop_or_idle(&mut inner);
    }

    /// Tail of a faulted run. Unless some decision along the way resumed
    /// or reset this actor, it stays busy — parked until a supervisor
    /// stops or resets it — so no further message is processed under a
    /// fault nobody handled.
    fn finish_faulted(&self) {
        let mut inner = self.lock_inner();
        if inner.stopped {
            return;
        }
        if inner.resume_pending {
            inner.resume_pending = false;
            self.pop_or_idle(&mut inner);
        }
    }

    fn pop_or_idle(&self, inner: &mut Inner<S, M>) {
        match inner.mailbox.shift() {
            Some(envelope) => self.schedule(inner, envelope.message),
            None => {
                inner.busy = false;
                self.arm_idle_timer(inner);
            }
        }
    }

    fn arm_idle_timer(&self, inner: &mut Inner<S, M>) {
        if inner.stopped || inner.busy {
            return;
        }
        let Some(delay) = self.shutdown_after else {
            return;
        };
        if let Some(old) = inner.idle_timer.take() {
            old.cancel();
        }
        let cell = self.strong();
        inner.idle_timer = Some(Timer::after(delay, async move {
            debug!(path = %cell.path, "idle shutdown");
            cell.stop_cell();
        }));
    }

    // --- fault handling ---

    async fn handle_fault_common(
        &self,
        message: Option<FaultMessage>,
        fault: Fault,
        child: Option<Arc<dyn Cell>>,
    ) {
        let event = SupervisionEvent {
            message: message.clone(),
            fault: fault.clone(),
            context: self.context(),
            child: child.as_ref().map(|c| c.untyped_ref()),
        };
        let decision = match AssertUnwindSafe((self.on_crash)(event)).catch_unwind().await {
            Ok(decision) => decision,
            Err(_) => {
                warn!(path = %self.path, "supervision policy panicked; escalating");
                Decision::Escalate
            }
        };
        debug!(path = %self.path, ?decision, "supervision decision");
        self.apply_decision(decision, message, fault, child).await;
    }

    async fn apply_decision(
        &self,
        decision: Decision,
        message: Option<FaultMessage>,
        fault: Fault,
        child: Option<Arc<dyn Cell>>,
    ) {
        match decision {
            Decision::Stop => self.stop_cell(),
            Decision::StopAll => {
                let peers = self.peers();
                if peers.is_empty() {
                    self.stop_cell();
                } else {
                    for peer in peers {
                        peer.stop();
                    }
                }
            }
            Decision::StopChild => match child {
                Some(child) => child.stop(),
                None => {
                    warn!(
                        path = %self.path,
                        "stop_child decision with no faulting child; escalating"
                    );
                    self.escalate_fault(message, fault).await;
                }
            },
            Decision::StopAllChildren => {
                for c in self.children_snapshot() {
                    c.stop();
                }
            }
            Decision::Resume => self.advance_external(),
            Decision::Reset => self.reset_cell(),
            Decision::ResetAll => {
                let peers = self.peers();
                if peers.is_empty() {
                    self.reset_cell();
                } else {
                    for peer in peers {
                        peer.reset();
                    }
                }
            }
            Decision::ResetChild => match child {
                Some(child) => child.reset(),
                None => {
                    warn!(
                        path = %self.path,
                        "reset_child decision with no faulting child; escalating"
                    );
                    self.escalate_fault(message, fault).await;
                }
            },
            Decision::ResetAllChildren => {
                for c in self.children_snapshot() {
                    c.reset();
                }
            }
            Decision::Escalate => self.escalate_fault(message, fault).await,
        }
    }

    /// Hands the fault to the parent's policy, with this actor attached
    /// as the faulting child.
    async fn escalate_fault(&self, message: Option<FaultMessage>, fault: Fault) {
        match self.parent_cell() {
            Some(parent) => {
                parent
                    .handle_fault(message, fault, Some(self.strong() as Arc<dyn Cell>))
                    .await
            }
            None => {
                error!(
                    path = %self.path, fault = %fault,
                    "fault escalated from an orphaned actor; stopping it"
                );
                self.stop_cell();
            }
        }
    }

    fn parent_cell(&self) -> Option<Arc<dyn Cell>> {
        let weak = self.lock_inner().parent.clone();
        weak.and_then(|w| w.upgrade())
    }

    /// This actor's siblings (itself included) as registered with the
    /// parent.
    fn peers(&self) -> Vec<Arc<dyn Cell>> {
        self.parent_cell().map(|p| p.children()).unwrap_or_default()
    }

    fn children_snapshot(&self) -> Vec<Arc<dyn Cell>> {
        self.lock_inner().children.values().cloned().collect()
    }

    // --- stop and reset ---

    fn stop_cell(&self) {
        let (ctx, state, parent, children, hook) = {
            let mut inner = self.lock_inner();
            if inner.stopped {
                return;
            }
            inner.stopped = true;
            let ctx = self.context_locked(&inner);
            if let Some(task) = inner.macrotask.take() {
                task.cancel();
            }
            if let Some(timer) = inner.idle_timer.take() {
                timer.cancel();
            }
            let parent = inner.parent.take();
            let children: Vec<Arc<dyn Cell>> =
                inner.children.drain().map(|(_, child)| child).collect();
            inner.child_refs.clear();
            let state = inner.state.take();
            let hook = match self.after_stop.lock() {
                Ok(mut slot) => slot.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            (ctx, state, parent, children, hook)
        };

        // release anything parked on the init gate so it observes the stop
        self.init_gate.send_replace(true);

        // the parent forgets this actor before its own children go down
        if let Some(parent) = parent.and_then(|weak| weak.upgrade()) {
            parent.child_stopped(self.path.name());
        }
        for child in children {
            child.stop();
        }
        if let Some(shared) = self.system.upgrade() {
            shared.deregister(self.id);
        }
        info!(path = %self.path, "actor stopped");

        // afterStop runs in its own turn, strictly after the actor is
        // terminal; its failures are not faults of a dead actor
        if let Some(hook) = hook {
            let path = self.path.clone();
            Macrotask::spawn(async move {
                if AssertUnwindSafe(hook(state, ctx)).catch_unwind().await.is_err() {
                    warn!(path = %path, "after_stop hook panicked");
                }
            });
        }
    }

    /// Stops every child, reruns state initialization, then resumes.
    /// The mailbox is preserved.
    fn reset_cell(&self) {
        let children = {
            let mut inner = self.lock_inner();
            if inner.stopped {
                return;
            }
            inner.init_epoch += 1;
            inner.state = None;
            let children: Vec<Arc<dyn Cell>> =
                inner.children.drain().map(|(_, child)| child).collect();
            inner.child_refs.clear();
            children
        };
        debug!(path = %self.path, "resetting");
        for child in children {
            child.stop();
        }
        self.start_init();
        self.advance_external();
    }
}

#[async_trait]
impl<S, M> Cell for ActorCell<S, M>
where
    S: Clone + Send + 'static,
    M: Send + Sync + 'static,
{
    fn id(&self) -> ActorId {
        self.id
    }

    fn path(&self) -> &ActorPath {
        &self.path
    }

    fn is_stopped(&self) -> bool {
        self.lock_inner().stopped
    }

    fn dispatch_any(self: Arc<Self>, message: AnyMessage) -> Result<(), ActorError> {
        let message = message
            .downcast::<M>()
            .map_err(|_| ActorError::MessageType)?;
        self.enqueue(Arc::from(message))
    }

    fn stop(self: Arc<Self>) {
        self.stop_cell();
    }

    fn reset(self: Arc<Self>) {
        self.reset_cell();
    }

    async fn handle_fault(
        self: Arc<Self>,
        message: Option<FaultMessage>,
        fault: Fault,
        child: Option<Arc<dyn Cell>>,
    ) {
        self.handle_fault_common(message, fault, child).await;
    }

    fn child_spawned(&self, child: Arc<dyn Cell>) -> Result<(), ActorError> {
        let mut inner = self.lock_inner();
        if inner.stopped {
            return Err(ActorError::Stopped(self.path.clone()));
        }
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
        debug!(path = %self.path, child = name, "child stopped");
    }

    fn children(&self) -> Vec<Arc<dyn Cell>> {
        self.lock_inner().children.values().cloned().collect()
    }

    fn mailbox_len(&self) -> usize {
        self.lock_inner().mailbox.len()
    }

    fn untyped_ref(&self) -> UntypedRef {
        UntypedRef {
            id: self.id,
            path: self.path.clone(),
            system: self.system.clone(),
        }
    }
}

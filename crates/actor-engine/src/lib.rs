//! # Actor Engine
//!
//! This crate provides an in-process **supervision-tree actor runtime**:
//! isolated stateful entities ("actors") that communicate solely by
//! asynchronous message passing, persist state across messages, spawn and
//! own children, and recover from faults via parent-directed supervision.
//!
//! ## Why the Actor Model?
//!
//! - **Isolated state** — no shared memory, no locks in user code
//! - **Message-passing concurrency** — sequential processing within each
//!   actor eliminates data races by construction
//! - **Supervision** — faults don't leak to callers; they flow *up* the
//!   tree to a policy that decides the faulting actor's fate
//!
//! ## Architecture Overview
//!
//! The engine separates concerns into three layers:
//!
//! 1. **Behavior Layer** ([`Behavior`]) — your logic: one message in, next
//!    state out. Any matching async closure qualifies.
//! 2. **Runtime Layer** — the dispatch engine: mailbox, at-most-one
//!    invocation in flight, lifecycle, fault handling. Internal; you never
//!    touch it directly.
//! 3. **Interface Layer** ([`ActorRef`]) — the typed handle every caller
//!    holds: `dispatch`, `query`, `stop`.
//!
//! ## Core Guarantees
//!
//! - Within one actor, messages are processed in dispatch order, one at a
//!   time to completion — including any `await`s your behavior makes.
//! - A behavior fault (an `Err` or a panic) never reaches the dispatcher;
//!   it runs through the actor's supervision policy, which picks one of
//!   the nine [`Decision`]s (the default escalates to the parent).
//! - A stopped actor is terminal: further dispatches and queries fail,
//!   children are stopped recursively, and the `after_stop` hook runs
//!   exactly once.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use actor_engine::{spawn, ActorContext, ActorSystem, Props, QueryRef};
//!
//! #[derive(Debug)]
//! enum CounterMsg {
//!     Add(i64),
//!     Get(QueryRef<i64>),
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let system = ActorSystem::new();
//!
//!     let counter = spawn(
//!         &system,
//!         |state: i64, msg: Arc<CounterMsg>, _ctx: ActorContext<CounterMsg>| async move {
//!             match &*msg {
//!                 CounterMsg::Add(n) => Ok(state + n),
//!                 CounterMsg::Get(reply) => {
//!                     reply.resolve(state);
//!                     Ok(state)
//!                 }
//!             }
//!         },
//!         Props::with_state(0).name("counter"),
//!     )?;
//!
//!     counter.dispatch(CounterMsg::Add(1))?;
//!     counter.dispatch(CounterMsg::Add(2))?;
//!     counter.dispatch(CounterMsg::Add(3))?;
//!
//!     // The query pattern: a temporary reply reference rides inside the
//!     // message; resolving it completes the query.
//!     let total = counter
//!         .query(CounterMsg::Get, Duration::from_millis(100))
//!         .await?;
//!     assert_eq!(total, 6);
//!
//!     system.stop();
//!     Ok(())
//! }
//! ```
//!
//! ## Supervision
//!
//! Every actor carries a policy (see [`Props::on_crash`]) mapping a
//! [`SupervisionEvent`] to a [`Decision`]: stop/reset/resume this actor,
//! its siblings, or its children — or escalate. Escalation hands the same
//! fault to the parent's policy with the faulting child attached; a fault
//! that escalates past every ancestor reaches the system root, which logs
//! it loudly and stops the faulting subtree.
//!
//! ## Concurrency Model
//!
//! Actors share the host tokio runtime. Each behavior invocation runs as
//! its own task turn, so timers, I/O, and other actors interleave at every
//! suspension point — but never inside one actor, whose invocations are
//! strictly serialized. There is no back-pressure: mailboxes are unbounded
//! and `dispatch` is fire-and-forget.

mod actor;
mod mailbox;
mod schedule;

pub mod behavior;
pub mod context;
pub mod deferral;
pub mod error;
pub mod path;
pub mod reference;
pub mod spawn;
pub mod supervision;
pub mod system;

// Re-export core types for convenience
pub use behavior::Behavior;
pub use context::{ActorContext, MailboxProbe};
pub use deferral::{Deferral, Settled};
pub use error::{ActorError, Fault};
pub use path::ActorPath;
pub use reference::{ActorRef, QueryRef, UntypedRef};
pub use spawn::{spawn, spawn_stateless, Props, SpawnParent};
pub use supervision::{escalate_policy, resume_policy, Decision, SupervisionEvent};
pub use system::ActorSystem;

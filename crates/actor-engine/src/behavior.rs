//! # Behavior Trait
//!
//! The `Behavior` trait is the contract between user code and the dispatch
//! engine: given the current state, one message, and a context snapshot,
//! produce the next state. The engine guarantees at most one invocation is
//! in flight per actor, so a behavior never observes its own concurrency.
//!
//! You rarely implement this trait by hand — any `async` closure of the
//! right shape already satisfies it through the blanket impl:
//!
//! ```rust
//! use std::sync::Arc;
//! use actor_engine::{ActorContext, Fault};
//!
//! // A counter behavior: the next state is the sum so far.
//! let _behavior = |state: i64, msg: Arc<i64>, _ctx: ActorContext<i64>| async move {
//!     Ok::<_, Fault>(state + *msg)
//! };
//! ```
//!
//! Returning `Err` (or panicking) does not reach the dispatcher: it routes
//! the invocation through the actor's supervision policy, and the state
//! observed by the next message is the pre-message value.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ActorContext;
use crate::error::Fault;

/// A state transition driven by one message.
///
/// `state` is owned: the engine hands the current state in and stores
/// whatever comes back. The message arrives behind `Arc` so supervision can
/// still inspect it if this invocation faults.
#[async_trait]
pub trait Behavior<S, M>: Send + Sync + 'static
where
    S: Send + 'static,
    M: Send + Sync + 'static,
{
    async fn receive(&self, state: S, message: Arc<M>, ctx: ActorContext<M>) -> Result<S, Fault>;
}

#[async_trait]
impl<S, M, F, Fut> Behavior<S, M> for F
where
    S: Send + 'static,
    M: Send + Sync + 'static,
    F: Fn(S, Arc<M>, ActorContext<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S, Fault>> + Send + 'static,
{
    async fn receive(&self, state: S, message: Arc<M>, ctx: ActorContext<M>) -> Result<S, Fault> {
        (self)(state, message, ctx).await
    }
}

//! One-shot deferrals.
//!
//! A [`Deferral`] is a single-assignment value cell: pending until the first
//! `resolve` or `reject`, after which every further settle call is a no-op.
//! The receiving half is a plain `tokio` oneshot receiver, so callers chain
//! continuations on it like any other future.
//!
//! The engine uses deferrals as the waiters behind temporary query
//! references: the system's correlation table maps each temp reference to
//! exactly one deferral.

use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::Fault;

/// The settled outcome delivered to the receiving half.
pub type Settled<T> = Result<T, Fault>;

/// The write half of a one-shot settle-exactly-once cell.
pub struct Deferral<T> {
    tx: Mutex<Option<oneshot::Sender<Settled<T>>>>,
}

impl<T: Send + 'static> Deferral<T> {
    /// Creates a pending deferral and the receiver that observes its outcome.
    pub fn new() -> (Self, oneshot::Receiver<Settled<T>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Settles with a value. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settles with a fault. Returns `false` if already settled.
    pub fn reject(&self, fault: Fault) -> bool {
        self.settle(Err(fault))
    }

    /// True once `resolve` or `reject` has taken effect.
    pub fn is_settled(&self) -> bool {
        self.tx.lock().map(|slot| slot.is_none()).unwrap_or(true)
    }

    fn settle(&self, outcome: Settled<T>) -> bool {
        let sender = match self.tx.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            // A dropped receiver still counts as settled: the value had
            // nowhere to go, but the cell is no longer pending.
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

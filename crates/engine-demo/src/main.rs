//! A small tour of the actor engine: a counter answering queries, and a
//! flaky worker whose faults are handled by its supervision policy.
//!
//! Run with `RUST_LOG=debug cargo run -p engine-demo` to watch the engine's
//! dispatch and supervision decisions go by.

mod tracing;

use std::sync::Arc;
use std::time::Duration;

use actor_engine::{spawn, ActorContext, ActorSystem, Decision, Fault, Props, QueryRef};
use ::tracing::info;

#[derive(Debug)]
enum CounterMsg {
    Add(i64),
    Get(QueryRef<i64>),
}

#[derive(Debug)]
enum WorkerMsg {
    Work(u32),
    Completed(QueryRef<u64>),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing::setup_tracing();

    let system = ActorSystem::with_name("demo");

    // --- a counter actor answering queries ---

    let counter = spawn(
        &system,
        |state: i64, msg: Arc<CounterMsg>, _ctx: ActorContext<CounterMsg>| async move {
            match &*msg {
                CounterMsg::Add(n) => Ok(state + n),
                CounterMsg::Get(reply) => {
                    reply.resolve(state);
                    Ok(state)
                }
            }
        },
        Props::with_state(0).name("counter"),
    )?;

    for n in 1..=3 {
        counter.dispatch(CounterMsg::Add(n))?;
    }
    let total = counter
        .query(CounterMsg::Get, Duration::from_millis(100))
        .await?;
    info!(total, "counter answered");

    // --- a flaky worker, reset by its supervision policy ---

    let worker = spawn(
        &system,
        |done: u64, msg: Arc<WorkerMsg>, _ctx: ActorContext<WorkerMsg>| async move {
            match &*msg {
                WorkerMsg::Work(n) if n % 7 == 0 => Err(Fault::msg("unlucky job")),
                WorkerMsg::Work(_) => Ok(done + 1),
                WorkerMsg::Completed(reply) => {
                    reply.resolve(done);
                    Ok(done)
                }
            }
        },
        Props::with_state_fn(|_ctx| async { Ok(0) })
            .name("worker")
            .on_crash(|_event| async { Decision::Reset })
            // nothing to do for two seconds? go home
            .shutdown_after(Duration::from_secs(2)),
    )?;

    for n in 1..=10 {
        worker.dispatch(WorkerMsg::Work(n))?;
    }
    let completed = worker
        .query(WorkerMsg::Completed, Duration::from_millis(100))
        .await?;
    info!(completed, "worker finished the batch (the reset wiped its tally once)");

    system.stop();
    Ok(())
}

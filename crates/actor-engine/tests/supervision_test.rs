use std::sync::{Arc, Mutex};
use std::time::Duration;

use actor_engine::{
    spawn, ActorContext, ActorSystem, Decision, Fault, Props, QueryRef, SupervisionEvent,
};

#[derive(Debug)]
enum Cmd {
    Ping,
    Boom,
    Panic,
    Get(QueryRef<i64>),
}

/// Counts pings; `Boom` and `Panic` fault.
fn worker(
    state: i64,
    msg: Arc<Cmd>,
    _ctx: ActorContext<Cmd>,
) -> impl std::future::Future<Output = Result<i64, Fault>> {
    async move {
        match &*msg {
            Cmd::Ping => Ok(state + 1),
            Cmd::Boom => Err(Fault::msg("boom")),
            Cmd::Panic => panic!("kaboom"),
            Cmd::Get(reply) => {
                reply.resolve(state);
                Ok(state)
            }
        }
    }
}

fn worker_props() -> Props<i64, Cmd> {
    Props::with_state_fn(|_ctx| async { Ok(42) })
}

/// A parent with no behavior of its own, for hosting supervised workers.
fn inert_parent(
    system: &ActorSystem,
    name: &str,
) -> actor_engine::ActorRef<u8> {
    spawn(
        system,
        |_state: (), _msg: Arc<u8>, _ctx: ActorContext<u8>| async move { Ok(()) },
        Props::with_state(()).name(name),
    )
    .unwrap()
}

// --- decisions applied by the faulting actor's own policy ---

#[tokio::test]
async fn stop_halts_the_faulting_actor() {
    let system = ActorSystem::new();
    let actor = spawn(
        &system,
        worker,
        worker_props().on_crash(|_event| async { Decision::Stop }),
    )
    .unwrap();

    actor.dispatch(Cmd::Boom).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(actor.dispatch(Cmd::Ping).is_err());
}

#[tokio::test]
async fn resume_keeps_the_state_and_drains_on() {
    let system = ActorSystem::new();
    let actor = spawn(
        &system,
        worker,
        worker_props().on_crash(|_event| async { Decision::Resume }),
    )
    .unwrap();

    actor.dispatch(Cmd::Ping).unwrap();
    actor.dispatch(Cmd::Boom).unwrap();
    actor.dispatch(Cmd::Ping).unwrap();

    let count = actor
        .query(Cmd::Get, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(count, 44);
}

#[tokio::test]
async fn reset_reinitializes_and_preserves_the_mailbox() {
    let system = ActorSystem::new();
    let actor = spawn(
        &system,
        worker,
        worker_props().on_crash(|_event| async { Decision::Reset }),
    )
    .unwrap();

    actor.dispatch(Cmd::Ping).unwrap(); // 43
    actor.dispatch(Cmd::Boom).unwrap(); // back to 42
    actor.dispatch(Cmd::Ping).unwrap(); // 43 again, queued across the reset

    let count = actor
        .query(Cmd::Get, Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(count, 43);
}

#[tokio::test]
async fn reset_stops_the_current_children() {
    let system = ActorSystem::new();
    let actor = spawn(
        &system,
        worker,
        worker_props().on_crash(|_event| async { Decision::Reset }),
    )
    .unwrap();
    let child = spawn(&actor, worker, worker_props().name("kid")).unwrap();

    actor.dispatch(Cmd::Boom).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(child.dispatch(Cmd::Ping).is_err());
    // the reset actor itself is alive and reinitialized
    let count = actor
        .query(Cmd::Get, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(count, 42);
}

#[tokio::test]
async fn a_behavior_panic_is_an_ordinary_fault() {
    let system = ActorSystem::new();
    let seen: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
    let sink = seen.clone();

    let actor = spawn(
        &system,
        worker,
        worker_props().on_crash(move |event: SupervisionEvent<Cmd>| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = Some(event.fault.is_panic());
                Decision::Resume
            }
        }),
    )
    .unwrap();

    actor.dispatch(Cmd::Panic).unwrap();
    actor.dispatch(Cmd::Ping).unwrap();

    let count = actor
        .query(Cmd::Get, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(count, 43);
    assert_eq!(*seen.lock().unwrap(), Some(true));
}

// --- sibling-wide decisions ---

#[tokio::test]
async fn stop_all_takes_the_siblings_down_too() {
    let system = ActorSystem::new();
    let parent = inert_parent(&system, "host");
    let a = spawn(
        &parent,
        worker,
        worker_props()
            .name("a")
            .on_crash(|_event| async { Decision::StopAll }),
    )
    .unwrap();
    let b = spawn(&parent, worker, worker_props().name("b")).unwrap();

    a.dispatch(Cmd::Boom).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(a.dispatch(Cmd::Ping).is_err());
    assert!(b.dispatch(Cmd::Ping).is_err());
    // the parent itself is untouched
    assert!(parent.dispatch(0).is_ok());
}

#[tokio::test]
async fn a_reset_discards_the_result_of_an_in_flight_run() {
    let system = ActorSystem::new();
    let parent = inert_parent(&system, "host");

    // a slow sibling that is mid-behavior when the reset lands
    let slow = spawn(
        &parent,
        |state: i64, msg: Arc<Cmd>, _ctx: ActorContext<Cmd>| async move {
            match &*msg {
                Cmd::Ping => {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    Ok(state + 1)
                }
                Cmd::Get(reply) => {
                    reply.resolve(state);
                    Ok(state)
                }
                _ => Ok(state),
            }
        },
        worker_props().name("slow"),
    )
    .unwrap();
    let trigger = spawn(
        &parent,
        worker,
        worker_props()
            .name("trigger")
            .on_crash(|_event| async { Decision::ResetAll }),
    )
    .unwrap();

    slow.dispatch(Cmd::Ping).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    // resets both siblings while the slow run is still going
    trigger.dispatch(Cmd::Boom).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // the stale run's result never lands on the reinitialized state
    let count = slow
        .query(Cmd::Get, Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(count, 42);
}

#[tokio::test]
async fn a_child_decision_without_a_child_escalates() {
    let system = ActorSystem::new();
    let seen: Arc<Mutex<bool>> = Arc::new(Mutex::new(false));
    let sink = seen.clone();

    let parent = spawn(
        &system,
        |_state: (), _msg: Arc<u8>, _ctx: ActorContext<u8>| async move { Ok(()) },
        Props::with_state(()).on_crash(move |event: SupervisionEvent<u8>| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = event.child.is_some();
                Decision::StopChild
            }
        }),
    )
    .unwrap();

    // the child's own fault carries no child, so its stop_child decision
    // cannot apply and escalates instead
    let child = spawn(
        &parent,
        worker,
        worker_props().on_crash(|_event| async { Decision::StopChild }),
    )
    .unwrap();

    child.dispatch(Cmd::Boom).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(*seen.lock().unwrap());
    assert!(child.dispatch(Cmd::Ping).is_err());
    assert!(parent.dispatch(0).is_ok());
}

#[tokio::test]
async fn reset_all_reinitializes_every_sibling() {
    let system = ActorSystem::new();
    let parent = inert_parent(&system, "host");
    let a = spawn(
        &parent,
        worker,
        worker_props()
            .name("a")
            .on_crash(|_event| async { Decision::ResetAll }),
    )
    .unwrap();
    let b = spawn(&parent, worker, worker_props().name("b")).unwrap();

    a.dispatch(Cmd::Ping).unwrap();
    b.dispatch(Cmd::Ping).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    a.dispatch(Cmd::Boom).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let a_count = a.query(Cmd::Get, Duration::from_millis(200)).await.unwrap();
    let b_count = b.query(Cmd::Get, Duration::from_millis(200)).await.unwrap();
    assert_eq!((a_count, b_count), (42, 42));
}

// --- decisions applied by the parent on an escalated fault ---

#[tokio::test]
async fn escalation_reaches_the_parent_with_the_original_message() {
    let system = ActorSystem::new();
    let seen: Arc<Mutex<Option<(bool, String)>>> = Arc::new(Mutex::new(None));
    let sink = seen.clone();

    let parent = spawn(
        &system,
        |_state: (), _msg: Arc<u8>, _ctx: ActorContext<u8>| async move { Ok(()) },
        Props::with_state(()).name("guardian").on_crash(
            move |event: SupervisionEvent<u8>| {
                let sink = sink.clone();
                async move {
                    let is_boom = matches!(event.message_as::<Cmd>(), Some(Cmd::Boom));
                    let child = event
                        .child
                        .as_ref()
                        .map(|c| c.name().to_string())
                        .unwrap_or_default();
                    *sink.lock().unwrap() = Some((is_boom, child));
                    Decision::StopChild
                }
            },
        ),
    )
    .unwrap();

    // the worker keeps the default policy: escalate
    let child = spawn(&parent, worker, worker_props().name("fragile")).unwrap();

    child.dispatch(Cmd::Boom).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        *seen.lock().unwrap(),
        Some((true, "fragile".to_string()))
    );
    assert!(child.dispatch(Cmd::Ping).is_err());
    assert!(parent.dispatch(0).is_ok());
}

#[tokio::test]
async fn a_panicking_policy_escalates() {
    let system = ActorSystem::new();
    let seen: Arc<Mutex<bool>> = Arc::new(Mutex::new(false));
    let sink = seen.clone();

    let parent = spawn(
        &system,
        |_state: (), _msg: Arc<u8>, _ctx: ActorContext<u8>| async move { Ok(()) },
        Props::with_state(()).on_crash(move |_event: SupervisionEvent<u8>| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = true;
                Decision::StopChild
            }
        }),
    )
    .unwrap();

    let child = spawn(
        &parent,
        worker,
        worker_props().on_crash(|_event| async { panic!("broken policy") }),
    )
    .unwrap();

    child.dispatch(Cmd::Boom).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(*seen.lock().unwrap());
    assert!(child.dispatch(Cmd::Ping).is_err());
}

#[tokio::test]
async fn reset_child_reinitializes_the_faulting_child() {
    let system = ActorSystem::new();
    let parent = spawn(
        &system,
        |_state: (), _msg: Arc<u8>, _ctx: ActorContext<u8>| async move { Ok(()) },
        Props::with_state(())
            .on_crash(|_event: SupervisionEvent<u8>| async { Decision::ResetChild }),
    )
    .unwrap();
    let child = spawn(&parent, worker, worker_props()).unwrap();

    child.dispatch(Cmd::Ping).unwrap(); // 43
    child.dispatch(Cmd::Boom).unwrap(); // escalates; parent resets the child

    let count = child
        .query(Cmd::Get, Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(count, 42);
}

#[tokio::test]
async fn stop_all_children_clears_the_whole_brood() {
    let system = ActorSystem::new();
    let parent = spawn(
        &system,
        |_state: (), _msg: Arc<u8>, _ctx: ActorContext<u8>| async move { Ok(()) },
        Props::with_state(())
            .on_crash(|_event: SupervisionEvent<u8>| async { Decision::StopAllChildren }),
    )
    .unwrap();
    let a = spawn(&parent, worker, worker_props().name("a")).unwrap();
    let b = spawn(&parent, worker, worker_props().name("b")).unwrap();

    a.dispatch(Cmd::Boom).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(a.dispatch(Cmd::Ping).is_err());
    assert!(b.dispatch(Cmd::Ping).is_err());
    assert!(parent.dispatch(0).is_ok());
}

#[tokio::test]
async fn reset_all_children_reinitializes_the_whole_brood() {
    let system = ActorSystem::new();
    let parent = spawn(
        &system,
        |_state: (), _msg: Arc<u8>, _ctx: ActorContext<u8>| async move { Ok(()) },
        Props::with_state(())
            .on_crash(|_event: SupervisionEvent<u8>| async { Decision::ResetAllChildren }),
    )
    .unwrap();
    let a = spawn(&parent, worker, worker_props().name("a")).unwrap();
    let b = spawn(&parent, worker, worker_props().name("b")).unwrap();

    a.dispatch(Cmd::Ping).unwrap();
    b.dispatch(Cmd::Ping).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    a.dispatch(Cmd::Boom).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let a_count = a.query(Cmd::Get, Duration::from_millis(200)).await.unwrap();
    let b_count = b.query(Cmd::Get, Duration::from_millis(200)).await.unwrap();
    assert_eq!((a_count, b_count), (42, 42));
}

// --- initialization faults ---

#[tokio::test]
async fn an_init_fault_escalates_with_no_message() {
    let system = ActorSystem::new();
    let seen: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
    let sink = seen.clone();

    let parent = spawn(
        &system,
        |_state: (), _msg: Arc<u8>, _ctx: ActorContext<u8>| async move { Ok(()) },
        Props::with_state(()).on_crash(move |event: SupervisionEvent<u8>| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = Some(event.message.is_none());
                Decision::StopChild
            }
        }),
    )
    .unwrap();

    let child = spawn(
        &parent,
        worker,
        Props::with_state_fn(|_ctx| async { Err(Fault::msg("no state for you")) }),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*seen.lock().unwrap(), Some(true));
    assert!(child.dispatch(Cmd::Ping).is_err());
}

// --- escalation past the root ---

#[tokio::test]
async fn a_fault_nobody_handles_stops_the_subtree() {
    let system = ActorSystem::new();
    // both levels keep the default escalate policy; the root stops the
    // faulting top-level actor and with it the whole subtree
    let parent = spawn(
        &system,
        |_state: (), _msg: Arc<u8>, _ctx: ActorContext<u8>| async move { Ok(()) },
        Props::with_state(()),
    )
    .unwrap();
    let child = spawn(&parent, worker, worker_props()).unwrap();

    child.dispatch(Cmd::Boom).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(parent.dispatch(0).is_err());
    assert!(child.dispatch(Cmd::Ping).is_err());
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use actor_engine::{spawn, ActorContext, ActorError, ActorSystem, Fault, Props, QueryRef};

#[derive(Debug)]
enum Msg {
    Get(QueryRef<i64>),
    HoldReply(QueryRef<i64>),
    TryLate,
    Reject(QueryRef<i64>),
}

#[tokio::test]
async fn a_resolved_reply_completes_the_query() {
    let system = ActorSystem::new();
    let actor = spawn(
        &system,
        |state: i64, msg: Arc<Msg>, _ctx: ActorContext<Msg>| async move {
            if let Msg::Get(reply) = &*msg {
                reply.resolve(state);
            }
            Ok(state)
        },
        Props::with_state(11),
    )
    .unwrap();

    let answer = actor
        .query(Msg::Get, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(answer, 11);
}

#[tokio::test]
async fn the_reply_reference_settles_exactly_once() {
    let system = ActorSystem::new();
    let settles: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = settles.clone();

    let actor = spawn(
        &system,
        move |state: i64, msg: Arc<Msg>, _ctx: ActorContext<Msg>| {
            let sink = sink.clone();
            async move {
                if let Msg::Get(reply) = &*msg {
                    sink.lock().unwrap().push(reply.resolve(state));
                    sink.lock().unwrap().push(reply.resolve(state + 1));
                }
                Ok(state)
            }
        },
        Props::with_state(5),
    )
    .unwrap();

    let answer = actor
        .query(Msg::Get, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(answer, 5);
    assert_eq!(*settles.lock().unwrap(), vec![true, false]);
}

#[tokio::test]
async fn an_unanswered_query_times_out_with_the_timeout_value() {
    let system = ActorSystem::new();
    let actor = spawn(
        &system,
        |state: i64, _msg: Arc<Msg>, _ctx: ActorContext<Msg>| async move { Ok(state) },
        Props::with_state(0),
    )
    .unwrap();

    let err = actor
        .query(Msg::Get, Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::QueryTimeout(10)));
    assert!(err.to_string().contains("10"));
}

#[tokio::test]
async fn a_timed_out_reference_is_already_deregistered() {
    let system = ActorSystem::new();
    let settles: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = settles.clone();

    // state keeps the reply reference around instead of answering
    let actor = spawn(
        &system,
        move |state: Option<QueryRef<i64>>, msg: Arc<Msg>, _ctx: ActorContext<Msg>| {
            let sink = sink.clone();
            async move {
                match &*msg {
                    Msg::HoldReply(reply) => Ok(Some(reply.clone())),
                    Msg::TryLate => {
                        if let Some(reply) = &state {
                            sink.lock().unwrap().push(reply.resolve(99));
                        }
                        Ok(state)
                    }
                    _ => Ok(state),
                }
            }
        },
        Props::with_state(None),
    )
    .unwrap();

    let err = actor
        .query(Msg::HoldReply, Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::QueryTimeout(20)));

    actor.dispatch(Msg::TryLate).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // resolving after the timeout finds no registered reference
    assert_eq!(*settles.lock().unwrap(), vec![false]);
}

#[tokio::test]
async fn a_rejected_reply_fails_the_query() {
    let system = ActorSystem::new();
    let actor = spawn(
        &system,
        |state: i64, msg: Arc<Msg>, _ctx: ActorContext<Msg>| async move {
            if let Msg::Reject(reply) = &*msg {
                reply.reject(Fault::msg("nothing for you"));
            }
            Ok(state)
        },
        Props::with_state(0),
    )
    .unwrap();

    let err = actor
        .query(Msg::Reject, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::QueryRejected(_)));
    assert!(err.to_string().contains("nothing for you"));
}

#[tokio::test]
async fn querying_a_stopped_actor_fails_fast() {
    let system = ActorSystem::new();
    let actor = spawn(
        &system,
        |state: i64, _msg: Arc<Msg>, _ctx: ActorContext<Msg>| async move { Ok(state) },
        Props::with_state(0),
    )
    .unwrap();
    actor.stop().unwrap();

    let err = actor
        .query(Msg::Get, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::Unresolvable(_)));
}

#[tokio::test]
async fn queries_join_the_mailbox_queue() {
    let system = ActorSystem::new();
    // a slow first message must be fully processed before the query's
    // message is — FIFO applies to queries like everything else
    let actor = spawn(
        &system,
        |state: i64, msg: Arc<Msg>, _ctx: ActorContext<Msg>| async move {
            match &*msg {
                Msg::TryLate => {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    Ok(state + 1)
                }
                Msg::Get(reply) => {
                    reply.resolve(state);
                    Ok(state)
                }
                _ => Ok(state),
            }
        },
        Props::with_state(0),
    )
    .unwrap();

    actor.dispatch(Msg::TryLate).unwrap();
    let answer = actor
        .query(Msg::Get, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(answer, 1);
}

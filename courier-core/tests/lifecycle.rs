mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use courier::config::ChannelConfig;
use courier::testing::{RecordingHandler, StaticFlagClient};
use courier::{ConsumerLifecycleController, LifecycleState};

type OrderHandler = RecordingHandler<String, Order>;

struct Fixture {
    client: Arc<StaticFlagClient>,
    broker: Arc<OrderBroker>,
    handler: Arc<OrderHandler>,
    controller: Arc<ConsumerLifecycleController>,
}

fn gated(initial: bool, handler: OrderHandler) -> Fixture {
    let client = Arc::new(StaticFlagClient::new());
    client.set_silently(FLAG, initial);
    let broker = Arc::new(OrderBroker::new(2));
    let handler = Arc::new(handler);

    let controller = channel(ChannelConfig::new(TOPIC), &broker)
        .with_flags(flag_store(&client))
        .subscribe_gated(&[TOPIC], handler.clone(), FLAG, Duration::ZERO)
        .unwrap();

    Fixture {
        client,
        broker,
        handler,
        controller,
    }
}

/// Test: A gated subscription stays idle while its flag is off
///
/// ✅ Verifies:
/// - no worker is launched and the consumer never subscribes
/// - records published meanwhile are not delivered
#[tokio::test]
async fn no_worker_while_flag_is_false() {
    let fx = gated(false, OrderHandler::new());
    fx.controller.settled().await;

    fx.broker.append(TOPIC, None, Some(Order::new(1, "c")));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(fx.controller.state(), LifecycleState::Stopped);
    assert!(!fx.controller.is_running());
    assert_eq!(fx.controller.workers_started(), 0);
    assert!(fx.broker.subscriptions().is_empty());
    assert!(fx.handler.records().is_empty());
}

#[tokio::test]
async fn starts_immediately_when_flag_is_true() {
    let fx = gated(true, OrderHandler::new());
    fx.controller.settled().await;

    assert_eq!(fx.controller.state(), LifecycleState::Running);
    assert_eq!(fx.controller.workers_started(), 1);

    fx.broker.append(TOPIC, None, Some(Order::new(1, "c")));
    assert!(fx.handler.wait_for_records(1, WAIT).await);
    fx.controller.shutdown().await;
}

/// Test: Concurrent `true` notifications launch exactly one worker
///
/// ✅ Verifies:
/// - sixteen simultaneous change events for `true` start a single worker
/// - the controller ends up running
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_true_flips_start_exactly_one_worker() {
    let fx = gated(false, OrderHandler::new());

    let flips: Vec<_> = (0..16)
        .map(|_| {
            let client = fx.client.clone();
            tokio::spawn(async move { client.emit(FLAG, true) })
        })
        .collect();
    for flip in flips {
        flip.await.unwrap();
    }
    fx.controller.settled().await;

    assert_eq!(fx.controller.workers_started(), 1);
    assert_eq!(fx.controller.state(), LifecycleState::Running);
    assert!(fx.controller.is_running());
    fx.controller.shutdown().await;
}

/// Test: Turning the flag off stops the worker, turning it on restarts it
///
/// ✅ Verifies:
/// - `false` cancels the worker and clears the running guard
/// - nothing is delivered while stopped
/// - `true` launches a fresh worker that picks up where the last one left off
#[tokio::test]
async fn flag_transitions_stop_and_restart() {
    let fx = gated(true, OrderHandler::new());
    fx.controller.settled().await;

    fx.client.set(FLAG, false);
    fx.controller.settled().await;
    assert_eq!(fx.controller.state(), LifecycleState::Stopped);
    assert!(!fx.controller.is_running());

    fx.broker.append(TOPIC, None, Some(Order::new(1, "c")));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fx.handler.records().is_empty());

    fx.client.set(FLAG, true);
    fx.controller.settled().await;
    assert_eq!(fx.controller.workers_started(), 2);
    assert!(fx.handler.wait_for_records(1, WAIT).await);
    fx.controller.shutdown().await;
}

#[tokio::test]
async fn redundant_stop_is_a_no_op() {
    let fx = gated(false, OrderHandler::new());

    fx.client.emit(FLAG, false);
    fx.client.emit(FLAG, false);
    fx.controller.settled().await;

    assert_eq!(fx.controller.state(), LifecycleState::Stopped);
    assert_eq!(fx.controller.workers_started(), 0);
}

/// Test: A worker that dies stays dead until the flag changes again
///
/// ✅ Verifies:
/// - a panicking handler takes the worker down and clears the running guard
/// - no automatic restart happens while the flag stays true
/// - the next change event to `true` starts a new worker
#[tokio::test]
async fn dead_worker_waits_for_next_flag_change() {
    let fx = gated(true, OrderHandler::panicking_at(0));
    fx.controller.settled().await;
    assert_eq!(fx.controller.state(), LifecycleState::Running);

    let mut state = fx.controller.watch_state();
    fx.broker.append(TOPIC, None, Some(Order::new(1, "boom")));
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == LifecycleState::Stopped))
        .await
        .expect("worker did not go down")
        .unwrap();

    assert!(!fx.controller.is_running());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fx.controller.workers_started(), 1);

    fx.client.emit(FLAG, true);
    fx.controller.settled().await;
    assert_eq!(fx.controller.workers_started(), 2);
    fx.controller.shutdown().await;
}

#[tokio::test]
async fn shutdown_ignores_later_flag_changes() {
    let fx = gated(true, OrderHandler::new());
    fx.controller.settled().await;

    fx.controller.shutdown().await;
    assert_eq!(fx.controller.state(), LifecycleState::Stopped);

    fx.client.set(FLAG, false);
    fx.client.set(FLAG, true);
    fx.controller.settled().await;
    assert_eq!(fx.controller.workers_started(), 1);
    assert!(!fx.controller.is_running());
}

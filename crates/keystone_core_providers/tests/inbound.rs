//! Inbound provider driving flows from pushed events.

use keystone_core_providers::prelude::*;
use keystone_engine::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

type Seen = Arc<Mutex<Vec<(String, u64)>>>;

fn inbound_floor(team: impl Team) -> (OfficeFloor, InboundHandle<String>, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let provider = InboundProvider::<String>::new();
    let handle = provider.handle();

    let mut builder = OfficeFloorBuilder::new();
    builder.add_team("inbound", team);
    builder
        .add_provider("inbound", provider)
        .office("app")
        .input()
        .link_flow("request", "handle")
        .link_team(0, "inbound");
    let record = Arc::clone(&seen);
    builder.office("app").add_function("handle", None, move |call| {
        let event = call.take_argument::<String>().unwrap_or_default();
        let unit = call.unit().ok_or_else(|| call.fail("no unit"))?;
        let request = unit.acquire_blocking("input:inbound", None)?;
        let sequence = request
            .object::<InboundRequest>()
            .map(|request| request.sequence())
            .ok_or_else(|| call.fail("no inbound request"))?;
        record.lock().push((event, sequence));
        Ok(())
    });

    (builder.build().unwrap(), handle, seen)
}

fn completion() -> (FlowCallback, oneshot::Receiver<Result<(), Escalation>>) {
    let (sender, receiver) = oneshot::channel();
    let callback: FlowCallback = Box::new(move |result| {
        let _ = sender.send(result);
    });
    (callback, receiver)
}

#[test]
fn push_before_open_is_rejected() {
    let (_floor, handle, _) = inbound_floor(PassiveTeam);
    assert_eq!(
        handle.push("early".into(), None),
        Err(InboundError::NotStarted("inbound".into()))
    );
    assert_eq!(handle.pushed(), 0);
}

#[test]
fn push_after_close_is_rejected() {
    let (floor, handle, _) = inbound_floor(PassiveTeam);
    floor.open().unwrap();
    floor.close().unwrap();
    assert_eq!(
        handle.push("late".into(), None),
        Err(InboundError::Stopped("inbound".into()))
    );
}

#[test]
fn passive_team_handles_events_inline() {
    let (floor, handle, seen) = inbound_floor(PassiveTeam);
    floor.open().unwrap();

    handle.push("first".into(), None).unwrap();
    handle.push("second".into(), None).unwrap();

    assert_eq!(
        *seen.lock(),
        vec![("first".to_string(), 0), ("second".to_string(), 1)]
    );
    assert_eq!(handle.handled(), 2);
    floor.close().unwrap();
}

#[tokio::test]
async fn worker_team_reports_through_callbacks() {
    let (floor, handle, seen) = inbound_floor(WorkerTeam::new("inbound", 2));
    floor.open().unwrap();

    let mut receivers = Vec::new();
    for index in 0..4 {
        let (callback, receiver) = completion();
        handle.push(format!("event-{index}"), Some(callback)).unwrap();
        receivers.push(receiver);
    }
    for receiver in receivers {
        assert!(receiver.await.unwrap().is_ok());
    }

    assert_eq!(handle.pushed(), 4);
    assert_eq!(handle.handled(), 4);
    let mut sequences: Vec<u64> = seen.lock().iter().map(|(_, sequence)| *sequence).collect();
    sequences.sort_unstable();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
    floor.close().unwrap();
}

#[tokio::test]
async fn flow_failure_reaches_the_callback() {
    let provider = InboundProvider::<u32>::new();
    let handle = provider.handle();
    let mut builder = OfficeFloorBuilder::new();
    builder.add_team("inline", PassiveTeam);
    builder
        .add_provider("inbound", provider)
        .office("app")
        .input()
        .link_flow(0, "reject")
        .default_team("inline");
    builder
        .office("app")
        .add_function("reject", None, |call| Err(call.fail("rejected")));
    let floor = builder.build().unwrap();
    floor.open().unwrap();

    let (callback, receiver) = completion();
    handle.push(7, Some(callback)).unwrap();
    match receiver.await.unwrap() {
        Err(Escalation::FunctionFailed { function, .. }) => assert_eq!(function, "reject"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(handle.handled(), 1);
}

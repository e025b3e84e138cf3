//! Concurrent acquisition, team-driven flows and completion races.


use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use keystone_engine::prelude::*;
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use test_utils::*;

const THREADS: usize = 8;

#[test]
fn global_object_is_sourced_once_across_threads() {
    let provider = CounterProvider::default();
    let mut builder = app_builder();
    builder.add_provider("shared", provider.clone()).office("app");
    builder
        .office("app")
        .bind(BindScope::Global, "shared")
        .bound_name("shared");
    let floor = builder.build().unwrap();
    let office = Arc::clone(floor.office("app").unwrap());

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let office = Arc::clone(&office);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let unit = office.begin_process();
                let container = unit.acquire_blocking("shared", Some(Duration::from_secs(5)))?;
                if let Some(mut counter) = container.object_mut::<Counter>() {
                    counter.value += 1;
                }
                unit.complete().into_result()
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(provider.sourced(), 1);

    let unit = office.begin_process();
    let container = unit.acquire_blocking("shared", None).unwrap();
    assert_eq!(
        container.object::<Counter>().unwrap().value,
        THREADS as u64
    );
    assert_eq!(container.state(), ContainerState::Ready);
    unit.complete();
    floor.close().unwrap();
}

#[test]
fn process_objects_are_not_shared_between_threads() {
    let provider = CounterProvider::default();
    let mut builder = app_builder();
    builder.add_provider("local", provider.clone()).office("app");
    builder
        .office("app")
        .bind(BindScope::Process, "local")
        .bound_name("local");
    let floor = builder.build().unwrap();
    let office = Arc::clone(floor.office("app").unwrap());

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let office = Arc::clone(&office);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let unit = office.begin_process();
                barrier.wait();
                let first = unit.acquire_blocking("local", None).unwrap();
                let second = unit.acquire_blocking("local", None).unwrap();
                assert!(Arc::ptr_eq(&first, &second));
                unit.complete();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(provider.sourced(), THREADS);
}

#[test]
fn worker_team_runs_flows_concurrently() {
    const INVOCATIONS: u32 = 32;

    let total = Arc::new(AtomicU64::new(0));
    let provider = FlowProvider::new(1).with_groups(1);
    let mut builder = app_builder();
    builder.add_team("workers", WorkerTeam::new("workers", 4));
    builder
        .add_provider("requests", provider.clone())
        .office("app")
        .input()
        .link_flow(0, "handle")
        .link_team(0, "workers");
    let sum = Arc::clone(&total);
    builder.office("app").add_function("handle", None, move |call| {
        let value = call.argument::<u32>().copied().unwrap_or_default();
        sum.fetch_add(u64::from(value), Ordering::SeqCst);
        Ok(())
    });
    let floor = builder.build().unwrap();
    floor.open().unwrap();

    let execute = provider.execute();
    let team = Arc::clone(execute.team(0).unwrap());
    let (sender, receiver) = mpsc::channel();
    for value in 0..INVOCATIONS {
        let execute = Arc::clone(&execute);
        let sender = sender.clone();
        team.assign(Box::new(move || {
            execute.invoke_flow(
                0,
                Some(Box::new(value)),
                None,
                Duration::ZERO,
                Some(Box::new(move |result: Result<(), Escalation>| {
                    let _ = sender.send(result.is_ok());
                })),
            );
        }));
    }
    drop(sender);

    let outcomes: Vec<bool> = receiver.iter().take(INVOCATIONS as usize).collect();
    assert_eq!(outcomes.len(), INVOCATIONS as usize);
    assert!(outcomes.into_iter().all(|ok| ok));
    assert_eq!(
        total.load(Ordering::SeqCst),
        u64::from((0..INVOCATIONS).sum::<u32>())
    );
    floor.close().unwrap();
}

#[test]
fn sourcing_and_completion_race_ends_disposed() {
    for _ in 0..50 {
        let provider = DeferredProvider::default();
        let mut builder = app_builder();
        builder.add_provider("slow", provider.clone()).office("app");
        builder
            .office("app")
            .bind(BindScope::Process, "slow")
            .bound_name("slow");
        let floor = builder.build().unwrap();

        let unit = floor.office("app").unwrap().begin_process();
        unit.acquire("slow", |_| {});
        let container = unit.container("slow").unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let supplier = {
            let barrier = Arc::clone(&barrier);
            let provider = provider.clone();
            thread::spawn(move || {
                barrier.wait();
                provider.complete_all()
            })
        };
        barrier.wait();
        unit.complete();
        assert_eq!(supplier.join().unwrap(), 1);

        assert_eq!(container.state(), ContainerState::Disposed);
        assert!(container.object::<Counter>().is_none());
    }
}

#[tokio::test]
async fn acquire_callback_wakes_an_async_waiter() {
    let provider = DeferredProvider::default();
    let mut builder = app_builder();
    builder.add_provider("slow", provider.clone()).office("app");
    builder
        .office("app")
        .bind(BindScope::Process, "slow")
        .bound_name("slow");
    let floor = builder.build().unwrap();

    let unit = floor.office("app").unwrap().begin_process();
    let (sender, receiver) = tokio::sync::oneshot::channel();
    unit.acquire("slow", move |result| {
        let _ = sender.send(result);
    });
    let supplier = thread::spawn(move || provider.complete_all());

    let container = receiver.await.unwrap().unwrap();
    assert_eq!(supplier.join().unwrap(), 1);
    assert_eq!(container.state(), ContainerState::Ready);
    unit.complete();
    assert_eq!(container.state(), ContainerState::Disposed);
}

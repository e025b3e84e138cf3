//! Container lifecycle, recycling, pooling and timeout tests.


use core::sync::atomic::Ordering;
use core::time::Duration;
use keystone_engine::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use test_utils::*;

// ─────────────────────────────────────────────────────────────────────────────
// State machine
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn container_walks_the_full_lifecycle() {
    let mut builder = app_builder();
    builder.add_provider("counter", CounterProvider::default()).office("app");
    builder.office("app").bind(BindScope::Process, "counter");
    let floor = builder.build().unwrap();

    let unit = floor.office("app").unwrap().begin_process();
    let container = unit.acquire_blocking("process:0:counter", None).unwrap();
    assert_eq!(container.state(), ContainerState::Ready);
    assert!(container.object::<Counter>().is_some());

    let report = unit.complete();
    assert!(report.is_success());
    assert_eq!(
        container.history(),
        vec![
            ContainerState::Uninitialized,
            ContainerState::Sourcing,
            ContainerState::Ready,
            ContainerState::Recycling,
            ContainerState::Disposed,
        ]
    );
    assert!(container.object::<Counter>().is_none());
}

#[test]
fn same_unit_reuses_its_container() {
    let provider = CounterProvider::default();
    let mut builder = app_builder();
    builder.add_provider("counter", provider.clone()).office("app");
    builder.office("app").bind(BindScope::Process, "counter").bound_name("counter");
    let floor = builder.build().unwrap();

    let unit = floor.office("app").unwrap().begin_process();
    let first = unit.acquire_blocking("counter", None).unwrap();
    let second = unit.acquire_blocking("counter", None).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(provider.sourced(), 1);
    unit.complete();
}

#[test]
fn sourcing_failure_disposes_and_escalates() {
    let mut builder = app_builder();
    builder
        .add_provider("requests", FlowProvider::new(1))
        .office("app")
        .input()
        .link_flow(0, "handle");
    builder.office("app").add_function("handle", None, noop);
    let floor = builder.build().unwrap();

    let unit = floor.office("app").unwrap().begin_process();
    let error = unit.acquire_blocking("input:requests", None).unwrap_err();
    assert!(matches!(error, Escalation::SourcingFailed { .. }));

    let container = unit.container("input:requests").unwrap();
    assert_eq!(container.state(), ContainerState::Disposed);
    let report = unit.complete();
    assert!(!report.is_success());
}

#[test]
fn object_supplied_after_unit_completed_is_discarded() {
    let provider = DeferredProvider::default();
    let mut builder = app_builder();
    builder.add_provider("slow", provider.clone()).office("app");
    builder.office("app").bind(BindScope::Process, "slow").bound_name("slow");
    let floor = builder.build().unwrap();

    let unit = floor.office("app").unwrap().begin_process();
    let outcome = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);
    unit.acquire("slow", move |result| *slot.lock() = Some(result.is_ok()));
    let container = unit.container("slow").unwrap();
    assert_eq!(container.state(), ContainerState::Sourcing);

    unit.complete();
    assert_eq!(*outcome.lock(), Some(false));
    assert_eq!(provider.complete_all(), 1);
    assert_eq!(container.state(), ContainerState::Disposed);
    assert!(container.object::<Counter>().is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Scopes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn function_scope_is_recycled_per_call() {
    let provider = RecyclingProvider::default();
    let mut builder = app_builder();
    builder.add_provider("scratch", provider.clone()).office("app");
    let app = builder.office("app");
    app.bind(BindScope::Function("handle".into()), "scratch")
        .bound_name("scratch");
    app.add_function("handle", None, |call| {
        let unit = call.unit().ok_or_else(|| call.fail("no unit"))?;
        unit.acquire_blocking("scratch", None)?;
        Ok(())
    });
    app.add_function("other", None, |call| {
        let unit = call.unit().ok_or_else(|| call.fail("no unit"))?;
        unit.acquire_blocking("scratch", None)?;
        Ok(())
    });
    let floor = builder.build().unwrap();
    let office = floor.office("app").unwrap();

    assert!(office.invoke("handle", None).is_success());
    assert!(office.invoke("handle", None).is_success());
    assert_eq!(provider.recycled(), 2);

    let report = office.invoke("other", None);
    assert!(
        report
            .escalations()
            .iter()
            .any(|e| matches!(e, Escalation::UnknownBinding(name) if name == "scratch"))
    );
}

#[test]
fn global_containers_live_until_close() {
    let provider = RecyclingProvider::failing();
    let mut builder = app_builder();
    builder.add_provider("cache", provider.clone()).office("app");
    let app = builder.office("app");
    app.bind(BindScope::Global, "cache").bound_name("cache");
    app.add_function("touch", None, |call| {
        let unit = call.unit().ok_or_else(|| call.fail("no unit"))?;
        let cache = unit.acquire_blocking("cache", None)?;
        if let Some(mut counter) = cache.object_mut::<Counter>() {
            counter.value += 1;
        }
        Ok(())
    });
    let floor = builder.build().unwrap();
    floor.open().unwrap();
    let office = floor.office("app").unwrap();

    for _ in 0..3 {
        assert!(office.invoke("touch", None).is_success());
    }
    assert_eq!(provider.recycled(), 0);

    let cache = office.begin_process().container("cache").unwrap();
    assert_eq!(cache.object::<Counter>().unwrap().value, 3);
    drop(cache);

    let error = floor.close().unwrap_err();
    assert_eq!(provider.recycled(), 1);
    match error {
        CloseError::Cleanup(cleanup) => assert!(cleanup.involves("cache")),
        other => panic!("unexpected close error: {other}"),
    }
    assert!(matches!(floor.close(), Err(CloseError::AlreadyClosed)));
}

#[test]
fn thread_units_resolve_process_sites() {
    let mut builder = app_builder();
    builder.add_provider("counter", CounterProvider::default()).office("app");
    let app = builder.office("app");
    app.bind(BindScope::Process, "counter").bound_name("shared");
    app.bind(BindScope::Thread, "counter").bound_name("local");
    let floor = builder.build().unwrap();

    let process = floor.office("app").unwrap().begin_process();
    let thread = process.begin_thread();
    let shared = thread.acquire_blocking("shared", None).unwrap();
    let local = thread.acquire_blocking("local", None).unwrap();

    thread.complete();
    assert_eq!(local.state(), ContainerState::Disposed);
    assert_eq!(shared.state(), ContainerState::Ready);

    assert!(matches!(
        process.acquire_blocking("local", None),
        Err(Escalation::UnknownBinding(_))
    ));
    process.complete();
    assert_eq!(shared.state(), ContainerState::Disposed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Recycling and pools
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn pooled_objects_are_released_and_reused() {
    let provider = CounterProvider::default();
    let pool = Arc::new(CountingPool::default());
    let mut builder = app_builder();
    let shared = Arc::clone(&pool);
    builder
        .add_provider("counter", provider.clone())
        .office("app")
        .pool(move |_| Ok(shared as Arc<dyn ResourcePool>));
    builder.office("app").bind(BindScope::Process, "counter").bound_name("counter");
    let floor = builder.build().unwrap();
    let office = floor.office("app").unwrap();

    for _ in 0..3 {
        let unit = office.begin_process();
        unit.acquire_blocking("counter", None).unwrap();
        assert!(unit.complete().is_success());
    }

    assert_eq!(pool.released.load(Ordering::SeqCst), 3);
    assert_eq!(provider.sourced(), 1);
}

/// Records how many watched containers are still ready at each release.
#[derive(Default)]
struct WatchingPool {
    watched: Mutex<Vec<Arc<ResourceContainer>>>,
    ready_at_release: Mutex<Vec<usize>>,
}

impl ResourcePool for WatchingPool {
    fn acquire(&self) -> Option<Box<dyn ManagedResource>> {
        None
    }

    fn release(&self, _resource: Box<dyn ManagedResource>) {
        let ready = self
            .watched
            .lock()
            .iter()
            .filter(|container| container.state() == ContainerState::Ready)
            .count();
        self.ready_at_release.lock().push(ready);
    }

    fn lost(&self, _resource: Box<dyn ManagedResource>, _cause: &Escalation) {}
}

#[test]
fn pool_release_follows_each_site_out_of_ready() {
    let provider = CounterProvider::default();
    let pool = Arc::new(WatchingPool::default());
    let mut builder = app_builder();
    let shared = Arc::clone(&pool);
    builder
        .add_provider("counter", provider.clone())
        .office("app")
        .pool(move |_| Ok(shared as Arc<dyn ResourcePool>));
    let app = builder.office("app");
    for name in ["a", "b", "c"] {
        app.bind(BindScope::Process, "counter").bound_name(name);
    }
    let floor = builder.build().unwrap();

    let unit = floor.office("app").unwrap().begin_process();
    let containers: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| unit.acquire_blocking(name, None).unwrap())
        .collect();
    pool.watched.lock().extend(containers.iter().cloned());
    assert!(pool.ready_at_release.lock().is_empty());

    assert!(unit.complete().is_success());
    assert_eq!(*pool.ready_at_release.lock(), vec![2, 1, 0]);
    assert_eq!(provider.sourced(), 3);
    for container in &containers {
        assert_eq!(container.state(), ContainerState::Disposed);
    }
}

#[test]
fn one_failing_recycle_does_not_stop_the_other() {
    let failing = RecyclingProvider::failing();
    let working = RecyclingProvider::default();
    let mut builder = app_builder();
    builder.add_provider("failing", failing.clone()).office("app");
    builder.add_provider("working", working.clone()).office("app");
    let app = builder.office("app");
    app.bind(BindScope::Process, "working").bound_name("working");
    app.bind(BindScope::Process, "failing").bound_name("failing");
    let floor = builder.build().unwrap();

    let unit = floor.office("app").unwrap().begin_process();
    unit.acquire_blocking("working", None).unwrap();
    unit.acquire_blocking("failing", None).unwrap();
    let report = unit.complete();

    assert_eq!(failing.recycled(), 1);
    assert_eq!(working.recycled(), 1);
    let cleanup = report.cleanup().expect("one cleanup failure");
    assert_eq!(cleanup.failures().len(), 1);
    assert!(cleanup.involves("failing"));
    assert!(!cleanup.involves("working"));
    assert!(report.escalations().is_empty());
}

#[test]
fn failed_recycles_are_aggregated() {
    let provider = RecyclingProvider::failing();
    let pool = Arc::new(CountingPool::default());
    let mut builder = app_builder();
    let shared = Arc::clone(&pool);
    builder
        .add_provider("files", provider.clone())
        .office("app")
        .pool(move |_| Ok(shared as Arc<dyn ResourcePool>));
    let app = builder.office("app");
    app.bind(BindScope::Process, "files").bound_name("a");
    app.bind(BindScope::Process, "files").bound_name("b");
    let floor = builder.build().unwrap();

    let unit = floor.office("app").unwrap().begin_process();
    unit.acquire_blocking("a", None).unwrap();
    unit.acquire_blocking("b", None).unwrap();
    let report = unit.complete();

    let cleanup = report.cleanup().expect("cleanup failures");
    assert_eq!(cleanup.failures().len(), 2);
    assert!(cleanup.involves("a") && cleanup.involves("b"));
    assert_eq!(pool.lost.load(Ordering::SeqCst), 2);
    assert_eq!(pool.released.load(Ordering::SeqCst), 0);
    assert!(matches!(report.into_result(), Err(Escalation::Cleanup(_))));
}

#[test]
fn thread_completion_listeners_are_notified() {
    let listener = Arc::new(CompletionCounter::default());
    let mut builder = app_builder();
    let notified = Arc::clone(&listener);
    builder
        .add_provider("counter", CounterProvider::default())
        .office("app")
        .pool(|_| Ok(Arc::new(CountingPool::default()) as Arc<dyn ResourcePool>))
        .thread_completion_listener(move |_| notified as Arc<dyn ThreadCompletionListener>);
    builder.office("app").bind(BindScope::Thread, "counter").bound_name("counter");
    let floor = builder.build().unwrap();

    let process = floor.office("app").unwrap().begin_process();
    for _ in 0..2 {
        let thread = process.begin_thread();
        thread.acquire_blocking("counter", None).unwrap();
        thread.complete();
    }
    process.complete();
    assert_eq!(listener.completed.load(Ordering::SeqCst), 2);
}

#[test]
fn governance_sees_ready_and_recycled_objects() {
    let governance = RecordingGovernance::default();
    let mut builder = app_builder();
    builder.add_governance("audit", governance.clone());
    builder.add_provider("counter", CounterProvider::default()).office("app");
    builder
        .office("app")
        .bind(BindScope::Process, "counter")
        .bound_name("counter")
        .govern("audit");
    let floor = builder.build().unwrap();

    let unit = floor.office("app").unwrap().begin_process();
    unit.acquire_blocking("counter", None).unwrap();
    unit.complete();
    assert_eq!(
        *governance.events.lock(),
        vec!["govern counter".to_string(), "release counter".to_string()]
    );
}

#[test]
fn dependants_are_recycled_before_their_dependencies() {
    let governance = RecordingGovernance::default();
    let mut builder = app_builder();
    builder.add_governance("audit", governance.clone());
    builder.add_provider("counter", CounterProvider::default()).office("app");
    builder.add_provider("service", ServiceProvider).office("app");
    let app = builder.office("app");
    app.bind(BindScope::Process, "counter")
        .bound_name("counter")
        .govern("audit");
    app.bind(BindScope::Process, "service")
        .bound_name("service")
        .depends_on(0, "counter")
        .govern("audit");
    let floor = builder.build().unwrap();

    let unit = floor.office("app").unwrap().begin_process();
    unit.acquire_blocking("service", None).unwrap();
    assert!(unit.complete().is_success());
    assert_eq!(
        *governance.events.lock(),
        vec![
            "govern counter".to_string(),
            "govern service".to_string(),
            "release service".to_string(),
            "release counter".to_string(),
        ]
    );
}

#[test]
fn coordinating_objects_receive_their_dependencies() {
    let mut builder = app_builder();
    builder.add_provider("counter", CounterProvider::default()).office("app");
    builder.add_provider("service", ServiceProvider).office("app");
    let app = builder.office("app");
    app.bind(BindScope::Process, "counter").bound_name("counter");
    app.bind(BindScope::Process, "service")
        .bound_name("service")
        .depends_on(0, "counter");
    let floor = builder.build().unwrap();

    let unit = floor.office("app").unwrap().begin_process();
    let service = unit.acquire_blocking("service", None).unwrap();
    assert_eq!(
        service.object::<Service>().unwrap().counter_site.as_deref(),
        Some("counter")
    );
    assert_eq!(unit.container("counter").unwrap().state(), ContainerState::Ready);
    assert!(unit.complete().is_success());
}

// ─────────────────────────────────────────────────────────────────────────────
// Timeouts
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn sourcing_times_out_on_the_manual_clock() {
    let (manual, clock) = manual_clock();
    let provider = DeferredProvider::default();
    let mut builder = app_builder();
    builder.clock(clock);
    builder
        .add_provider("slow", provider.clone())
        .office("app")
        .timeout(Duration::from_millis(100));
    builder.office("app").bind(BindScope::Process, "slow").bound_name("slow");
    let floor = builder.build().unwrap();

    let unit = floor.office("app").unwrap().begin_process();
    let outcome = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);
    unit.acquire("slow", move |result| *slot.lock() = Some(result.map(|_| ())));

    manual.advance(Duration::from_millis(50));
    assert_eq!(floor.check_timeouts(), 0);
    manual.advance(Duration::from_millis(60));
    assert_eq!(floor.check_timeouts(), 1);

    assert!(matches!(
        outcome.lock().take(),
        Some(Err(Escalation::Timeout { .. }))
    ));
    assert!(unit.escalations().iter().any(Escalation::is_timeout));

    provider.complete_all();
    assert_eq!(unit.container("slow").unwrap().state(), ContainerState::Disposed);
    unit.complete();
}

#[test]
fn asynchronous_operation_times_out() {
    let (manual, clock) = manual_clock();
    let mut builder = app_builder();
    builder.clock(clock);
    builder
        .add_provider("db", ConnectionProvider)
        .office("app")
        .timeout(Duration::from_secs(1));
    builder.office("app").bind(BindScope::Process, "db").bound_name("db");
    let floor = builder.build().unwrap();

    let unit = floor.office("app").unwrap().begin_process();
    let container = unit.acquire_blocking("db", None).unwrap();
    let operations = container
        .object::<Connection>()
        .and_then(|connection| connection.operations.clone())
        .expect("asynchronous context bound");

    let finished = operations.start();
    finished.complete();
    let pending = operations.start();
    manual.advance(Duration::from_millis(600));
    pending.touch();
    manual.advance(Duration::from_millis(600));
    assert_eq!(floor.check_timeouts(), 0);
    manual.advance(Duration::from_millis(500));
    assert_eq!(floor.check_timeouts(), 1);

    pending.fail("too late");
    let report = unit.complete();
    assert_eq!(report.escalations().len(), 1);
    assert!(report.escalations()[0].is_timeout());
}

//! Phase one: provider instantiation, initialisation and descriptor checks.


use core::time::Duration;
use keystone_engine::prelude::*;
use std::sync::Arc;
use test_utils::*;

fn issue_for<'a>(error: &'a AssemblyError, name: &str) -> Vec<&'a str> {
    error
        .issues()
        .iter()
        .filter(|issue| issue.name() == name)
        .map(Issue::message)
        .collect()
}

#[test]
fn provider_without_name_is_reported() {
    let mut builder = app_builder();
    builder.add_provider("  ", CounterProvider::default()).office("app");

    let error = builder.build().unwrap_err();
    assert!(error.mentions("added without a name"));
}

#[test]
fn managing_office_must_exist() {
    let mut builder = app_builder();
    builder.add_provider("orphan", CounterProvider::default());
    builder.add_provider("lost", CounterProvider::default()).office("elsewhere");

    let error = builder.build().unwrap_err();
    assert_eq!(issue_for(&error, "orphan"), vec!["no managing office configured"]);
    assert_eq!(
        issue_for(&error, "lost"),
        vec!["unknown managing office 'elsewhere'"]
    );
}

#[test]
fn unknown_class_is_reported_with_cause() {
    let mut builder = app_builder();
    builder.add_provider_class("db", "postgres").office("app");

    let error = builder.build().unwrap_err();
    let issue = &error.issues()[0];
    assert_eq!(issue.kind(), AssetKind::Provider);
    assert_eq!(issue.message(), "failed to instantiate provider");
    assert!(issue.cause().is_some());
}

#[test]
fn registered_class_is_instantiated() {
    let mut builder = app_builder();
    builder
        .registry_mut()
        .register_default::<CounterProvider>("counter");
    builder
        .add_provider_class("counter", "counter")
        .office("app")
        .property("start", "3");
    builder.office("app").bind(BindScope::Process, "counter");

    let floor = builder.build().unwrap();
    let descriptor = floor.descriptor("counter").unwrap();
    assert_eq!(descriptor.office(), "app");
    assert_eq!(descriptor.object_type().arg_type(), ArgType::of::<Counter>());
}

#[test]
fn negative_timeout_is_rejected() {
    let mut builder = app_builder();
    builder
        .add_provider("counter", CounterProvider::default())
        .office("app")
        .timeout_millis(-5);

    let error = builder.build().unwrap_err();
    assert!(error.mentions("timeout must not be negative (got -5ms)"));
}

#[test]
fn asynchronous_provider_with_negative_timeout_is_rejected() {
    let mut builder = app_builder();
    builder
        .add_provider("db", ConnectionProvider)
        .office("app")
        .timeout_millis(-5);

    let error = builder.build().unwrap_err();
    assert_eq!(
        issue_for(&error, "db"),
        vec!["timeout must not be negative (got -5ms)"]
    );
}

#[test]
fn asynchronous_provider_needs_a_timeout() {
    let mut builder = app_builder();
    builder.add_provider("db", ConnectionProvider).office("app");
    builder
        .add_provider("db2", ConnectionProvider)
        .office("app")
        .timeout(Duration::from_millis(250));

    let error = builder.build().unwrap_err();
    assert_eq!(
        issue_for(&error, "db"),
        vec!["asynchronous provider requires a timeout greater than zero"]
    );
    assert!(issue_for(&error, "db2").is_empty());
}

#[test]
fn flows_and_input_binding_go_together() {
    let mut builder = app_builder();
    builder.add_provider("flows", FlowProvider::new(1)).office("app");
    builder
        .add_provider("input", CounterProvider::default())
        .office("app")
        .input();

    let error = builder.build().unwrap_err();
    assert!(error.mentions("requires flows but no input binding configured"));
    assert!(error.mentions("input binding configured but provider declares no flows"));
}

#[test]
fn second_recycle_declaration_aborts_assembly() {
    #[derive(Debug, Default)]
    struct Indecisive;

    impl Provider for Indecisive {
        fn init(&mut self, context: &mut SourceContext<'_>) -> Result<SourceMetadata, SourceError> {
            let _ = context.set_recycle_function("first");
            let _ = context.set_recycle_function("second");
            Ok(SourceMetadata::for_object::<Counter>())
        }

        fn source(&self, sink: SourceSink) {
            sink.ready(Counter::default());
        }
    }

    let mut builder = app_builder();
    builder.add_provider("indecisive", Indecisive).office("app");

    match builder.build() {
        Err(AssemblyError::ProviderBug { provider, bug }) => {
            assert_eq!(provider, "indecisive");
            assert!(matches!(bug, ProviderBug::RecycleFunctionAlreadyDeclared { .. }));
        }
        other => panic!("expected a provider bug, got {other:?}"),
    }
}

#[test]
fn failing_init_is_an_issue() {
    #[derive(Debug, Default)]
    struct NeedsUrl;

    impl Provider for NeedsUrl {
        fn init(&mut self, context: &mut SourceContext<'_>) -> Result<SourceMetadata, SourceError> {
            context.property("url")?;
            Ok(SourceMetadata::for_object::<Counter>())
        }

        fn source(&self, sink: SourceSink) {
            sink.ready(Counter::default());
        }
    }

    let mut builder = app_builder();
    builder.add_provider("remote", NeedsUrl).office("app");

    let error = builder.build().unwrap_err();
    assert_eq!(issue_for(&error, "remote"), vec!["failed to initialise"]);
}

#[test]
fn issues_of_every_provider_are_collected() {
    let mut builder = app_builder();
    builder.add_provider("a", CounterProvider::default());
    builder
        .add_provider("b", CounterProvider::default())
        .office("app")
        .timeout_millis(-1);
    builder.add_provider("c", ConnectionProvider).office("app");
    builder.add_provider("a", CounterProvider::default()).office("app");

    let error = builder.build().unwrap_err();
    let names: Vec<_> = error.issues().iter().map(Issue::name).collect();
    assert!(names.contains(&"a"));
    assert!(names.contains(&"b"));
    assert!(names.contains(&"c"));
    assert!(error.mentions("added more than once"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Pools
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn pool_factory_failure_is_an_issue() {
    let mut builder = app_builder();
    builder
        .add_provider("counter", CounterProvider::default())
        .office("app")
        .pool(|_| Err(PoolError::Configuration("no capacity".into())));

    let error = builder.build().unwrap_err();
    let issue = &error.issues()[0];
    assert_eq!(issue.message(), "failed to create pool");
    assert!(issue.cause().is_some());
}

#[test]
fn thread_listener_requires_a_pool() {
    let mut builder = app_builder();
    builder
        .add_provider("counter", CounterProvider::default())
        .office("app")
        .thread_completion_listener(|_| Arc::new(CompletionCounter::default()));

    let error = builder.build().unwrap_err();
    assert!(error.mentions("thread completion listener configured without a pool"));
}

#[test]
fn default_pool_skips_coordinating_providers() {
    let mut builder = app_builder();
    builder.default_pool(|context| {
        assert_ne!(context.provider_name(), "service");
        Ok(Arc::new(CountingPool::default()) as Arc<dyn ResourcePool>)
    });
    builder.add_provider("counter", CounterProvider::default()).office("app");
    builder.add_provider("service", ServiceProvider).office("app");

    let floor = builder.build().unwrap();
    assert!(floor.descriptor("counter").unwrap().is_poolable());
    assert!(!floor.descriptor("service").unwrap().is_poolable());
}

#[test]
fn configured_pool_wins_over_default() {
    let configured = Arc::new(CountingPool::default());
    let mut builder = app_builder();
    builder.default_pool(|_| Err(PoolError::Configuration("default used".into())));
    let pool = Arc::clone(&configured);
    builder
        .add_provider("counter", CounterProvider::default())
        .office("app")
        .pool(move |_| Ok(pool as Arc<dyn ResourcePool>));

    let floor = builder.build().unwrap();
    let descriptor = floor.descriptor("counter").unwrap();
    let pool = descriptor.pool().unwrap().pool();
    assert!(core::ptr::addr_eq(Arc::as_ptr(pool), Arc::as_ptr(&configured)));
}

//! Input provider turning pushed events into flow invocations.
//!
//! An [`InboundProvider`] declares one flow taking the event type, one
//! execution group the flows are dispatched on, and a recycle function of
//! its own. Each pushed event starts a new process in the managing office
//! whose input site holds an [`InboundRequest`].
//!
//! | Declaration | Value |
//! |-------------|-------|
//! | object type | [`InboundRequest`] |
//! | flow 0 | `request`, argument `E` |
//! | execution group 0 | `inbound` |
//! | recycle function | `<provider>.recycle` |

use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use core::time::Duration;
use keystone_engine::container::{RecycleParameter, SourceSink};
use keystone_engine::execute::{ExecuteContext, FlowCallback};
use keystone_engine::provider::{FlowSlot, Provider, SourceContext, SourceError, SourceMetadata};
use keystone_engine::resource::ManagedResource;
use keystone_engine::types::ArgType;
use std::any::Any;
use std::sync::{Arc, OnceLock};

/// Object of the input site while one event is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    sequence: u64,
}

impl InboundRequest {
    /// Position of the event among those pushed to the provider, from zero.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl ManagedResource for InboundRequest {}

/// Failure to push an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InboundError {
    /// The floor has not been opened yet.
    #[error("inbound provider '{0}' is not started")]
    NotStarted(String),

    /// The floor was closed.
    #[error("inbound provider '{0}' is stopped")]
    Stopped(String),

    /// No team serves the execution group.
    #[error("inbound provider '{0}' has no team")]
    NoTeam(String),
}

#[derive(Debug, Default)]
struct InboundShared {
    name: OnceLock<String>,
    execute: OnceLock<Arc<ExecuteContext>>,
    pushed: AtomicU64,
    handled: AtomicU64,
    stopped: AtomicBool,
}

impl InboundShared {
    fn name(&self) -> String {
        self.name.get().cloned().unwrap_or_default()
    }
}

/// Input provider for events of type `E`.
#[derive(Debug)]
pub struct InboundProvider<E> {
    shared: Arc<InboundShared>,
    _event: PhantomData<fn(E)>,
}

impl<E> Default for InboundProvider<E> {
    fn default() -> Self {
        Self {
            shared: Arc::new(InboundShared::default()),
            _event: PhantomData,
        }
    }
}

impl<E: Any + Send + Sync> InboundProvider<E> {
    /// Creates the provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle pushing events to this provider from any thread.
    #[must_use]
    pub fn handle(&self) -> InboundHandle<E> {
        InboundHandle {
            shared: Arc::clone(&self.shared),
            _event: PhantomData,
        }
    }
}

impl<E: Any + Send + Sync> Provider for InboundProvider<E> {
    fn init(&mut self, context: &mut SourceContext<'_>) -> Result<SourceMetadata, SourceError> {
        let _ = self.shared.name.set(context.provider_name().to_string());

        let shared = Arc::clone(&self.shared);
        let recycle = context.add_function(
            "recycle",
            Some(ArgType::of::<RecycleParameter>()),
            move |call| {
                if let Some(parameter) = call.argument::<RecycleParameter>() {
                    tracing::trace!(bound_name = parameter.bound_name(), "inbound request handled");
                }
                shared.handled.fetch_add(1, Ordering::AcqRel);
                Ok(())
            },
        );
        context.set_recycle_function(recycle)?;

        Ok(SourceMetadata::for_object::<InboundRequest>()
            .with_flow(FlowSlot::new("request").with_argument::<E>())
            .with_execution_group("inbound"))
    }

    fn start(&self, execute: Arc<ExecuteContext>) -> Result<(), SourceError> {
        self.shared
            .execute
            .set(execute)
            .map_err(|_| SourceError::msg("inbound provider started twice"))
    }

    fn source(&self, sink: SourceSink) {
        sink.fail("inbound requests are only supplied by pushed events");
    }

    fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
    }
}

/// Pushes events into an [`InboundProvider`].
#[derive(Debug)]
pub struct InboundHandle<E> {
    shared: Arc<InboundShared>,
    _event: PhantomData<fn(E)>,
}

impl<E> Clone for InboundHandle<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _event: PhantomData,
        }
    }
}

impl<E: Any + Send + Sync> InboundHandle<E> {
    /// Hands `event` to the provider's team, which invokes the `request` flow.
    ///
    /// # Errors
    ///
    /// [`InboundError`] if the floor is not open.
    pub fn push(&self, event: E, callback: Option<FlowCallback>) -> Result<(), InboundError> {
        let Some(execute) = self.shared.execute.get() else {
            return Err(InboundError::NotStarted(self.shared.name()));
        };
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(InboundError::Stopped(self.shared.name()));
        }
        let team = execute
            .team(0)
            .ok_or_else(|| InboundError::NoTeam(self.shared.name()))?;

        let request = InboundRequest {
            sequence: self.shared.pushed.fetch_add(1, Ordering::AcqRel),
        };
        let execute = Arc::clone(execute);
        team.assign(Box::new(move || {
            execute.invoke_flow(
                0,
                Some(Box::new(event)),
                Some(Box::new(request)),
                Duration::ZERO,
                callback,
            );
        }));
        Ok(())
    }

    /// Number of events pushed so far.
    #[must_use]
    pub fn pushed(&self) -> u64 {
        self.shared.pushed.load(Ordering::Acquire)
    }

    /// Number of requests recycled so far.
    #[must_use]
    pub fn handled(&self) -> u64 {
        self.shared.handled.load(Ordering::Acquire)
    }
}

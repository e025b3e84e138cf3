//! The runtime invocation entry point of a bound provider.
//!
//! An [`ExecuteContext`] is created once per provider when it is bound to its
//! managing office and handed to [`Provider::start`](crate::provider::Provider::start).
//! Its tables never change afterwards, so it can be shared with any number of
//! threads and invoked from I/O callbacks, timers or team workers.

use crate::escalation::Escalation;
use crate::floor::Office;
use crate::function::FunctionDecl;
use crate::resource::ManagedResource;
use crate::team::Team;
use crate::timer::{Expiry, TimerJob};
use crate::types::Argument;
use crate::unit::UnitOfWork;
use core::time::Duration;
use std::sync::{Arc, OnceLock, Weak};

/// Receives the outcome of a flow invocation.
pub type FlowCallback = Box<dyn FnOnce(Result<(), Escalation>) + Send + 'static>;

/// A flow slot resolved to a function of the managing office.
#[derive(Debug, Clone)]
pub struct ResolvedFlow {
    index: usize,
    label: String,
    function: Arc<FunctionDecl>,
}

impl ResolvedFlow {
    pub(crate) fn new(index: usize, label: &str, function: Arc<FunctionDecl>) -> Self {
        Self {
            index,
            label: label.to_string(),
            function,
        }
    }

    /// Slot index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Slot label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Target function, with the slot's argument type as parameter type.
    #[must_use]
    pub fn function(&self) -> &Arc<FunctionDecl> {
        &self.function
    }
}

/// Flow and team tables of one provider.
pub struct ExecuteContext {
    provider: String,
    flows: Vec<ResolvedFlow>,
    teams: Vec<Arc<dyn Team>>,
    input_site: Option<String>,
    office: OnceLock<Weak<Office>>,
}

impl core::fmt::Debug for ExecuteContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecuteContext")
            .field("provider", &self.provider)
            .field("flows", &self.flows)
            .field("teams", &self.teams.len())
            .field("input_site", &self.input_site)
            .finish_non_exhaustive()
    }
}

impl ExecuteContext {
    pub(crate) fn new(
        provider: String,
        flows: Vec<ResolvedFlow>,
        teams: Vec<Arc<dyn Team>>,
        input_site: Option<String>,
    ) -> Self {
        Self {
            provider,
            flows,
            teams,
            input_site,
            office: OnceLock::new(),
        }
    }

    pub(crate) fn attach(&self, office: Weak<Office>) {
        let _ = self.office.set(office);
    }

    /// Provider name.
    #[must_use]
    pub fn provider_name(&self) -> &str {
        &self.provider
    }

    /// Number of resolved flows, equal to the number of declared flow slots.
    #[must_use]
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Resolved flows in slot order.
    #[must_use]
    pub fn flows(&self) -> &[ResolvedFlow] {
        &self.flows
    }

    /// The resolved flow for `slot`.
    #[must_use]
    pub fn flow(&self, slot: usize) -> Option<&ResolvedFlow> {
        self.flows.iter().find(|flow| flow.index == slot)
    }

    /// Team for execution group `group`.
    #[must_use]
    pub fn team(&self, group: usize) -> Option<&Arc<dyn Team>> {
        self.teams.get(group)
    }

    /// Number of execution groups.
    #[must_use]
    pub fn team_count(&self) -> usize {
        self.teams.len()
    }

    /// Bound name of the provider's input site, if configured.
    #[must_use]
    pub fn input_site(&self) -> Option<&str> {
        self.input_site.as_deref()
    }

    /// Invokes flow `slot` in a new process unit of the managing office.
    ///
    /// `input` becomes the ready object of the provider's input site within
    /// that process. With a non-zero `delay` the flow is queued on the floor's
    /// timer thread; otherwise it runs on the calling thread. Flows only run
    /// while the floor is open: invoked before `open`, after `close`, or still
    /// queued when the floor closes, they fail with
    /// [`Escalation::Unavailable`]. The outcome (including cleanup failures of
    /// the process) goes to `callback`, or is logged if there is none.
    pub fn invoke_flow(
        &self,
        slot: usize,
        argument: Option<Argument>,
        input: Option<Box<dyn ManagedResource>>,
        delay: Duration,
        callback: Option<FlowCallback>,
    ) {
        let provider = self.provider.clone();
        let deliver = {
            let provider = provider.clone();
            move |result: Result<(), Escalation>| match callback {
                Some(callback) => callback(result),
                None => {
                    if let Err(escalation) = result {
                        tracing::error!(%provider, slot, %escalation, "flow failed without a callback");
                    }
                }
            }
        };

        let Some(flow) = self.flow(slot).cloned() else {
            deliver(Err(Escalation::UnknownFlow { provider, slot }));
            return;
        };
        let office = match self.office.get().and_then(Weak::upgrade) {
            Some(office) if office.is_running() => office,
            _ => {
                deliver(Err(not_running(provider)));
                return;
            }
        };
        let input_site = self.input_site.clone();

        if delay.is_zero() {
            deliver(run_flow(&office, &flow, argument, input, input_site.as_deref()));
            return;
        }

        let timer = Arc::clone(office.timer());
        let job: TimerJob = Box::new(move |expiry| {
            let result = match expiry {
                Expiry::Due if office.is_running() => {
                    run_flow(&office, &flow, argument, input, input_site.as_deref())
                }
                _ => Err(not_running(provider)),
            };
            deliver(result);
        });
        if let Err(job) = timer.schedule(delay, job) {
            job(Expiry::Cancelled);
        }
    }
}

fn not_running(provider: String) -> Escalation {
    Escalation::Unavailable {
        bound_name: provider,
        reason: "managing office is not running".to_string(),
    }
}

fn run_flow(
    office: &Arc<Office>,
    flow: &ResolvedFlow,
    argument: Option<Argument>,
    input: Option<Box<dyn ManagedResource>>,
    input_site: Option<&str>,
) -> Result<(), Escalation> {
    let unit = office.begin_process();
    let outcome = supply_input(&unit, flow, input, input_site)
        .and_then(|()| unit.run_decl(&flow.function, argument));
    let report = unit.complete();
    outcome.and(report.into_result())
}

fn supply_input(
    unit: &UnitOfWork,
    flow: &ResolvedFlow,
    input: Option<Box<dyn ManagedResource>>,
    input_site: Option<&str>,
) -> Result<(), Escalation> {
    let Some(object) = input else {
        return Ok(());
    };
    let Some(site) = input_site else {
        return Err(Escalation::Unavailable {
            bound_name: flow.function.name().to_string(),
            reason: "input object supplied but no input site configured".to_string(),
        });
    };
    unit.container(site)?.supply(object)
}

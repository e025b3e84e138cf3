//! Timeout monitors ("asset managers").
//!
//! Every binding site owns a sourcing monitor and, for asynchronous
//! resources, an operation monitor. Containers register with a monitor while
//! they are waiting on the provider (or on an in-flight asynchronous
//! operation) and deregister once the wait is over.
//!
//! Monitors do not own a thread. Something outside the engine polls
//! [`AssetManager::check`] (or
//! [`OfficeFloor::check_timeouts`](crate::floor::OfficeFloor::check_timeouts))
//! and every registration older than the timeout is escalated.
//!
//! A monitor with a zero timeout never fires.

use crate::clock::Clock;
use crate::escalation::Escalation;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// What a monitor watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorKind {
    /// Acquisition of the resource from its provider.
    Sourcing,
    /// An in-flight asynchronous operation on a ready resource.
    Operation,
}

impl core::fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MonitorKind::Sourcing => f.write_str("sourcing"),
            MonitorKind::Operation => f.write_str("operation"),
        }
    }
}

/// Something that can be timed out.
pub trait MonitoredAsset: Send + Sync {
    /// Called (without any monitor lock held) when the registration expired.
    fn timed_out(&self, kind: MonitorKind, escalation: Escalation);
}

/// Handle to one registration with a [`TimeoutMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetToken(u64);

struct Registration {
    token: AssetToken,
    since: Instant,
    asset: Weak<dyn MonitoredAsset>,
}

/// Watchdog for one binding site and one [`MonitorKind`].
pub struct TimeoutMonitor {
    name: String,
    bound_name: String,
    kind: MonitorKind,
    timeout: Duration,
    clock: Clock,
    next_token: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
}

impl core::fmt::Debug for TimeoutMonitor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimeoutMonitor")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("pending", &self.pending())
            .finish()
    }
}

impl TimeoutMonitor {
    fn new(bound_name: &str, kind: MonitorKind, timeout: Duration, clock: Clock) -> Self {
        Self {
            name: format!("{bound_name}#{kind}"),
            bound_name: bound_name.to_string(),
            kind,
            timeout,
            clock,
            next_token: AtomicU64::new(0),
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// Registration name, `<bound name>#<kind>`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What this monitor watches.
    #[must_use]
    pub fn kind(&self) -> MonitorKind {
        self.kind
    }

    /// Configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Starts watching `asset`.
    pub fn register(&self, asset: Weak<dyn MonitoredAsset>) -> AssetToken {
        let token = AssetToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.registrations.lock().push(Registration {
            token,
            since: self.clock.now(),
            asset,
        });
        token
    }

    /// Records activity, restarting the timeout for this registration.
    pub fn touch(&self, token: AssetToken) -> bool {
        let now = self.clock.now();
        let mut registrations = self.registrations.lock();
        match registrations.iter_mut().find(|r| r.token == token) {
            Some(registration) => {
                registration.since = now;
                true
            }
            None => false,
        }
    }

    /// Stops watching. Returns `false` if the registration already expired.
    pub fn deregister(&self, token: AssetToken) -> bool {
        let mut registrations = self.registrations.lock();
        let before = registrations.len();
        registrations.retain(|r| r.token != token);
        registrations.len() != before
    }

    /// Number of live registrations.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Escalates every expired registration. Returns how many fired.
    pub fn check(&self) -> usize {
        if self.timeout.is_zero() {
            return 0;
        }
        let now = self.clock.now();
        let mut expired = Vec::new();
        self.registrations.lock().retain(|registration| {
            if registration.asset.strong_count() == 0 {
                return false;
            }
            if now.saturating_duration_since(registration.since) >= self.timeout {
                expired.push(registration.asset.clone());
                return false;
            }
            true
        });

        let mut fired = 0;
        for asset in expired {
            if let Some(asset) = asset.upgrade() {
                tracing::warn!(monitor = %self.name, timeout = ?self.timeout, "timeout monitor fired");
                asset.timed_out(
                    self.kind,
                    Escalation::Timeout {
                        bound_name: self.bound_name.clone(),
                        timeout: self.timeout,
                    },
                );
                fired += 1;
            }
        }
        fired
    }
}

/// Owner of every [`TimeoutMonitor`] of an office floor.
#[derive(Debug)]
pub struct AssetManager {
    clock: Clock,
    monitors: Mutex<Vec<Weak<TimeoutMonitor>>>,
}

impl AssetManager {
    /// Creates a manager reading time from `clock`.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            monitors: Mutex::new(Vec::new()),
        }
    }

    /// Clock shared by all monitors.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Creates and tracks a monitor for `bound_name`.
    pub fn create_monitor(
        &self,
        bound_name: &str,
        kind: MonitorKind,
        timeout: Duration,
    ) -> Arc<TimeoutMonitor> {
        let monitor = Arc::new(TimeoutMonitor::new(
            bound_name,
            kind,
            timeout,
            self.clock.clone(),
        ));
        self.monitors.lock().push(Arc::downgrade(&monitor));
        monitor
    }

    /// Number of live monitors.
    #[must_use]
    pub fn monitor_count(&self) -> usize {
        self.monitors
            .lock()
            .iter()
            .filter(|m| m.strong_count() > 0)
            .count()
    }

    /// Polls every monitor. Returns the number of escalations raised.
    pub fn check(&self) -> usize {
        let monitors: Vec<Arc<TimeoutMonitor>> = {
            let mut monitors = self.monitors.lock();
            monitors.retain(|m| m.strong_count() > 0);
            monitors.iter().filter_map(Weak::upgrade).collect()
        };
        monitors.iter().map(|m| m.check()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[derive(Default)]
    struct Recorder {
        fired: Mutex<Vec<(MonitorKind, Escalation)>>,
    }

    impl MonitoredAsset for Recorder {
        fn timed_out(&self, kind: MonitorKind, escalation: Escalation) {
            self.fired.lock().push((kind, escalation));
        }
    }

    fn manager() -> (Arc<ManualClock>, AssetManager) {
        let manual = Arc::new(ManualClock::new());
        let manager = AssetManager::new(Clock::with_provider(manual.clone()));
        (manual, manager)
    }

    #[test]
    fn fires_once_after_timeout() {
        let (manual, manager) = manager();
        let monitor =
            manager.create_monitor("process:0:db", MonitorKind::Sourcing, Duration::from_secs(5));
        let asset = Arc::new(Recorder::default());
        let weak: Weak<dyn MonitoredAsset> = Arc::downgrade(&asset) as Weak<dyn MonitoredAsset>;
        monitor.register(weak);

        manual.advance(Duration::from_secs(4));
        assert_eq!(manager.check(), 0);

        manual.advance(Duration::from_secs(1));
        assert_eq!(manager.check(), 1);
        assert_eq!(manager.check(), 0);

        let fired = asset.fired.lock();
        assert_eq!(fired.len(), 1);
        assert!(fired[0].1.is_timeout());
    }

    #[test]
    fn touch_restarts_the_timeout() {
        let (manual, manager) = manager();
        let monitor =
            manager.create_monitor("x", MonitorKind::Operation, Duration::from_secs(2));
        let asset = Arc::new(Recorder::default());
        let token = monitor.register(Arc::downgrade(&asset) as Weak<dyn MonitoredAsset>);

        manual.advance(Duration::from_secs(1));
        assert!(monitor.touch(token));
        manual.advance(Duration::from_secs(1));
        assert_eq!(monitor.check(), 0);
        assert!(monitor.deregister(token));
        assert_eq!(monitor.pending(), 0);
    }

    #[test]
    fn zero_timeout_never_fires() {
        let (manual, manager) = manager();
        let monitor = manager.create_monitor("x", MonitorKind::Sourcing, Duration::ZERO);
        let asset = Arc::new(Recorder::default());
        monitor.register(Arc::downgrade(&asset) as Weak<dyn MonitoredAsset>);

        manual.advance(Duration::from_secs(3600));
        assert_eq!(manager.check(), 0);
        assert_eq!(monitor.pending(), 1);
    }

    #[test]
    fn dropped_monitors_are_pruned() {
        let (_manual, manager) = manager();
        let monitor = manager.create_monitor("x", MonitorKind::Sourcing, Duration::from_secs(1));
        assert_eq!(manager.monitor_count(), 1);
        drop(monitor);
        assert_eq!(manager.monitor_count(), 0);
    }
}

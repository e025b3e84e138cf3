//! Time source for timeout monitors.
//!
//! Monitors read time through a [`Clock`] so tests can substitute a
//! [`ManualClock`] and advance time without sleeping.

use core::time::Duration;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

// ─────────────────────────────────────────────────────────────────────────────
// ClockProvider Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for providing current time.
///
/// Implement this for custom time providers (e.g., a manual clock for tests).
pub trait ClockProvider: Send + Sync + 'static {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// System clock provider using `std::time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
struct SystemClock;

impl ClockProvider for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// Shared handle to a time provider.
#[derive(Clone)]
pub struct Clock {
    provider: Arc<dyn ClockProvider>,
}

impl core::fmt::Debug for Clock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Clock").finish_non_exhaustive()
    }
}

impl Clock {
    /// Creates a clock backed by the system clock.
    #[must_use]
    pub fn system() -> Self {
        Self {
            provider: Arc::new(SystemClock),
        }
    }

    /// Creates a clock with a custom provider.
    #[must_use]
    pub fn with_provider(provider: Arc<dyn ClockProvider>) -> Self {
        Self { provider }
    }

    /// Returns the current instant.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.provider.now()
    }

    /// Returns the duration elapsed since the given instant.
    #[must_use]
    pub fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ManualClock
// ─────────────────────────────────────────────────────────────────────────────

/// Clock that only moves when told to.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use keystone_engine::clock::{Clock, ManualClock};
///
/// let manual = Arc::new(ManualClock::new());
/// let clock = Clock::with_provider(manual.clone());
///
/// let start = clock.now();
/// manual.advance(Duration::from_secs(60));
/// assert_eq!(clock.elapsed_since(start), Duration::from_secs(60));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    current: RwLock<Instant>,
}

impl ManualClock {
    /// Creates a manual clock starting at the current system instant.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Creates a manual clock starting at `start`.
    #[must_use]
    pub fn starting_at(start: Instant) -> Self {
        Self {
            current: RwLock::new(start),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.current.write() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockProvider for ManualClock {
    fn now(&self) -> Instant {
        *self.current.read()
    }
}

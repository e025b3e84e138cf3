//! The timer thread behind delayed flow invocations.
//!
//! One timer serves every office of a floor. It runs from
//! [`OfficeFloor::open`](crate::floor::OfficeFloor::open) until
//! [`OfficeFloor::close`](crate::floor::OfficeFloor::close); entries still
//! pending when it stops are handed back as [`Expiry::Cancelled`].

use core::cmp::{Ordering, Reverse};
use core::time::Duration;
use parking_lot::{Condvar, Mutex};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Name of the timer thread.
pub const TIMER_THREAD: &str = "keystone-timer";

/// Longest delay honoured; longer delays are clamped.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// How a scheduled entry ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expiry {
    /// The delay elapsed while the timer was running.
    Due,
    /// The timer was not running, or stopped first.
    Cancelled,
}

pub(crate) type TimerJob = Box<dyn FnOnce(Expiry) + Send + 'static>;

struct Entry {
    due: Instant,
    sequence: u64,
    job: TimerJob,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.sequence).cmp(&(other.due, other.sequence))
    }
}

#[derive(Default)]
struct Schedule {
    entries: BinaryHeap<Reverse<Entry>>,
    next_sequence: u64,
    running: bool,
}

#[derive(Default)]
struct TimerShared {
    schedule: Mutex<Schedule>,
    wake: Condvar,
}

/// Deadline queue drained by a single thread.
#[derive(Default)]
pub(crate) struct FlowTimer {
    shared: Arc<TimerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl core::fmt::Debug for FlowTimer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let schedule = self.shared.schedule.lock();
        f.debug_struct("FlowTimer")
            .field("running", &schedule.running)
            .field("pending", &schedule.entries.len())
            .finish()
    }
}

impl FlowTimer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawns the timer thread. Does nothing if it already runs.
    pub(crate) fn start(&self) -> std::io::Result<()> {
        let mut thread = self.thread.lock();
        {
            let mut schedule = self.shared.schedule.lock();
            if schedule.running {
                return Ok(());
            }
            schedule.running = true;
        }
        let shared = Arc::clone(&self.shared);
        match std::thread::Builder::new()
            .name(TIMER_THREAD.to_string())
            .spawn(move || run(&shared))
        {
            Ok(handle) => {
                *thread = Some(handle);
                tracing::debug!("flow timer started");
                Ok(())
            }
            Err(error) => {
                self.shared.schedule.lock().running = false;
                Err(error)
            }
        }
    }

    /// Runs `job` on the timer thread once `delay` elapsed.
    ///
    /// # Errors
    ///
    /// Hands `job` back if the timer is not running.
    pub(crate) fn schedule(&self, delay: Duration, job: TimerJob) -> Result<(), TimerJob> {
        let mut schedule = self.shared.schedule.lock();
        if !schedule.running {
            return Err(job);
        }
        let due = Instant::now() + delay.min(MAX_DELAY);
        let sequence = schedule.next_sequence;
        schedule.next_sequence += 1;
        let earliest = schedule
            .entries
            .peek()
            .is_none_or(|Reverse(next)| due < next.due);
        schedule.entries.push(Reverse(Entry { due, sequence, job }));
        drop(schedule);
        if earliest {
            self.shared.wake.notify_one();
        }
        Ok(())
    }

    /// Number of entries waiting for their deadline.
    pub(crate) fn pending(&self) -> usize {
        self.shared.schedule.lock().entries.len()
    }

    /// Stops the thread and cancels every pending entry, earliest first.
    ///
    /// Called from a timer job, the thread is left to exit on its own once
    /// that job returns.
    pub(crate) fn stop(&self) {
        let mut cancelled: Vec<Entry> = {
            let mut schedule = self.shared.schedule.lock();
            schedule.running = false;
            core::mem::take(&mut schedule.entries)
                .into_iter()
                .map(|Reverse(entry)| entry)
                .collect()
        };
        self.shared.wake.notify_all();

        let handle = self.thread.lock().take();
        if let Some(handle) = handle
            && handle.thread().id() != std::thread::current().id()
            && handle.join().is_err()
        {
            tracing::error!("flow timer thread panicked");
        }

        cancelled.sort();
        if !cancelled.is_empty() {
            tracing::debug!(cancelled = cancelled.len(), "flow timer stopped with pending entries");
        }
        for entry in cancelled {
            (entry.job)(Expiry::Cancelled);
        }
    }
}

fn run(shared: &TimerShared) {
    loop {
        let job = {
            let mut schedule = shared.schedule.lock();
            loop {
                if !schedule.running {
                    return;
                }
                let next_due = schedule.entries.peek().map(|Reverse(entry)| entry.due);
                match next_due {
                    Some(due) if due <= Instant::now() => {
                        break schedule.entries.pop().map(|Reverse(entry)| entry.job);
                    }
                    Some(due) => {
                        let _ = shared.wake.wait_until(&mut schedule, due);
                    }
                    None => shared.wake.wait(&mut schedule),
                }
            }
        };
        if let Some(job) = job {
            job(Expiry::Due);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn recorder(label: &'static str, sender: &mpsc::Sender<(&'static str, Expiry)>) -> TimerJob {
        let sender = sender.clone();
        Box::new(move |expiry| {
            let _ = sender.send((label, expiry));
        })
    }

    #[test]
    fn entries_fire_in_deadline_order() {
        let timer = FlowTimer::new();
        timer.start().unwrap();
        let (sender, receiver) = mpsc::channel();

        timer.schedule(Duration::from_millis(60), recorder("late", &sender)).ok().unwrap();
        timer.schedule(Duration::from_millis(10), recorder("early", &sender)).ok().unwrap();

        let fired: Vec<_> = receiver.iter().take(2).collect();
        assert_eq!(fired, vec![("early", Expiry::Due), ("late", Expiry::Due)]);
        assert_eq!(timer.pending(), 0);
        timer.stop();
    }

    #[test]
    fn stopped_timer_cancels_pending_entries() {
        let timer = FlowTimer::new();
        timer.start().unwrap();
        let (sender, receiver) = mpsc::channel();

        timer.schedule(Duration::from_secs(60), recorder("pending", &sender)).ok().unwrap();
        assert_eq!(timer.pending(), 1);
        timer.stop();

        assert_eq!(receiver.try_recv().unwrap(), ("pending", Expiry::Cancelled));
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn idle_timer_hands_the_job_back() {
        let timer = FlowTimer::new();
        let (sender, receiver) = mpsc::channel();

        let job = timer.schedule(Duration::ZERO, recorder("refused", &sender)).unwrap_err();
        job(Expiry::Cancelled);
        assert_eq!(receiver.try_recv().unwrap(), ("refused", Expiry::Cancelled));
    }
}

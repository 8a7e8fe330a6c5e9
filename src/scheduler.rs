//! Single-threaded cooperative timer scheduler.
//!
//! Tasks are plain closures over a context value owned by the driver. Each
//! run returns [`Tick::After`] to be rescheduled or [`Tick::Stop`] to retire.
//! Tasks never block; the only suspension point is the sleep between ticks.
//!
//! ```rust,ignore
//! let mut scheduler = Scheduler::new();
//! scheduler.schedule_after(Duration::ZERO, |count: &mut u32| {
//!     *count += 1;
//!     if *count < 3 { Tick::After(Duration::from_millis(10)) } else { Tick::Stop }
//! });
//! scheduler.run(&mut 0).await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Outcome of one task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Run again after this delay
    After(Duration),
    /// Retire the task
    Stop,
}

/// Cancellation handle for a scheduled task.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Prevent any further runs of the task.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether the task was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

type TaskFn<C> = Box<dyn FnMut(&mut C) -> Tick>;

struct Entry<C> {
    due: Instant,
    seq: u64,
    handle: TaskHandle,
    task: TaskFn<C>,
}

/// Timer scheduler over a context `C`.
pub struct Scheduler<C> {
    entries: Vec<Entry<C>>,
    next_seq: u64,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Scheduler<C> {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    /// Schedule `task` to first run after `delay`.
    pub fn schedule_after<F>(&mut self, delay: Duration, task: F) -> TaskHandle
    where
        F: FnMut(&mut C) -> Tick + 'static,
    {
        let handle = TaskHandle::default();
        self.entries.push(Entry {
            due: Instant::now() + delay,
            seq: self.next_seq,
            handle: handle.clone(),
            task: Box::new(task),
        });
        self.next_seq += 1;
        handle
    }

    /// Number of live tasks.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.handle.is_cancelled())
            .count()
    }

    /// Whether no live tasks remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Earliest deadline among live tasks.
    pub fn next_due(&self) -> Option<Instant> {
        self.entries
            .iter()
            .filter(|e| !e.handle.is_cancelled())
            .map(|e| e.due)
            .min()
    }

    /// Run every task due at `now`, in deadline order. Returns tasks run.
    pub fn run_due(&mut self, ctx: &mut C, now: Instant) -> usize {
        self.entries.retain(|e| !e.handle.is_cancelled());
        self.entries.sort_by_key(|e| (e.due, e.seq));

        let mut ran = 0;
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].due > now {
                break;
            }
            let entry = &mut self.entries[i];
            ran += 1;
            match (entry.task)(ctx) {
                Tick::After(delay) if !entry.handle.is_cancelled() => {
                    entry.due = now + delay;
                    i += 1;
                },
                _ => {
                    self.entries.remove(i);
                },
            }
        }
        ran
    }

    /// Drive tasks until none remain.
    pub async fn run(&mut self, ctx: &mut C) {
        while let Some(due) = self.next_due() {
            tokio::time::sleep_until(due).await;
            self.run_due(ctx, Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_task_reschedules_until_stop() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_after(Duration::ZERO, |count: &mut u32| {
            *count += 1;
            if *count < 3 {
                Tick::After(Duration::from_millis(10))
            } else {
                Tick::Stop
            }
        });

        let mut count = 0;
        let start = Instant::now();
        scheduler.run(&mut count).await;

        assert_eq!(count, 3);
        assert!(scheduler.is_empty());
        assert_eq!(start.elapsed(), Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_independent_cadences() {
        let mut scheduler: Scheduler<Vec<&'static str>> = Scheduler::new();
        scheduler.schedule_after(Duration::from_millis(10), |log: &mut Vec<&'static str>| {
            log.push("fast");
            if log.len() >= 6 {
                Tick::Stop
            } else {
                Tick::After(Duration::from_millis(10))
            }
        });
        scheduler.schedule_after(Duration::from_millis(25), |log: &mut Vec<&'static str>| {
            log.push("slow");
            Tick::Stop
        });

        let mut log = Vec::new();
        scheduler.run(&mut log).await;

        assert_eq!(log, vec!["fast", "fast", "slow", "fast", "fast", "fast"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_never_runs() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule_after(Duration::from_millis(5), |n: &mut u32| {
            *n += 1;
            Tick::After(Duration::from_millis(5))
        });
        handle.cancel();

        let mut n = 0;
        scheduler.run(&mut n).await;
        assert_eq!(n, 0);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_run_due_skips_future_tasks() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let mut scheduler = Scheduler::new();
            scheduler.schedule_after(Duration::from_secs(60), |n: &mut u32| {
                *n += 1;
                Tick::Stop
            });
            let mut n = 0;
            assert_eq!(scheduler.run_due(&mut n, Instant::now()), 0);
            assert_eq!(n, 0);
            assert_eq!(scheduler.len(), 1);
        });
    }
}

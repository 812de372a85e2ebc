//! Timer-driven execution of an ordered list of delayed steps.
//!
//! The scheduler never runs actions itself. Its owner waits on
//! [`Scheduler::next_due`], performs the action in its own context and then
//! calls [`Scheduler::complete`], which arms the next step's deadline relative
//! to the moment the previous one finished. Cancelling is a cursor reset, so a
//! step that was already handed out still finishes but nothing after it runs.

use std::future::pending;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

/// One entry of a schedule: wait `delay`, then perform `action`
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledStep<A> {
    pub delay: Duration,
    pub action: A,
}

impl<A> ScheduledStep<A> {
    pub fn new(delay: Duration, action: A) -> Self {
        Self { delay, action }
    }
}

/// A step whose deadline has passed and that may now be executed
#[derive(Debug, Clone, PartialEq)]
pub struct DueStep<A> {
    /// Generation of the sequence the step belongs to
    pub generation: u64,
    /// Position in the sequence
    pub index: usize,
    pub action: A,
}

struct Cursor<A> {
    steps: Vec<ScheduledStep<A>>,
    next: usize,
    deadline: Instant,
    /// A step was handed out and has not been completed yet
    in_flight: bool,
}

pub struct Scheduler<A> {
    cursor: Option<Cursor<A>>,
    generation: u64,
}

impl<A: Clone> Scheduler<A> {
    pub fn new() -> Self {
        Self {
            cursor: None,
            generation: 0,
        }
    }

    /// Start a new sequence, replacing any sequence still pending.
    ///
    /// Returns the generation that identifies this sequence.
    pub fn start(&mut self, steps: Vec<ScheduledStep<A>>) -> u64 {
        if self.is_active() {
            debug!(
                "Replacing scheduled sequence generation {}",
                self.generation
            );
        }

        self.generation += 1;
        self.cursor = if steps.is_empty() {
            None
        } else {
            let deadline = Instant::now() + steps[0].delay;
            Some(Cursor {
                steps,
                next: 0,
                deadline,
                in_flight: false,
            })
        };

        debug!("Scheduled sequence generation {} started", self.generation);
        self.generation
    }

    /// Drop the pending sequence; returns whether anything was pending
    pub fn cancel(&mut self) -> bool {
        match self.cursor.take() {
            Some(cursor) => {
                debug!(
                    "Cancelled scheduled sequence generation {} at step {}/{}",
                    self.generation,
                    cursor.next,
                    cursor.steps.len()
                );
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of steps already handed out in the current sequence
    pub fn position(&self) -> Option<usize> {
        self.cursor.as_ref().map(|cursor| cursor.next)
    }

    /// Wait for the next step of the current sequence to become due.
    ///
    /// Stays pending while no sequence is active or while a handed-out step
    /// has not been completed. The cursor only moves once the deadline has
    /// passed, so dropping this future inside `select!` loses nothing.
    pub async fn next_due(&mut self) -> DueStep<A> {
        let deadline = match &self.cursor {
            Some(cursor) if !cursor.in_flight && cursor.next < cursor.steps.len() => {
                cursor.deadline
            }
            _ => pending().await,
        };

        sleep_until(deadline).await;

        let generation = self.generation;
        match self.cursor.as_mut() {
            Some(cursor) => {
                let index = cursor.next;
                cursor.next += 1;
                cursor.in_flight = true;
                trace!("Step {} of generation {} is due", index, generation);
                DueStep {
                    generation,
                    index,
                    action: cursor.steps[index].action.clone(),
                }
            }
            None => pending().await,
        }
    }

    /// Mark the step handed out by `next_due` as finished and arm the next one.
    ///
    /// Completion of a step from a cancelled or replaced sequence is ignored.
    pub fn complete(&mut self, step: &DueStep<A>) {
        if step.generation != self.generation {
            trace!(
                "Ignoring completion of stale generation {}",
                step.generation
            );
            return;
        }

        let finished = match self.cursor.as_mut() {
            Some(cursor) => {
                cursor.in_flight = false;
                if cursor.next < cursor.steps.len() {
                    cursor.deadline = Instant::now() + cursor.steps[cursor.next].delay;
                    false
                } else {
                    true
                }
            }
            None => false,
        };

        if finished {
            debug!("Scheduled sequence generation {} finished", self.generation);
            self.cursor = None;
        }
    }
}

impl<A: Clone> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout};

    fn assert_near(elapsed: Duration, millis: u64) {
        let expected = Duration::from_millis(millis);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "elapsed {:?}, expected {:?}",
            elapsed,
            expected
        );
    }

    fn steps() -> Vec<ScheduledStep<&'static str>> {
        vec![
            ScheduledStep::new(Duration::from_millis(100), "first"),
            ScheduledStep::new(Duration::from_millis(50), "second"),
            ScheduledStep::new(Duration::from_millis(200), "third"),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_run_in_order_with_spacing() {
        let mut scheduler = Scheduler::new();
        let started = Instant::now();
        scheduler.start(steps());

        let mut seen = Vec::new();
        while scheduler.is_active() {
            let due = scheduler.next_due().await;
            seen.push((due.action, started.elapsed()));
            scheduler.complete(&due);
        }

        let expected = [("first", 100), ("second", 150), ("third", 350)];
        assert_eq!(seen.len(), expected.len());
        for ((action, elapsed), (expected_action, millis)) in seen.iter().zip(expected) {
            assert_eq!(*action, expected_action);
            assert_near(*elapsed, millis);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_counts_from_completion() {
        let mut scheduler = Scheduler::new();
        let started = Instant::now();
        scheduler.start(steps());

        let first = scheduler.next_due().await;
        // a slow action delays everything after it
        advance(Duration::from_millis(30)).await;
        scheduler.complete(&first);

        let second = scheduler.next_due().await;
        assert_eq!(second.action, "second");
        assert_near(started.elapsed(), 180);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_remaining_steps() {
        let mut scheduler = Scheduler::new();
        scheduler.start(steps());

        let first = scheduler.next_due().await;
        assert!(scheduler.cancel());
        scheduler.complete(&first);

        assert!(!scheduler.is_active());
        let result = timeout(Duration::from_secs(10), scheduler.next_due()).await;
        assert!(result.is_err(), "no step may be due after cancel");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_invalidates_old_generation() {
        let mut scheduler = Scheduler::new();
        let old = scheduler.start(steps());
        let stale = scheduler.next_due().await;

        let new = scheduler.start(steps());
        assert_ne!(old, new);

        // completing the stale step must not advance the new sequence
        scheduler.complete(&stale);
        assert_eq!(scheduler.position(), Some(0));

        let due = scheduler.next_due().await;
        assert_eq!(due.generation, new);
        assert_eq!(due.index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_due_waits_for_completion() {
        let mut scheduler = Scheduler::new();
        scheduler.start(steps());

        let _first = scheduler.next_due().await;
        let result = timeout(Duration::from_secs(1), scheduler.next_due()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_sequence_is_inactive() {
        let mut scheduler: Scheduler<&str> = Scheduler::new();
        scheduler.start(Vec::new());
        assert!(!scheduler.is_active());
        assert!(!scheduler.cancel());
    }
}

//! Delayed and repeating script invocations.
//!
//! The engine owns one [`Scheduler`].  The host calls
//! [`ScriptEngine::tick`](crate::engine::ScriptEngine::tick) from its
//! authoritative thread; the engine collects due tasks with
//! [`Scheduler::take_due`], runs them, and hands repeating tasks back through
//! [`Scheduler::requeue`].
//!
//! | Kind | Fires | Then |
//! |------|-------|------|
//! | later | once, `delay` after scheduling | dropped |
//! | repeating | `delay` after scheduling, then every `period` | requeued until `count` runs are spent |

use std::time::{Duration, Instant};

/// Identifier handed out by the scheduler (not reused within one engine).
pub type TaskId = u64;

// ── Task ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub id: TaskId,
    /// Name of the script to execute.
    pub script: String,
    pub due: Instant,
    /// Gap between runs; `None` for a one-shot task.
    pub period: Option<Duration>,
    /// Runs still owed, counting the one about to fire; `None` = unbounded.
    pub remaining: Option<u32>,
}

impl ScheduledTask {
    /// Spend one run and move `due` forward by `period`.
    ///
    /// Returns `false` when the task is finished and must not be requeued.
    pub fn advance(&mut self) -> bool {
        let Some(period) = self.period else {
            return false;
        };
        if let Some(n) = self.remaining.as_mut() {
            *n = n.saturating_sub(1);
            if *n == 0 {
                return false;
            }
        }
        // Measured from the planned time so late ticks do not drift.
        self.due += period;
        true
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    next_id: TaskId,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler { tasks: Vec::new(), next_id: 1 }
    }

    /// Run `script` once, `delay` after `now`.
    pub fn later(&mut self, script: &str, delay: Duration, now: Instant) -> TaskId {
        self.push(script, now + delay, None, Some(1))
    }

    /// Run `script` `delay` after `now`, then every `period`.  `count` of
    /// `None` repeats until cancelled.  A zero period is raised to 1 ms.
    pub fn repeating(
        &mut self,
        script: &str,
        delay: Duration,
        period: Duration,
        count: Option<u32>,
        now: Instant,
    ) -> TaskId {
        let period = period.max(Duration::from_millis(1));
        self.push(script, now + delay, Some(period), count)
    }

    fn push(&mut self, script: &str, due: Instant, period: Option<Duration>, remaining: Option<u32>) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.push(ScheduledTask { id, script: script.to_owned(), due, period, remaining });
        log::debug!("scheduled task {id} for script '{script}'");
        id
    }

    /// Drop a task.  Returns `true` if it was pending.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() < before
    }

    /// Drop every task belonging to `script`.  Returns how many were dropped.
    pub fn cancel_script(&mut self, script: &str) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.script != script);
        before - self.tasks.len()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Earliest due time, or `None` if nothing is pending.
    pub fn next_due(&self) -> Option<Instant> {
        self.tasks.iter().map(|t| t.due).min()
    }

    /// Remove and return every task due at or before `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<ScheduledTask> {
        let (mut due, pending): (Vec<_>, Vec<_>) = self.tasks.drain(..).partition(|t| t.due <= now);
        self.tasks = pending;
        due.sort_by_key(|t| (t.due, t.id));
        due
    }

    /// Put a fired task back if it has runs left.
    pub fn requeue(&mut self, mut task: ScheduledTask) {
        if task.advance() {
            self.tasks.push(task);
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.tasks.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn later_fires_once() {
        let mut s = Scheduler::new();
        let t0 = Instant::now();
        let id = s.later("greet", ms(100), t0);
        assert!(s.take_due(t0 + ms(50)).is_empty());
        let due = s.take_due(t0 + ms(100));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);
        s.requeue(due.into_iter().next().unwrap());
        assert!(s.is_empty());
    }

    #[test]
    fn repeating_counts_down() {
        let mut s = Scheduler::new();
        let t0 = Instant::now();
        s.repeating("tick", ms(0), ms(10), Some(3), t0);
        let mut fired = 0;
        for step in 0..10 {
            for task in s.take_due(t0 + ms(step * 10)) {
                fired += 1;
                s.requeue(task);
            }
        }
        assert_eq!(fired, 3);
        assert!(s.is_empty());
    }

    #[test]
    fn unbounded_repeat_keeps_going() {
        let mut task = ScheduledTask {
            id: 1,
            script: "x".into(),
            due: Instant::now(),
            period: Some(ms(5)),
            remaining: None,
        };
        let start = task.due;
        for _ in 0..100 {
            assert!(task.advance());
        }
        assert_eq!(task.due, start + ms(500));
    }

    #[test]
    fn take_due_orders_by_time() {
        let mut s = Scheduler::new();
        let t0 = Instant::now();
        let b = s.later("b", ms(20), t0);
        let a = s.later("a", ms(10), t0);
        s.later("c", ms(1000), t0);
        let due: Vec<_> = s.take_due(t0 + ms(30)).into_iter().map(|t| t.id).collect();
        assert_eq!(due, [a, b]);
        assert_eq!(s.len(), 1);
        assert_eq!(s.next_due(), Some(t0 + ms(1000)));
    }

    #[test]
    fn cancel_by_id_and_script() {
        let mut s = Scheduler::new();
        let t0 = Instant::now();
        let id = s.later("a", ms(10), t0);
        s.repeating("b", ms(10), ms(10), None, t0);
        s.repeating("b", ms(20), ms(10), None, t0);
        assert!(s.cancel(id));
        assert!(!s.cancel(id));
        assert_eq!(s.cancel_script("b"), 2);
        assert!(s.next_due().is_none());
    }

    #[test]
    fn zero_period_is_clamped() {
        let mut s = Scheduler::new();
        s.repeating("spin", ms(0), Duration::ZERO, None, Instant::now());
        assert_eq!(s.iter().next().unwrap().period, Some(ms(1)));
    }
}

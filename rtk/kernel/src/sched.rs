//! Scheduler state
//!
//! Pure bookkeeping, free of any port or critical-section concerns. The
//! kernel keeps one `SchedState` behind its lock and drives it from task,
//! tick and interrupt context.
//!
//! Selection rule: the runnable task with the highest priority wins. On a
//! tie the task that is already running keeps the CPU; otherwise the one that
//! became ready first (lowest `seq`) goes next. A preempted task keeps its
//! `seq`, so it resumes ahead of its peers once the preemptor is done.

use heapless::Vec;
use rtk_core::Tick;

use crate::task::{BlockedOn, Tcb, TaskId, TaskState};

pub(crate) struct SchedState<const TASKS: usize> {
    pub(crate) tasks: Vec<Tcb, TASKS>,
    pub(crate) current: Option<TaskId>,
    pub(crate) tick: Tick,
    pub(crate) started: bool,
    seq: u64,
}

impl<const TASKS: usize> SchedState<TASKS> {
    pub(crate) const fn new() -> Self {
        Self {
            tasks: Vec::new(),
            current: None,
            tick: Tick::ZERO,
            started: false,
            seq: 0,
        }
    }

    /// Add a task in the Ready state
    pub(crate) fn register(&mut self, mut tcb: Tcb) -> Option<TaskId> {
        let id = TaskId::new(u8::try_from(self.tasks.len()).ok()?);
        tcb.state = TaskState::Ready;
        tcb.seq = self.next_seq();
        self.tasks.push(tcb).ok()?;
        Some(id)
    }

    pub(crate) fn tcb(&self, id: TaskId) -> Option<&Tcb> {
        self.tasks.get(id.index())
    }

    pub(crate) fn tcb_mut(&mut self, id: TaskId) -> Option<&mut Tcb> {
        self.tasks.get_mut(id.index())
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn ids(&self) -> impl Iterator<Item = (TaskId, &Tcb)> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(index, tcb)| (TaskId::new(index as u8), tcb))
    }

    /// Task that should be running now
    pub(crate) fn highest_ready(&self) -> Option<TaskId> {
        self.ids()
            .filter(|(_, tcb)| tcb.is_runnable())
            .max_by(|(_, a), (_, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then((a.state == TaskState::Running).cmp(&(b.state == TaskState::Running)))
                    .then(b.seq.cmp(&a.seq))
            })
            .map(|(id, _)| id)
    }

    /// True when the CPU should go to another task
    pub(crate) fn needs_switch(&self) -> bool {
        self.started && self.highest_ready() != self.current
    }

    /// Make the highest-priority ready task current.
    ///
    /// Returns the new current task if it changed.
    pub(crate) fn commit_switch(&mut self) -> Option<TaskId> {
        let next = self.highest_ready()?;
        if let Some(tcb) = self.tasks.get_mut(next.index()) {
            tcb.state = TaskState::Running;
        }
        let previous = self.current.replace(next);
        if previous == Some(next) {
            return None;
        }
        if let Some(tcb) = previous.and_then(|id| self.tasks.get_mut(id.index())) {
            if tcb.state == TaskState::Running {
                tcb.state = TaskState::Ready;
            }
        }
        Some(next)
    }

    /// Move `id` to the back of its priority level in the ready set
    pub(crate) fn make_ready(&mut self, id: TaskId) {
        let seq = self.next_seq();
        if let Some(tcb) = self.tasks.get_mut(id.index()) {
            tcb.state = TaskState::Ready;
            tcb.blocked_on = BlockedOn::Nothing;
            tcb.wake_at = None;
            tcb.seq = seq;
        }
    }

    /// Block the current task until woken or until `wake_at`.
    ///
    /// A task suspended from interrupt context before it got here stays
    /// suspended.
    pub(crate) fn block_current(&mut self, on: BlockedOn, wake_at: Option<Tick>) {
        let seq = self.next_seq();
        let Some(tcb) = self.current.and_then(|id| self.tasks.get_mut(id.index())) else {
            return;
        };
        if tcb.state == TaskState::Suspended {
            return;
        }
        tcb.state = TaskState::Blocked;
        tcb.blocked_on = on;
        tcb.wake_at = wake_at;
        tcb.seq = seq;
    }

    /// Send the current task to the back of its priority level.
    ///
    /// Returns true if another task takes over.
    pub(crate) fn yield_current(&mut self) -> bool {
        let seq = self.next_seq();
        let Some(id) = self.current else {
            return false;
        };
        let Some(tcb) = self.tasks.get_mut(id.index()) else {
            return false;
        };
        if tcb.state != TaskState::Running {
            return self.needs_switch();
        }
        tcb.state = TaskState::Ready;
        tcb.seq = seq;

        if self.needs_switch() {
            true
        } else {
            if let Some(tcb) = self.tasks.get_mut(id.index()) {
                tcb.state = TaskState::Running;
            }
            false
        }
    }

    /// Highest-priority task blocked on `on`, first come first served among
    /// equals
    pub(crate) fn first_waiter(&self, on: BlockedOn) -> Option<TaskId> {
        self.ids()
            .filter(|(_, tcb)| tcb.state == TaskState::Blocked && tcb.blocked_on == on)
            .max_by(|(_, a), (_, b)| a.priority.cmp(&b.priority).then(b.seq.cmp(&a.seq)))
            .map(|(id, _)| id)
    }

    /// Wake the first waiter on `on`, if any
    pub(crate) fn wake_one(&mut self, on: BlockedOn) -> Option<TaskId> {
        let id = self.first_waiter(on)?;
        self.make_ready(id);
        Some(id)
    }

    pub(crate) fn waiters(&self, on: BlockedOn) -> usize {
        self.tasks
            .iter()
            .filter(|tcb| tcb.state == TaskState::Blocked && tcb.blocked_on == on)
            .count()
    }

    /// Advance time by one tick and wake every task whose deadline passed.
    ///
    /// Returns true if a switch is needed.
    pub(crate) fn tick(&mut self, time_slicing: bool) -> bool {
        self.tick = self.tick.next();
        let now = self.tick;

        for index in 0..self.tasks.len() {
            let due = {
                let tcb = &self.tasks[index];
                tcb.state == TaskState::Blocked
                    && tcb.wake_at.map_or(false, |deadline| now.has_reached(deadline))
            };
            if due {
                self.make_ready(TaskId::new(index as u8));
            }
        }

        if time_slicing && self.has_ready_peer() {
            return self.yield_current();
        }
        self.needs_switch()
    }

    /// Another ready task shares the current task's priority
    fn has_ready_peer(&self) -> bool {
        let Some(current) = self.current.and_then(|id| self.tcb(id)) else {
            return false;
        };
        self.ids().any(|(id, tcb)| {
            Some(id) != self.current
                && tcb.state == TaskState::Ready
                && tcb.priority == current.priority
        })
    }

    /// Take a task out of scheduling, cancelling any wait.
    ///
    /// Returns true if the current task was suspended.
    pub(crate) fn suspend(&mut self, id: TaskId) -> bool {
        let Some(tcb) = self.tasks.get_mut(id.index()) else {
            return false;
        };
        tcb.state = TaskState::Suspended;
        tcb.blocked_on = BlockedOn::Nothing;
        tcb.wake_at = None;
        self.current == Some(id)
    }

    /// Put a suspended task back into the ready set.
    ///
    /// Returns false if the task was not suspended.
    pub(crate) fn resume(&mut self, id: TaskId) -> bool {
        match self.tcb(id) {
            Some(tcb) if tcb.state == TaskState::Suspended => {
                self.make_ready(id);
                true
            }
            _ => false,
        }
    }
}

//! The kernel object
//!
//! `Kernel` ties the scheduler state to a [`Port`]. All scheduler state lives
//! behind one critical-section mutex; the port is only invoked after the
//! section has been left.

use core::cell::RefCell;
use core::fmt;

use critical_section::{CriticalSection, Mutex};
use log::{debug, error, info, trace, warn};
use rtk_core::{critical, Duration, Error, KResult, Priority, Tick, Timeout};

use crate::config::KernelConfig;
use crate::port::{KernelHooks, Port};
use crate::sched::SchedState;
use crate::task::{
    BlockedOn, SpawnError, TaskConfig, TaskEntry, TaskId, TaskInfo, TaskStack, TaskState, Tcb,
    MIN_STACK_WORDS,
};

/// Stack size of the idle task, in words
pub const IDLE_STACK_WORDS: usize = 128;

/// Conditions that stop the system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatal {
    /// A task entry function returned
    TaskReturned(TaskId),
    /// [`Kernel::start`] was called a second time
    StartedTwice,
    /// No task could be dispatched at start-up
    NoRunnableTask,
    /// The port asked to run a task the kernel does not know
    UnknownTask(TaskId),
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::TaskReturned(id) => write!(f, "{} returned from its entry function", id),
            Fatal::StartedTwice => write!(f, "kernel started twice"),
            Fatal::NoRunnableTask => write!(f, "no runnable task"),
            Fatal::UnknownTask(id) => write!(f, "unknown task {}", id),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Fatal {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Fatal::TaskReturned(id) => defmt::write!(fmt, "TaskReturned({})", id),
            Fatal::StartedTwice => defmt::write!(fmt, "StartedTwice"),
            Fatal::NoRunnableTask => defmt::write!(fmt, "NoRunnableTask"),
            Fatal::UnknownTask(id) => defmt::write!(fmt, "UnknownTask({})", id),
        }
    }
}

enum Step<T> {
    Done(T),
    Failed(Error),
    Wait,
}

/// Preemptive priority kernel for up to `TASKS` tasks, idle task included
pub struct Kernel<P: Port, const TASKS: usize> {
    port: P,
    config: KernelConfig,
    pub(crate) sched: Mutex<RefCell<SchedState<TASKS>>>,
    halted: Mutex<RefCell<Option<Fatal>>>,
    idle_stack: TaskStack<IDLE_STACK_WORDS>,
}

impl<P: Port, const TASKS: usize> Kernel<P, TASKS> {
    const VALID_TASKS: () = assert!(
        TASKS >= 2 && TASKS <= 255,
        "a kernel needs room for the idle task and at most 255 tasks"
    );

    /// Create a kernel. Usable in a `static` initializer.
    pub const fn new(port: P, config: KernelConfig) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_TASKS;
        Self {
            port,
            config,
            sched: Mutex::new(RefCell::new(SchedState::new())),
            halted: Mutex::new(RefCell::new(None)),
            idle_stack: TaskStack::new(),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Register a task. Must happen before [`start`](Self::start).
    pub fn spawn<const W: usize>(
        &'static self,
        config: TaskConfig,
        stack: &'static TaskStack<W>,
    ) -> Result<TaskId, SpawnError> {
        if config.priority.is_idle() {
            return Err(SpawnError::InvalidPriority);
        }
        let id = self.register(config.name, config.priority, TaskEntry::Func(config.entry), stack)?;
        debug!("spawned {} '{}' at {}", id, config.name, config.priority);
        Ok(id)
    }

    fn register<const W: usize>(
        &'static self,
        name: &'static str,
        priority: Priority,
        entry: TaskEntry,
        stack: &'static TaskStack<W>,
    ) -> Result<TaskId, SpawnError> {
        if W < MIN_STACK_WORDS {
            return Err(SpawnError::StackTooSmall);
        }
        critical_section::with(|cs| {
            let mut sched = self.sched.borrow_ref_mut(cs);
            if sched.started {
                return Err(SpawnError::AlreadyStarted);
            }
            // one slot stays free for the idle task
            let reserved = usize::from(!matches!(entry, TaskEntry::Idle));
            if sched.tasks.len() + reserved >= TASKS {
                return Err(SpawnError::TooManyTasks);
            }

            let mut region = stack.claim(cs).ok_or(SpawnError::StackInUse)?;
            let id = TaskId::new(sched.tasks.len() as u8);
            // SAFETY: the stack was just claimed and no task runs on it yet
            let saved_sp = self.port.init_stack(unsafe { region.prepare() }, id);

            let mut tcb = Tcb::new(name, priority, entry);
            tcb.stack = Some(region);
            tcb.saved_sp = saved_sp;
            sched.register(tcb).ok_or(SpawnError::TooManyTasks)
        })
    }

    /// Register the idle task and hand the CPU to the scheduler
    pub fn start(&'static self) -> ! {
        let already_started = {
            let guard = critical::enter();
            let started = self.sched.borrow_ref(guard.token()).started;
            critical::exit(guard);
            started
        };
        let first = if already_started {
            Err(Fatal::StartedTwice)
        } else {
            self.start_scheduler()
        };

        match first {
            Ok(first) => {
                info!(
                    "{} starting {} tasks at {} Hz",
                    self.config.name,
                    self.task_count(),
                    self.config.tick_hz
                );
                self.port.start(self, first)
            }
            Err(fatal) => self.fatal(fatal),
        }
    }

    fn start_scheduler(&'static self) -> Result<TaskId, Fatal> {
        self.register("idle", Priority::IDLE, TaskEntry::Idle, &self.idle_stack)
            .map_err(|_| Fatal::NoRunnableTask)?;
        critical_section::with(|cs| {
            let mut sched = self.sched.borrow_ref_mut(cs);
            sched.started = true;
            sched.commit_switch().ok_or(Fatal::NoRunnableTask)
        })
    }

    pub fn is_started(&self) -> bool {
        critical_section::with(|cs| self.sched.borrow_ref(cs).started)
    }

    /// True once the kernel stopped on a fatal error
    pub fn is_halted(&self) -> bool {
        self.halt_reason().is_some()
    }

    pub fn halt_reason(&self) -> Option<Fatal> {
        critical_section::with(|cs| *self.halted.borrow_ref(cs))
    }

    /// Stop the system
    pub fn fatal(&self, reason: Fatal) -> ! {
        error!("{}: fatal: {}", self.config.name, reason);
        critical_section::with(|cs| {
            self.halted.borrow_ref_mut(cs).get_or_insert(reason);
        });
        self.port.halt()
    }

    /// Give the CPU to the next ready task of equal priority, if any
    pub fn yield_now(&self) {
        if self.caller().is_none() {
            return;
        }
        let switch = critical_section::with(|cs| self.sched.borrow_ref_mut(cs).yield_current());
        if switch {
            self.port.request_switch();
        }
    }

    /// Block the calling task for `duration` ticks. Zero yields.
    pub fn delay(&self, duration: Duration) {
        if duration.is_zero() {
            self.yield_now();
            return;
        }
        if self.caller().is_none() {
            warn!("delay outside task context ignored");
            return;
        }
        let wake_at = self.tick_count().offset(duration);
        self.sleep_until(wake_at);
    }

    /// Block until `*last_wake + period`, then advance `last_wake` by one
    /// period. Keeps periodic tasks free of drift.
    pub fn delay_until(&self, last_wake: &mut Tick, period: Duration) {
        let wake_at = last_wake.offset(period);
        *last_wake = wake_at;
        if self.caller().is_none() {
            warn!("delay_until outside task context ignored");
            return;
        }
        self.sleep_until(wake_at);
    }

    fn sleep_until(&self, wake_at: Tick) {
        loop {
            let done = critical_section::with(|cs| {
                let mut sched = self.sched.borrow_ref_mut(cs);
                if sched.tick.has_reached(wake_at) {
                    return true;
                }
                sched.block_current(BlockedOn::Delay, Some(wake_at));
                false
            });
            if done {
                return;
            }
            self.port.request_switch();
        }
    }

    /// Tick interrupt entry point
    pub fn on_tick(&self) {
        let switch = critical_section::with(|cs| {
            self.sched
                .borrow_ref_mut(cs)
                .tick(self.config.time_slicing)
        });
        if switch {
            self.port.request_switch();
        }
    }

    pub fn tick_count(&self) -> Tick {
        critical_section::with(|cs| self.sched.borrow_ref(cs).tick)
    }

    /// Microseconds since start-up, if the port keeps a clock
    pub fn uptime_us(&self) -> Option<u64> {
        self.port.uptime_us()
    }

    /// Task currently holding the CPU
    pub fn current_task(&self) -> Option<TaskId> {
        critical_section::with(|cs| self.sched.borrow_ref(cs).current)
    }

    pub fn task_state(&self, task: TaskId) -> Option<TaskState> {
        critical_section::with(|cs| self.sched.borrow_ref(cs).tcb(task).map(|tcb| tcb.state))
    }

    pub fn task_info(&self, task: TaskId) -> Option<TaskInfo> {
        critical_section::with(|cs| self.sched.borrow_ref(cs).tcb(task).map(|tcb| tcb.info(task)))
    }

    pub fn task_count(&self) -> usize {
        critical_section::with(|cs| self.sched.borrow_ref(cs).tasks.len())
    }

    /// Take `task` out of scheduling. A blocking call it is in re-checks its
    /// condition once the task is resumed.
    pub fn suspend(&self, task: TaskId) -> KResult<()> {
        // (is idle, needs switch)
        let (idle, switch) = critical_section::with(|cs| {
            let mut sched = self.sched.borrow_ref_mut(cs);
            match sched.tcb(task) {
                None => return Err(Error::NotInitialized),
                Some(tcb) if tcb.priority.is_idle() => return Ok((true, false)),
                Some(_) => {}
            }
            sched.suspend(task);
            Ok((false, sched.needs_switch()))
        })?;
        if idle {
            warn!("the idle task cannot be suspended");
        } else if switch {
            self.port.request_switch();
        }
        Ok(())
    }

    /// Make a suspended task ready again
    pub fn resume(&self, task: TaskId) -> KResult<()> {
        let switch = critical_section::with(|cs| {
            let mut sched = self.sched.borrow_ref_mut(cs);
            if sched.tcb(task).is_none() {
                return Err(Error::NotInitialized);
            }
            sched.resume(task);
            Ok(sched.needs_switch())
        })?;
        if switch {
            self.port.request_switch();
        }
        Ok(())
    }

    /// Request a switch if a task with higher priority became ready
    pub fn reschedule(&self) {
        let switch = critical_section::with(|cs| self.sched.borrow_ref(cs).needs_switch());
        if switch {
            self.port.request_switch();
        }
    }

    /// The calling task, or `None` from interrupt context and before start
    pub(crate) fn caller(&self) -> Option<TaskId> {
        if self.port.in_interrupt() {
            return None;
        }
        critical_section::with(|cs| {
            let sched = self.sched.borrow_ref(cs);
            sched.started.then_some(sched.current).flatten()
        })
    }

    /// Retry `attempt` until it yields a value, blocking the caller on `on`
    /// between attempts.
    ///
    /// Outside task context the call degrades to a single attempt failing
    /// with `unavailable`; before start it fails with `NotInitialized`.
    pub(crate) fn blocking<T>(
        &self,
        on: BlockedOn,
        timeout: Timeout,
        unavailable: Error,
        mut attempt: impl FnMut(CriticalSection<'_>, &mut SchedState<TASKS>) -> Option<T>,
    ) -> KResult<T> {
        let in_interrupt = self.port.in_interrupt();
        let mut deadline: Option<Option<Tick>> = None;

        loop {
            let (step, switch) = critical_section::with(|cs| {
                let mut sched = self.sched.borrow_ref_mut(cs);
                if let Some(value) = attempt(cs, &mut *sched) {
                    return (Step::Done(value), sched.needs_switch());
                }
                if !sched.started {
                    return (Step::Failed(Error::NotInitialized), false);
                }
                if in_interrupt || sched.current.is_none() {
                    return (Step::Failed(unavailable), false);
                }

                let now = sched.tick;
                let deadline = *deadline.get_or_insert_with(|| timeout.deadline(now));
                if deadline.map_or(false, |deadline| now.has_reached(deadline)) {
                    return (Step::Failed(Error::Timeout), false);
                }
                sched.block_current(on, deadline);
                (Step::Wait, true)
            });

            if switch {
                self.port.request_switch();
            }
            match step {
                Step::Done(value) => return Ok(value),
                Step::Failed(err) => return Err(err),
                Step::Wait => trace!("blocked on {:?}", on),
            }
        }
    }

    fn idle_loop(&self) -> ! {
        loop {
            self.reschedule();
            if let Some(callback) = self.config.idle_callback {
                callback();
            }
            self.port.idle();
        }
    }
}

impl<P: Port, const TASKS: usize> KernelHooks for Kernel<P, TASKS> {
    fn task_count(&self) -> usize {
        Kernel::task_count(self)
    }

    fn task_name(&self, task: TaskId) -> &'static str {
        critical_section::with(|cs| {
            self.sched
                .borrow_ref(cs)
                .tcb(task)
                .map_or("?", |tcb| tcb.name)
        })
    }

    fn run_task(&self, task: TaskId) -> ! {
        let entry = critical_section::with(|cs| self.sched.borrow_ref(cs).tcb(task).map(|tcb| tcb.entry));
        match entry {
            Some(TaskEntry::Idle) => self.idle_loop(),
            Some(TaskEntry::Func(entry)) => {
                entry();
                self.fatal(Fatal::TaskReturned(task))
            }
            None => self.fatal(Fatal::UnknownTask(task)),
        }
    }

    fn commit_switch(&self) -> Option<TaskId> {
        critical_section::with(|cs| self.sched.borrow_ref_mut(cs).commit_switch())
    }

    fn switch_context(&self, sp: usize) -> usize {
        critical_section::with(|cs| {
            let mut sched = self.sched.borrow_ref_mut(cs);
            let outgoing = sched.current;
            if sp != 0 {
                if let Some(tcb) = outgoing.and_then(|id| sched.tcb_mut(id)) {
                    tcb.saved_sp = sp;
                }
            }
            sched.commit_switch();
            sched
                .current
                .and_then(|id| sched.tcb(id))
                .map_or(sp, |tcb| tcb.saved_sp)
        })
    }

    fn on_tick(&self) {
        Kernel::on_tick(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use rtk_core::priority;

    /// Port that never switches; enough to exercise bookkeeping before start.
    struct NullPort {
        switches: AtomicUsize,
    }

    impl NullPort {
        const fn new() -> Self {
            Self {
                switches: AtomicUsize::new(0),
            }
        }
    }

    unsafe impl Port for NullPort {
        fn init_stack(&self, stack: &mut [usize], task: TaskId) -> usize {
            let top = stack.len() - 1;
            stack[top] = task.raw() as usize;
            top
        }

        fn start(&'static self, _hooks: &'static dyn KernelHooks, _first: TaskId) -> ! {
            panic!("NullPort cannot start");
        }

        fn request_switch(&self) {
            self.switches.fetch_add(1, Ordering::Relaxed);
        }

        fn in_interrupt(&self) -> bool {
            false
        }

        fn idle(&self) {}

        fn halt(&self) -> ! {
            panic!("halted");
        }
    }

    fn worker() {}

    #[test]
    fn spawn_validates_configuration() {
        static KERNEL: Kernel<NullPort, 3> = Kernel::new(NullPort::new(), KernelConfig::new());
        static STACK_A: TaskStack<64> = TaskStack::new();
        static STACK_B: TaskStack<64> = TaskStack::new();
        static TINY: TaskStack<8> = TaskStack::new();

        assert_eq!(
            KERNEL.spawn(TaskConfig::new("tiny", priority!(1), worker), &TINY),
            Err(SpawnError::StackTooSmall)
        );
        assert_eq!(
            KERNEL.spawn(TaskConfig::new("zero", Priority::IDLE, worker), &STACK_A),
            Err(SpawnError::InvalidPriority)
        );

        let a = KERNEL
            .spawn(TaskConfig::new("a", priority!(2), worker), &STACK_A)
            .expect("first task");
        assert_eq!(
            KERNEL.spawn(TaskConfig::new("again", priority!(2), worker), &STACK_A),
            Err(SpawnError::StackInUse)
        );
        KERNEL
            .spawn(TaskConfig::new("b", priority!(1), worker), &STACK_B)
            .expect("second task");

        static STACK_C: TaskStack<64> = TaskStack::new();
        assert_eq!(
            KERNEL.spawn(TaskConfig::new("c", priority!(1), worker), &STACK_C),
            Err(SpawnError::TooManyTasks)
        );

        let info = KERNEL.task_info(a).expect("registered");
        assert_eq!(info.name, "a");
        assert_eq!(info.state, TaskState::Ready);
        assert_eq!(info.stack_words, 64);
        assert_eq!(info.stack_unused_words, 63);
    }

    #[test]
    fn blocking_before_start_reports_not_initialized() {
        static KERNEL: Kernel<NullPort, 2> = Kernel::new(NullPort::new(), KernelConfig::new());

        let result: KResult<()> =
            KERNEL.blocking(BlockedOn::Delay, Timeout::Forever, Error::QueueEmpty, |_, _| None);
        assert_eq!(result, Err(Error::NotInitialized));
        assert_eq!(
            KERNEL.blocking(BlockedOn::Delay, Timeout::Forever, Error::QueueEmpty, |_, _| Some(3)),
            Ok(3)
        );
    }

    #[test]
    fn ticks_advance_before_start() {
        static KERNEL: Kernel<NullPort, 2> = Kernel::new(NullPort::new(), KernelConfig::new());
        KERNEL.on_tick();
        KERNEL.on_tick();
        assert_eq!(KERNEL.tick_count(), Tick::new(2));
        assert_eq!(KERNEL.port().switches.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn delay_outside_a_task_returns_immediately() {
        static KERNEL: Kernel<NullPort, 2> = Kernel::new(NullPort::new(), KernelConfig::new());
        KERNEL.delay(Duration::from_ticks(5));
        KERNEL.yield_now();
        assert_eq!(KERNEL.current_task(), None);
    }

    #[test]
    fn unknown_tasks_are_reported() {
        static KERNEL: Kernel<NullPort, 2> = Kernel::new(NullPort::new(), KernelConfig::new());
        let ghost = TaskId::new(7);
        assert_eq!(KERNEL.suspend(ghost), Err(Error::NotInitialized));
        assert_eq!(KERNEL.resume(ghost), Err(Error::NotInitialized));
        assert_eq!(KERNEL.task_state(ghost), None);
    }

    #[test]
    fn fatal_display_names_the_task() {
        extern crate std;
        use std::string::ToString;
        assert_eq!(
            Fatal::TaskReturned(TaskId::new(2)).to_string(),
            "task#2 returned from its entry function"
        );
    }
}

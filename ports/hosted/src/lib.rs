//! Hosted port
//!
//! Runs an RTK kernel on a desktop OS for tests and demos. Every task is
//! backed by its own thread, but only the thread holding the *baton* may run,
//! so the kernel sees exactly one running task at a time, as on a single-core
//! target.
//!
//! Any thread that is not a task thread counts as interrupt context. Tests
//! use this to inject ticks and to post to queues and notifications the way
//! interrupt handlers do.
//!
//! A running task is preempted at its next kernel call, or at the next idle
//! iteration when the idle task runs. Code that spins without calling into
//! the kernel is not preempted.

use std::cell::Cell;
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, trace};
use rtk_kernel::{Kernel, KernelHooks, Port, TaskId};

mod ticker;

pub use ticker::{spawn_tick_source, TickSource};

/// How long the idle task sleeps when nothing wakes it
const IDLE_WAIT: Duration = Duration::from_millis(1);

thread_local! {
    /// Port and task the current thread backs, if any
    static ROLE: Cell<Option<(usize, TaskId)>> = const { Cell::new(None) };
}

#[derive(Debug, Default)]
struct Baton {
    running: Option<TaskId>,
    preempt: bool,
    halted: bool,
}

/// Port backed by host threads
pub struct HostedPort {
    baton: Mutex<Baton>,
    turn: Condvar,
    hooks: OnceLock<&'static dyn KernelHooks>,
    epoch: OnceLock<Instant>,
}

impl HostedPort {
    pub const fn new() -> Self {
        Self {
            baton: Mutex::new(Baton {
                running: None,
                preempt: false,
                halted: false,
            }),
            turn: Condvar::new(),
            hooks: OnceLock::new(),
            epoch: OnceLock::new(),
        }
    }

    /// Task whose thread holds the baton
    pub fn running_task(&self) -> Option<TaskId> {
        self.lock().running
    }

    /// True once the kernel halted
    pub fn is_halted(&self) -> bool {
        self.lock().halted
    }

    /// Block until the first task was dispatched or the kernel halted
    pub fn wait_until_running(&self) {
        let mut baton = self.lock();
        while baton.running.is_none() && !baton.halted {
            baton = self.turn.wait(baton).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Baton> {
        self.baton.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    /// Task backed by the calling thread
    fn own_task(&self) -> Option<TaskId> {
        ROLE.with(Cell::get)
            .filter(|&(port, _)| port == self.key())
            .map(|(_, task)| task)
    }

    fn hand_over(&self, me: TaskId, next: TaskId) {
        trace!("{} -> {}", me, next);
        let mut baton = self.lock();
        baton.running = Some(next);
        self.turn.notify_all();
        self.wait_for_turn(baton, me);
    }

    fn wait_for_turn(&self, mut baton: MutexGuard<'_, Baton>, me: TaskId) {
        loop {
            if baton.halted {
                drop(baton);
                park_forever();
            }
            if baton.running == Some(me) {
                return;
            }
            baton = self.turn.wait(baton).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn spawn_task_thread(&'static self, hooks: &'static dyn KernelHooks, task: TaskId) -> bool {
        let name = hooks.task_name(task);
        let spawned = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                ROLE.with(|role| role.set(Some((self.key(), task))));
                self.wait_for_turn(self.lock(), task);
                hooks.run_task(task)
            });
        match spawned {
            Ok(_) => true,
            Err(err) => {
                error!("cannot spawn thread for '{}': {}", name, err);
                false
            }
        }
    }
}

impl Default for HostedPort {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: a task thread only runs while it holds the baton, and the baton
// always names the kernel's current task.
unsafe impl Port for HostedPort {
    fn init_stack(&self, _stack: &mut [usize], _task: TaskId) -> usize {
        // task threads bring their own stacks
        0
    }

    fn start(&'static self, hooks: &'static dyn KernelHooks, first: TaskId) -> ! {
        let _ = self.hooks.set(hooks);
        let _ = self.epoch.set(Instant::now());

        for index in 0..hooks.task_count() {
            if !self.spawn_task_thread(hooks, TaskId::new(index as u8)) {
                self.halt();
            }
        }

        let mut baton = self.lock();
        baton.running = Some(first);
        self.turn.notify_all();
        drop(baton);
        park_forever()
    }

    fn request_switch(&self) {
        match self.own_task() {
            Some(me) => {
                let Some(hooks) = self.hooks.get() else {
                    return;
                };
                if let Some(next) = hooks.commit_switch() {
                    if next != me {
                        self.hand_over(me, next);
                    }
                }
            }
            None => {
                let mut baton = self.lock();
                baton.preempt = true;
                self.turn.notify_all();
            }
        }
    }

    fn in_interrupt(&self) -> bool {
        self.own_task().is_none()
    }

    fn idle(&self) {
        let mut baton = self.lock();
        if !baton.preempt {
            baton = self
                .turn
                .wait_timeout(baton, IDLE_WAIT)
                .map(|(baton, _)| baton)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
        baton.preempt = false;
    }

    fn halt(&self) -> ! {
        let mut baton = self.lock();
        baton.halted = true;
        self.turn.notify_all();
        drop(baton);
        park_forever()
    }

    fn uptime_us(&self) -> Option<u64> {
        self.epoch
            .get()
            .map(|epoch| u64::try_from(epoch.elapsed().as_micros()).unwrap_or(u64::MAX))
    }
}

fn park_forever() -> ! {
    loop {
        thread::park();
    }
}

/// Start `kernel` on a boot thread and return once its first task runs
///
/// The calling thread then acts as interrupt context.
pub fn launch<const TASKS: usize>(kernel: &'static Kernel<HostedPort, TASKS>) {
    let boot = thread::Builder::new()
        .name("rtk-boot".to_owned())
        .spawn(move || {
            kernel.start();
        });
    if let Err(err) = boot {
        error!("cannot spawn boot thread: {}", err);
        return;
    }
    kernel.port().wait_until_running();
}

/// Install `env_logger`, honouring `RUST_LOG` and defaulting to `info`
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

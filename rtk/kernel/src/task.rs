//! Tasks: identity, configuration, stacks and the task control block.

use core::cell::{Cell, UnsafeCell};
use core::fmt;

use critical_section::{CriticalSection, Mutex};
use rtk_core::{Priority, Tick};

use crate::notify::Notification;

/// Smallest stack accepted by [`Kernel::spawn`](crate::Kernel::spawn), in words
pub const MIN_STACK_WORDS: usize = 32;

/// Word pattern written over a fresh stack to measure its high-water mark
pub(crate) const STACK_PAINT: usize = usize::MAX / 0xFF * 0xA5;

/// Task identifier. Assigned in registration order, starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u8);

impl TaskId {
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TaskId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "task#{}", self.0);
    }
}

/// Task execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Task is ready to run.
    Ready,
    /// Task is currently executing.
    Running,
    /// Task waits for a delay, a queue or a notification.
    Blocked,
    /// Task was taken out of scheduling until resumed.
    Suspended,
}

#[cfg(feature = "defmt")]
impl defmt::Format for TaskState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            TaskState::Ready => defmt::write!(fmt, "Ready"),
            TaskState::Running => defmt::write!(fmt, "Running"),
            TaskState::Blocked => defmt::write!(fmt, "Blocked"),
            TaskState::Suspended => defmt::write!(fmt, "Suspended"),
        }
    }
}

/// What a blocked task waits for
///
/// Wait-set membership is derived from this field, so a task can only ever
/// sit in one set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockedOn {
    Nothing,
    Delay,
    Notification,
    /// Wait list of a primitive, keyed by its address
    List(usize),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TaskEntry {
    Idle,
    Func(fn()),
}

/// Registration data for a task.
#[derive(Debug, Clone, Copy)]
pub struct TaskConfig {
    pub name: &'static str,
    pub priority: Priority,
    pub entry: fn(),
}

impl TaskConfig {
    /// Creates a new task configuration.
    ///
    /// `entry` must never return; a returning task halts the kernel.
    pub const fn new(name: &'static str, priority: Priority, entry: fn()) -> Self {
        Self {
            name,
            priority,
            entry,
        }
    }
}

/// Statically allocated task stack of `W` machine words
///
/// A stack can be handed to the kernel once; afterwards it belongs to the
/// task it was registered with.
#[repr(C, align(8))]
pub struct TaskStack<const W: usize> {
    words: UnsafeCell<[usize; W]>,
    claimed: Mutex<Cell<bool>>,
}

// SAFETY: the words are only reachable through `claim`, which succeeds once.
unsafe impl<const W: usize> Sync for TaskStack<W> {}

impl<const W: usize> TaskStack<W> {
    pub const fn new() -> Self {
        Self {
            words: UnsafeCell::new([0; W]),
            claimed: Mutex::new(Cell::new(false)),
        }
    }

    /// Stack size in words
    pub const fn words(&self) -> usize {
        W
    }

    pub(crate) fn claim(&'static self, cs: CriticalSection<'_>) -> Option<StackRegion> {
        let claimed = self.claimed.borrow(cs);
        if claimed.replace(true) {
            return None;
        }
        Some(StackRegion {
            base: self.words.get().cast::<usize>(),
            words: W,
        })
    }
}

impl<const W: usize> Default for TaskStack<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Stack memory owned by one task. The stack grows down from the top.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StackRegion {
    base: *mut usize,
    words: usize,
}

// SAFETY: a region is owned by exactly one TCB.
unsafe impl Send for StackRegion {}

impl StackRegion {
    pub(crate) const fn words(&self) -> usize {
        self.words
    }

    /// Fill the stack with [`STACK_PAINT`] and hand it out for the port to
    /// lay down the initial frame.
    ///
    /// # Safety
    ///
    /// The owning task must not be running.
    pub(crate) unsafe fn prepare(&mut self) -> &mut [usize] {
        let words = core::slice::from_raw_parts_mut(self.base, self.words);
        words.fill(STACK_PAINT);
        words
    }

    /// Words at the bottom of the stack that were never written
    pub(crate) fn unused_words(&self) -> usize {
        // SAFETY: reading plain words; a racing write only makes the figure stale
        let words = unsafe { core::slice::from_raw_parts(self.base, self.words) };
        words.iter().take_while(|&&word| word == STACK_PAINT).count()
    }
}

/// Snapshot of a task for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: &'static str,
    pub priority: Priority,
    pub state: TaskState,
    /// Stack size in words
    pub stack_words: usize,
    /// Stack words never touched so far (high-water mark)
    pub stack_unused_words: usize,
}

/// Error types for task registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Every task slot is taken (one is reserved for the idle task).
    TooManyTasks,
    /// Priority 0 belongs to the idle task.
    InvalidPriority,
    /// The stack was already given to another task.
    StackInUse,
    /// The stack is smaller than [`MIN_STACK_WORDS`].
    StackTooSmall,
    /// Tasks must be registered before the kernel starts.
    AlreadyStarted,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyTasks => write!(f, "no free task slot"),
            Self::InvalidPriority => write!(f, "priority 0 is reserved for the idle task"),
            Self::StackInUse => write!(f, "stack already belongs to a task"),
            Self::StackTooSmall => write!(f, "stack smaller than {} words", MIN_STACK_WORDS),
            Self::AlreadyStarted => write!(f, "kernel already started"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SpawnError {}

#[cfg(feature = "defmt")]
impl defmt::Format for SpawnError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::TooManyTasks => defmt::write!(fmt, "TooManyTasks"),
            Self::InvalidPriority => defmt::write!(fmt, "InvalidPriority"),
            Self::StackInUse => defmt::write!(fmt, "StackInUse"),
            Self::StackTooSmall => defmt::write!(fmt, "StackTooSmall"),
            Self::AlreadyStarted => defmt::write!(fmt, "AlreadyStarted"),
        }
    }
}

/// Task control block
pub(crate) struct Tcb {
    pub(crate) name: &'static str,
    pub(crate) priority: Priority,
    pub(crate) state: TaskState,
    pub(crate) blocked_on: BlockedOn,
    /// Deadline while blocked with a timeout
    pub(crate) wake_at: Option<Tick>,
    /// Arrival order within a priority level, for FIFO among equals
    pub(crate) seq: u64,
    pub(crate) notification: Notification,
    pub(crate) entry: TaskEntry,
    pub(crate) stack: Option<StackRegion>,
    pub(crate) saved_sp: usize,
}

impl Tcb {
    pub(crate) const fn new(name: &'static str, priority: Priority, entry: TaskEntry) -> Self {
        Self {
            name,
            priority,
            state: TaskState::Ready,
            blocked_on: BlockedOn::Nothing,
            wake_at: None,
            seq: 0,
            notification: Notification::new(),
            entry,
            stack: None,
            saved_sp: 0,
        }
    }

    pub(crate) fn is_runnable(&self) -> bool {
        matches!(self.state, TaskState::Ready | TaskState::Running)
    }

    pub(crate) fn info(&self, id: TaskId) -> TaskInfo {
        TaskInfo {
            id,
            name: self.name,
            priority: self.priority,
            state: self.state,
            stack_words: self.stack.map_or(0, |stack| stack.words()),
            stack_unused_words: self.stack.map_or(0, |stack| stack.unused_words()),
        }
    }
}

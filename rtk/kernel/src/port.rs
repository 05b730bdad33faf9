//! Target abstraction
//!
//! A port performs the context switches the scheduler decides on. The kernel
//! is generic over its port, so everything is resolved at compile time.

use crate::task::TaskId;

/// Target-specific half of the kernel
///
/// # Safety
///
/// Implementations must only run a task while the kernel reports it as the
/// current task, and must call [`KernelHooks::run_task`] exactly once per
/// task on that task's own stack.
pub unsafe trait Port: Sync {
    /// Prepare `stack` so that switching to `task` for the first time enters
    /// [`KernelHooks::run_task`]. Returns the initial saved stack pointer.
    fn init_stack(&self, stack: &mut [usize], task: TaskId) -> usize;

    /// Switch from the start-up context to `first`. Never returns.
    fn start(&'static self, hooks: &'static dyn KernelHooks, first: TaskId) -> !;

    /// Ask for [`KernelHooks::commit_switch`] to run as soon as the current
    /// interrupt or critical section allows.
    fn request_switch(&self);

    /// True when called from an interrupt handler
    fn in_interrupt(&self) -> bool;

    /// Wait for the next interrupt. Called by the idle task.
    fn idle(&self);

    /// Stop the system after a fatal error
    fn halt(&self) -> !;

    /// Free-running microsecond counter, for diagnostics only
    fn uptime_us(&self) -> Option<u64> {
        None
    }
}

/// Kernel entry points a port calls back into
pub trait KernelHooks: Sync {
    /// Number of registered tasks, idle task included
    fn task_count(&self) -> usize;

    /// Name given at registration
    fn task_name(&self, task: TaskId) -> &'static str;

    /// Body of every task. Never returns: a task function that returns
    /// halts the kernel.
    fn run_task(&self, task: TaskId) -> !;

    /// Make the highest-priority ready task current. Returns it if it
    /// differs from the task that was current before.
    fn commit_switch(&self) -> Option<TaskId>;

    /// Save `sp` for the outgoing task (0 when there is none), commit the
    /// switch and return the stack pointer of the task to resume.
    fn switch_context(&self, sp: usize) -> usize;

    /// Tick interrupt handler
    fn on_tick(&self);
}

//! Task notifications
//!
//! Every task owns a 32-bit notification word and a pending flag. Any task
//! or interrupt handler can post to it; only the owning task waits on it.
//! Posts are not queued: with [`NotifyAction::Overwrite`] the most recent
//! value wins.

use log::{trace, warn};
use rtk_core::{Error, KResult, Timeout};

use crate::kernel::Kernel;
use crate::port::Port;
use crate::task::{BlockedOn, TaskId, TaskState};

/// How a post combines with the stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyAction {
    /// `old | value`
    SetBits,
    /// `old + value`, wrapping
    Increment,
    /// Replace the stored value
    Overwrite,
    /// Replace the stored value unless a notification is still pending
    OverwriteIfEmpty,
}

/// What a successful wait leaves behind in the word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearMode {
    /// Zero the word
    Reset,
    /// Subtract one, for use as a counting semaphore
    Decrement,
    /// Leave the value as it is
    Keep,
}

/// Notification word of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Notification {
    value: u32,
    pending: bool,
}

impl Notification {
    pub const fn new() -> Self {
        Self {
            value: 0,
            pending: false,
        }
    }

    pub const fn value(&self) -> u32 {
        self.value
    }

    pub const fn is_pending(&self) -> bool {
        self.pending
    }

    /// Apply a post. Returns the value held before it.
    ///
    /// `OverwriteIfEmpty` on a pending word fails with [`Error::QueueFull`]
    /// and changes nothing.
    pub fn post(&mut self, value: u32, action: NotifyAction) -> KResult<u32> {
        let previous = self.value;
        self.value = match action {
            NotifyAction::SetBits => previous | value,
            NotifyAction::Increment => previous.wrapping_add(value),
            NotifyAction::Overwrite => value,
            NotifyAction::OverwriteIfEmpty if self.pending => return Err(Error::QueueFull),
            NotifyAction::OverwriteIfEmpty => value,
        };
        self.pending = true;
        Ok(previous)
    }

    /// Consume a pending notification. Returns the value seen before
    /// `mode` was applied, or `None` when nothing is pending.
    pub fn take(&mut self, mode: ClearMode) -> Option<u32> {
        if !self.pending {
            return None;
        }
        let value = self.value;
        match mode {
            ClearMode::Reset => {
                self.value = 0;
                self.pending = false;
            }
            ClearMode::Decrement => {
                self.value = value.saturating_sub(1);
                self.pending = self.value != 0;
            }
            ClearMode::Keep => self.pending = false,
        }
        Some(value)
    }

    /// Drop any pending notification and zero the word. Returns the old value.
    pub fn clear(&mut self) -> u32 {
        let previous = self.value;
        *self = Self::new();
        previous
    }
}

impl<P: Port, const TASKS: usize> Kernel<P, TASKS> {
    /// Post to the notification word of `target`
    ///
    /// Returns the value held before the post. Wakes `target` if it waits
    /// for a notification. Callable from interrupt handlers.
    pub fn notify(&self, target: TaskId, value: u32, action: NotifyAction) -> KResult<u32> {
        let (previous, switch) = critical_section::with(|cs| {
            let mut sched = self.sched.borrow_ref_mut(cs);
            let tcb = sched.tcb_mut(target).ok_or(Error::NotInitialized)?;
            let previous = tcb.notification.post(value, action)?;
            let waiting =
                tcb.state == TaskState::Blocked && tcb.blocked_on == BlockedOn::Notification;
            if waiting {
                sched.make_ready(target);
            }
            Ok::<_, Error>((previous, sched.needs_switch()))
        })?;

        if switch {
            self.port().request_switch();
        }
        Ok(previous)
    }

    /// Wait for a notification and reset the word
    ///
    /// Returns the value that was pending, or [`Error::Timeout`]. Must be
    /// called by a task; elsewhere it fails with [`Error::NotInitialized`].
    pub fn notify_wait(&self, timeout: Timeout) -> KResult<u32> {
        self.wait_notification(timeout, ClearMode::Reset)
    }

    /// Wait for a notification and decrement the word
    ///
    /// Pairs with [`NotifyAction::Increment`] to use the word as a counting
    /// semaphore. Returns the count before the decrement.
    pub fn notify_take(&self, timeout: Timeout) -> KResult<u32> {
        self.wait_notification(timeout, ClearMode::Decrement)
    }

    /// Consume a pending notification without blocking
    pub fn notify_try_wait(&self, mode: ClearMode) -> KResult<u32> {
        let me = self.caller().ok_or(Error::NotInitialized)?;
        critical_section::with(|cs| {
            let mut sched = self.sched.borrow_ref_mut(cs);
            let tcb = sched.tcb_mut(me).ok_or(Error::NotInitialized)?;
            tcb.notification.take(mode).ok_or(Error::QueueEmpty)
        })
    }

    /// Current value of a task's word, pending or not
    pub fn notify_peek(&self, task: TaskId) -> u32 {
        self.with_notification(task, |word| word.value()).unwrap_or(0)
    }

    /// True if `task` has an unconsumed notification
    pub fn notify_is_pending(&self, task: TaskId) -> bool {
        self.with_notification(task, |word| word.is_pending())
            .unwrap_or(false)
    }

    /// Drop a pending notification. Returns the previous value.
    pub fn notify_clear(&self, task: TaskId) -> u32 {
        self.with_notification(task, Notification::clear).unwrap_or(0)
    }

    fn wait_notification(&self, timeout: Timeout, mode: ClearMode) -> KResult<u32> {
        let Some(me) = self.caller() else {
            warn!("notification wait outside task context");
            return Err(Error::NotInitialized);
        };
        let result = self.blocking(BlockedOn::Notification, timeout, Error::QueueEmpty, |_, sched| {
            sched.tcb_mut(me)?.notification.take(mode)
        });
        if matches!(result, Err(Error::Timeout)) {
            trace!("{} notification wait timed out", me);
        }
        result
    }

    fn with_notification<R>(&self, task: TaskId, f: impl FnOnce(&mut Notification) -> R) -> Option<R> {
        critical_section::with(|cs| {
            let mut sched = self.sched.borrow_ref_mut(cs);
            sched.tcb_mut(task).map(|tcb| f(&mut tcb.notification))
        })
    }
}

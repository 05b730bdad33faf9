//! Message queue
//!
//! Bounded FIFO of `N` items of `T`, copied in and out by value. Tasks may
//! block on a full or empty queue; interrupt handlers use the `try_*` forms.
//! Every successful send wakes one blocked receiver and every successful
//! receive wakes one blocked sender.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;
use log::trace;
use rtk_core::{Error, KResult, Timeout};

use crate::kernel::Kernel;
use crate::port::Port;
use crate::task::BlockedOn;

/// Tasks waiting on one side of a queue
///
/// The list itself is implicit: a task belongs to it while it is blocked on
/// this list's address.
struct WaitList {
    anchor: u8,
}

impl WaitList {
    const fn new() -> Self {
        Self { anchor: 0 }
    }

    fn key(&self) -> BlockedOn {
        BlockedOn::List(&self.anchor as *const u8 as usize)
    }
}

/// Fixed-capacity message queue
///
/// ```ignore
/// static READINGS: Queue<u16, 8> = Queue::new();
///
/// // interrupt handler
/// let _ = READINGS.try_send(&KERNEL, sample);
///
/// // task
/// let sample = READINGS.receive(&KERNEL, Timeout::ticks(100))?;
/// ```
pub struct Queue<T, const N: usize> {
    items: Mutex<RefCell<Deque<T, N>>>,
    senders: WaitList,
    receivers: WaitList,
}

impl<T: Copy + Send, const N: usize> Queue<T, N> {
    const NON_EMPTY: () = assert!(N > 0, "a queue needs room for at least one item");

    /// Create an empty queue
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY;
        Self {
            items: Mutex::new(RefCell::new(Deque::new())),
            senders: WaitList::new(),
            receivers: WaitList::new(),
        }
    }

    /// Append `value` without blocking. Fails with [`Error::QueueFull`].
    pub fn try_send<P: Port, const TASKS: usize>(
        &self,
        kernel: &Kernel<P, TASKS>,
        value: T,
    ) -> KResult<()> {
        let switch = critical_section::with(|cs| {
            self.items
                .borrow_ref_mut(cs)
                .push_back(value)
                .map_err(|_| Error::QueueFull)?;
            let mut sched = kernel.sched.borrow_ref_mut(cs);
            sched.wake_one(self.receivers.key());
            Ok::<_, Error>(sched.needs_switch())
        })?;
        if switch {
            kernel.port().request_switch();
        }
        Ok(())
    }

    /// Take the oldest item without blocking. Fails with
    /// [`Error::QueueEmpty`].
    pub fn try_receive<P: Port, const TASKS: usize>(
        &self,
        kernel: &Kernel<P, TASKS>,
    ) -> KResult<T> {
        let (value, switch) = critical_section::with(|cs| {
            let value = self
                .items
                .borrow_ref_mut(cs)
                .pop_front()
                .ok_or(Error::QueueEmpty)?;
            let mut sched = kernel.sched.borrow_ref_mut(cs);
            sched.wake_one(self.senders.key());
            Ok::<_, Error>((value, sched.needs_switch()))
        })?;
        if switch {
            kernel.port().request_switch();
        }
        Ok(value)
    }

    /// Append `value`, waiting up to `timeout` for a free slot
    pub fn send<P: Port, const TASKS: usize>(
        &self,
        kernel: &Kernel<P, TASKS>,
        value: T,
        timeout: Timeout,
    ) -> KResult<()> {
        let result = kernel.blocking(self.senders.key(), timeout, Error::QueueFull, |cs, sched| {
            self.items.borrow_ref_mut(cs).push_back(value).ok()?;
            sched.wake_one(self.receivers.key());
            Some(())
        });
        if matches!(result, Err(Error::Timeout)) {
            trace!("queue send timed out");
        }
        result
    }

    /// Take the oldest item, waiting up to `timeout` for one to arrive
    pub fn receive<P: Port, const TASKS: usize>(
        &self,
        kernel: &Kernel<P, TASKS>,
        timeout: Timeout,
    ) -> KResult<T> {
        let result = kernel.blocking(self.receivers.key(), timeout, Error::QueueEmpty, |cs, sched| {
            let value = self.items.borrow_ref_mut(cs).pop_front()?;
            sched.wake_one(self.senders.key());
            Some(value)
        });
        if matches!(result, Err(Error::Timeout)) {
            trace!("queue receive timed out");
        }
        result
    }

    /// Copy of the oldest item, left in the queue
    pub fn try_peek(&self) -> KResult<T> {
        critical_section::with(|cs| {
            self.items
                .borrow_ref(cs)
                .front()
                .copied()
                .ok_or(Error::QueueEmpty)
        })
    }

    /// [`try_send`](Self::try_send) for `nb` style callers
    pub fn poll_send<P: Port, const TASKS: usize>(
        &self,
        kernel: &Kernel<P, TASKS>,
        value: T,
    ) -> nb::Result<(), Error> {
        rtk_core::nb_result(self.try_send(kernel, value))
    }

    /// [`try_receive`](Self::try_receive) for `nb` style callers
    pub fn poll_receive<P: Port, const TASKS: usize>(
        &self,
        kernel: &Kernel<P, TASKS>,
    ) -> nb::Result<T, Error> {
        rtk_core::nb_result(self.try_receive(kernel))
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.items.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.items.borrow_ref(cs).is_empty())
    }

    pub fn is_full(&self) -> bool {
        critical_section::with(|cs| self.items.borrow_ref(cs).is_full())
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Tasks blocked until a slot frees up
    pub fn waiting_senders<P: Port, const TASKS: usize>(&self, kernel: &Kernel<P, TASKS>) -> usize {
        critical_section::with(|cs| kernel.sched.borrow_ref(cs).waiters(self.senders.key()))
    }

    /// Tasks blocked until an item arrives
    pub fn waiting_receivers<P: Port, const TASKS: usize>(&self, kernel: &Kernel<P, TASKS>) -> usize {
        critical_section::with(|cs| kernel.sched.borrow_ref(cs).waiters(self.receivers.key()))
    }
}

impl<T: Copy + Send, const N: usize> Default for Queue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

//! Message queue checks
//!
//! Only the non-blocking operations are exercised, so the suite can run
//! before the scheduler starts as well as from a task.

use rtk_core::Error;
use rtk_kernel::{Kernel, Port, Queue};

use crate::{ensure, ensure_eq, CaseResult, TestCase};

pub const DEPTH: usize = 4;

pub struct QueueFixture<'a, P: Port, const TASKS: usize> {
    pub kernel: &'a Kernel<P, TASKS>,
    pub queue: &'a Queue<u32, DEPTH>,
}

impl<P: Port, const TASKS: usize> QueueFixture<'_, P, TASKS> {
    fn drain(&self) {
        while self.queue.try_receive(self.kernel).is_ok() {}
    }
}

pub fn cases<'a, P: Port, const TASKS: usize>() -> [TestCase<QueueFixture<'a, P, TASKS>>; 3] {
    [
        TestCase::new("queue_fill_and_drain", fill_and_drain),
        TestCase::new("queue_peek_keeps_item", peek_keeps_item),
        TestCase::new("queue_never_empty_and_full", never_empty_and_full),
    ]
}

fn fill_and_drain<P: Port, const TASKS: usize>(
    fixture: &mut QueueFixture<'_, P, TASKS>,
) -> CaseResult {
    let (kernel, queue) = (fixture.kernel, fixture.queue);
    fixture.drain();

    for value in 1..=DEPTH as u32 {
        ensure_eq!(queue.try_send(kernel, value), Ok(()));
    }
    ensure!(queue.is_full());
    ensure_eq!(queue.try_send(kernel, 5), Err(Error::QueueFull));

    for value in 1..=DEPTH as u32 {
        ensure_eq!(queue.try_receive(kernel), Ok(value));
    }
    ensure_eq!(queue.try_receive(kernel), Err(Error::QueueEmpty));
    Ok(())
}

fn peek_keeps_item<P: Port, const TASKS: usize>(
    fixture: &mut QueueFixture<'_, P, TASKS>,
) -> CaseResult {
    let (kernel, queue) = (fixture.kernel, fixture.queue);
    fixture.drain();

    ensure_eq!(queue.try_peek(), Err(Error::QueueEmpty));
    ensure_eq!(queue.try_send(kernel, 11), Ok(()));
    ensure_eq!(queue.try_send(kernel, 12), Ok(()));
    ensure_eq!(queue.try_peek(), Ok(11));
    ensure_eq!(queue.len(), 2);

    fixture.drain();
    ensure!(queue.is_empty());
    Ok(())
}

fn never_empty_and_full<P: Port, const TASKS: usize>(
    fixture: &mut QueueFixture<'_, P, TASKS>,
) -> CaseResult {
    let (kernel, queue) = (fixture.kernel, fixture.queue);
    fixture.drain();

    for step in 0..3 * DEPTH as u32 {
        ensure!(!(queue.is_empty() && queue.is_full()));
        if step % 3 == 2 {
            let _ = queue.try_receive(kernel);
        } else {
            let _ = queue.try_send(kernel, step);
        }
    }
    ensure!(!(queue.is_empty() && queue.is_full()));

    fixture.drain();
    Ok(())
}

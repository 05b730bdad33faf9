//! Task notification checks
//!
//! The suite posts to the notification word of the task running it, so it
//! must be run from that task after the scheduler started.

use rtk_core::{Error, Timeout};
use rtk_kernel::{ClearMode, Kernel, NotifyAction, Port, TaskId};

use crate::{ensure, ensure_eq, CaseResult, TestCase};

pub struct NotifyFixture<'a, P: Port, const TASKS: usize> {
    pub kernel: &'a Kernel<P, TASKS>,
    /// The task running the suite
    pub me: TaskId,
}

pub fn cases<'a, P: Port, const TASKS: usize>() -> [TestCase<NotifyFixture<'a, P, TASKS>>; 4] {
    [
        TestCase::new("notify_set_bits_combine", set_bits_combine),
        TestCase::new("notify_overwrite_if_empty", overwrite_if_empty),
        TestCase::new("notify_take_counts_down", take_counts_down),
        TestCase::new("notify_try_wait_when_idle", try_wait_when_idle),
    ]
}

fn set_bits_combine<P: Port, const TASKS: usize>(
    fixture: &mut NotifyFixture<'_, P, TASKS>,
) -> CaseResult {
    let (kernel, me) = (fixture.kernel, fixture.me);
    kernel.notify_clear(me);

    for bits in [0x10, 0x01, 0x04] {
        ensure!(kernel.notify(me, bits, NotifyAction::SetBits).is_ok());
    }
    ensure!(kernel.notify_is_pending(me));
    ensure_eq!(kernel.notify_try_wait(ClearMode::Reset), Ok(0x15));
    ensure_eq!(kernel.notify_peek(me), 0);
    Ok(())
}

fn overwrite_if_empty<P: Port, const TASKS: usize>(
    fixture: &mut NotifyFixture<'_, P, TASKS>,
) -> CaseResult {
    let (kernel, me) = (fixture.kernel, fixture.me);
    kernel.notify_clear(me);

    ensure_eq!(kernel.notify(me, 7, NotifyAction::OverwriteIfEmpty), Ok(0));
    ensure_eq!(
        kernel.notify(me, 9, NotifyAction::OverwriteIfEmpty),
        Err(Error::QueueFull)
    );
    ensure_eq!(kernel.notify_wait(Timeout::NONE), Ok(7));
    Ok(())
}

fn take_counts_down<P: Port, const TASKS: usize>(
    fixture: &mut NotifyFixture<'_, P, TASKS>,
) -> CaseResult {
    let (kernel, me) = (fixture.kernel, fixture.me);
    kernel.notify_clear(me);

    for _ in 0..3 {
        ensure!(kernel.notify(me, 1, NotifyAction::Increment).is_ok());
    }
    for expected in [3, 2, 1] {
        ensure_eq!(kernel.notify_take(Timeout::NONE), Ok(expected));
    }
    ensure_eq!(kernel.notify_take(Timeout::NONE), Err(Error::Timeout));
    Ok(())
}

fn try_wait_when_idle<P: Port, const TASKS: usize>(
    fixture: &mut NotifyFixture<'_, P, TASKS>,
) -> CaseResult {
    let kernel = fixture.kernel;
    kernel.notify_clear(fixture.me);

    ensure_eq!(
        kernel.notify_try_wait(ClearMode::Keep),
        Err(Error::QueueEmpty)
    );
    ensure!(!kernel.notify_is_pending(fixture.me));
    Ok(())
}

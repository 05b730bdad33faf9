//! Task notifications on the hosted port

mod common;

use std::sync::Mutex;

use common::{wait_for_state, wait_until};
use rtk_kernel::{
    priority, ClearMode, Duration, Error, Kernel, KernelConfig, NotifyAction, Queue, TaskConfig,
    TaskId, TaskStack, TaskState, Timeout,
};
use rtk_port_hosted::{launch, HostedPort};

type Results = Mutex<Vec<Result<u32, Error>>>;

fn park<const TASKS: usize>(kernel: &Kernel<HostedPort, TASKS>) -> ! {
    loop {
        kernel.delay(Duration::MAX);
    }
}

#[test]
fn test_set_bits_accumulate_until_read() {
    static KERNEL: Kernel<HostedPort, 2> = Kernel::new(HostedPort::new(), KernelConfig::new());
    static STACK: TaskStack<64> = TaskStack::new();
    static GATE: Queue<u8, 1> = Queue::new();
    static SEEN: Results = Mutex::new(Vec::new());

    fn reader() {
        GATE.receive(&KERNEL, Timeout::Forever).unwrap();
        SEEN.lock().unwrap().push(KERNEL.notify_wait(Timeout::NONE));
        SEEN.lock().unwrap().push(KERNEL.notify_wait(Timeout::NONE));
        park(&KERNEL)
    }

    let task = KERNEL.spawn(TaskConfig::new("reader", priority!(1), reader), &STACK).unwrap();
    launch(&KERNEL);
    wait_for_state(&KERNEL, task, TaskState::Blocked);

    assert_eq!(KERNEL.notify(task, 0x01, NotifyAction::SetBits), Ok(0x00));
    assert_eq!(KERNEL.notify(task, 0x04, NotifyAction::SetBits), Ok(0x01));
    assert_eq!(KERNEL.notify(task, 0x10, NotifyAction::SetBits), Ok(0x05));
    assert_eq!(KERNEL.notify_peek(task), 0x15);
    // the task waits on the gate, not on its word
    assert_eq!(KERNEL.task_state(task), Some(TaskState::Blocked));

    GATE.try_send(&KERNEL, 1).unwrap();
    wait_until("both reads", || SEEN.lock().unwrap().len() == 2);
    assert_eq!(*SEEN.lock().unwrap(), [Ok(0x15), Err(Error::Timeout)]);
    assert_eq!(KERNEL.notify_peek(task), 0);
}

#[test]
fn test_overwrite_if_empty_keeps_pending_value() {
    static KERNEL: Kernel<HostedPort, 2> = Kernel::new(HostedPort::new(), KernelConfig::new());
    static STACK: TaskStack<64> = TaskStack::new();

    fn reader() {
        park(&KERNEL)
    }

    let task = KERNEL.spawn(TaskConfig::new("reader", priority!(1), reader), &STACK).unwrap();
    launch(&KERNEL);
    wait_for_state(&KERNEL, task, TaskState::Blocked);

    assert_eq!(KERNEL.notify(task, 7, NotifyAction::OverwriteIfEmpty), Ok(0));
    assert_eq!(
        KERNEL.notify(task, 9, NotifyAction::OverwriteIfEmpty),
        Err(Error::QueueFull)
    );
    assert_eq!(KERNEL.notify_peek(task), 7);

    assert_eq!(KERNEL.notify(task, 9, NotifyAction::Overwrite), Ok(7));
    assert_eq!(KERNEL.notify_peek(task), 9);
    assert!(KERNEL.notify_is_pending(task));

    assert_eq!(KERNEL.notify_clear(task), 9);
    assert!(!KERNEL.notify_is_pending(task));
    assert_eq!(KERNEL.notify(task, 3, NotifyAction::OverwriteIfEmpty), Ok(0));
    // the reader sleeps, so nothing consumed the word
    assert_eq!(KERNEL.task_state(task), Some(TaskState::Blocked));
}

#[test]
fn test_take_counts_down_like_a_semaphore() {
    static KERNEL: Kernel<HostedPort, 2> = Kernel::new(HostedPort::new(), KernelConfig::new());
    static STACK: TaskStack<64> = TaskStack::new();
    static GATE: Queue<u8, 1> = Queue::new();
    static SEEN: Results = Mutex::new(Vec::new());

    fn consumer() {
        GATE.receive(&KERNEL, Timeout::Forever).unwrap();
        for _ in 0..4 {
            let taken = KERNEL.notify_take(Timeout::NONE);
            SEEN.lock().unwrap().push(taken);
        }
        park(&KERNEL)
    }

    let task = KERNEL.spawn(TaskConfig::new("consumer", priority!(1), consumer), &STACK).unwrap();
    launch(&KERNEL);
    wait_for_state(&KERNEL, task, TaskState::Blocked);

    for _ in 0..3 {
        KERNEL.notify(task, 1, NotifyAction::Increment).unwrap();
    }
    GATE.try_send(&KERNEL, 1).unwrap();

    wait_until("four takes", || SEEN.lock().unwrap().len() == 4);
    assert_eq!(
        *SEEN.lock().unwrap(),
        [Ok(3), Ok(2), Ok(1), Err(Error::Timeout)]
    );
}

#[test]
fn test_wait_times_out_then_sees_later_post() {
    static KERNEL: Kernel<HostedPort, 2> = Kernel::new(HostedPort::new(), KernelConfig::new());
    static STACK: TaskStack<64> = TaskStack::new();
    static SEEN: Results = Mutex::new(Vec::new());

    fn waiter() {
        let first = KERNEL.notify_wait(Timeout::ticks(2));
        SEEN.lock().unwrap().push(first);
        let second = KERNEL.notify_wait(Timeout::Forever);
        SEEN.lock().unwrap().push(second);
        park(&KERNEL)
    }

    let task = KERNEL.spawn(TaskConfig::new("waiter", priority!(1), waiter), &STACK).unwrap();
    launch(&KERNEL);

    wait_for_state(&KERNEL, task, TaskState::Blocked);
    KERNEL.on_tick();
    wait_for_state(&KERNEL, task, TaskState::Blocked);
    KERNEL.on_tick();
    wait_until("timeout", || SEEN.lock().unwrap().len() == 1);
    assert_eq!(SEEN.lock().unwrap()[0], Err(Error::Timeout));

    wait_for_state(&KERNEL, task, TaskState::Blocked);
    KERNEL.notify(task, 42, NotifyAction::Overwrite).unwrap();
    wait_until("second wait", || SEEN.lock().unwrap().len() == 2);
    assert_eq!(SEEN.lock().unwrap()[1], Ok(42));
}

#[test]
fn test_try_wait_modes() {
    static KERNEL: Kernel<HostedPort, 2> = Kernel::new(HostedPort::new(), KernelConfig::new());
    static STACK: TaskStack<64> = TaskStack::new();
    static GATE: Queue<u8, 1> = Queue::new();
    static SEEN: Results = Mutex::new(Vec::new());

    fn poller() {
        GATE.receive(&KERNEL, Timeout::Forever).unwrap();
        let mut seen = Vec::new();
        seen.push(KERNEL.notify_try_wait(ClearMode::Keep));
        seen.push(KERNEL.notify_try_wait(ClearMode::Keep));
        seen.push(Ok(KERNEL.notify_peek(TaskId::new(0))));
        SEEN.lock().unwrap().extend(seen);
        park(&KERNEL)
    }

    let task = KERNEL.spawn(TaskConfig::new("poller", priority!(1), poller), &STACK).unwrap();
    launch(&KERNEL);
    wait_for_state(&KERNEL, task, TaskState::Blocked);

    KERNEL.notify(task, 5, NotifyAction::Overwrite).unwrap();
    GATE.try_send(&KERNEL, 1).unwrap();
    wait_until("three results", || SEEN.lock().unwrap().len() == 3);
    assert_eq!(*SEEN.lock().unwrap(), [Ok(5), Err(Error::QueueEmpty), Ok(5)]);
}

#[test]
fn test_misuse_is_reported() {
    static KERNEL: Kernel<HostedPort, 2> = Kernel::new(HostedPort::new(), KernelConfig::new());
    static STACK: TaskStack<64> = TaskStack::new();

    fn idler() {
        park(&KERNEL)
    }

    // before start nobody can wait
    assert_eq!(KERNEL.notify_wait(Timeout::Forever), Err(Error::NotInitialized));

    let task = KERNEL.spawn(TaskConfig::new("idler", priority!(1), idler), &STACK).unwrap();
    launch(&KERNEL);
    wait_for_state(&KERNEL, task, TaskState::Blocked);

    // the test thread plays an interrupt handler
    assert_eq!(KERNEL.notify_wait(Timeout::Forever), Err(Error::NotInitialized));
    assert_eq!(KERNEL.notify_take(Timeout::NONE), Err(Error::NotInitialized));
    assert_eq!(
        KERNEL.notify_try_wait(ClearMode::Reset),
        Err(Error::NotInitialized)
    );

    let ghost = TaskId::new(9);
    assert_eq!(
        KERNEL.notify(ghost, 1, NotifyAction::SetBits),
        Err(Error::NotInitialized)
    );
    assert_eq!(KERNEL.notify_peek(ghost), 0);
    assert!(!KERNEL.notify_is_pending(ghost));
    assert_eq!(KERNEL.notify_clear(ghost), 0);
}

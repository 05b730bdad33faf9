//! Queues and pools working together across tasks and interrupts

mod common;

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use common::{wait_for_state, wait_until};
use rtk_kernel::{
    priority, Duration, Error, Kernel, KernelConfig, NotifyAction, Queue, TaskConfig, TaskStack,
    TaskState, Timeout,
};
use rtk_mem::StaticPool;
use rtk_port_hosted::{launch, HostedPort};

#[derive(Debug)]
struct Frame {
    seq: u32,
    payload: [u8; 12],
}

/// Pool block handed from producer to consumer
#[derive(Debug, Clone, Copy)]
struct FrameRef(NonNull<Frame>);

// SAFETY: a frame has exactly one owner, the side that last received it
unsafe impl Send for FrameRef {}

#[test]
fn test_frames_flow_from_interrupt_to_task() {
    static KERNEL: Kernel<HostedPort, 2> = Kernel::new(HostedPort::new(), KernelConfig::new());
    static STACK: TaskStack<128> = TaskStack::new();
    static POOL: StaticPool<Frame, 4> = StaticPool::new();
    static FRAMES: Queue<FrameRef, 4> = Queue::new();
    static SEEN: Mutex<Vec<(u32, u8)>> = Mutex::new(Vec::new());

    fn consumer() {
        loop {
            let FrameRef(ptr) = FRAMES.receive(&KERNEL, Timeout::Forever).unwrap();
            // SAFETY: the producer initialized the frame before sending it
            let frame = unsafe { ptr.as_ref() };
            let sum = frame.payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
            SEEN.lock().unwrap().push((frame.seq, sum));
            POOL.deallocate(ptr).unwrap();
        }
    }

    POOL.init();
    let task = KERNEL.spawn(TaskConfig::new("consumer", priority!(3), consumer), &STACK).unwrap();
    launch(&KERNEL);

    for seq in 0..10u32 {
        wait_for_state(&KERNEL, task, TaskState::Blocked);
        let ptr = POOL.allocate().unwrap();
        // SAFETY: fresh block owned by this thread until it is sent
        unsafe {
            ptr.as_ptr().write(Frame {
                seq,
                payload: [seq as u8; 12],
            })
        };
        FRAMES.try_send(&KERNEL, FrameRef(ptr)).unwrap();
    }

    wait_until("ten frames", || SEEN.lock().unwrap().len() == 10);
    let expected: Vec<(u32, u8)> = (0..10u32)
        .map(|seq| (seq, (seq as u8).wrapping_mul(12)))
        .collect();
    assert_eq!(*SEEN.lock().unwrap(), expected);

    wait_until("blocks to return", || POOL.is_full());
    let stats = POOL.stats();
    assert_eq!(stats.used_blocks, 0);
    assert!(stats.min_free_blocks >= 3);
}

#[test]
fn test_interrupt_bursts_exhaust_the_pool() {
    static KERNEL: Kernel<HostedPort, 2> = Kernel::new(HostedPort::new(), KernelConfig::new());
    static STACK: TaskStack<128> = TaskStack::new();
    static POOL: StaticPool<Frame, 3> = StaticPool::new();
    static FRAMES: Queue<FrameRef, 4> = Queue::new();
    static DRAINED: AtomicBool = AtomicBool::new(false);

    fn consumer() {
        KERNEL.notify_wait(Timeout::Forever).unwrap();
        while let Ok(FrameRef(ptr)) = FRAMES.try_receive(&KERNEL) {
            POOL.deallocate(ptr).unwrap();
        }
        DRAINED.store(true, Ordering::SeqCst);
        loop {
            KERNEL.delay(Duration::MAX);
        }
    }

    POOL.init();
    let task = KERNEL.spawn(TaskConfig::new("consumer", priority!(1), consumer), &STACK).unwrap();
    launch(&KERNEL);
    wait_for_state(&KERNEL, task, TaskState::Blocked);

    // the consumer is asleep, so a burst can only fill the pool
    for seq in 0..3 {
        let ptr = POOL.allocate().unwrap();
        // SAFETY: fresh block owned by this thread until it is sent
        unsafe {
            ptr.as_ptr().write(Frame {
                seq,
                payload: [0; 12],
            })
        };
        FRAMES.try_send(&KERNEL, FrameRef(ptr)).unwrap();
    }
    assert!(POOL.is_empty());
    assert_eq!(POOL.allocate().err(), Some(Error::NoMemory));
    assert_eq!(FRAMES.len(), 3);

    KERNEL.notify(task, 1, NotifyAction::SetBits).unwrap();
    wait_until("consumer to drain", || DRAINED.load(Ordering::SeqCst));
    assert!(POOL.is_full());
    assert!(FRAMES.is_empty());
}

#[test]
fn test_sender_blocks_on_full_queue() {
    static KERNEL: Kernel<HostedPort, 3> = Kernel::new(HostedPort::new(), KernelConfig::new());
    static STACK_PRODUCER: TaskStack<64> = TaskStack::new();
    static STACK_CONSUMER: TaskStack<64> = TaskStack::new();
    static LINK: Queue<u32, 2> = Queue::new();
    static RECEIVED: Mutex<Vec<u32>> = Mutex::new(Vec::new());
    static SENT_ALL: AtomicBool = AtomicBool::new(false);

    fn producer() {
        for value in 0..6 {
            LINK.send(&KERNEL, value, Timeout::Forever).unwrap();
        }
        SENT_ALL.store(true, Ordering::SeqCst);
        loop {
            KERNEL.delay(Duration::MAX);
        }
    }
    fn consumer() {
        KERNEL.notify_wait(Timeout::Forever).unwrap();
        loop {
            let value = LINK.receive(&KERNEL, Timeout::Forever).unwrap();
            RECEIVED.lock().unwrap().push(value);
        }
    }

    let producer = KERNEL
        .spawn(TaskConfig::new("producer", priority!(2), producer), &STACK_PRODUCER)
        .unwrap();
    let consumer = KERNEL
        .spawn(TaskConfig::new("consumer", priority!(1), consumer), &STACK_CONSUMER)
        .unwrap();
    launch(&KERNEL);

    wait_for_state(&KERNEL, producer, TaskState::Blocked);
    wait_for_state(&KERNEL, consumer, TaskState::Blocked);
    assert!(LINK.is_full());
    assert_eq!(LINK.waiting_senders(&KERNEL), 1);
    assert_eq!(LINK.try_peek(), Ok(0));

    KERNEL.notify(consumer, 1, NotifyAction::SetBits).unwrap();
    wait_until("all values", || RECEIVED.lock().unwrap().len() == 6);
    assert!(SENT_ALL.load(Ordering::SeqCst));
    assert_eq!(*RECEIVED.lock().unwrap(), [0, 1, 2, 3, 4, 5]);
    assert_eq!(LINK.waiting_senders(&KERNEL), 0);
    wait_until("consumer to wait", || LINK.waiting_receivers(&KERNEL) == 1);
}

//! The bundled suites, run on the host

use std::sync::Mutex;

use rtk_kernel::{priority, Duration, Kernel, KernelConfig, Queue, TaskConfig, TaskStack};
use rtk_mem::StaticPool;
use rtk_port_hosted::{launch, HostedPort};
use rtk_selftest::suites::notification::{self, NotifyFixture};
use rtk_selftest::suites::pool::{self, PoolFixture, SmallBlock, BLOCKS};
use rtk_selftest::suites::queue::{self, QueueFixture, DEPTH};
use rtk_selftest::{run_suite, TestReport};

#[test]
fn test_pool_suite_passes() {
    static POOL: StaticPool<SmallBlock, BLOCKS> = StaticPool::new();
    let mut report: TestReport<4> = TestReport::new();
    let mut fixture = PoolFixture::new(&POOL);

    run_suite("pool", &pool::cases(), &mut fixture, &mut report);
    // a second run finds the pool the way the first one left it
    run_suite("pool", &pool::cases(), &mut fixture, &mut report);

    assert!(report.failures().is_empty(), "{:?}", report.failures());
    assert_eq!(report.passed(), 6);
    assert!(POOL.is_full());
}

#[test]
fn test_queue_suite_passes_before_start() {
    static KERNEL: Kernel<HostedPort, 2> = Kernel::new(HostedPort::new(), KernelConfig::new());
    static QUEUE: Queue<u32, DEPTH> = Queue::new();
    let mut report: TestReport<4> = TestReport::new();
    let mut fixture = QueueFixture {
        kernel: &KERNEL,
        queue: &QUEUE,
    };

    run_suite("queue", &queue::cases(), &mut fixture, &mut report);

    assert!(report.failures().is_empty(), "{:?}", report.failures());
    assert!(report.is_success());
    assert!(QUEUE.is_empty());
}

#[test]
fn test_notification_suite_passes_in_a_task() {
    static KERNEL: Kernel<HostedPort, 2> = Kernel::new(HostedPort::new(), KernelConfig::new());
    static STACK: TaskStack<256> = TaskStack::new();
    static QUEUE: Queue<u32, DEPTH> = Queue::new();
    static REPORT: Mutex<Option<TestReport<8>>> = Mutex::new(None);

    fn runner() {
        let me = KERNEL.current_task().unwrap();
        let mut report = TestReport::new();

        let mut fixture = NotifyFixture { kernel: &KERNEL, me };
        run_suite("notification", &notification::cases(), &mut fixture, &mut report);
        let mut fixture = QueueFixture {
            kernel: &KERNEL,
            queue: &QUEUE,
        };
        run_suite("queue", &queue::cases(), &mut fixture, &mut report);

        *REPORT.lock().unwrap() = Some(report);
        loop {
            KERNEL.delay(Duration::MAX);
        }
    }

    KERNEL
        .spawn(TaskConfig::new("selftest", priority!(1), runner), &STACK)
        .unwrap();
    launch(&KERNEL);

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while REPORT.lock().unwrap().is_none() {
        assert!(std::time::Instant::now() < deadline, "suite did not finish");
        std::thread::sleep(std::time::Duration::from_millis(1));
    }

    let report = REPORT.lock().unwrap().take().unwrap();
    assert!(report.failures().is_empty(), "{:?}", report.failures());
    assert_eq!(report.passed(), 7);
}

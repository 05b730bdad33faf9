//! Blinky driven through a queue
//!
//! A periodic `sampler` task posts readings to a queue. The `blinker` task
//! receives them, toggles the (simulated) LED and counts the toggles on the
//! `monitor` task's notification word.
//!
//! ```text
//! cargo run --example blinky_queue --release
//! ```

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use cortex_m_rt::entry;
use panic_halt as _;
use rtk_kernel::{
    priority, Kernel, KernelConfig, NotifyAction, Queue, TaskConfig, TaskId, TaskStack, Timeout,
};
use rtk_port_cortex_m::{configure_systick, use_port, CortexMPort};

const CORE_HZ: u32 = 12_000_000;

static KERNEL: Kernel<CortexMPort, 4> = Kernel::new(
    CortexMPort::new(),
    KernelConfig::builder().name("blinky").tick_hz(1000).build(),
);
use_port!(KERNEL);

static READINGS: Queue<u32, 8> = Queue::new();

static SAMPLER_STACK: TaskStack<256> = TaskStack::new();
static BLINKER_STACK: TaskStack<256> = TaskStack::new();
static MONITOR_STACK: TaskStack<256> = TaskStack::new();

static LED: AtomicBool = AtomicBool::new(false);
static MONITOR: AtomicU32 = AtomicU32::new(0);
static TOGGLES: AtomicU32 = AtomicU32::new(0);

fn sampler() {
    let mut last_wake = KERNEL.tick_count();
    let mut reading = 0u32;
    loop {
        KERNEL.delay_until(&mut last_wake, KERNEL.config().millis(500));
        reading = reading.wrapping_add(1);
        let _ = READINGS.send(&KERNEL, reading, Timeout::ticks(10));
    }
}

fn blinker() {
    let monitor = TaskId::new(MONITOR.load(Ordering::Relaxed) as u8);
    loop {
        if READINGS.receive(&KERNEL, Timeout::Forever).is_ok() {
            LED.fetch_xor(true, Ordering::Relaxed);
            let _ = KERNEL.notify(monitor, 1, NotifyAction::Increment);
        }
    }
}

fn monitor() {
    loop {
        if KERNEL.notify_take(Timeout::Forever).is_ok() {
            TOGGLES.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[entry]
fn main() -> ! {
    let mut core = cortex_m::Peripherals::take().unwrap();

    KERNEL
        .spawn(TaskConfig::new("blinker", priority!(3), blinker), &BLINKER_STACK)
        .unwrap();
    let monitor = KERNEL
        .spawn(TaskConfig::new("monitor", priority!(2), monitor), &MONITOR_STACK)
        .unwrap();
    MONITOR.store(u32::from(monitor.raw()), Ordering::Relaxed);
    KERNEL
        .spawn(TaskConfig::new("sampler", priority!(1), sampler), &SAMPLER_STACK)
        .unwrap();

    configure_systick(&mut core.SYST, CORE_HZ, KERNEL.config().tick_hz);
    KERNEL.start()
}

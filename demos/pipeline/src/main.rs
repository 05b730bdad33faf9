//! Frame pipeline on the hosted port
//!
//! The main thread plays a sampling interrupt: it fills frames taken from a
//! static pool and posts them to a queue. A high-priority `filter` task
//! averages each frame and gives the block back, then counts the frame on
//! the `reporter` task's notification word. A periodic `heartbeat` task logs
//! the kernel's uptime.
//!
//! ```text
//! RUST_LOG=debug cargo run -p rtk-demo-pipeline -- --frames 50
//! ```

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration as StdDuration, Instant};

use clap::Parser;
use log::{debug, error, info, warn};
use rtk_kernel::{
    priority, Error, Fatal, Kernel, KernelConfig, NotifyAction, Queue, SpawnError,
    TaskConfig, TaskId, TaskStack, Timeout,
};
use rtk_mem::StaticPool;
use rtk_port_hosted::{init_logging, launch, spawn_tick_source, HostedPort};

const SAMPLES: usize = 8;
const POOL_BLOCKS: usize = 6;
const QUEUE_DEPTH: usize = 4;

#[derive(Parser, Debug)]
#[command(author, version, about = "Interrupt-to-task pipeline on the RTK hosted port")]
struct Opts {
    /// Number of frames the interrupt produces
    #[arg(long, default_value_t = 20)]
    frames: u32,

    /// Milliseconds between two sampling interrupts
    #[arg(long = "interval", default_value_t = 3, value_name = "MS")]
    interval_ms: u64,

    /// Kernel tick period in milliseconds
    #[arg(long = "tick", default_value_t = 1, value_name = "MS")]
    tick_ms: u64,
}

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("cannot spawn task: {0}")]
    Spawn(#[from] SpawnError),
    #[error("kernel call failed: {0}")]
    Kernel(#[from] Error),
    #[error("kernel halted: {0}")]
    Halted(Fatal),
    #[error("only {done} of {wanted} frames were processed")]
    Stalled { done: u32, wanted: u32 },
}

struct Frame {
    seq: u32,
    samples: [u16; SAMPLES],
}

/// Pool block in flight between the interrupt and the filter task
#[derive(Clone, Copy)]
struct FrameRef(NonNull<Frame>);

// SAFETY: a frame is owned by whoever last received it from the queue
unsafe impl Send for FrameRef {}

const CONFIG: KernelConfig = KernelConfig::builder().name("pipeline").tick_hz(1000).build();

static KERNEL: Kernel<HostedPort, 4> = Kernel::new(HostedPort::new(), CONFIG);
static FRAME_POOL: StaticPool<Frame, POOL_BLOCKS> = StaticPool::new();
static FRAMES: Queue<FrameRef, QUEUE_DEPTH> = Queue::new();

static FILTER_STACK: TaskStack<512> = TaskStack::new();
static REPORTER_STACK: TaskStack<512> = TaskStack::new();
static HEARTBEAT_STACK: TaskStack<256> = TaskStack::new();

static REPORTER: AtomicU32 = AtomicU32::new(u32::MAX);
static PROCESSED: AtomicU32 = AtomicU32::new(0);
static SAMPLE_SUM: AtomicU64 = AtomicU64::new(0);

fn filter() {
    let reporter = TaskId::new(REPORTER.load(Ordering::Acquire) as u8);
    loop {
        let FrameRef(ptr) = match FRAMES.receive(&KERNEL, Timeout::ticks(250)) {
            Ok(frame) => frame,
            Err(Error::Timeout) => {
                debug!("filter: no frame for 250 ticks");
                continue;
            }
            Err(err) => {
                error!("filter: {}", err);
                continue;
            }
        };

        // SAFETY: the interrupt initialized the frame before queueing it
        let frame = unsafe { ptr.as_ptr().read() };
        if let Err(err) = FRAME_POOL.deallocate(ptr) {
            warn!("filter: frame {} not returned: {}", frame.seq, err);
        }

        let sum: u64 = frame.samples.iter().map(|&s| u64::from(s)).sum();
        SAMPLE_SUM.fetch_add(sum, Ordering::Relaxed);
        debug!("filter: frame {} average {}", frame.seq, sum / SAMPLES as u64);

        if let Err(err) = KERNEL.notify(reporter, 1, NotifyAction::Increment) {
            warn!("filter: reporter not notified: {}", err);
        }
    }
}

fn reporter() {
    loop {
        match KERNEL.notify_take(Timeout::ticks(1000)) {
            Ok(_) => {
                let done = PROCESSED.fetch_add(1, Ordering::AcqRel) + 1;
                if done % 10 == 0 {
                    info!("reporter: {} frames, {} blocks free", done, FRAME_POOL.available());
                }
            }
            Err(Error::Timeout) => debug!("reporter: idle"),
            Err(err) => error!("reporter: {}", err),
        }
    }
}

fn heartbeat() {
    let mut last_wake = KERNEL.tick_count();
    loop {
        KERNEL.delay_until(&mut last_wake, KERNEL.config().millis(100));
        debug!(
            "heartbeat: tick {} uptime {} us",
            last_wake,
            KERNEL.uptime_us().unwrap_or(0)
        );
    }
}

fn spawn_tasks() -> Result<(), DemoError> {
    KERNEL.spawn(TaskConfig::new("filter", priority!(3), filter), &FILTER_STACK)?;
    let reporter = KERNEL.spawn(
        TaskConfig::new("reporter", priority!(2), reporter),
        &REPORTER_STACK,
    )?;
    REPORTER.store(u32::from(reporter.raw()), Ordering::Release);
    KERNEL.spawn(
        TaskConfig::new("heartbeat", priority!(1), heartbeat),
        &HEARTBEAT_STACK,
    )?;
    Ok(())
}

/// One sampling interrupt: fill a frame and hand it to the filter
fn sample(seq: u32) -> Result<(), Error> {
    let ptr = FRAME_POOL.allocate()?;
    let mut samples = [0u16; SAMPLES];
    for (index, slot) in samples.iter_mut().enumerate() {
        *slot = (seq as u16).wrapping_mul(31).wrapping_add(index as u16 * 7);
    }
    // SAFETY: fresh block owned by this interrupt until it is queued
    unsafe { ptr.as_ptr().write(Frame { seq, samples }) };

    if let Err(err) = FRAMES.try_send(&KERNEL, FrameRef(ptr)) {
        // never queued, so the block is still ours
        FRAME_POOL.deallocate(ptr)?;
        return Err(err);
    }
    Ok(())
}

fn run(opts: &Opts) -> Result<(), DemoError> {
    FRAME_POOL.init();
    spawn_tasks()?;

    launch(&KERNEL);
    let ticker = spawn_tick_source(&KERNEL, StdDuration::from_millis(opts.tick_ms));

    let mut sent = 0;
    let mut dropped = 0;
    for seq in 0..opts.frames {
        match sample(seq) {
            Ok(()) => sent += 1,
            Err(err) if err.is_transient() => {
                dropped += 1;
                debug!("interrupt: frame {} dropped: {}", seq, err);
            }
            Err(err) => return Err(err.into()),
        }
        thread::sleep(StdDuration::from_millis(opts.interval_ms));
    }

    let deadline = Instant::now() + StdDuration::from_secs(5);
    while PROCESSED.load(Ordering::Acquire) < sent {
        if let Some(reason) = KERNEL.halt_reason() {
            return Err(DemoError::Halted(reason));
        }
        if Instant::now() >= deadline {
            return Err(DemoError::Stalled {
                done: PROCESSED.load(Ordering::Acquire),
                wanted: sent,
            });
        }
        thread::sleep(StdDuration::from_millis(1));
    }
    ticker.stop();

    let stats = FRAME_POOL.stats();
    info!(
        "{} frames processed, {} dropped, sample sum {}",
        sent,
        dropped,
        SAMPLE_SUM.load(Ordering::Relaxed)
    );
    info!(
        "pool peak utilization {}%, ticks {}",
        stats.peak_utilization(),
        KERNEL.tick_count()
    );
    Ok(())
}

fn main() {
    init_logging();
    let opts = Opts::parse();

    if let Err(err) = run(&opts) {
        error!("{}", err);
        std::process::exit(1);
    }
}

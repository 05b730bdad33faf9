//! Tick source thread
//!
//! Sleeps until absolute deadlines on the monotonic clock, so the tick rate
//! does not drift with scheduling noise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error};
use rtk_kernel::Kernel;

use crate::HostedPort;

/// Handle of a running tick thread
pub struct TickSource {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TickSource {
    /// Stop ticking and wait for the thread to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TickSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Call `kernel.on_tick()` every `period` from a dedicated thread
///
/// The thread plays the tick interrupt. It stops when the returned handle is
/// dropped or the kernel halts.
pub fn spawn_tick_source<const TASKS: usize>(
    kernel: &'static Kernel<HostedPort, TASKS>,
    period: Duration,
) -> TickSource {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);

    let spawned = thread::Builder::new()
        .name("rtk-tick".to_owned())
        .spawn(move || {
            debug!("tick source running every {:?}", period);
            let mut next_tick = Instant::now();
            while flag.load(Ordering::Relaxed) && !kernel.port().is_halted() {
                next_tick += period;
                let now = Instant::now();
                if next_tick > now {
                    thread::sleep(next_tick - now);
                }
                kernel.on_tick();
            }
        });

    let handle = match spawned {
        Ok(handle) => Some(handle),
        Err(err) => {
            error!("cannot spawn tick thread: {}", err);
            running.store(false, Ordering::SeqCst);
            None
        }
    };
    TickSource { running, handle }
}

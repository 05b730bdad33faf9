#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use rtk_kernel::{Kernel, TaskId, TaskState};
use rtk_port_hosted::HostedPort;

/// Poll `condition` until it holds, failing the test after five seconds
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Wait until `task` is in `state`
pub fn wait_for_state<const TASKS: usize>(
    kernel: &'static Kernel<HostedPort, TASKS>,
    task: TaskId,
    state: TaskState,
) {
    wait_until(&format!("{task} to be {state:?}"), || {
        kernel.task_state(task) == Some(state)
    });
}

/// Deliver `count` ticks, letting the scheduler settle after each one
pub fn tick<const TASKS: usize>(kernel: &'static Kernel<HostedPort, TASKS>, count: u32) {
    for _ in 0..count {
        kernel.on_tick();
        thread::sleep(Duration::from_millis(2));
    }
}

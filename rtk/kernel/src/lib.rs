#![no_std]
#![allow(unsafe_code)] // stack regions and the port contract

//! # RTK Kernel
//!
//! Preemptive, priority-based scheduler for single-core microcontrollers,
//! plus the two primitives that need it to block tasks:
//!
//! - [`Queue`]: fixed-capacity FIFO with blocking and non-blocking transfer
//! - task notifications: a 32-bit word per task (see [`NotifyAction`])
//!
//! Target specifics live behind the [`Port`] trait. A kernel is declared as a
//! `static`, tasks are registered with [`Kernel::spawn`] and the system is
//! handed over to the scheduler with [`Kernel::start`].
//!
//! ```ignore
//! static KERNEL: Kernel<CortexMPort, 4> = Kernel::new(CortexMPort::new(), KernelConfig::new());
//! static SENSOR_STACK: TaskStack<256> = TaskStack::new();
//!
//! KERNEL.spawn(TaskConfig::new("sensor", priority!(2), sensor_task), &SENSOR_STACK)?;
//! KERNEL.start();
//! ```

#[cfg(feature = "std")]
extern crate std;

pub mod config;
pub mod kernel;
pub mod notify;
pub mod port;
pub mod queue;
mod sched;
pub mod task;

pub use config::{KernelConfig, KernelConfigBuilder};
pub use kernel::{Fatal, Kernel};
pub use notify::{ClearMode, Notification, NotifyAction};
pub use port::{KernelHooks, Port};
pub use queue::Queue;
pub use task::{SpawnError, TaskConfig, TaskId, TaskInfo, TaskStack, TaskState};

pub use rtk_core::{priority, Duration, Error, KResult, Priority, Tick, Timeout};

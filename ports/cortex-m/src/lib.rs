//! RTK Port for ARMv7-M
//!
//! Runs tasks in Thread mode on the process stack (PSP) and switches between
//! them in the `PendSV` handler, which is given the lowest exception priority
//! so a switch never interrupts another handler. `SysTick` drives the kernel
//! tick.
//!
//! Boards keep using `cortex-m-rt`'s vector table; this crate only claims
//! the `PendSV` and `SysTick` symbols (the latter through [`use_port!`]).
//!
//! # Usage
//!
//! ```ignore
//! #![no_std]
//! #![no_main]
//!
//! use rtk_kernel::{Kernel, KernelConfig};
//! use rtk_port_cortex_m::{configure_systick, use_port, CortexMPort};
//!
//! static KERNEL: Kernel<CortexMPort, 4> = Kernel::new(CortexMPort::new(), KernelConfig::new());
//! use_port!(KERNEL);
//!
//! #[cortex_m_rt::entry]
//! fn main() -> ! {
//!     let mut core = cortex_m::Peripherals::take().unwrap();
//!     configure_systick(&mut core.SYST, 12_000_000, KERNEL.config().tick_hz);
//!     // spawn tasks ...
//!     KERNEL.start()
//! }
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

use core::cell::Cell;

use cortex_m::peripheral::scb::{SystemHandler, VectActive};
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m::asm;
use critical_section::Mutex;
use log::debug;
use rtk_kernel::{KernelHooks, Port, TaskId};

mod switch;

/// Words pushed by the hardware on exception entry: r0-r3, r12, lr, pc, xPSR
const HW_FRAME_WORDS: usize = 8;
/// Words pushed by `PendSV`: r4-r11
const SW_FRAME_WORDS: usize = 8;
const FRAME_WORDS: usize = HW_FRAME_WORDS + SW_FRAME_WORDS;

// offsets inside the hardware frame
const R0: usize = 0;
const LR: usize = 5;
const PC: usize = 6;
const XPSR: usize = 7;

/// Thumb state bit of xPSR
const XPSR_THUMB: usize = 0x0100_0000;

/// Lowest priority, so `PendSV` only runs once no other handler is active
const PENDSV_PRIORITY: u8 = 0xff;
const SYSTICK_PRIORITY: u8 = 0x80;

/// Largest value the 24-bit SysTick reload register holds
const SYSTICK_MAX_RELOAD: u32 = 0x00ff_ffff;

static HOOKS: Mutex<Cell<Option<&'static dyn KernelHooks>>> = Mutex::new(Cell::new(None));

fn hooks() -> Option<&'static dyn KernelHooks> {
    critical_section::with(|cs| HOOKS.borrow(cs).get())
}

/// Port for Cortex-M3/M4/M7 cores without FPU context
pub struct CortexMPort {
    _private: (),
}

impl CortexMPort {
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for CortexMPort {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: tasks only run through the frames built in `init_stack`, and the
// `PendSV` handler saves and restores every register the hardware does not.
unsafe impl Port for CortexMPort {
    fn init_stack(&self, stack: &mut [usize], task: TaskId) -> usize {
        // exception frames must start on an 8-byte boundary
        let top = stack.len() & !1;
        let frame = &mut stack[top - FRAME_WORDS..top];
        frame.fill(0);

        let hw = &mut frame[SW_FRAME_WORDS..];
        hw[R0] = usize::from(task.raw());
        hw[LR] = switch::rtk_task_exit as usize;
        hw[PC] = switch::rtk_task_entry as usize & !1;
        hw[XPSR] = XPSR_THUMB;

        frame.as_ptr() as usize
    }

    fn start(&'static self, hooks: &'static dyn KernelHooks, first: TaskId) -> ! {
        critical_section::with(|cs| HOOKS.borrow(cs).set(Some(hooks)));
        debug!("dispatching {}", first);

        // SAFETY: the kernel owns the PendSV and SysTick priorities, and a
        // zero PSP tells `PendSV` there is no context to save yet.
        unsafe {
            let mut core = cortex_m::Peripherals::steal();
            core.SCB.set_priority(SystemHandler::PendSV, PENDSV_PRIORITY);
            core.SCB.set_priority(SystemHandler::SysTick, SYSTICK_PRIORITY);
            cortex_m::register::psp::write(0);
        }
        SCB::set_pendsv();

        // SAFETY: all scheduler state is in place
        unsafe { cortex_m::interrupt::enable() };

        // the boot context ends here; `PendSV` never switches back to it
        loop {
            asm::wfi();
        }
    }

    fn request_switch(&self) {
        SCB::set_pendsv();
    }

    fn in_interrupt(&self) -> bool {
        SCB::vect_active() != VectActive::ThreadMode
    }

    fn idle(&self) {
        asm::wfi();
    }

    fn halt(&self) -> ! {
        cortex_m::interrupt::disable();
        loop {
            asm::wfi();
        }
    }
}

/// Program SysTick to fire `tick_hz` times per second on a `core_hz` clock
pub fn configure_systick(syst: &mut SYST, core_hz: u32, tick_hz: u32) {
    let reload = systick_reload(core_hz, tick_hz);
    debug!("systick reload {} for {} Hz", reload, tick_hz);
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(reload);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();
}

fn systick_reload(core_hz: u32, tick_hz: u32) -> u32 {
    (core_hz / tick_hz.max(1))
        .saturating_sub(1)
        .clamp(1, SYSTICK_MAX_RELOAD)
}

/// Bind the `SysTick` exception to a static kernel's tick
///
/// ```ignore
/// static KERNEL: Kernel<CortexMPort, 4> = Kernel::new(CortexMPort::new(), KernelConfig::new());
/// rtk_port_cortex_m::use_port!(KERNEL);
/// ```
#[macro_export]
macro_rules! use_port {
    ($kernel:path) => {
        #[no_mangle]
        extern "C" fn SysTick() {
            $kernel.on_tick();
        }
    };
}

//! Context switch
//!
//! `PendSV` runs with the outgoing task's r0-r3, r12, lr, pc and xPSR already
//! stacked on its PSP. It pushes r4-r11 below them, asks the kernel for the
//! incoming task's stack pointer, pops that task's r4-r11 and returns to
//! Thread mode on the new PSP, where the hardware unstacks the rest.
//!
//! A zero PSP means no task ran yet, so nothing is saved.

use core::arch::global_asm;

use cortex_m::asm;
use rtk_kernel::TaskId;

use crate::hooks;

global_asm!(
    ".section .text.PendSV,\"ax\",%progbits",
    ".global PendSV",
    ".type PendSV,%function",
    ".thumb_func",
    "PendSV:",
    "    cpsid   i",
    "    mrs     r0, psp",
    "    cbz     r0, 1f",
    "    stmdb   r0!, {{r4-r11}}",
    "1:",
    // r0 = incoming stack pointer
    "    bl      rtk_switch_context",
    "    ldmia   r0!, {{r4-r11}}",
    "    msr     psp, r0",
    // return to Thread mode, process stack
    "    ldr     lr, =0xFFFFFFFD",
    "    cpsie   i",
    "    bx      lr",
    "    .ltorg",
    ".size PendSV, . - PendSV",
);

/// Save `sp` for the outgoing task and return the incoming task's
#[no_mangle]
extern "C" fn rtk_switch_context(sp: usize) -> usize {
    match hooks() {
        Some(hooks) => hooks.switch_context(sp),
        None => sp,
    }
}

/// First code a task runs; `task` arrives in r0 from its initial frame
pub(crate) extern "C" fn rtk_task_entry(task: usize) -> ! {
    match hooks() {
        Some(hooks) => hooks.run_task(TaskId::new(task as u8)),
        None => loop {
            asm::wfi();
        },
    }
}

/// Return address of every initial frame; `run_task` never returns
pub(crate) extern "C" fn rtk_task_exit() -> ! {
    asm::udf()
}

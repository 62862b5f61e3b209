//! Cortex-M4 port implementation
//!
//! Provides context switching via PendSV exception handler.

#![allow(named_asm_labels)]

use core::arch::naked_asm;
use core::cell::UnsafeCell;
use core::ptr::{self, addr_of_mut};

use cortex_m::interrupt;
use cortex_m::peripheral::scb::{SystemHandler, VectActive};
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SCB;
use cortex_m::register::primask;

use super::Port;
use crate::error::Fatal;
use crate::kernel::Kernel;
use crate::task::Task;
use crate::types::StackWord;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;

#[cfg(feature = "defmt")]
use defmt_rtt as _;

#[cfg(feature = "defmt")]
use panic_probe as _;

#[cfg(feature = "defmt")]
#[defmt::panic_handler]
fn defmt_panic() -> ! {
    cortex_m::asm::udf()
}

#[cortex_m_rt::exception]
unsafe fn HardFault(_ef: &cortex_m_rt::ExceptionFrame) -> ! {
    loop {
        cortex_m::asm::udf();
    }
}

/// Saved stack pointer of a task that is not running
pub struct TaskContext {
    sp: UnsafeCell<*mut StackWord>,
}

// Only touched with interrupts masked or from PendSV
unsafe impl Sync for TaskContext {}

impl TaskContext {
    pub const fn new() -> Self {
        TaskContext {
            sp: UnsafeCell::new(ptr::null_mut()),
        }
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Contexts PendSV switches between. `cur` is null until the first task
/// starts.
#[repr(C)]
struct CpuState {
    cur: *const TaskContext,
    next: *const TaskContext,
}

#[no_mangle]
static mut CPU_STATE: CpuState = CpuState {
    cur: ptr::null(),
    next: ptr::null(),
};

/// Initialize SysTick timer for system tick generation
///
/// # Arguments
/// * `reload` - Core clock cycles per tick
///
/// # Example
/// For 16MHz clock with 1000Hz tick rate: reload = 16_000_000 / 1000 = 16_000
pub fn systick_init(reload: u32) {
    // SAFETY: SYST is only configured here
    let mut p = unsafe { cortex_m::Peripherals::steal() };

    p.SYST.set_reload(reload - 1);
    p.SYST.clear_current();
    p.SYST.set_clock_source(SystClkSource::Core);
    p.SYST.enable_interrupt();
    p.SYST.enable_counter();
}

/// Context structure stored on stack
#[repr(C, align(4))]
struct UcStk {
    r4: u32,
    r5: u32,
    r6: u32,
    r7: u32,
    r8: u32,
    r9: u32,
    r10: u32,
    r11: u32,
    exc_return: u32, // LR value for exception return
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    xpsr: u32,
}
const CONTEXT_STACK_SIZE: usize = 17;

/// First code run by every task. `task` and `kernel` arrive in r0 and r1.
extern "C" fn task_start(task: *const Task, kernel: *const Kernel) -> ! {
    // SAFETY: task_init stored pointers to 'static objects
    let (task, kernel) = unsafe { (&*task, &*kernel) };
    kernel.task_run(task);
    kernel.halt(Fatal::SelfCheck)
}

extern "C" fn task_return() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

pub struct CortexM4;

impl CortexM4 {
    pub const fn new() -> Self {
        CortexM4
    }
}

impl Default for CortexM4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for CortexM4 {
    type CriticalState = critical_section::RestoreState;

    #[inline(always)]
    fn critical_enter(&self) -> Self::CriticalState {
        unsafe { critical_section::acquire() }
    }

    #[inline(always)]
    unsafe fn critical_exit(&self, state: Self::CriticalState) {
        unsafe { critical_section::release(state) }
    }

    #[inline(always)]
    fn is_critical(&self) -> bool {
        primask::read().is_inactive()
    }

    unsafe fn task_init(&self, kernel: &'static Kernel, task: &'static Task, stack: &'static mut [StackWord]) {
        let stk_top = stack.as_mut_ptr_range().end;
        let stk_aligned = ((stk_top as usize) & !7) as *mut u32;

        unsafe {
            let frame_ptr = stk_aligned.sub(CONTEXT_STACK_SIZE) as *mut UcStk;
            frame_ptr.write(UcStk {
                r4: 0x04040404,
                r5: 0x05050505,
                r6: 0x06060606,
                r7: 0x07070707,
                r8: 0x08080808,
                r9: 0x09090909,
                r10: 0x10101010,
                r11: 0x11111111,
                exc_return: 0xFFFF_FFFD,
                r0: task as *const Task as u32,
                r1: kernel as *const Kernel as u32,
                r2: 0,
                r3: 0,
                r12: 0,
                lr: task_return as *const () as u32,
                pc: (task_start as *const () as u32) | 1,
                xpsr: 0x0100_0000,
            });

            // 4 bytes before the frame, matching PendSV's "add r0, r0, #4"
            *task.ctx.sp.get() = (frame_ptr as *mut u32).sub(1);
        }
    }

    unsafe fn start_first(&self, first: &'static Task) {
        unsafe {
            let mut scb = cortex_m::Peripherals::steal().SCB;

            // PendSV and SysTick at the lowest priority
            scb.set_priority(SystemHandler::PendSV, 0xF0);
            scb.set_priority(SystemHandler::SysTick, 0xF0);

            let state = &mut *addr_of_mut!(CPU_STATE);
            state.cur = ptr::null();
            state.next = &first.ctx;

            cortex_m::register::psp::write(0);
            interrupt::enable();
        }
        SCB::set_pendsv();

        loop {
            cortex_m::asm::wfi();
        }
    }

    unsafe fn context_switch(&self, _from: &'static Task, to: &'static Task, _from_exited: bool) {
        // `cur` is left to PendSV: a switch requested before the previous
        // one completed must still save the task actually running
        unsafe { (*addr_of_mut!(CPU_STATE)).next = &to.ctx };
        SCB::set_pendsv();

        if SCB::vect_active() == VectActive::ThreadMode {
            // let PendSV in, we resume here when switched back
            unsafe { interrupt::enable() };
            cortex_m::asm::isb();
            interrupt::disable();
        }
    }

    fn idle(&self) {
        cortex_m::asm::wfi();
    }

    fn halt(&self, _reason: Fatal) -> ! {
        interrupt::disable();
        loop {
            cortex_m::asm::wfi();
        }
    }
}

/// Called from PendSV to swap contexts. Returns the new task's stack pointer.
#[inline(never)]
#[no_mangle]
unsafe extern "C" fn pendsv_switch_context(cur_sp: *mut u32) -> *mut u32 {
    unsafe {
        let state = &mut *addr_of_mut!(CPU_STATE);

        if !state.cur.is_null() {
            *(*state.cur).sp.get() = cur_sp;
        }
        state.cur = state.next;

        if state.cur.is_null() {
            ptr::null_mut()
        } else {
            *(*state.cur).sp.get()
        }
    }
}

/// PendSV exception handler - performs full context switch
///
/// 1. Save R4-R11, LR to current task's PSP (skip if first task)
/// 2. Call switch_context to swap context pointers
/// 3. Restore R4-R11, LR from new task's stack
/// 4. Exception return
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "dsb",
        "isb",

        "mrs r0, psp",

        "ldr r1, ={cpu_state}",
        "ldr r1, [r1]",
        "cbz r1, 1f",

        "stmdb r0!, {{r4-r11, lr}}",

        "sub r0, r0, #4",

        "1:",
        "bl pendsv_switch_context",

        "cbz r0, 2f",
        "add r0, r0, #4",
        "ldmia r0!, {{r4-r11, lr}}",

        "msr psp, r0",

        "2:",
        "cpsie i",
        "dsb",
        "isb",

        "bx lr",

        cpu_state = sym CPU_STATE,
    );
}

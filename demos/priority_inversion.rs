//! Priority Inversion Demo - mutex priority inheritance
//!
//! Three tasks: High(3), Med(2), Low(1)
//! Low holds mutex -> High waits -> Low boosted to prio 3

#![no_std]
#![no_main]

use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::{entry, exception};
use cortex_m_semihosting::debug;
use defmt::info;
// device memory map for the linker
use stm32_metapac as _;
use tickos::port::systick_init;
use tickos::{Kernel, Mutex, StackWord, Task, CFG_TICK_RATE_HZ};

const CORE_CLOCK_HZ: u32 = 16_000_000;
const ROUNDS: u32 = 5;

static KERNEL: Kernel = Kernel::new();

static HIGH_RUNS: AtomicU32 = AtomicU32::new(0);
static LOW_RUNS: AtomicU32 = AtomicU32::new(0);

static MTX: Mutex = Mutex::new();

static HIGH: Task = Task::new();
static mut HIGH_STK: [StackWord; 256] = [0; 256];
static MED: Task = Task::new();
static mut MED_STK: [StackWord; 256] = [0; 256];
static LOW: Task = Task::new();
static mut LOW_STK: [StackWord; 256] = [0; 256];

/// High priority task
fn high_task_fn() -> i32 {
    KERNEL.delay(50);

    for _ in 0..ROUNDS {
        let n = HIGH_RUNS.fetch_add(1, Ordering::Relaxed) + 1;

        if MTX.lock(&KERNEL).is_err() {
            return -1;
        }
        info!("[HIGH] acquired #{}", n);

        for _ in 0..1_000 {
            cortex_m::asm::nop();
        }

        MTX.unlock(&KERNEL);
        KERNEL.delay(100);
    }

    info!("[HIGH] done, low ran {} times", LOW_RUNS.load(Ordering::Relaxed));
    debug::exit(debug::EXIT_SUCCESS);
    0
}

/// Medium priority task - CPU bound
fn med_task_fn() -> i32 {
    loop {
        for _ in 0..50_000 {
            cortex_m::asm::nop();
        }
        KERNEL.delay(10);
    }
}

/// Low priority task - holds mutex long
fn low_task_fn() -> i32 {
    loop {
        let n = LOW_RUNS.fetch_add(1, Ordering::Relaxed) + 1;

        if MTX.lock(&KERNEL).is_err() {
            return -1;
        }
        info!("[LOW] holding #{} at prio {}", n, LOW.prio_current(&KERNEL));

        for _ in 0..100_000 {
            cortex_m::asm::nop();
        }

        MTX.unlock(&KERNEL);
        KERNEL.delay(200);
    }
}

#[exception]
fn SysTick() {
    KERNEL.isr(|| KERNEL.tick());
}

#[entry]
fn main() -> ! {
    info!("Priority Inversion Demo: H(3) M(2) L(1)");

    KERNEL.start(
        |k| {
            MTX.create(k);
            // SAFETY: each stack is handed to exactly one task, once
            unsafe {
                k.task_create(&LOW, 1, &mut *addr_of_mut!(LOW_STK), &low_task_fn);
                k.task_create(&MED, 2, &mut *addr_of_mut!(MED_STK), &med_task_fn);
                k.task_create(&HIGH, 3, &mut *addr_of_mut!(HIGH_STK), &high_task_fn);
            }
            systick_init(CORE_CLOCK_HZ / CFG_TICK_RATE_HZ);
            info!("Starting...");
        },
        None,
    );

    loop {
        cortex_m::asm::wfi();
    }
}

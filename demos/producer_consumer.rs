//! Producer-Consumer example with semaphores

#![no_std]
#![no_main]

use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::{entry, exception};
use defmt::info;
// device memory map for the linker
use stm32_metapac as _;
use tickos::port::systick_init;
use tickos::{Kernel, Semaphore, StackWord, Task, CFG_TICK_RATE_HZ, TIMEOUT_INFINITE};

const CORE_CLOCK_HZ: u32 = 16_000_000;

static KERNEL: Kernel = Kernel::new();

static PRODUCED: AtomicU32 = AtomicU32::new(0);
static CONSUMED: AtomicU32 = AtomicU32::new(0);

static SEM: Semaphore = Semaphore::new(0);

static PRODUCER: Task = Task::new();
static mut PRODUCER_STK: [StackWord; 256] = [0; 256];
static CONSUMER: Task = Task::new();
static mut CONSUMER_STK: [StackWord; 256] = [0; 256];

fn producer_task() -> i32 {
    loop {
        let n = PRODUCED.fetch_add(1, Ordering::Relaxed) + 1;
        SEM.up(&KERNEL);
        info!("[P] produced #{}", n);
        KERNEL.delay(200);
    }
}

fn consumer_task() -> i32 {
    loop {
        if SEM.down(&KERNEL, TIMEOUT_INFINITE).is_err() {
            return -1;
        }
        let n = CONSUMED.fetch_add(1, Ordering::Relaxed) + 1;
        info!("[C] consumed #{}", n);
        for _ in 0..10_000 {
            cortex_m::asm::nop();
        }
    }
}

#[exception]
fn SysTick() {
    KERNEL.isr(|| KERNEL.tick());
}

#[entry]
fn main() -> ! {
    info!("Producer-Consumer Demo");

    KERNEL.start(
        |k| {
            SEM.create(k, 0);
            // SAFETY: each stack is handed to exactly one task, once
            unsafe {
                k.task_create(&PRODUCER, 2, &mut *addr_of_mut!(PRODUCER_STK), &producer_task);
                k.task_create(&CONSUMER, 3, &mut *addr_of_mut!(CONSUMER_STK), &consumer_task);
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

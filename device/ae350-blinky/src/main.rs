//! LED counter on the AE350 GPIO, booted through the `.bootloader` section.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

/// ATCGPIO100 on the AE350 APB.
const GPIO_BASE: usize = 0xF070_0000;
const GPIO_DATA_OUT: *mut u32 = (GPIO_BASE + 0x24) as *mut u32;
const GPIO_CHANNEL_DIR: *mut u32 = (GPIO_BASE + 0x28) as *mut u32;

// Placed at ORIGIN(FLASH) by the generated memory.x, so this is the first code run after reset.
core::arch::global_asm!(
    r#"
.section .bootloader, "ax"
.globl _bootloader
_bootloader:
    csrw mie, zero
    csrw mip, zero
    j _start
"#
);

#[riscv_rt::entry]
fn main() -> ! {
    unsafe {
        GPIO_CHANNEL_DIR.write_volatile(0xFF);
    }

    let mut counter: u32 = 0;
    loop {
        unsafe {
            GPIO_DATA_OUT.write_volatile(counter & 0xFF);
        }
        for _ in 0..100_000 {
            core::hint::spin_loop();
        }
        counter = counter.wrapping_add(1);
    }
}

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    loop {
        core::hint::spin_loop();
    }
}

// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Boot console (NS16550A) used by logging and the panic path
//! OWNERS: @kernel-team
//! PUBLIC API: KernelUart::lock(), raw_writer()
//! DEPENDS_ON: spin::Mutex
//! INVARIANTS: MMIO only on riscv64-none; host builds discard output

use core::fmt::{self, Write};
use spin::Mutex;

/// Address of the first UART on the board.
const UART0_BASE: usize = 0x1000_0000;
const UART_TX: usize = 0x0;
const UART_LSR: usize = 0x5;
const LSR_TX_IDLE: u8 = 1 << 5;

/// Console writer shared by every hart; the mutex keeps lines from interleaving.
static UART0: Mutex<KernelUart> = Mutex::new(KernelUart::new(UART0_BASE));

/// UART implementation capable of formatted writes.
#[derive(Clone, Copy)]
pub struct KernelUart {
    base: usize,
}

impl KernelUart {
    /// Creates a UART abstraction rooted at `base`.
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    /// Returns a guard for the boot UART singleton.
    pub fn lock() -> spin::MutexGuard<'static, KernelUart> {
        UART0.lock()
    }

    fn put(&self, byte: u8) {
        put_mmio(self.base, byte);
    }
}

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
#[inline]
fn put_mmio(base: usize, byte: u8) {
    // SAFETY: `base` is the identity/direct-mapped UART window, valid for the whole boot.
    unsafe {
        while core::ptr::read_volatile((base + UART_LSR) as *const u8) & LSR_TX_IDLE == 0 {}
        core::ptr::write_volatile((base + UART_TX) as *mut u8, byte);
    }
}

#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
#[inline]
fn put_mmio(_base: usize, _byte: u8) {}

impl Write for KernelUart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &byte in s.as_bytes() {
            if byte == b'\n' {
                self.put(b'\r');
            }
            self.put(byte);
        }
        Ok(())
    }
}

/// Lock-free writer for panic contexts where the console mutex may already be held.
pub struct RawUart;

impl Write for RawUart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        KernelUart::new(UART0_BASE).write_str(s)
    }
}

pub fn raw_writer() -> RawUart {
    RawUart
}

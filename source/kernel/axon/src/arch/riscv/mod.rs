// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! RISC-V supervisor-mode helpers used by the bring-up core.
//!
//! Host builds compile the same surface through `#[cfg(not(...))]` stubs so
//! the boot sequencing logic can be unit tested off-target.

use crate::hal::CpuOps;

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
use sbi_rt as sbi;

/// Supervisor software interrupt pending bit in `sip`.
#[cfg_attr(not(all(target_arch = "riscv64", target_os = "none")), allow(dead_code))]
const SIP_SSIP: usize = 1 << 1;

/// Reads the `time` CSR.
#[inline]
pub fn read_time() -> u64 {
    #[cfg(all(target_arch = "riscv64", target_os = "none"))]
    {
        ::riscv::register::time::read() as u64
    }
    #[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
    {
        0
    }
}

/// Clears a pending supervisor software interrupt (left over from the boot IPI).
#[inline]
pub fn clear_soft_pending() {
    #[cfg(all(target_arch = "riscv64", target_os = "none"))]
    // SAFETY: clearing SSIP only drops a pending IPI; no memory is touched.
    unsafe {
        core::arch::asm!("csrc sip, {0}", in(reg) SIP_SSIP, options(nomem, nostack));
    }
}

/// Programs the next supervisor timer interrupt `delta` ticks from now.
#[inline]
pub fn set_timer_after(delta: u64) {
    #[cfg(all(target_arch = "riscv64", target_os = "none"))]
    {
        let _ = sbi::set_timer(read_time().wrapping_add(delta));
    }
    #[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
    {
        let _ = delta;
    }
}

/// Unmasks software, timer and external interrupts and sets `sstatus.SIE`.
#[inline]
pub fn enable_interrupts() {
    #[cfg(all(target_arch = "riscv64", target_os = "none"))]
    // SAFETY: the trap vector is installed on this hart before steady state.
    unsafe {
        use ::riscv::register::{sie, sstatus};
        sie::set_ssoft();
        sie::set_stimer();
        sie::set_sext();
        sstatus::set_sie();
    }
}

/// Issues a WFI instruction or yields on the host.
#[inline]
pub fn wait_for_interrupt() {
    #[cfg(all(target_arch = "riscv64", target_os = "none"))]
    // SAFETY: `wfi` is a hint; the hart resumes on any enabled interrupt.
    unsafe {
        core::arch::asm!("wfi", options(nomem, nostack, preserves_flags));
    }
    #[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
    {
        core::hint::spin_loop();
    }
}

/// Flushes every translation cached by this hart.
#[inline]
pub fn flush_tlb_all() {
    #[cfg(all(target_arch = "riscv64", target_os = "none"))]
    // SAFETY: a full fence only invalidates cached translations.
    unsafe {
        core::arch::asm!("sfence.vma x0, x0", options(nostack));
    }
}

/// Parks the hart forever; used by the panic path.
pub fn halt() -> ! {
    loop {
        wait_for_interrupt();
    }
}

/// `CpuOps` backed by the local hart's CSRs.
pub struct RiscvCpu;

impl CpuOps for RiscvCpu {
    fn clear_soft_pending(&mut self) {
        clear_soft_pending();
    }

    fn arm_timer(&mut self, interval: u64) {
        set_timer_after(interval);
    }

    fn enable_interrupts(&mut self) {
        enable_interrupts();
    }

    fn wait_for_interrupt(&mut self) {
        wait_for_interrupt();
    }
}

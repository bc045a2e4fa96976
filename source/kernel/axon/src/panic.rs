// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Panic handler emitting location and message over the raw UART, then parking the hart
//! OWNERS: @kernel-team
//! PUBLIC API: panic handler (no_std)
//! DEPENDS_ON: uart::raw_writer(), arch::riscv::halt()
//! INVARIANTS: No console lock (the panicking hart may hold it); no allocation

#[cfg(all(target_os = "none", not(test)))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use core::fmt::Write;

    let mut w = crate::uart::raw_writer();
    let _ = w.write_str("\nPANIC: ");
    if let Some(location) = info.location() {
        let _ = write!(w, "{}:{}: ", location.file(), location.line());
    }
    let _ = write!(w, "{}\n", info.message());

    #[cfg(target_arch = "riscv64")]
    {
        let hart: usize;
        // SAFETY: reads the thread pointer, which holds the hart id set up at entry.
        unsafe { core::arch::asm!("mv {}, tp", out(reg) hart) };
        let _ = write!(w, "PANIC hart={}\n", hart);
    }

    crate::arch::riscv::halt()
}

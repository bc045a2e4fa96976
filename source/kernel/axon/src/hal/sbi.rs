// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! SBI-backed firmware queries and inter-hart wakeups.

use super::{ConfigKey, FirmwareConfig, HartWake};

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
use sbi_rt as sbi;

/// Legacy-convention vendor call exposing the board's device-tree values.
#[cfg_attr(not(all(target_arch = "riscv64", target_os = "none")), allow(dead_code))]
const SBI_EXT_READ_FDT: usize = 0x0a;

/// Firmware configuration read through the board firmware's FDT query call.
///
/// The firmware answers zero for keys it does not know; every key the boot
/// core asks for is non-zero on a bootable platform, so zero maps to `None`.
pub struct SbiFirmware;

impl FirmwareConfig for SbiFirmware {
    fn read(&self, key: ConfigKey) -> Option<u64> {
        let value = read_fdt(key as usize);
        log_debug!(target: "sbi", "fdt key={} value=0x{:x}", key, value);
        if value == 0 {
            None
        } else {
            Some(value as u64)
        }
    }
}

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
fn read_fdt(key: usize) -> usize {
    let value: usize;
    // SAFETY: legacy SBI call; firmware only writes a0 and does not touch kernel memory.
    unsafe {
        core::arch::asm!(
            "ecall",
            inlateout("a0") key => value,
            in("a7") SBI_EXT_READ_FDT,
            options(nostack)
        );
    }
    value
}

#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
fn read_fdt(_key: usize) -> usize {
    0
}

/// Wakes parked harts by sending a supervisor software interrupt.
pub struct SbiHartWake;

impl HartWake for SbiHartWake {
    fn wake(&mut self, mask: usize) {
        #[cfg(all(target_arch = "riscv64", target_os = "none"))]
        {
            let ret = sbi::send_ipi(mask, 0);
            if ret.error != 0 {
                log_error!(target: "smp", "wake mask=0x{:x} failed err=0x{:x}", mask, ret.error);
            }
        }
        #[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
        {
            let _ = mask;
        }
    }
}

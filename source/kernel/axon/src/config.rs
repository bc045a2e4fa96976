// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Compile-time platform constants for the AXON bring-up core
//! OWNERS: @kernel-boot-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! PUBLIC API: NR_CPUS, MAX_CPUS, NUM_MAX_TASK, page/VA constants, device window lengths
//! DEPENDS_ON: core
//! INVARIANTS: NR_CPUS <= MAX_CPUS; PGDIR_PA page aligned; values stable across boots

/// Fixed CPU ceiling for bounded per-CPU state.
pub const MAX_CPUS: usize = 4;

/// Harts brought up on the reference board (dual-core).
pub const NR_CPUS: usize = 2;

/// Capacity of the general PCB table.
pub const NUM_MAX_TASK: usize = 16;

/// Base page size used by `ioremap` windows.
pub const NORMAL_PAGE_SIZE: usize = 4096;

/// Physical address of the kernel top-level page directory.
pub const PGDIR_PA: usize = 0x5e00_0000;

/// Offset of the kernel direct map (`kva = pa + KERNEL_VA_OFFSET`).
pub const KERNEL_VA_OFFSET: usize = 0xffff_ffc0_0000_0000;

/// Root-table entry holding the early identity window installed by the bootloader.
pub const TEMP_MAPPING_ROOT_INDEX: usize = 1;

/// Periodic scheduling ticks per second armed in steady state.
pub const TICKS_PER_SEC: u64 = 100;

/// Interrupt-controller MMIO window, in pages.
pub const PLIC_WINDOW_PAGES: usize = 0x4000;

/// Ethernet controller MMIO window, in pages.
pub const ETHERNET_WINDOW_PAGES: usize = 9;

/// Register block offset inside the ethernet window.
pub const ETHERNET_REG_OFFSET: usize = 0x8000;

/// System-level control register window, in pages.
pub const SLCR_WINDOW_PAGES: usize = 1;

static_assertions::const_assert!(NR_CPUS >= 1 && NR_CPUS <= MAX_CPUS);
static_assertions::const_assert!(MAX_CPUS <= usize::BITS as usize);
static_assertions::const_assert_eq!(PGDIR_PA % NORMAL_PAGE_SIZE, 0);

/// Converts a physical address to its kernel direct-map alias.
#[inline]
pub const fn pa2kva(pa: usize) -> usize {
    pa.wrapping_add(KERNEL_VA_OFFSET)
}

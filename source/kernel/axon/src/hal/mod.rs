// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hardware and collaborator abstraction traits consumed by the bring-up core.
//!
//! Everything the boot sequence needs from firmware, the memory manager,
//! device drivers and the per-hart CPU state is reached through these traits.
//! Target builds bind them to SBI/CSR code (`hal::sbi`, `arch::riscv`) or to
//! subsystem entry points supplied by the boot wrapper; unit tests bind them to
//! recording fakes.

pub mod sbi;

use core::fmt;

/// Keys understood by the firmware configuration query interface.
#[repr(usize)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigKey {
    /// Timer frequency (`/cpus/cpu/timebase-frequency`).
    Timebase = 0,
    /// System-level control register base (`/soc/slcr/reg`).
    SlcrBase = 1,
    /// Ethernet controller base (`/soc/ethernet/reg`).
    EthernetBase = 2,
    /// Interrupt controller base (`/soc/interrupt-controller/reg`).
    PlicBase = 3,
    /// Interrupt line count (`riscv,ndev`).
    NrIrqs = 4,
}

impl ConfigKey {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Timebase => "timebase",
            Self::SlcrBase => "slcr",
            Self::EthernetBase => "ethernet",
            Self::PlicBase => "plic",
            Self::NrIrqs => "nr_irqs",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only firmware configuration source (device tree or boot-protocol query).
pub trait FirmwareConfig {
    /// Returns the value for `key`, `None` when the platform does not provide it.
    fn read(&self, key: ConfigKey) -> Option<u64>;
}

/// Memory-manager entry point mapping device physical ranges into kernel space.
pub trait IoRemap {
    /// Maps `len` bytes at physical `phys` and returns the kernel-virtual base.
    fn ioremap(&mut self, phys: usize, len: usize) -> usize;
}

/// Status code returned by a failing driver entry point.
#[must_use = "driver failures are fatal to boot"]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverError {
    pub code: i64,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.code)
    }
}

/// Controller-specific configuration handed to the ethernet driver before init.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmacConfig {
    pub device_id: u16,
    /// Kernel-virtual base of the register block.
    pub base_address: usize,
    pub cache_coherent: bool,
}

/// Device driver initialization entry points, in dependency order.
pub trait DeviceDrivers {
    /// Initializes the interrupt controller mapped at `base`.
    fn plic_init(&mut self, base: usize, nr_irqs: u32) -> Result<(), DriverError>;
    /// Publishes the system-level control base used by the ethernet driver.
    fn set_slcr_base(&mut self, base: usize);
    /// Stores the ethernet controller configuration.
    fn configure_emac(&mut self, config: EmacConfig);
    /// Runs the ethernet driver's initialization entry point.
    fn emac_init(&mut self) -> Result<(), DriverError>;
}

/// One-shot subsystem initializers owned by other kernel layers.
pub trait KernelSubsystems {
    /// Futex bucket setup (primary only).
    fn init_futex(&mut self);
    /// Global exception/interrupt setup including the primary's trap vector.
    fn init_exception(&mut self);
    /// Local trap vector and interrupt-enable setup on a secondary hart.
    fn setup_exception(&mut self, cpu: crate::types::CpuId);
    /// Screen/terminal buffers (primary only).
    fn init_screen(&mut self);
}

/// Per-hart CPU state manipulated on entry to steady state.
pub trait CpuOps {
    fn clear_soft_pending(&mut self);
    /// Arms the next timer interrupt `interval` ticks from now.
    fn arm_timer(&mut self, interval: u64);
    fn enable_interrupts(&mut self);
    fn wait_for_interrupt(&mut self);
}

/// Wakes secondary harts parked in the bootloader.
pub trait HartWake {
    /// Signals every hart whose bit is set in `mask`.
    fn wake(&mut self, mask: usize);
}

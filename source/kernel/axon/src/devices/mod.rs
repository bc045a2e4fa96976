// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Fixed-order device bring-up on the primary hart
//! OWNERS: @kernel-drivers-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests with recording firmware/remap/driver fakes
//! PUBLIC API: bring_up_devices(), DeviceMap, Device, DeviceError
//! DEPENDS_ON: hal::{FirmwareConfig, IoRemap, DeviceDrivers}, timer::set_time_base
//! INVARIANTS: Timer -> interrupt controller -> network controller; fail-fast, no retry

use core::fmt;

use crate::config::{
    ETHERNET_REG_OFFSET, ETHERNET_WINDOW_PAGES, NORMAL_PAGE_SIZE, PLIC_WINDOW_PAGES,
    SLCR_WINDOW_PAGES,
};
use crate::hal::{ConfigKey, DeviceDrivers, DriverError, EmacConfig, FirmwareConfig, IoRemap};

/// Devices resolved during bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    InterruptController,
    NetworkController,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InterruptController => f.write_str("plic"),
            Self::NetworkController => f.write_str("emacps"),
        }
    }
}

/// Failure of a bring-up step.
#[must_use = "device bring-up failures are fatal"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// Firmware did not provide a required key.
    MissingKey(ConfigKey),
    /// A value does not fit the driver interface.
    OutOfRange(ConfigKey),
    /// Driver entry point returned a non-success status.
    Init { device: Device, code: i64 },
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey(key) => write!(f, "firmware key {} missing", key),
            Self::OutOfRange(key) => write!(f, "firmware key {} out of range", key),
            Self::Init { device, code } => write!(f, "{} init failed status {}", device, code),
        }
    }
}

/// A physical MMIO range and its kernel-virtual alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioWindow {
    pub phys: usize,
    pub virt: usize,
    pub len: usize,
}

/// Everything resolved by [`bring_up_devices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMap {
    /// Timer ticks per second.
    pub time_base: u64,
    pub plic: MmioWindow,
    pub nr_irqs: u32,
    /// System-level control registers handed to the network driver.
    pub slcr: MmioWindow,
    pub ethernet: MmioWindow,
    /// Kernel-virtual base of the ethernet register block.
    pub ethernet_regs: usize,
}

fn require(firmware: &dyn FirmwareConfig, key: ConfigKey) -> Result<u64, DeviceError> {
    match firmware.read(key) {
        Some(value) => Ok(value),
        None => {
            log_error!(target: "devices", "firmware key {} missing", key);
            Err(DeviceError::MissingKey(key))
        }
    }
}

fn require_addr(firmware: &dyn FirmwareConfig, key: ConfigKey) -> Result<usize, DeviceError> {
    let raw = require(firmware, key)?;
    usize::try_from(raw).map_err(|_| DeviceError::OutOfRange(key))
}

fn map_window(
    remap: &mut dyn IoRemap,
    name: &'static str,
    phys: usize,
    pages: usize,
) -> MmioWindow {
    let len = pages * NORMAL_PAGE_SIZE;
    let virt = remap.ioremap(phys, len);
    log_info!(target: "devices", "{} phys=0x{:x} virt=0x{:x} len=0x{:x}", name, phys, virt, len);
    MmioWindow { phys, virt, len }
}

fn driver_status(device: Device, result: Result<(), DriverError>) -> Result<(), DeviceError> {
    result.map_err(|err| {
        log_error!(target: "devices", "{} init failed: {}", device, err);
        DeviceError::Init { device, code: err.code }
    })
}

/// Resolves, maps and initializes the platform devices in dependency order.
///
/// 1. timer base (published through `timer::set_time_base`)
/// 2. interrupt controller
/// 3. network controller (system-control window, then the ethernet window)
///
/// The first failure is returned; later steps are not attempted.
pub fn bring_up_devices(
    firmware: &dyn FirmwareConfig,
    remap: &mut dyn IoRemap,
    drivers: &mut dyn DeviceDrivers,
) -> Result<DeviceMap, DeviceError> {
    let time_base = require(firmware, ConfigKey::Timebase)?;
    crate::timer::set_time_base(time_base);
    log_info!(target: "devices", "time_base={}", time_base);

    let plic_phys = require_addr(firmware, ConfigKey::PlicBase)?;
    let nr_irqs = require(firmware, ConfigKey::NrIrqs)?;
    let nr_irqs = u32::try_from(nr_irqs).map_err(|_| DeviceError::OutOfRange(ConfigKey::NrIrqs))?;
    log_info!(target: "devices", "plic nr_irqs=0x{:x}", nr_irqs);
    let plic = map_window(remap, "plic", plic_phys, PLIC_WINDOW_PAGES);
    driver_status(Device::InterruptController, drivers.plic_init(plic.virt, nr_irqs))?;

    let slcr_phys = require_addr(firmware, ConfigKey::SlcrBase)?;
    let ethernet_phys = require_addr(firmware, ConfigKey::EthernetBase)?;
    let slcr = map_window(remap, "slcr", slcr_phys, SLCR_WINDOW_PAGES);
    drivers.set_slcr_base(slcr.virt);
    let ethernet = map_window(remap, "ethernet", ethernet_phys, ETHERNET_WINDOW_PAGES);
    let ethernet_regs = ethernet.virt + ETHERNET_REG_OFFSET;
    drivers.configure_emac(EmacConfig {
        device_id: 0,
        base_address: ethernet_regs,
        cache_coherent: false,
    });
    driver_status(Device::NetworkController, drivers.emac_init())?;

    Ok(DeviceMap { time_base, plic, nr_irqs, slcr, ethernet, ethernet_regs })
}
